// crates/server/src/routes/fasta.rs
//! FASTA validation endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::fasta::{self, FastaError, SequenceReport};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    file_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    file: PathBuf,
    num_sequences: usize,
    valid: bool,
    sequences: Vec<SequenceReport>,
}

/// POST /api/fasta/validate — parse an RNA FASTA file and report
/// per-sequence validity and statistics.
async fn validate(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> ApiResult<Json<ValidateResponse>> {
    let sequences = fasta::load_fasta(&req.file_path).await.map_err(|e| match e {
        FastaError::NotFound { path } => ApiError::FileNotFound(path),
        FastaError::Empty { .. } => ApiError::BadRequest(e.to_string()),
        FastaError::Io { .. } => ApiError::Internal(e.to_string()),
    })?;

    let reports: Vec<SequenceReport> = sequences
        .iter()
        .map(|s| fasta::validate_sequence(&s.name, &s.sequence))
        .collect();

    Ok(Json(ValidateResponse {
        file: req.file_path,
        num_sequences: reports.len(),
        valid: reports.iter().all(|r| r.valid),
        sequences: reports,
    }))
}

/// Build the fasta router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/fasta/validate", post(validate))
}
