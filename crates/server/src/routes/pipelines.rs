// crates/server/src/routes/pipelines.rs
//! Submission endpoints for the prediction pipelines. Each handler
//! creates a background job and returns its id immediately; callers poll
//! `/api/jobs/{id}` for progress.

use std::future::Future;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use rnafold_jobs::{WorkContext, WorkResult};
use rnafold_types::{JobId, JobStatus, WorkDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::pipelines::basic::{BasicParams, BatchParams};
use crate::pipelines::comprehensive::ComprehensiveParams;
use crate::pipelines::ensemble::EnsembleParams;
use crate::pipelines::inference::InferenceParams;
use crate::pipelines::refinement::RefinementParams;
use crate::pipelines::{self, PipelineSettings};
use crate::state::AppState;

/// Request body for any pipeline submission: the pipeline's own
/// parameters plus an optional job label.
#[derive(Debug, Deserialize)]
struct SubmitRequest<P> {
    #[serde(flatten)]
    params: P,
    #[serde(default)]
    job_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: JobId,
    status: JobStatus,
}

/// Shared submission glue: record the descriptor, hand the pipeline
/// closure to the job core, answer 202 with the new id.
async fn submit<P, F, Fut>(
    state: Arc<AppState>,
    pipeline: &str,
    name: Option<String>,
    params: P,
    run: F,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)>
where
    P: Serialize + Send + 'static,
    F: FnOnce(P, PipelineSettings, WorkContext) -> Fut + Send + 'static,
    Fut: Future<Output = WorkResult> + Send + 'static,
{
    let descriptor = WorkDescriptor::new(
        pipeline,
        serde_json::to_value(&params).map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    let settings = state.pipelines.clone();
    let job_id = state
        .manager
        .submit(descriptor, name, move |ctx| run(params, settings, ctx))
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Pending,
        }),
    ))
}

/// `<prefix>_<input stem>`, the default label the original tools used.
fn stem_name(prefix: &str, input: &FsPath) -> Option<String> {
    input
        .file_stem()
        .map(|stem| format!("{prefix}_{}", stem.to_string_lossy()))
}

/// POST /api/pipelines/basic — single-sequence structure prediction.
async fn submit_basic(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest<BasicParams>>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let name = req
        .job_name
        .or_else(|| stem_name("basic", &req.params.input_file));
    submit(state, "basic", name, req.params, pipelines::basic::run).await
}

/// POST /api/pipelines/ensemble — multi-model ensemble prediction.
async fn submit_ensemble(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest<EnsembleParams>>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let name = req
        .job_name
        .or_else(|| stem_name("ensemble", &req.params.input_file));
    submit(state, "ensemble", name, req.params, pipelines::ensemble::run).await
}

/// POST /api/pipelines/refinement — structure refinement.
async fn submit_refinement(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest<RefinementParams>>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let name = req
        .job_name
        .or_else(|| stem_name("refine", &req.params.input_file));
    submit(
        state,
        "refinement",
        name,
        req.params,
        pipelines::refinement::run,
    )
    .await
}

/// POST /api/pipelines/inference — raw model inference.
async fn submit_inference(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest<InferenceParams>>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let name = req
        .job_name
        .or_else(|| stem_name("inference", &req.params.input_file));
    submit(
        state,
        "inference",
        name,
        req.params,
        pipelines::inference::run,
    )
    .await
}

/// POST /api/pipelines/batch — basic prediction over many inputs.
async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest<BatchParams>>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    if req.params.input_files.is_empty() {
        return Err(ApiError::BadRequest("no input files provided".into()));
    }
    let name = req
        .job_name
        .or_else(|| Some(format!("batch_{}_sequences", req.params.input_files.len())));
    submit(state, "batch", name, req.params, pipelines::basic::run_batch).await
}

/// POST /api/pipelines/comprehensive — full analysis pipeline.
async fn submit_comprehensive(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest<ComprehensiveParams>>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let name = req
        .job_name
        .or_else(|| stem_name("comprehensive", &req.params.input_file));
    submit(
        state,
        "comprehensive",
        name,
        req.params,
        pipelines::comprehensive::run,
    )
    .await
}

/// Build the pipelines router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pipelines/basic", post(submit_basic))
        .route("/pipelines/ensemble", post(submit_ensemble))
        .route("/pipelines/refinement", post(submit_refinement))
        .route("/pipelines/inference", post(submit_inference))
        .route("/pipelines/batch", post(submit_batch))
        .route("/pipelines/comprehensive", post(submit_comprehensive))
}
