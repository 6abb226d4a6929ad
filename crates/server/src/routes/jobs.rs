// crates/server/src/routes/jobs.rs
//! API routes for background job management.
//!
//! - GET  /jobs               — list jobs, submission order, optional status filter
//! - GET  /jobs/stream        — SSE stream of job status-change events
//! - GET  /jobs/{id}          — status summary
//! - GET  /jobs/{id}/result   — success payload of a completed job
//! - GET  /jobs/{id}/log      — tail of the job log
//! - POST /jobs/{id}/cancel   — advisory cancellation

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use rnafold_jobs::DEFAULT_LOG_TAIL;
use rnafold_types::{JobId, JobStatus, JobSummary};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

/// GET /api/jobs — all jobs in submission order, optionally filtered.
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    let filter = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<JobStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
        None => None,
    };
    Ok(Json(state.manager.list_jobs(filter).await))
}

/// GET /api/jobs/{id} — status summary; 404 for unknown ids.
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobSummary>> {
    Ok(Json(state.manager.get_status(id).await?))
}

/// GET /api/jobs/{id}/result — the success payload. 409 with the current
/// status while the job is anything other than completed.
async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(state.manager.get_result(id).await?))
}

fn default_tail() -> usize {
    DEFAULT_LOG_TAIL
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    #[serde(default = "default_tail")]
    tail: usize,
}

#[derive(Debug, Serialize)]
struct LogResponse {
    job_id: JobId,
    lines: Vec<String>,
    line_count: usize,
}

/// GET /api/jobs/{id}/log?tail=50 — last N log lines, oldest first.
async fn get_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<LogResponse>> {
    let lines = state.manager.get_log(id, query.tail).await?;
    Ok(Json(LogResponse {
        job_id: id,
        line_count: lines.len(),
        lines,
    }))
}

/// POST /api/jobs/{id}/cancel — advisory cancellation. A no-op success
/// on jobs that are already terminal.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobSummary>> {
    Ok(Json(state.manager.cancel_job(id).await?))
}

/// GET /api/jobs/stream — SSE stream of status-change events.
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.manager.subscribe();

    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Ok(event) = rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }
    };

    Sse::new(stream)
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/stream", get(stream_jobs))
        .route("/jobs/{id}", get(get_status))
        .route("/jobs/{id}/result", get(get_result))
        .route("/jobs/{id}/log", get(get_log))
        .route("/jobs/{id}/cancel", post(cancel_job))
}
