// crates/server/src/error.rs
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rnafold_jobs::{ResultError, StoreError};
use rnafold_types::{JobId, JobStatus};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {id} is {status}; result unavailable")]
    ResultNotReady { id: JobId, status: JobStatus },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::JobNotFound(id),
            StoreError::Conflict { reason, .. } => ApiError::Conflict(reason),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ResultError> for ApiError {
    fn from(err: ResultError) -> Self {
        match err {
            ResultError::NotReady { id, status } => ApiError::ResultNotReady { id, status },
            ResultError::Store(store) => store.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {id}")),
                )
            }
            ApiError::ResultNotReady { id, status } => {
                tracing::debug!(job_id = %id, status = %status, "Result not ready");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details(
                        "Result unavailable",
                        format!("Job {id} is {status}"),
                    ),
                )
            }
            ApiError::FileNotFound(path) => {
                tracing::warn!(path = %path.display(), "File not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("File not found", path.display().to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
