// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use rnafold_jobs::JobManager;

use crate::pipelines::PipelineSettings;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// The job orchestration core.
    pub manager: Arc<JobManager>,
    /// Environment handed to pipeline work units.
    pub pipelines: PipelineSettings,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(manager: Arc<JobManager>, pipelines: PipelineSettings) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            manager,
            pipelines,
        })
    }
}
