// crates/server/src/routes/mod.rs
//! API route modules.

pub mod fasta;
pub mod health;
pub mod jobs;
pub mod pipelines;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` router over the shared application state.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(health::router())
                .merge(jobs::router())
                .merge(pipelines::router())
                .merge(fasta::router()),
        )
        .with_state(state)
}
