// crates/server/src/main.rs
//! rnafold server binary.
//!
//! Rehydrates the job registry from the data directory, then serves the
//! REST API. Jobs interrupted by the previous shutdown are finalized as
//! failed during rehydration; nothing is silently resumed.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use rnafold_jobs::JobManager;
use rnafold_server::{create_app, AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let jobs_root = config.jobs_root();
    tracing::info!(jobs_root = %jobs_root.display(), workers = config.workers, "opening job registry");
    let manager = JobManager::open(&jobs_root, config.executor_config()).await?;

    let state = AppState::new(manager, config.pipeline_settings());
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "rnafold server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
