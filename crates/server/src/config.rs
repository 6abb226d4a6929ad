// crates/server/src/config.rs
//! Server configuration from CLI flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rnafold_jobs::ExecutorConfig;

use crate::pipelines::PipelineSettings;

/// Default port for the server.
const DEFAULT_PORT: u16 = 47311;

#[derive(Debug, Clone, Parser)]
#[command(name = "rnafold-server", about = "RNA structure prediction job server", version)]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(long, env = "RNAFOLD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Data directory for job records, results, and logs.
    /// Defaults to the platform data dir (`~/.local/share/rnafold` on Linux).
    #[arg(long, env = "RNAFOLD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Maximum number of prediction jobs running concurrently.
    #[arg(long, env = "RNAFOLD_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Hard per-job time bound, in seconds.
    #[arg(long, env = "RNAFOLD_JOB_TIMEOUT_SECS", default_value_t = 2 * 60 * 60)]
    pub job_timeout_secs: u64,

    /// Directory holding the DRfold2 pipeline scripts. When unset, all
    /// pipelines run their built-in mock path.
    #[arg(long, env = "RNAFOLD_SCRIPTS_DIR")]
    pub scripts_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("rnafold")
        })
    }

    /// Root of the per-job durable units: `<data_dir>/jobs/`.
    pub fn jobs_root(&self) -> PathBuf {
        self.data_dir().join("jobs")
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrent: self.workers,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            scripts_dir: self.scripts_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::parse_from(["rnafold-server"]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.workers, 2);
        assert_eq!(config.job_timeout_secs, 7200);
        assert!(config.scripts_dir.is_none());
        assert!(config.jobs_root().ends_with("rnafold/jobs"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::parse_from([
            "rnafold-server",
            "--port",
            "9000",
            "--workers",
            "8",
            "--data-dir",
            "/tmp/rf",
            "--job-timeout-secs",
            "60",
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.executor_config().max_concurrent, 8);
        assert_eq!(
            config.executor_config().job_timeout,
            Duration::from_secs(60)
        );
        assert_eq!(config.jobs_root(), PathBuf::from("/tmp/rf/jobs"));
    }
}
