// crates/server/src/pipelines/mod.rs
//! The prediction pipelines the server exposes as background jobs.
//!
//! Each pipeline is an opaque work unit from the job core's point of
//! view: it gets a `WorkContext`, logs through it, polls its cancellation
//! token between passes, and returns a JSON payload or a `WorkError`.
//!
//! Two execution paths per pipeline:
//! - an external script (`python3 <scripts_dir>/<name>.py ...`) when a
//!   scripts directory is configured; this is the path where
//!   cancellation can forcibly kill the process;
//! - a built-in mock that produces deterministic placeholder structures,
//!   used when no toolchain is installed or `use_mock` is set.

pub mod basic;
pub mod comprehensive;
pub mod ensemble;
pub mod inference;
pub mod refinement;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rnafold_jobs::{run_command, WorkContext, WorkError, WorkResult};
use serde::{Deserialize, Serialize};

/// Pacing of mock pipeline passes. Long enough that cancellation and
/// polling behavior is observable, short enough for tests.
pub(crate) const MOCK_PASS_DURATION: Duration = Duration::from_millis(15);

/// DRfold2 model configurations accepted by the prediction pipelines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelConfig {
    #[default]
    #[serde(rename = "cfg_95")]
    Cfg95,
    #[serde(rename = "cfg_96")]
    Cfg96,
    #[serde(rename = "cfg_97")]
    Cfg97,
    #[serde(rename = "cfg_99")]
    Cfg99,
}

impl ModelConfig {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cfg95 => "cfg_95",
            Self::Cfg96 => "cfg_96",
            Self::Cfg97 => "cfg_97",
            Self::Cfg99 => "cfg_99",
        }
    }
}

impl std::fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment handed to every pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    /// Directory holding the DRfold2 pipeline scripts. `None` means no
    /// toolchain is installed and all pipelines run their mock path.
    pub scripts_dir: Option<PathBuf>,
}

/// Run a pipeline script as an external process, if one is available.
///
/// Returns `None` when no scripts directory is configured or the script
/// is missing, letting the caller fall back to the mock path.
pub(crate) async fn run_script(
    ctx: &WorkContext,
    settings: &PipelineSettings,
    script_name: &str,
    args: Vec<String>,
) -> Option<WorkResult> {
    let dir = settings.scripts_dir.as_ref()?;
    let script = dir.join(script_name);
    if !script.exists() {
        return None;
    }
    let mut full_args = vec![script.to_string_lossy().into_owned()];
    full_args.extend(args);
    Some(run_command(ctx, "python3", &full_args).await)
}

/// Fail the work unit if cancellation has been requested. Pipelines call
/// this between passes; it is the only place in-process work observes
/// the advisory flag.
pub(crate) fn checkpoint(ctx: &WorkContext) -> Result<(), WorkError> {
    if ctx.is_cancelled() {
        Err(WorkError::Cancelled)
    } else {
        Ok(())
    }
}

/// Write a placeholder PDB structure for a sequence: one phosphate
/// record per nucleotide on a simple helix, enough for downstream code
/// that only needs a syntactically valid file.
pub(crate) async fn write_mock_structure(path: &Path, sequence: &str) -> Result<(), WorkError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| WorkError::failed(format!("cannot create {}: {e}", parent.display())))?;
    }

    let mut pdb = String::from("HEADER    MOCK RNA STRUCTURE\n");
    for (i, base) in sequence.chars().enumerate() {
        let turn = i as f64 * 0.6;
        pdb.push_str(&format!(
            "ATOM  {:>5}  P     {} A{:>4}    {:8.3}{:8.3}{:8.3}  1.00  0.00           P\n",
            i + 1,
            base,
            i + 1,
            9.4 * turn.cos(),
            9.4 * turn.sin(),
            2.81 * i as f64,
        ));
    }
    pdb.push_str("END\n");

    tokio::fs::write(path, pdb)
        .await
        .map_err(|e| WorkError::failed(format!("cannot write {}: {e}", path.display())))
}

/// Default output location next to the input: `<input>.<ext>`.
pub(crate) fn sibling_output(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_serde_names() {
        let cfg: ModelConfig = serde_json::from_str("\"cfg_97\"").unwrap();
        assert_eq!(cfg, ModelConfig::Cfg97);
        assert_eq!(serde_json::to_string(&ModelConfig::Cfg95).unwrap(), "\"cfg_95\"");
        assert!(serde_json::from_str::<ModelConfig>("\"cfg_42\"").is_err());
    }

    #[tokio::test]
    async fn mock_structure_covers_every_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdb");
        write_mock_structure(&path, "AUGC").await.unwrap();
        let pdb = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(pdb.lines().filter(|l| l.starts_with("ATOM")).count(), 4);
        assert!(pdb.ends_with("END\n"));
    }
}
