// crates/server/src/pipelines/ensemble.rs
//! Ensemble prediction: fold the sequence with several model
//! configurations, then cluster the variants into a consensus structure.

use std::path::PathBuf;

use rnafold_jobs::{WorkContext, WorkError, WorkResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    checkpoint, run_script, write_mock_structure, ModelConfig, PipelineSettings,
    MOCK_PASS_DURATION,
};
use crate::fasta;

/// All model configurations an ensemble may draw from, in order.
const ENSEMBLE_MODELS: [ModelConfig; 4] = [
    ModelConfig::Cfg95,
    ModelConfig::Cfg96,
    ModelConfig::Cfg97,
    ModelConfig::Cfg99,
];

fn default_max_models() -> usize {
    ENSEMBLE_MODELS.len()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub input_file: PathBuf,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_max_models")]
    pub max_models: usize,
    #[serde(default)]
    pub use_mock: bool,
}

/// Run the ensemble pipeline. The cancellation token is polled between
/// model passes, so a cancel lands at the next pass boundary.
pub async fn run(
    params: EnsembleParams,
    settings: PipelineSettings,
    ctx: WorkContext,
) -> WorkResult {
    if params.max_models == 0 {
        return Err(WorkError::failed("max_models must be at least 1"));
    }

    let sequences = fasta::load_fasta(&params.input_file)
        .await
        .map_err(|e| WorkError::failed(e.to_string()))?;
    let seq = &sequences[0];

    if !params.use_mock {
        let args = vec![
            "--input".into(),
            params.input_file.to_string_lossy().into_owned(),
            "--max-models".into(),
            params.max_models.to_string(),
        ];
        if let Some(result) = run_script(&ctx, &settings, "ensemble_prediction.py", args).await {
            return result;
        }
        ctx.log("prediction toolchain unavailable; using mock ensemble")
            .await;
    }

    let output_dir = params
        .output_dir
        .unwrap_or_else(|| params.input_file.with_extension("ensemble"));
    let models = &ENSEMBLE_MODELS[..params.max_models.min(ENSEMBLE_MODELS.len())];

    let mut variants = Vec::with_capacity(models.len());
    for (i, model) in models.iter().enumerate() {
        checkpoint(&ctx)?;
        ctx.log(&format!("model {}/{}: folding with {model}", i + 1, models.len()))
            .await;
        tokio::time::sleep(MOCK_PASS_DURATION).await;

        let variant = output_dir.join(format!("variant_{model}.pdb"));
        write_mock_structure(&variant, &seq.sequence).await?;
        variants.push(variant);
    }

    checkpoint(&ctx)?;
    ctx.log(&format!("clustering {} variants", variants.len())).await;
    tokio::time::sleep(MOCK_PASS_DURATION).await;

    // The first variant stands in for the cluster medoid in mock mode.
    let consensus = output_dir.join("consensus.pdb");
    write_mock_structure(&consensus, &seq.sequence).await?;

    Ok(json!({
        "output_dir": output_dir,
        "models_generated": variants.len(),
        "variant_files": variants,
        "consensus_structure": consensus,
        "sequence_length": seq.sequence.len(),
    }))
}
