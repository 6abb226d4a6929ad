// crates/server/src/pipelines/comprehensive.rs
//! The full analysis pipeline: basic prediction, then optional
//! refinement of the predicted structure, then optional ensemble
//! prediction, with one aggregated payload.

use std::path::PathBuf;

use rnafold_jobs::{WorkContext, WorkError, WorkResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::basic::{self, BasicParams};
use super::ensemble::{self, EnsembleParams};
use super::refinement::{self, RefinementParams};
use super::{checkpoint, ModelConfig, PipelineSettings};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveParams {
    pub input_file: PathBuf,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub include_refinement: bool,
    #[serde(default = "default_true")]
    pub include_ensemble: bool,
    #[serde(default)]
    pub use_mock: bool,
}

pub async fn run(
    params: ComprehensiveParams,
    settings: PipelineSettings,
    ctx: WorkContext,
) -> WorkResult {
    let output_dir = params
        .output_dir
        .unwrap_or_else(|| params.input_file.with_extension("analysis"));

    ctx.log("stage 1/3: basic prediction").await;
    let prediction = basic::run(
        BasicParams {
            input_file: params.input_file.clone(),
            output_file: Some(output_dir.join("predicted.pdb")),
            model_config: ModelConfig::default(),
            use_mock: params.use_mock,
        },
        settings.clone(),
        ctx.clone(),
    )
    .await?;

    let refinement = if params.include_refinement {
        checkpoint(&ctx)?;
        ctx.log("stage 2/3: structure refinement").await;
        let structure = prediction["structure_file"]
            .as_str()
            .map(PathBuf::from)
            .ok_or_else(|| WorkError::failed("prediction payload carries no structure file"))?;
        Some(
            refinement::run(
                RefinementParams {
                    input_file: structure,
                    output_file: Some(output_dir.join("refined.pdb")),
                    steps: 1000,
                    use_mock: params.use_mock,
                },
                settings.clone(),
                ctx.clone(),
            )
            .await?,
        )
    } else {
        None
    };

    let ensemble = if params.include_ensemble {
        checkpoint(&ctx)?;
        ctx.log("stage 3/3: ensemble prediction").await;
        Some(
            ensemble::run(
                EnsembleParams {
                    input_file: params.input_file.clone(),
                    output_dir: Some(output_dir.join("ensemble")),
                    max_models: 4,
                    use_mock: params.use_mock,
                },
                settings,
                ctx.clone(),
            )
            .await?,
        )
    } else {
        None
    };

    Ok(json!({
        "output_dir": output_dir,
        "prediction": prediction,
        "refinement": refinement,
        "ensemble": ensemble,
    }))
}
