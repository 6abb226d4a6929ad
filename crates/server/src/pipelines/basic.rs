// crates/server/src/pipelines/basic.rs
//! Basic single-sequence structure prediction, plus the batch variant
//! that folds every sequence file in one submission.

use std::path::PathBuf;

use rnafold_jobs::{WorkContext, WorkError, WorkResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    checkpoint, run_script, sibling_output, write_mock_structure, ModelConfig, PipelineSettings,
    MOCK_PASS_DURATION,
};
use crate::fasta;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicParams {
    pub input_file: PathBuf,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub model_config: ModelConfig,
    #[serde(default)]
    pub use_mock: bool,
}

/// Predict the structure of the first sequence in `input_file`.
pub async fn run(
    params: BasicParams,
    settings: PipelineSettings,
    ctx: WorkContext,
) -> WorkResult {
    let sequences = fasta::load_fasta(&params.input_file)
        .await
        .map_err(|e| WorkError::failed(e.to_string()))?;
    let seq = &sequences[0];
    ctx.log(&format!(
        "loaded {} ({} nt) from {}",
        seq.name,
        seq.sequence.len(),
        params.input_file.display()
    ))
    .await;

    if !params.use_mock {
        let args = vec![
            "--input".into(),
            params.input_file.to_string_lossy().into_owned(),
            "--model-config".into(),
            params.model_config.to_string(),
        ];
        if let Some(result) = run_script(&ctx, &settings, "basic_prediction.py", args).await {
            return result;
        }
        ctx.log("prediction toolchain unavailable; using mock prediction")
            .await;
    }

    for pass in ["extracting features", "folding", "scoring"] {
        checkpoint(&ctx)?;
        ctx.log(&format!("{}: {pass}", params.model_config)).await;
        tokio::time::sleep(MOCK_PASS_DURATION).await;
    }
    checkpoint(&ctx)?;

    let output = params
        .output_file
        .unwrap_or_else(|| sibling_output(&params.input_file, "pdb"));
    write_mock_structure(&output, &seq.sequence).await?;
    ctx.log(&format!("wrote structure to {}", output.display()))
        .await;

    Ok(json!({
        "structure_file": output,
        "sequence_name": seq.name,
        "sequence_length": seq.sequence.len(),
        "prediction_method": "mock",
        "model_config": params.model_config,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchParams {
    pub input_files: Vec<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub model_config: ModelConfig,
    #[serde(default)]
    pub use_mock: bool,
}

/// Fold every input file with the same model configuration. Per-file
/// failures are recorded in the payload; the batch itself fails only if
/// no file succeeds.
pub async fn run_batch(
    params: BatchParams,
    settings: PipelineSettings,
    ctx: WorkContext,
) -> WorkResult {
    let total = params.input_files.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut succeeded = 0usize;

    for (i, input) in params.input_files.iter().enumerate() {
        checkpoint(&ctx)?;
        ctx.log(&format!("[{}/{total}] {}", i + 1, input.display()))
            .await;

        let output_file = params.output_dir.as_ref().map(|dir| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("sequence_{}", i + 1));
            dir.join(format!("{stem}.pdb"))
        });
        let item = BasicParams {
            input_file: input.clone(),
            output_file,
            model_config: params.model_config,
            use_mock: params.use_mock,
        };

        match run(item, settings.clone(), ctx.clone()).await {
            Ok(payload) => {
                succeeded += 1;
                outcomes.push(json!({"input": input, "status": "success", "result": payload}));
            }
            Err(WorkError::Cancelled) => return Err(WorkError::Cancelled),
            Err(e) => {
                ctx.log(&format!("{} failed: {e}", input.display())).await;
                outcomes.push(json!({"input": input, "status": "failed", "error": e.to_string()}));
            }
        }
    }

    if succeeded == 0 {
        return Err(WorkError::failed(format!("all {total} inputs failed")));
    }

    Ok(json!({
        "total": total,
        "succeeded": succeeded,
        "failed": total - succeeded,
        "model_config": params.model_config,
        "outcomes": outcomes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rnafold_jobs::LogSink;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    async fn context(dir: &tempfile::TempDir) -> (WorkContext, CancellationToken) {
        let sink = LogSink::new(dir.path().join("logs"));
        let id = Uuid::new_v4();
        let log = sink.writer(id).await.unwrap();
        let token = CancellationToken::new();
        (WorkContext::new(id, log, token.clone()), token)
    }

    async fn write_fasta(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, body).await.unwrap();
        path
    }

    #[tokio::test]
    async fn mock_prediction_produces_structure() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _token) = context(&dir).await;
        let input = write_fasta(&dir, "seq.fasta", ">s1\nAUGCAUGC\n").await;

        let payload = run(
            BasicParams {
                input_file: input.clone(),
                output_file: None,
                model_config: ModelConfig::Cfg96,
                use_mock: true,
            },
            PipelineSettings::default(),
            ctx,
        )
        .await
        .unwrap();

        assert_eq!(payload["sequence_length"], 8);
        assert_eq!(payload["model_config"], "cfg_96");
        let structure = PathBuf::from(payload["structure_file"].as_str().unwrap());
        assert!(structure.exists());
    }

    #[tokio::test]
    async fn missing_input_fails_the_work_unit() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _token) = context(&dir).await;

        let err = run(
            BasicParams {
                input_file: dir.path().join("absent.fasta"),
                output_file: None,
                model_config: ModelConfig::default(),
                use_mock: true,
            },
            PipelineSettings::default(),
            ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkError::Failed { .. }));
    }

    #[tokio::test]
    async fn cancellation_between_passes_is_observed() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, token) = context(&dir).await;
        let input = write_fasta(&dir, "seq.fasta", ">s1\nAUGC\n").await;

        token.cancel();
        let err = run(
            BasicParams {
                input_file: input,
                output_file: None,
                model_config: ModelConfig::default(),
                use_mock: true,
            },
            PipelineSettings::default(),
            ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkError::Cancelled));
    }

    #[tokio::test]
    async fn batch_records_per_file_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _token) = context(&dir).await;
        let good = write_fasta(&dir, "good.fasta", ">g\nAUGC\n").await;
        let missing = dir.path().join("missing.fasta");
        let out = dir.path().join("batch-out");

        let payload = run_batch(
            BatchParams {
                input_files: vec![good, missing],
                output_dir: Some(out.clone()),
                model_config: ModelConfig::default(),
                use_mock: true,
            },
            PipelineSettings::default(),
            ctx,
        )
        .await
        .unwrap();

        assert_eq!(payload["total"], 2);
        assert_eq!(payload["succeeded"], 1);
        assert_eq!(payload["failed"], 1);
        assert!(out.join("good.pdb").exists());
    }

    #[tokio::test]
    async fn batch_with_no_successes_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _token) = context(&dir).await;

        let err = run_batch(
            BatchParams {
                input_files: vec![dir.path().join("nope.fasta")],
                output_dir: None,
                model_config: ModelConfig::default(),
                use_mock: true,
            },
            PipelineSettings::default(),
            ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkError::Failed { .. }));
    }
}
