// crates/jobs/src/persist.rs
//! Durable on-disk layout for job records.
//!
//! One directory per job under the store root:
//!
//! ```text
//! <root>/<job_id>/record.json   metadata, status, timestamps, error
//! <root>/<job_id>/result.json   success payload, written only on completion
//! <root>/<job_id>/job.log       append-only log, owned by the log sink
//! ```
//!
//! `record.json` is written atomically (temp file + rename) so a crash
//! mid-write never leaves a half-record behind.

use std::path::{Path, PathBuf};

use rnafold_types::{JobId, JobRecord, JobStatus};
use tracing::warn;

use crate::store::StoreError;

const RECORD_FILE: &str = "record.json";
const RESULT_FILE: &str = "result.json";
pub(crate) const LOG_FILE: &str = "job.log";

pub(crate) fn job_dir(root: &Path, id: JobId) -> PathBuf {
    root.join(id.to_string())
}

pub(crate) fn record_path(root: &Path, id: JobId) -> PathBuf {
    job_dir(root, id).join(RECORD_FILE)
}

pub(crate) fn result_path(root: &Path, id: JobId) -> PathBuf {
    job_dir(root, id).join(RESULT_FILE)
}

pub(crate) fn log_path(root: &Path, id: JobId) -> PathBuf {
    job_dir(root, id).join(LOG_FILE)
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a record's metadata to `record.json`, atomically.
pub(crate) async fn write_record(root: &Path, record: &JobRecord) -> Result<(), StoreError> {
    let dir = job_dir(root, record.id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| io_err(&dir, e))?;

    let path = record_path(root, record.id);
    let json = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Malformed {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Write a completed job's success payload to `result.json`.
pub(crate) async fn write_result(
    root: &Path,
    id: JobId,
    result: &serde_json::Value,
) -> Result<(), StoreError> {
    let path = result_path(root, id);
    let json = serde_json::to_vec_pretty(result).map_err(|e| StoreError::Malformed {
        path: path.clone(),
        message: e.to_string(),
    })?;
    tokio::fs::write(&path, &json)
        .await
        .map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Scan the store root and load every job record found on disk.
///
/// Entries without a parseable `record.json` are skipped with a warning
/// so one corrupt record cannot block startup. Completed jobs get their
/// `result.json` payload re-attached when present.
pub(crate) async fn load_all(root: &Path) -> Result<Vec<JobRecord>, StoreError> {
    let mut records = Vec::new();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(io_err(root, e)),
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(root, e))? {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let path = dir.join(RECORD_FILE);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping job dir without readable record");
                continue;
            }
        };
        let mut record: JobRecord = match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed job record");
                continue;
            }
        };

        if record.status == JobStatus::Completed {
            let result_file = dir.join(RESULT_FILE);
            match tokio::fs::read_to_string(&result_file).await {
                Ok(json) => match serde_json::from_str(&json) {
                    Ok(value) => record.result = Some(value),
                    Err(e) => {
                        warn!(path = %result_file.display(), error = %e, "malformed result artifact")
                    }
                },
                Err(e) => {
                    warn!(path = %result_file.display(), error = %e, "completed job missing result artifact")
                }
            }
        }

        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rnafold_types::WorkDescriptor;

    fn record() -> JobRecord {
        JobRecord::new(
            WorkDescriptor::new("ensemble", serde_json::json!({"max_models": 2})),
            Some("test".into()),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn write_then_load_round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let r = record();
        write_record(dir.path(), &r).await.unwrap();

        let loaded = load_all(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, r.id);
        assert_eq!(loaded[0].status, JobStatus::Pending);
        assert_eq!(loaded[0].descriptor.pipeline, "ensemble");
    }

    #[tokio::test]
    async fn result_artifact_is_reattached_for_completed_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = record();
        crate::status::transition(&mut r, JobStatus::Running, chrono::Utc::now()).unwrap();
        crate::status::transition(&mut r, JobStatus::Completed, chrono::Utc::now()).unwrap();
        write_record(dir.path(), &r).await.unwrap();
        write_result(dir.path(), r.id, &serde_json::json!({"value": 42}))
            .await
            .unwrap();

        let loaded = load_all(dir.path()).await.unwrap();
        assert_eq!(loaded[0].result, Some(serde_json::json!({"value": 42})));
    }

    #[tokio::test]
    async fn malformed_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = record();
        write_record(dir.path(), &good).await.unwrap();

        let bad_dir = dir.path().join("not-a-job");
        tokio::fs::create_dir_all(&bad_dir).await.unwrap();
        tokio::fs::write(bad_dir.join(RECORD_FILE), b"{ nope")
            .await
            .unwrap();

        let loaded = load_all(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, good.id);
    }

    #[tokio::test]
    async fn missing_root_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_all(&dir.path().join("absent")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn rewrite_replaces_record_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = record();
        write_record(dir.path(), &r).await.unwrap();
        crate::status::transition(&mut r, JobStatus::Running, chrono::Utc::now()).unwrap();
        write_record(dir.path(), &r).await.unwrap();

        let loaded = load_all(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, JobStatus::Running);
        assert!(!record_path(dir.path(), r.id)
            .with_extension("json.tmp")
            .exists());
    }
}
