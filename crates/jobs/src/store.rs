// crates/jobs/src/store.rs
//! Durable registry of job records.
//!
//! The store owns the authoritative copy of every [`JobRecord`]. All
//! mutations go through [`JobStore::update`], which applies the caller's
//! closure and flushes the mutated record to disk *before* releasing the
//! registry lock. A successful update is always durable, and no reader
//! ever observes a partially applied mutation.
//!
//! At startup the in-memory registry is rebuilt by scanning the on-disk
//! job directories, so a restart loses no terminal job's final state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rnafold_types::{JobId, JobRecord, JobStatus, WorkDescriptor};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::persist;
use crate::status::{self, TransitionError};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("conflicting update for job {id}: {reason}")]
    Conflict { id: JobId, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed job data at {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// In-memory registry: records by id, plus submission order.
#[derive(Default)]
struct Registry {
    records: HashMap<JobId, JobRecord>,
    order: Vec<JobId>,
}

/// Durable, internally serialized job registry.
pub struct JobStore {
    root: PathBuf,
    inner: RwLock<Registry>,
}

impl JobStore {
    /// Open the store rooted at `root`, creating the directory if needed
    /// and rehydrating all records found on disk.
    ///
    /// Records left `pending` or `running` by a previous process are
    /// finalized as `failed` ("aborted by server restart"); a job is
    /// never silently resumed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Io {
                path: root.clone(),
                source: e,
            })?;

        let mut records = persist::load_all(&root).await?;
        records.sort_by_key(|r| r.submitted_at);

        let now = Utc::now();
        let mut registry = Registry::default();
        for mut record in records {
            if status::finalize_interrupted(&mut record, now) {
                warn!(job_id = %record.id, "finalized job interrupted by restart");
                persist::write_record(&root, &record).await?;
            }
            registry.order.push(record.id);
            registry.records.insert(record.id, record);
        }

        if !registry.order.is_empty() {
            info!(jobs = registry.order.len(), root = %root.display(), "rehydrated job registry");
        }

        Ok(Self {
            root,
            inner: RwLock::new(registry),
        })
    }

    /// Directory holding the per-job durable units.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new `pending` record. The record is persisted before this
    /// returns; if persistence fails, the registry is left unchanged and
    /// the error is surfaced to the submitter.
    pub async fn create(
        &self,
        descriptor: WorkDescriptor,
        name: Option<String>,
    ) -> Result<JobRecord, StoreError> {
        let record = JobRecord::new(descriptor, name, Utc::now());

        let mut registry = self.inner.write().await;
        persist::write_record(&self.root, &record).await?;
        registry.order.push(record.id);
        registry.records.insert(record.id, record.clone());
        Ok(record)
    }

    /// Fetch a snapshot of a record.
    pub async fn get(&self, id: JobId) -> Result<JobRecord, StoreError> {
        let registry = self.inner.read().await;
        registry
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Atomically mutate a record.
    ///
    /// The closure runs against a copy under the registry write lock; the
    /// mutated record is flushed to disk before the lock is released and
    /// before it becomes visible to readers. On any error the in-memory
    /// record is unchanged.
    ///
    /// Updating a record already in a terminal state fails with
    /// [`StoreError::Conflict`]. (Log appends do not go through the store
    /// and are never blocked.)
    pub async fn update<F>(&self, id: JobId, mutate: F) -> Result<JobRecord, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), TransitionError>,
    {
        let mut registry = self.inner.write().await;
        let current = registry.records.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.status.is_terminal() {
            return Err(StoreError::Conflict {
                id,
                reason: format!("record is terminal ({})", current.status),
            });
        }

        let mut updated = current.clone();
        mutate(&mut updated).map_err(|e| StoreError::Conflict {
            id,
            reason: e.to_string(),
        })?;

        persist::write_record(&self.root, &updated).await?;
        if updated.status == JobStatus::Completed {
            if let Some(result) = &updated.result {
                persist::write_result(&self.root, id, result).await?;
            }
        }

        registry.records.insert(id, updated.clone());
        Ok(updated)
    }

    /// All records in submission order, optionally filtered by status.
    pub async fn list(&self, filter: Option<JobStatus>) -> Vec<JobRecord> {
        let registry = self.inner.read().await;
        registry
            .order
            .iter()
            .filter_map(|id| registry.records.get(id))
            .filter(|r| filter.map_or(true, |s| r.status == s))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn descriptor() -> WorkDescriptor {
        WorkDescriptor::new("basic", serde_json::json!({"model_config": "cfg_95"}))
    }

    #[tokio::test]
    async fn create_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();

        let record = store.create(descriptor(), Some("first".into())).await.unwrap();
        let fetched = store.get(record.id).await.unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.name.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_applies_transition_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        let record = store.create(descriptor(), None).await.unwrap();

        let updated = store
            .update(record.id, |r| {
                status::transition(r, JobStatus::Running, Utc::now())
            })
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Running);

        // Reopen from disk: the running record was flushed.
        drop(store);
        let store = JobStore::open(dir.path()).await.unwrap();
        // ...and finalized as failed, since it was mid-flight at "crash".
        let reloaded = store.get(record.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn update_on_terminal_record_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        let record = store.create(descriptor(), None).await.unwrap();

        store
            .update(record.id, |r| {
                status::transition(r, JobStatus::Cancelled, Utc::now())
            })
            .await
            .unwrap();

        let err = store
            .update(record.id, |r| {
                r.cancel_requested = true;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn illegal_transition_is_conflict_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        let record = store.create(descriptor(), None).await.unwrap();

        let err = store
            .update(record.id, |r| {
                status::transition(r, JobStatus::Completed, Utc::now())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get(record.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn list_preserves_submission_order_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();

        let a = store.create(descriptor(), Some("a".into())).await.unwrap();
        let b = store.create(descriptor(), Some("b".into())).await.unwrap();
        let c = store.create(descriptor(), Some("c".into())).await.unwrap();

        store
            .update(b.id, |r| status::transition(r, JobStatus::Running, Utc::now()))
            .await
            .unwrap();
        store
            .update(b.id, |r| status::transition(r, JobStatus::Failed, Utc::now()))
            .await
            .unwrap();

        let all = store.list(None).await;
        assert_eq!(
            all.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![a.id, b.id, c.id]
        );

        let failed = store.list(Some(JobStatus::Failed)).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);
    }

    #[tokio::test]
    async fn terminal_records_survive_reopen_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        let record = store.create(descriptor(), None).await.unwrap();

        store
            .update(record.id, |r| {
                status::transition(r, JobStatus::Running, Utc::now())
            })
            .await
            .unwrap();
        store
            .update(record.id, |r| {
                status::transition(r, JobStatus::Completed, Utc::now())?;
                r.result = Some(serde_json::json!({"value": 42}));
                Ok(())
            })
            .await
            .unwrap();

        drop(store);
        let store = JobStore::open(dir.path()).await.unwrap();
        let reloaded = store.get(record.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.result, Some(serde_json::json!({"value": 42})));
        assert!(reloaded.finished_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_updates_serialize_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JobStore::open(dir.path()).await.unwrap());
        let record = store.create(descriptor(), None).await.unwrap();

        // A racing claim and cancel-flag write: both go through the write
        // lock; exactly one ordering is observed, never a torn record.
        let claim = {
            let store = store.clone();
            let id = record.id;
            tokio::spawn(async move {
                store
                    .update(id, |r| status::transition(r, JobStatus::Running, Utc::now()))
                    .await
            })
        };
        let flag = {
            let store = store.clone();
            let id = record.id;
            tokio::spawn(async move {
                store
                    .update(id, |r| {
                        r.cancel_requested = true;
                        Ok(())
                    })
                    .await
            })
        };

        claim.await.unwrap().unwrap();
        flag.await.unwrap().unwrap();

        let record = store.get(record.id).await.unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert!(record.cancel_requested);
    }
}
