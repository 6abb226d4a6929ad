// crates/jobs/src/manager.rs
//! The public face of the job system.
//!
//! `JobManager` composes the store, log sink, and executor behind the
//! operation set callers use: submit, status, result, log, cancel, list.
//! None of these calls ever block on job completion.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use rnafold_types::{JobEvent, JobId, JobStatus, JobSummary, WorkDescriptor};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::executor::{ExecutorConfig, JobExecutor};
use crate::logsink::LogSink;
use crate::store::{JobStore, StoreError};
use crate::work::{WorkContext, WorkResult};

/// Default number of log lines returned by a log read.
pub const DEFAULT_LOG_TAIL: usize = 50;

/// Capacity of the job event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Error returned by [`JobManager::get_result`].
#[derive(Debug, Error)]
pub enum ResultError {
    /// The job exists but is not `completed`; the variant carries the
    /// status the caller actually observed.
    #[error("job {id} is {status}; result unavailable")]
    NotReady { id: JobId, status: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owner of the orchestration core. Cheap to share via `Arc`; route
/// handlers and background tasks all go through one instance.
pub struct JobManager {
    store: Arc<JobStore>,
    logs: LogSink,
    executor: JobExecutor,
    events: broadcast::Sender<JobEvent>,
}

impl JobManager {
    /// Open (or create) the job registry under `jobs_root` and start an
    /// executor with the given tuning. Rehydrates persisted records.
    pub async fn open(
        jobs_root: impl AsRef<Path>,
        config: ExecutorConfig,
    ) -> Result<Arc<Self>, StoreError> {
        let store = Arc::new(JobStore::open(jobs_root.as_ref()).await?);
        let logs = LogSink::new(jobs_root.as_ref());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let executor = JobExecutor::new(Arc::clone(&store), logs.clone(), config, events.clone());

        Ok(Arc::new(Self {
            store,
            logs,
            executor,
            events,
        }))
    }

    /// Submit a work unit for background execution. Creates a fresh
    /// `pending` record (never deduplicated by descriptor), hands it to
    /// the executor, and returns the new job id immediately.
    ///
    /// Fails only if the initial record cannot be persisted.
    pub async fn submit<F, Fut>(
        &self,
        descriptor: WorkDescriptor,
        name: Option<String>,
        work: F,
    ) -> Result<JobId, StoreError>
    where
        F: FnOnce(WorkContext) -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        let record = self.store.create(descriptor, name).await?;
        info!(job_id = %record.id, pipeline = %record.descriptor.pipeline, "job submitted");
        let _ = self
            .events
            .send(JobEvent::from_record(&record, record.submitted_at));
        self.executor.spawn(&record, work);
        Ok(record.id)
    }

    /// Status summary for a job. `NotFound` for unknown ids, never a
    /// default or empty record.
    pub async fn get_status(&self, id: JobId) -> Result<JobSummary, StoreError> {
        Ok(JobSummary::from(&self.store.get(id).await?))
    }

    /// Success payload of a completed job. Any other status yields
    /// [`ResultError::NotReady`] carrying that status.
    pub async fn get_result(&self, id: JobId) -> Result<serde_json::Value, ResultError> {
        let record = self.store.get(id).await?;
        match (record.status, record.result) {
            (JobStatus::Completed, Some(result)) => Ok(result),
            (JobStatus::Completed, None) => {
                // Completed record whose result artifact was lost on disk.
                Err(ResultError::Store(StoreError::Malformed {
                    path: self.logs.log_path(id).with_file_name("result.json"),
                    message: "completed job has no result artifact".into(),
                }))
            }
            (status, _) => Err(ResultError::NotReady { id, status }),
        }
    }

    /// The last `tail` lines of a job's log, oldest first.
    pub async fn get_log(&self, id: JobId, tail: usize) -> Result<Vec<String>, StoreError> {
        self.store.get(id).await?; // unknown ids are NotFound, not empty logs
        self.logs
            .tail(id, tail)
            .await
            .map_err(|source| StoreError::Io {
                path: self.logs.log_path(id),
                source,
            })
    }

    /// Request cancellation. Advisory: sets the flag the executor checks
    /// before claiming, and fires the live execution context's token.
    /// A no-op success on jobs already terminal; `NotFound` otherwise
    /// for unknown ids.
    pub async fn cancel_job(&self, id: JobId) -> Result<JobSummary, StoreError> {
        let record = self.store.get(id).await?;
        if record.status.is_terminal() {
            return Ok(JobSummary::from(&record));
        }

        let updated = match self
            .store
            .update(id, |r| {
                r.cancel_requested = true;
                Ok(())
            })
            .await
        {
            Ok(record) => record,
            // Reached terminal between the get and the update: no-op.
            Err(StoreError::Conflict { .. }) => self.store.get(id).await?,
            Err(e) => return Err(e),
        };

        if let Some(token) = self.executor.cancellation_token(id) {
            token.cancel();
        }
        info!(job_id = %id, "cancellation requested");
        Ok(JobSummary::from(&updated))
    }

    /// All jobs in submission order, optionally filtered by status.
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Vec<JobSummary> {
        self.store
            .list(status)
            .await
            .iter()
            .map(JobSummary::from)
            .collect()
    }

    /// Subscribe to status-change events (for SSE streaming).
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}
