// crates/jobs/src/executor.rs
//! Supervision of job execution contexts.
//!
//! The executor spawns exactly one tokio task per submitted job. A shared
//! semaphore caps how many work units run at once (prediction pipelines
//! are heavy); queued tasks hold no resources beyond the task itself.
//!
//! A work-unit fault never crashes the host: panics are caught at the
//! task boundary and recorded as a `failed` terminal state, and timeouts
//! are recorded with kind `Timeout`. A terminal transition that loses a
//! race is dropped, so exactly one terminal status is ever recorded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rnafold_types::{JobError, JobErrorKind, JobEvent, JobId, JobRecord, JobStatus};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::logsink::LogSink;
use crate::status;
use crate::store::{JobStore, StoreError};
use crate::work::{WorkContext, WorkError, WorkResult};

/// Tuning for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of work units running concurrently.
    pub max_concurrent: usize,
    /// Hard time bound per work unit. Exceeding it fails the job with
    /// kind `Timeout`.
    pub job_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            job_timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// What the supervising task will record as the job's terminal state.
enum Outcome {
    Completed(serde_json::Value),
    Failed(JobError),
    Cancelled,
}

/// Launches and supervises one execution context per job.
pub struct JobExecutor {
    store: Arc<JobStore>,
    logs: LogSink,
    semaphore: Arc<Semaphore>,
    job_timeout: Duration,
    active: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    events: broadcast::Sender<JobEvent>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<JobStore>,
        logs: LogSink,
        config: ExecutorConfig,
        events: broadcast::Sender<JobEvent>,
    ) -> Self {
        Self {
            store,
            logs,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            job_timeout: config.job_timeout,
            active: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Spawn the execution context for a freshly created `pending` record.
    /// Returns immediately; the caller is never blocked on the work unit.
    pub fn spawn<F, Fut>(&self, record: &JobRecord, work: F)
    where
        F: FnOnce(WorkContext) -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        let id = record.id;
        let token = CancellationToken::new();
        match self.active.lock() {
            Ok(mut active) => {
                if active.contains_key(&id) {
                    error!(job_id = %id, "execution context already live; refusing duplicate spawn");
                    return;
                }
                active.insert(id, token.clone());
            }
            Err(e) => {
                error!(job_id = %id, "active-jobs mutex poisoned: {e}");
                return;
            }
        }

        let store = Arc::clone(&self.store);
        let logs = self.logs.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let job_timeout = self.job_timeout;
        let active = Arc::clone(&self.active);
        let events = self.events.clone();

        tokio::spawn(async move {
            supervise(store, logs, semaphore, job_timeout, events, id, token, work).await;
            match active.lock() {
                Ok(mut active) => {
                    active.remove(&id);
                }
                Err(e) => error!(job_id = %id, "active-jobs mutex poisoned: {e}"),
            }
        });
    }

    /// The cancellation token of a job whose execution context is still
    /// live. `None` once the supervising task has finished.
    pub fn cancellation_token(&self, id: JobId) -> Option<CancellationToken> {
        match self.active.lock() {
            Ok(active) => active.get(&id).cloned(),
            Err(e) => {
                error!(job_id = %id, "active-jobs mutex poisoned: {e}");
                None
            }
        }
    }
}

fn emit(events: &broadcast::Sender<JobEvent>, record: &JobRecord) {
    // No subscribers is fine.
    let _ = events.send(JobEvent::from_record(record, Utc::now()));
}

#[allow(clippy::too_many_arguments)]
async fn supervise<F, Fut>(
    store: Arc<JobStore>,
    logs: LogSink,
    semaphore: Arc<Semaphore>,
    job_timeout: Duration,
    events: broadcast::Sender<JobEvent>,
    id: JobId,
    token: CancellationToken,
    work: F,
) where
    F: FnOnce(WorkContext) -> Fut + Send + 'static,
    Fut: Future<Output = WorkResult> + Send + 'static,
{
    let _permit = match Arc::clone(&semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return, // semaphore closed: process shutting down
    };

    // Claim checkpoint. The cancel-flag check and the pending->running
    // transition happen inside one atomic store update, so a cancellation
    // requested strictly before the claim always short-circuits here and
    // the work unit body never runs.
    let now = Utc::now();
    let claimed = store
        .update(id, |record| {
            if record.cancel_requested {
                status::transition(record, JobStatus::Cancelled, now)
            } else {
                status::transition(record, JobStatus::Running, now)
            }
        })
        .await;

    let record = match claimed {
        Ok(record) => record,
        Err(e) => {
            error!(job_id = %id, error = %e, "failed to claim job");
            return;
        }
    };
    emit(&events, &record);

    if record.status == JobStatus::Cancelled {
        info!(job_id = %id, "job cancelled before claim; work unit skipped");
        return;
    }
    info!(job_id = %id, pipeline = %record.descriptor.pipeline, "job running");

    let log = match logs.writer(id).await {
        Ok(log) => log,
        Err(e) => {
            record_outcome(
                &store,
                &events,
                id,
                Outcome::Failed(JobError::execution(format!("cannot open job log: {e}"))),
            )
            .await;
            return;
        }
    };
    let ctx = WorkContext::new(id, log, token.clone());

    // The work unit runs in its own task so a panic inside it is caught
    // at the join boundary instead of unwinding through the supervisor.
    let mut handle = tokio::spawn(work(ctx));

    let outcome = match tokio::time::timeout(job_timeout, &mut handle).await {
        Err(_elapsed) => {
            // Advisory stop for cooperative work, forcible for processes;
            // the task itself is released at its next await point.
            token.cancel();
            handle.abort();
            Outcome::Failed(JobError::new(
                JobErrorKind::Timeout,
                format!("execution exceeded {}s", job_timeout.as_secs()),
                None,
            ))
        }
        Ok(Err(join_err)) if join_err.is_panic() => Outcome::Failed(JobError::new(
            JobErrorKind::Execution,
            "work unit panicked",
            Some(join_err.to_string()),
        )),
        Ok(Err(_aborted)) => Outcome::Cancelled,
        Ok(Ok(Ok(value))) => Outcome::Completed(value),
        Ok(Ok(Err(WorkError::Cancelled))) => Outcome::Cancelled,
        Ok(Ok(Err(WorkError::Failed { message, detail }))) => {
            Outcome::Failed(JobError::new(JobErrorKind::Execution, message, detail))
        }
    };

    record_outcome(&store, &events, id, outcome).await;
}

/// Record a terminal outcome. A conflict here means another terminal
/// transition landed first; the first one wins and this one is dropped.
async fn record_outcome(
    store: &JobStore,
    events: &broadcast::Sender<JobEvent>,
    id: JobId,
    outcome: Outcome,
) {
    let now = Utc::now();
    let target = match &outcome {
        Outcome::Completed(_) => JobStatus::Completed,
        Outcome::Failed(_) => JobStatus::Failed,
        Outcome::Cancelled => JobStatus::Cancelled,
    };

    let updated = store
        .update(id, |record| {
            status::transition(record, target, now)?;
            match outcome {
                Outcome::Completed(value) => record.result = Some(value),
                Outcome::Failed(err) => record.error = Some(err),
                Outcome::Cancelled => {}
            }
            Ok(())
        })
        .await;

    match updated {
        Ok(record) => {
            emit(events, &record);
            info!(job_id = %id, status = %record.status, "job finished");
        }
        Err(StoreError::Conflict { .. }) => {
            debug!(job_id = %id, status = %target, "terminal transition lost the race; keeping first");
        }
        Err(e) => error!(job_id = %id, error = %e, "failed to record job outcome"),
    }
}
