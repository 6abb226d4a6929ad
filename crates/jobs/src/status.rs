// crates/jobs/src/status.rs
//! The job status state machine.
//!
//! Every mutation of `status`, `started_at`, and `finished_at` goes through
//! this module. The store and executor call [`transition`]; nothing else in
//! the codebase writes those fields.

use chrono::{DateTime, Utc};
use rnafold_types::{JobError, JobRecord, JobStatus};
use thiserror::Error;

/// A transition was attempted that the state machine does not permit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Whether `from -> to` is a legal transition.
///
/// Legal edges: `pending -> running`, `running -> completed`,
/// `running -> failed`, `pending -> cancelled`, `running -> cancelled`.
/// Everything else, including any edge out of a terminal state, is
/// rejected.
pub fn is_legal(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Pending, Cancelled)
            | (Running, Cancelled)
    )
}

/// Apply a status transition to a record, stamping timestamps.
///
/// `started_at` is set exactly once, on `pending -> running`;
/// `finished_at` exactly once, on entry to a terminal state.
pub fn transition(
    record: &mut JobRecord,
    to: JobStatus,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    let from = record.status;
    if !is_legal(from, to) {
        return Err(TransitionError { from, to });
    }
    record.status = to;
    if from == JobStatus::Pending && to == JobStatus::Running {
        record.started_at = Some(now);
    }
    if to.is_terminal() {
        record.finished_at = Some(now);
    }
    Ok(())
}

/// Finalize a record left `pending` or `running` by a process that died
/// mid-flight. Recovery-only: called while rehydrating the store, before
/// the registry is live. Terminal records are left untouched.
pub fn finalize_interrupted(record: &mut JobRecord, now: DateTime<Utc>) -> bool {
    if record.status.is_terminal() {
        return false;
    }
    record.status = JobStatus::Failed;
    record.finished_at = Some(now);
    record.error = Some(JobError::execution("aborted by server restart"));
    true
}
