// crates/types/src/job.rs
//! Job records, statuses, and the structured errors attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job. Generated at submission, never reused.
pub type JobId = Uuid;

/// Maximum number of bytes of error detail retained on a job record.
/// Longer backtraces/stderr dumps are truncated at this bound.
pub const ERROR_DETAIL_MAX_BYTES: usize = 4096;

/// Status of a background job.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: once a record
/// enters one of them it is never mutated again (log appends excepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error for parsing a status filter from a query string.
#[derive(Debug, thiserror::Error)]
#[error("unknown job status: {0:?}")]
pub struct UnknownStatus(pub String);

/// Classification of a recorded job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The work unit raised or reported a failure.
    Execution,
    /// The work unit exceeded its configured time bound.
    Timeout,
}

/// Structured failure description stored on a failed job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    /// Longer diagnostic context (stderr tail, trace). Truncated to
    /// [`ERROR_DETAIL_MAX_BYTES`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobError {
    /// Build a job error, truncating `detail` to the retained bound.
    pub fn new(kind: JobErrorKind, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: detail.map(|d| truncate_utf8(d, ERROR_DETAIL_MAX_BYTES)),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(JobErrorKind::Execution, message, None)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(JobErrorKind::Timeout, message, None)
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Truncate a string to at most `max` bytes on a char boundary.
fn truncate_utf8(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}

/// Opaque reference to the work a job wraps: a pipeline name plus its
/// argument bundle. The job core never looks inside `params`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub pipeline: String,
    pub params: serde_json::Value,
}

impl WorkDescriptor {
    pub fn new(pipeline: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            pipeline: pipeline.into(),
            params,
        }
    }
}

/// The authoritative record of one job, owned by the store.
///
/// `status`, `started_at`, and `finished_at` are mutated only by the
/// transition functions in `rnafold-jobs`. The success payload lives in
/// a separate `result.json` artifact on disk and is therefore skipped
/// when the record itself is serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: JobStatus,
    pub descriptor: WorkDescriptor,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Advisory cancellation flag. Setting it never changes `status`
    /// directly; the executor observes it at its checkpoints.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Success payload, present only on completed jobs. Persisted as its
    /// own artifact, not inside the metadata record.
    #[serde(skip)]
    pub result: Option<serde_json::Value>,
}

impl JobRecord {
    /// Create a fresh `pending` record for a newly submitted job.
    pub fn new(descriptor: WorkDescriptor, name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            status: JobStatus::Pending,
            descriptor,
            submitted_at: now,
            started_at: None,
            finished_at: None,
            error: None,
            cancel_requested: false,
            result: None,
        }
    }
}

/// Caller-facing snapshot of a job, returned by status and list calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: JobStatus,
    pub pipeline: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id,
            name: record.name.clone(),
            status: record.status,
            pipeline: record.descriptor.pipeline.clone(),
            submitted_at: record.submitted_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            error: record.error.clone(),
            cancel_requested: record.cancel_requested,
        }
    }
}

/// Status-change notification broadcast to streaming consumers.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_record(record: &JobRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id: record.id,
            name: record.name.clone(),
            status: record.status,
            timestamp,
        }
    }
}
