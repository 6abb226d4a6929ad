// crates/jobs/src/work.rs
//! The work-unit contract.
//!
//! A work unit is an opaque async closure handed a [`WorkContext`]. The
//! core never inspects its internals: it supplies a log handle and an
//! advisory cancellation token, and receives back either a JSON success
//! payload or a [`WorkError`].
//!
//! True preemption exists only for externally supervised processes (see
//! [`run_command`]), which are killed when the token fires. In-process
//! work observes cancellation solely at its own poll points.

use std::process::Stdio;

use rnafold_types::JobId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::logsink::JobLog;

/// How many trailing stderr lines are kept as failure detail.
const STDERR_TAIL_LINES: usize = 40;

/// Failure reported by a work unit.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkError {
    /// The work unit failed. `detail` carries diagnostic context such as a
    /// stderr tail; it is truncated when recorded on the job.
    #[error("{message}")]
    Failed {
        message: String,
        detail: Option<String>,
    },

    /// The work unit observed the cancellation token and stopped.
    #[error("cancelled")]
    Cancelled,
}

impl WorkError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            detail: None,
        }
    }

    pub fn failed_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }
}

/// Outcome of a work unit: a JSON success payload or a structured failure.
pub type WorkResult = Result<serde_json::Value, WorkError>;

/// Everything a work unit receives from the core: its id, a log handle,
/// and the advisory cancellation token.
#[derive(Clone)]
pub struct WorkContext {
    pub job_id: JobId,
    log: JobLog,
    cancel: CancellationToken,
}

impl WorkContext {
    /// Normally constructed by the executor; public so pipeline code can
    /// be exercised directly in tests.
    pub fn new(job_id: JobId, log: JobLog, cancel: CancellationToken) -> Self {
        Self { job_id, log, cancel }
    }

    /// Append a line to the job log. Best-effort: a log I/O failure never
    /// fails the work unit.
    pub async fn log(&self, text: &str) {
        if let Err(e) = self.log.append(text).await {
            warn!(job_id = %self.job_id, error = %e, "job log append failed");
        }
    }

    /// Poll the advisory cancellation flag.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve when cancellation is requested. For use in `select!` arms
    /// around interruptible awaits.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The raw token, for handing to nested helpers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Run an external process as the job's work unit.
///
/// stdout and stderr are streamed line-by-line into the job log as they
/// arrive. If the cancellation token fires while the process runs, the
/// process is forcibly killed and `WorkError::Cancelled` is returned.
///
/// On exit code 0 the last stdout line is returned as the payload if it
/// parses as a JSON object (the convention our pipeline scripts follow);
/// otherwise a minimal `{"exit_code": 0}` payload is produced. A non-zero
/// exit fails the work unit with a stderr tail as detail.
pub async fn run_command(ctx: &WorkContext, program: &str, args: &[String]) -> WorkResult {
    ctx.log(&format!("$ {} {}", program, args.join(" "))).await;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| WorkError::failed(format!("failed to spawn {program}: {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Drain both streams concurrently with the wait, so a chatty process
    // never blocks on a full pipe.
    let stdout_task = tokio::spawn(drain_stream(stdout, ctx.log.clone()));
    let stderr_task = tokio::spawn(drain_stream(stderr, ctx.log.clone()));

    let status = tokio::select! {
        status = child.wait() => {
            status.map_err(|e| WorkError::failed(format!("failed to wait for {program}: {e}")))?
        }
        _ = ctx.cancelled() => {
            ctx.log("cancellation requested; killing process").await;
            if let Err(e) = child.kill().await {
                warn!(job_id = %ctx.job_id, error = %e, "failed to kill cancelled process");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(WorkError::Cancelled);
        }
    };

    let stdout_lines = stdout_task.await.unwrap_or_default();
    let stderr_lines = stderr_task.await.unwrap_or_default();

    if status.success() {
        let payload = stdout_lines
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| serde_json::from_str::<serde_json::Value>(l).ok())
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({ "exit_code": 0 }));
        Ok(payload)
    } else {
        let code = status.code();
        let tail_start = stderr_lines.len().saturating_sub(STDERR_TAIL_LINES);
        let detail = stderr_lines[tail_start..].join("\n");
        Err(WorkError::Failed {
            message: match code {
                Some(code) => format!("{program} exited with code {code}"),
                None => format!("{program} terminated by signal"),
            },
            detail: (!detail.is_empty()).then_some(detail),
        })
    }
}

/// Stream a child pipe into the job log, collecting the lines.
async fn drain_stream<R>(reader: Option<R>, log: JobLog) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut collected = Vec::new();
    let Some(reader) = reader else {
        return collected;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Err(e) = log.append(&line).await {
            warn!(error = %e, "job log append failed while draining process output");
        }
        collected.push(line);
    }
    collected
}
