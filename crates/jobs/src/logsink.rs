// crates/jobs/src/logsink.rs
//! Append-only per-job log capture with tail reads.
//!
//! Each job owns one `job.log` file under its job directory. There is a
//! single writer handle per job (held by the executing task); readers go
//! straight to the file and may run concurrently with the writer.
//!
//! Every append is newline-terminated and flushed before it returns, and
//! [`LogSink::tail`] only surfaces `\n`-terminated lines, so a reader
//! never observes a torn line.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rnafold_types::JobId;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::persist;

/// Chunk size for backward tail reads: 8 KiB.
const TAIL_CHUNK_SIZE: u64 = 8 * 1024;

/// Factory for per-job log writers and tail reads, rooted at the store's
/// jobs directory.
#[derive(Debug, Clone)]
pub struct LogSink {
    root: PathBuf,
}

impl LogSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of a job's log file (which may not exist yet).
    pub fn log_path(&self, id: JobId) -> PathBuf {
        persist::log_path(&self.root, id)
    }

    /// Open the single writer handle for a job's log, creating the file
    /// (and the job directory) if needed.
    pub async fn writer(&self, id: JobId) -> io::Result<JobLog> {
        let path = self.log_path(id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(JobLog {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Read the last `n` complete lines of a job's log.
    ///
    /// A job whose log has no appends yet yields an empty list.
    pub async fn tail(&self, id: JobId, n: usize) -> io::Result<Vec<String>> {
        let path = self.log_path(id);
        match tail_lines(&path, n).await {
            Ok(lines) => Ok(lines),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Cloneable handle to one job's log file. Appends are serialized through
/// an internal mutex; the executing work unit and its supervisor share
/// this handle.
#[derive(Debug, Clone)]
pub struct JobLog {
    file: Arc<Mutex<File>>,
}

impl JobLog {
    /// Append text to the log. Each line of `text` is written
    /// newline-terminated; the whole append is flushed before returning,
    /// so a tail issued afterwards observes it.
    pub async fn append(&self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(text.len() + 1);
        for line in text.lines() {
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read the last `n` complete lines from a file without loading the whole
/// file: seek to EOF and read backward in 8 KiB chunks until enough
/// newlines are seen.
///
/// Only `\n`-terminated lines count; a trailing fragment (an append still
/// in flight) is not surfaced. Lines are returned oldest-first.
async fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path).await?;
    let file_len = file.metadata().await?.len();
    if file_len == 0 {
        return Ok(Vec::new());
    }

    // n lines need n terminators plus the boundary newline before the
    // first of them, so stop once n + 1 newlines are collected.
    let target_newlines = n + 1;
    let mut newline_count = 0usize;
    let mut collected: Vec<u8> = Vec::new();
    let mut remaining = file_len;

    while remaining > 0 {
        let chunk_len = remaining.min(TAIL_CHUNK_SIZE);
        let offset = remaining - chunk_len;

        file.seek(io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; chunk_len as usize];
        file.read_exact(&mut buf).await?;

        newline_count += buf.iter().filter(|&&b| b == b'\n').count();

        buf.append(&mut collected);
        collected = buf;
        remaining = offset;

        if newline_count >= target_newlines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&collected);
    // Drop anything after the last newline: it is an unterminated fragment.
    let complete = match text.rfind('\n') {
        Some(idx) => &text[..idx],
        None => return Ok(Vec::new()),
    };
    if complete.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<&str> = complete.split('\n').collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|s| s.to_string()).collect())
}
