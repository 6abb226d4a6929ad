// crates/jobs/tests/lifecycle.rs
//! End-to-end lifecycle tests for the job orchestration core: the
//! submit/poll/result flow, cancellation semantics, restart recovery,
//! and log tail consistency.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rnafold_jobs::{ExecutorConfig, JobManager, ResultError, StoreError, WorkError};
use rnafold_types::{JobErrorKind, JobStatus, WorkDescriptor};

fn descriptor(pipeline: &str) -> WorkDescriptor {
    WorkDescriptor::new(pipeline, serde_json::json!({}))
}

fn small_pool() -> ExecutorConfig {
    ExecutorConfig {
        max_concurrent: 2,
        job_timeout: Duration::from_secs(30),
    }
}

async fn wait_terminal(manager: &JobManager, id: rnafold_types::JobId) -> JobStatus {
    for _ in 0..500 {
        let status = manager.get_status(id).await.unwrap().status;
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never became terminal");
}

/// Scenario A: a work unit that waits 50ms then returns `{"value": 42}`.
#[tokio::test]
async fn submit_poll_result_flow() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    let id = manager
        .submit(descriptor("basic"), Some("scenario-a".into()), |ctx| async move {
            ctx.log("predicting").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(serde_json::json!({"value": 42}))
        })
        .await
        .unwrap();

    // Immediately after submit the job has not been claimed.
    assert_eq!(manager.get_status(id).await.unwrap().status, JobStatus::Pending);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let summary = manager.get_status(id).await.unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
    assert!(summary.started_at.is_some());
    assert!(summary.finished_at.is_some());

    let result = manager.get_result(id).await.unwrap();
    assert_eq!(result, serde_json::json!({"value": 42}));
}

/// Scenario B: a work unit that raises "bad input".
#[tokio::test]
async fn failing_work_unit_reports_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    let id = manager
        .submit(descriptor("basic"), None, |_ctx| async move {
            Err(WorkError::failed("bad input"))
        })
        .await
        .unwrap();

    assert_eq!(wait_terminal(&manager, id).await, JobStatus::Failed);

    let summary = manager.get_status(id).await.unwrap();
    let error = summary.error.unwrap();
    assert_eq!(error.kind, JobErrorKind::Execution);
    assert_eq!(error.message, "bad input");

    match manager.get_result(id).await {
        Err(ResultError::NotReady { status, .. }) => assert_eq!(status, JobStatus::Failed),
        other => panic!("expected NotReady(failed), got {other:?}"),
    }
}

/// Scenario C: cancellation before the executor claims the job. The work
/// unit body must never run; its side-effect counter stays untouched.
#[tokio::test]
async fn cancel_before_claim_never_runs_work_unit() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(
        dir.path(),
        ExecutorConfig {
            max_concurrent: 1,
            job_timeout: Duration::from_secs(30),
        },
    )
    .await
    .unwrap();

    // Fill the single worker slot so the next submission stays pending.
    let blocker = manager
        .submit(descriptor("blocker"), None, |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(serde_json::json!({}))
        })
        .await
        .unwrap();
    for _ in 0..100 {
        if manager.get_status(blocker).await.unwrap().status == JobStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let side_effects = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&side_effects);
    let id = manager
        .submit(descriptor("victim"), None, move |_ctx| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({}))
        })
        .await
        .unwrap();

    let summary = manager.cancel_job(id).await.unwrap();
    assert!(summary.cancel_requested);

    assert_eq!(wait_terminal(&manager, id).await, JobStatus::Cancelled);
    let summary = manager.get_status(id).await.unwrap();
    assert!(summary.started_at.is_none(), "cancelled job must never claim");
    assert_eq!(side_effects.load(Ordering::SeqCst), 0, "work unit body ran");
}

/// Scenario D: listing with a status filter returns exactly the matching
/// jobs, in submission order.
#[tokio::test]
async fn list_failed_jobs_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    let mut failed_ids = Vec::new();
    let mut all_ids = Vec::new();
    for i in 0..5 {
        let fails = i % 2 == 0;
        let id = manager
            .submit(descriptor(&format!("job-{i}")), None, move |_ctx| async move {
                if fails {
                    Err(WorkError::failed("planned failure"))
                } else {
                    Ok(serde_json::json!({}))
                }
            })
            .await
            .unwrap();
        all_ids.push(id);
        if fails {
            failed_ids.push(id);
        }
    }
    for id in &all_ids {
        wait_terminal(&manager, *id).await;
    }

    let failed: Vec<_> = manager
        .list_jobs(Some(JobStatus::Failed))
        .await
        .iter()
        .map(|s| s.job_id)
        .collect();
    assert_eq!(failed, failed_ids);
}

/// Concurrent cancellation and natural completion resolve to exactly one
/// terminal status under any interleaving.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_completion_yields_one_terminal_status() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    for round in 0..10 {
        let id = manager
            .submit(descriptor(&format!("race-{round}")), None, |ctx| async move {
                for _ in 0..5 {
                    if ctx.is_cancelled() {
                        return Err(WorkError::Cancelled);
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                Ok(serde_json::json!({}))
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(round as u64)).await;
        let _ = manager.cancel_job(id).await;

        let first = wait_terminal(&manager, id).await;
        // Whatever terminal state landed, it must never change again.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = manager.get_status(id).await.unwrap().status;
        assert_eq!(first, second, "terminal status changed after the fact");
        assert!(matches!(first, JobStatus::Completed | JobStatus::Cancelled));
    }
}

/// Tail reads reflect all appends that completed before the call, most
/// recent last, at most `n` lines.
#[tokio::test]
async fn log_tail_is_bounded_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    let id = manager
        .submit(descriptor("chatty"), None, |ctx| async move {
            for i in 0..120 {
                ctx.log(&format!("model pass {i}")).await;
            }
            Ok(serde_json::json!({}))
        })
        .await
        .unwrap();
    wait_terminal(&manager, id).await;

    let tail = manager.get_log(id, 10).await.unwrap();
    assert_eq!(tail.len(), 10);
    assert_eq!(tail.last().unwrap(), "model pass 119");
    assert_eq!(tail.first().unwrap(), "model pass 110");

    let everything = manager.get_log(id, 1000).await.unwrap();
    assert_eq!(everything.len(), 120);
}

/// After a simulated restart, terminal jobs are reconstructed from disk
/// with identical status, result, and error; the partial log of a
/// cancelled job is retained.
#[tokio::test]
async fn restart_rehydrates_terminal_jobs() {
    let dir = tempfile::tempdir().unwrap();

    let (completed, failed, cancelled) = {
        let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

        let completed = manager
            .submit(descriptor("good"), Some("keeper".into()), |ctx| async move {
                ctx.log("finished cleanly").await;
                Ok(serde_json::json!({"structures": 3}))
            })
            .await
            .unwrap();
        let failed = manager
            .submit(descriptor("bad"), None, |_ctx| async move {
                Err(WorkError::failed_with_detail("bad input", "line 1: not FASTA"))
            })
            .await
            .unwrap();
        let cancelled = manager
            .submit(descriptor("slow"), None, |ctx| async move {
                ctx.log("started, then told to stop").await;
                loop {
                    if ctx.is_cancelled() {
                        return Err(WorkError::Cancelled);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap();

        wait_terminal(&manager, completed).await;
        wait_terminal(&manager, failed).await;
        for _ in 0..100 {
            if manager.get_status(cancelled).await.unwrap().status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        manager.cancel_job(cancelled).await.unwrap();
        wait_terminal(&manager, cancelled).await;

        (completed, failed, cancelled)
    };

    // "Restart": a fresh manager over the same data directory.
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    let summary = manager.get_status(completed).await.unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.name.as_deref(), Some("keeper"));
    assert_eq!(
        manager.get_result(completed).await.unwrap(),
        serde_json::json!({"structures": 3})
    );

    let summary = manager.get_status(failed).await.unwrap();
    assert_eq!(summary.status, JobStatus::Failed);
    let error = summary.error.unwrap();
    assert_eq!(error.message, "bad input");
    assert_eq!(error.detail.as_deref(), Some("line 1: not FASTA"));

    let summary = manager.get_status(cancelled).await.unwrap();
    assert_eq!(summary.status, JobStatus::Cancelled);
    let log = manager.get_log(cancelled, 50).await.unwrap();
    assert!(log.contains(&"started, then told to stop".to_string()));

    // Submission order survives the restart.
    let all: Vec<_> = manager.list_jobs(None).await.iter().map(|s| s.job_id).collect();
    assert_eq!(all, vec![completed, failed, cancelled]);
}

/// An unknown id always yields NotFound, never a default record.
#[tokio::test]
async fn unknown_ids_are_never_fabricated() {
    let dir = tempfile::tempdir().unwrap();
    let manager = JobManager::open(dir.path(), small_pool()).await.unwrap();

    let ghost = uuid::Uuid::new_v4();
    assert!(matches!(
        manager.get_status(ghost).await,
        Err(StoreError::NotFound(id)) if id == ghost
    ));
}
