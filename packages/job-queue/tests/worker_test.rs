//! Worker integration tests against the in-memory store
//!
//! Covers:
//! - Successful processing, progress and completion hooks
//! - Retry with backoff, permanent failures and exhausted attempts
//! - Attempt timeouts
//! - Stalled job recovery
//! - Graceful shutdown

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use talentflow_job_queue::{
    now_ms, Backoff, JobContext, JobError, JobHandler, JobId, JobOptions, JobRecord, JobState,
    JobStore, KeepJobs, MemoryJobStore, QueueService, Worker, WorkerOptions, STALLED_REASON,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test handler
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    /// Attempts that fail before one succeeds
    fail_times: u32,
    /// Fail with a permanent error instead of a retryable one
    permanent: bool,
    /// Time spent per attempt
    sleep_ms: u64,
}

impl Task {
    fn ok() -> Self {
        Self {
            fail_times: 0,
            permanent: false,
            sleep_ms: 0,
        }
    }
}

#[derive(Default)]
struct RecordingHandler {
    attempts: AtomicU32,
    completed: Mutex<Vec<(JobId, Value)>>,
    final_failures: Mutex<Vec<(JobId, String, bool)>>,
}

impl RecordingHandler {
    fn completed(&self) -> Vec<(JobId, Value)> {
        self.completed.lock().unwrap().clone()
    }

    fn final_failures(&self) -> Vec<(JobId, String, bool)> {
        self.final_failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    type Payload = Task;

    async fn handle(&self, ctx: &JobContext<Task>) -> Result<Value, JobError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        ctx.report_progress(50).await;

        if ctx.payload.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.payload.sleep_ms)).await;
        }

        if ctx.attempt <= ctx.payload.fail_times {
            return Err(if ctx.payload.permanent {
                JobError::permanent("bad input")
            } else {
                JobError::retryable(format!("flaky attempt {}", ctx.attempt))
            });
        }

        Ok(json!({"attempt": ctx.attempt}))
    }

    async fn on_completed(&self, job: &JobRecord, _payload: &Task, result: &Value) {
        self.completed.lock().unwrap().push((job.id, result.clone()));
    }

    async fn on_final_failure(&self, job: &JobRecord, payload: Option<&Task>, reason: &str) {
        self.final_failures
            .lock()
            .unwrap()
            .push((job.id, reason.to_string(), payload.is_some()));
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn fast_options() -> WorkerOptions {
    WorkerOptions {
        concurrency: 2,
        poll_interval: Duration::from_millis(10),
        lock_duration: Duration::from_secs(1),
        job_timeout: Duration::from_secs(5),
        max_stalled: 1,
        stalled_check_interval: Duration::from_millis(10),
    }
}

fn fast_retries(attempts: u32) -> JobOptions {
    JobOptions::default()
        .with_attempts(attempts)
        .with_backoff(Backoff::Fixed { delay_ms: 10 })
}

struct Harness {
    store: Arc<MemoryJobStore>,
    queue: QueueService<Task>,
    handler: Arc<RecordingHandler>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryJobStore::new("tasks"));
        Self {
            queue: QueueService::new(store.clone(), fast_retries(3)),
            store,
            handler: Arc::new(RecordingHandler::default()),
            shutdown: CancellationToken::new(),
            worker: None,
        }
    }

    fn start(&mut self, options: WorkerOptions) {
        let worker = Worker::new(self.store.clone(), self.handler.clone(), options);
        let shutdown = self.shutdown.clone();
        self.worker = Some(tokio::spawn(async move {
            worker.run(shutdown).await.unwrap();
        }));
    }

    async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.worker.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker did not stop")
                .unwrap();
        }
    }

    async fn wait_for_state(&self, id: JobId, state: JobState) -> JobRecord {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(job) = self.store.get(id).await.unwrap() {
                if job.state == state {
                    return job;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} never reached {}",
                id,
                state
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

// =============================================================================
// Processing outcomes
// =============================================================================

#[tokio::test]
async fn test_successful_job_completes() {
    let mut h = Harness::new();
    let id = h.queue.add("task", &Task::ok(), None).await.unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Completed).await;
    h.stop().await;

    assert_eq!(job.attempts_made, 1);
    assert_eq!(job.progress, 100);
    assert_eq!(job.return_value, Some(json!({"attempt": 1})));
    assert_eq!(h.handler.completed(), vec![(id, json!({"attempt": 1}))]);
    assert!(h.handler.final_failures().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_retryable_failure_is_retried() {
    let mut h = Harness::new();
    let task = Task {
        fail_times: 2,
        ..Task::ok()
    };
    let id = h.queue.add("task", &task, None).await.unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Completed).await;
    h.stop().await;

    assert_eq!(job.attempts_made, 3);
    assert_eq!(job.return_value, Some(json!({"attempt": 3})));
    assert_eq!(h.handler.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_attempts_fail_once() {
    let mut h = Harness::new();
    let task = Task {
        fail_times: 10,
        ..Task::ok()
    };
    let id = h.queue.add("task", &task, Some(fast_retries(2))).await.unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Failed).await;
    h.stop().await;

    assert_eq!(job.attempts_made, 2);
    assert_eq!(job.failed_reason.as_deref(), Some("flaky attempt 2"));
    assert_eq!(
        h.handler.final_failures(),
        vec![(id, "flaky attempt 2".to_string(), true)]
    );
}

#[tokio::test]
async fn test_permanent_failure_skips_retries() {
    let mut h = Harness::new();
    let task = Task {
        fail_times: 1,
        permanent: true,
        ..Task::ok()
    };
    let id = h.queue.add("task", &task, None).await.unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Failed).await;
    h.stop().await;

    assert_eq!(job.attempts_made, 1);
    assert_eq!(h.handler.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.handler.final_failures().len(), 1);
}

#[tokio::test]
async fn test_undecodable_payload_fails_without_payload() {
    let mut h = Harness::new();
    let raw: QueueService<Value> = QueueService::new(h.store.clone(), fast_retries(3));
    let id = raw.add("task", &json!({"unexpected": true}), None).await.unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Failed).await;
    h.stop().await;

    assert!(job.failed_reason.unwrap().starts_with("invalid payload"));
    assert_eq!(h.handler.attempts.load(Ordering::SeqCst), 0);
    let failures = h.handler.final_failures();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].2);
}

#[tokio::test]
async fn test_attempt_timeout_counts_as_failure() {
    let mut h = Harness::new();
    let task = Task {
        sleep_ms: 2_000,
        ..Task::ok()
    };
    let options = fast_retries(1).with_timeout_ms(50);
    let id = h.queue.add("task", &task, Some(options)).await.unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Failed).await;
    h.stop().await;

    assert_eq!(job.failed_reason.as_deref(), Some("job timed out after 50ms"));
    assert!(h.handler.completed().is_empty());
}

#[tokio::test]
async fn test_retention_trims_completed_jobs() {
    let mut h = Harness::new();
    let options = JobOptions {
        remove_on_complete: KeepJobs::None,
        ..fast_retries(1)
    };
    let id = h.queue.add("task", &Task::ok(), Some(options)).await.unwrap();
    h.start(fast_options());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.handler.completed().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "job never completed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.stop().await;

    assert!(h.store.get(id).await.unwrap().is_none());
    assert_eq!(h.store.counts().await.unwrap().completed, 0);
}

// =============================================================================
// Stalled jobs
// =============================================================================

#[tokio::test]
async fn test_stalled_job_is_requeued_and_processed() {
    let mut h = Harness::new();
    let id = h.queue.add("task", &Task::ok(), None).await.unwrap();
    // A worker that claimed the job and died: its lock is already expired
    h.store
        .claim_next(now_ms() - 10_000, 1, "dead-worker")
        .await
        .unwrap();
    h.start(fast_options());

    let job = h.wait_for_state(id, JobState::Completed).await;
    h.stop().await;

    assert_eq!(job.stalled_count, 1);
    assert!(h.handler.final_failures().is_empty());
}

#[tokio::test]
async fn test_job_stalling_too_often_fails() {
    let mut h = Harness::new();
    let id = h.queue.add("task", &Task::ok(), None).await.unwrap();
    h.store
        .claim_next(now_ms() - 10_000, 1, "dead-worker")
        .await
        .unwrap();
    h.start(WorkerOptions {
        max_stalled: 0,
        ..fast_options()
    });

    let job = h.wait_for_state(id, JobState::Failed).await;
    h.stop().await;

    assert_eq!(job.failed_reason.as_deref(), Some(STALLED_REASON));
    assert_eq!(
        h.handler.final_failures(),
        vec![(id, STALLED_REASON.to_string(), true)]
    );
}

#[tokio::test]
async fn test_stale_worker_cannot_complete_requeued_job() {
    let store = MemoryJobStore::new("tasks");
    let queue: QueueService<Task> = QueueService::new(Arc::new(store.clone()), fast_retries(3));
    let id = queue.add("task", &Task::ok(), None).await.unwrap();

    store.claim_next(now_ms() - 10_000, 1, "old").await.unwrap();
    store.recover_stalled(now_ms(), 1).await.unwrap();
    store.claim_next(now_ms(), 60_000, "new").await.unwrap();

    assert!(store.complete(id, "old", &json!(null), now_ms()).await.is_err());
    assert!(!store.extend_lock(id, "old", now_ms() + 1_000).await.unwrap());
    store.complete(id, "new", &json!(null), now_ms()).await.unwrap();
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_waits_for_running_jobs() {
    let mut h = Harness::new();
    let task = Task {
        sleep_ms: 200,
        ..Task::ok()
    };
    let id = h.queue.add("task", &task, None).await.unwrap();
    h.start(fast_options());

    h.wait_for_state(id, JobState::Active).await;
    h.stop().await;

    let job = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn test_stopped_worker_claims_nothing() {
    let mut h = Harness::new();
    h.start(fast_options());
    h.stop().await;

    let id = h.queue.add("task", &Task::ok(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        h.store.get(id).await.unwrap().unwrap().state,
        JobState::Waiting
    );
}
