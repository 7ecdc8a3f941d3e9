//! Consumer side: polls a queue and runs jobs through a [`JobHandler`]

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::QueueResult;
use crate::job::{JobId, JobRecord, JobState, KeepJobs, STALLED_REASON};
use crate::service::now_ms;
use crate::store::JobStore;

/// Failure of a single job attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Worth another attempt (network hiccups, rate limits, timeouts)
    #[error("{0}")]
    Retryable(String),

    /// Will fail the same way every time
    #[error("{0}")]
    Permanent(String),
}

impl JobError {
    pub fn retryable(message: impl fmt::Display) -> Self {
        Self::Retryable(message.to_string())
    }

    pub fn permanent(message: impl fmt::Display) -> Self {
        Self::Permanent(message.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// What a handler sees while running one attempt
pub struct JobContext<P> {
    pub id: JobId,
    pub name: String,
    pub payload: P,
    /// 1-based number of this attempt
    pub attempt: u32,
    pub max_attempts: u32,
    store: Arc<dyn JobStore>,
    token: String,
}

impl<P> JobContext<P> {
    /// Record progress (0-100). Failures are logged and otherwise ignored;
    /// progress is informational.
    pub async fn report_progress(&self, progress: u8) {
        if let Err(e) = self
            .store
            .update_progress(self.id, &self.token, progress.min(100))
            .await
        {
            warn!(job_id = %self.id, progress, error = %e, "Failed to update job progress");
        }
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Job-type specific processing
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + Sync + 'static;

    /// Run one attempt. The returned value is stored as the job result.
    async fn handle(
        &self,
        ctx: &JobContext<Self::Payload>,
    ) -> Result<serde_json::Value, JobError>;

    /// Called once after a job completed
    async fn on_completed(
        &self,
        _job: &JobRecord,
        _payload: &Self::Payload,
        _result: &serde_json::Value,
    ) {
    }

    /// Called once when a job has failed for good. `payload` is `None` when
    /// it could not be decoded.
    async fn on_final_failure(
        &self,
        _job: &JobRecord,
        _payload: Option<&Self::Payload>,
        _reason: &str,
    ) {
    }
}

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Jobs processed in parallel
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Lock lifetime; the heartbeat renews it every half period
    pub lock_duration: Duration,
    /// Attempt timeout unless the job carries its own
    pub job_timeout: Duration,
    /// Stalls tolerated before a job is failed
    pub max_stalled: u32,
    pub stalled_check_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(500),
            lock_duration: Duration::from_secs(30),
            job_timeout: Duration::from_secs(300),
            max_stalled: 1,
            stalled_check_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerOptions {
    pub fn from_config(config: &talentflow_shared_config::QueueConfig, concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            lock_duration: Duration::from_millis(config.lock_duration_ms),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            max_stalled: config.max_stalled,
            ..Default::default()
        }
    }

    fn lock_ms(&self) -> u64 {
        u64::try_from(self.lock_duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Polls one queue and runs claimed jobs with bounded concurrency
pub struct Worker<H: JobHandler> {
    store: Arc<dyn JobStore>,
    handler: Arc<H>,
    options: WorkerOptions,
}

impl<H: JobHandler> Clone for Worker<H> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            handler: Arc::clone(&self.handler),
            options: self.options.clone(),
        }
    }
}

impl<H: JobHandler> Worker<H> {
    pub fn new(store: Arc<dyn JobStore>, handler: Arc<H>, options: WorkerOptions) -> Self {
        Self {
            store,
            handler,
            options,
        }
    }

    pub fn queue_name(&self) -> &str {
        self.store.queue_name()
    }

    /// Process jobs until `shutdown` fires, then wait for in-flight jobs
    pub async fn run(self, shutdown: CancellationToken) -> QueueResult<()> {
        let concurrency = self.options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut last_stalled_check: Option<Instant> = None;

        info!(
            queue = %self.queue_name(),
            concurrency,
            "Worker started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let stalled_due = last_stalled_check
                .map_or(true, |at| at.elapsed() >= self.options.stalled_check_interval);
            if stalled_due {
                self.check_stalled().await;
                last_stalled_check = Some(Instant::now());
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let token = Uuid::new_v4().to_string();
            let claimed = self
                .store
                .claim_next(now_ms(), self.options.lock_ms(), &token)
                .await;

            match claimed {
                Ok(Some(job)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.process(job, token).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    self.idle(&shutdown).await;
                }
                Err(e) => {
                    drop(permit);
                    error!(queue = %self.queue_name(), error = %e, "Failed to claim job");
                    self.idle(&shutdown).await;
                }
            }
        }

        info!(queue = %self.queue_name(), "Worker stopping, waiting for running jobs");
        // Every permit back means every spawned job finished
        let _drained = semaphore.acquire_many(concurrency as u32).await;
        info!(queue = %self.queue_name(), "Worker stopped");
        Ok(())
    }

    async fn idle(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.options.poll_interval) => {}
        }
    }

    #[instrument(skip(self, job, token), fields(queue = %job.queue, job_id = %job.id, name = %job.name))]
    async fn process(&self, job: JobRecord, token: String) {
        let started = Instant::now();
        let attempt = job.attempts_made + 1;
        debug!(attempt, max_attempts = job.options.attempts, "Processing job");

        let payload: H::Payload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                let reason = format!("invalid payload: {}", e);
                self.finish_failed(&job, &token, &reason, None).await;
                return;
            }
        };

        let ctx = JobContext {
            id: job.id,
            name: job.name.clone(),
            payload,
            attempt,
            max_attempts: job.options.attempts,
            store: Arc::clone(&self.store),
            token: token.clone(),
        };

        let heartbeat_stop = CancellationToken::new();
        let heartbeat = tokio::spawn(heartbeat(
            Arc::clone(&self.store),
            job.id,
            token.clone(),
            self.options.lock_duration,
            heartbeat_stop.clone(),
        ));

        let timeout = job
            .options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.options.job_timeout);
        let outcome = match tokio::time::timeout(timeout, self.handler.handle(&ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(JobError::retryable(format!(
                "job timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        heartbeat_stop.cancel();
        let _ = heartbeat.await;

        let payload = ctx.payload;
        match outcome {
            Ok(result) => {
                if let Err(e) = self.store.complete(job.id, &token, &result, now_ms()).await {
                    warn!(error = %e, "Could not mark job completed");
                    return;
                }
                info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    attempt,
                    "Job completed"
                );
                self.apply_retention(JobState::Completed, job.options.remove_on_complete)
                    .await;
                self.handler.on_completed(&job, &payload, &result).await;
            }
            Err(err) if err.is_retryable() && attempt < job.options.attempts => {
                let now = now_ms();
                let delay = job.options.backoff.delay_ms(attempt);
                let retry_at = now.saturating_add(delay as i64);
                match self
                    .store
                    .fail(job.id, &token, &err.to_string(), Some(retry_at), now)
                    .await
                {
                    Ok(()) => warn!(
                        error = %err,
                        attempt,
                        retry_in_ms = delay,
                        "Job attempt failed, retrying"
                    ),
                    Err(e) => warn!(error = %e, "Could not schedule job retry"),
                }
            }
            Err(err) => {
                self.finish_failed(&job, &token, &err.to_string(), Some(&payload))
                    .await;
            }
        }
    }

    async fn finish_failed(
        &self,
        job: &JobRecord,
        token: &str,
        reason: &str,
        payload: Option<&H::Payload>,
    ) {
        if let Err(e) = self.store.fail(job.id, token, reason, None, now_ms()).await {
            warn!(job_id = %job.id, error = %e, "Could not mark job failed");
            return;
        }
        error!(
            queue = %job.queue,
            job_id = %job.id,
            attempts = job.attempts_made + 1,
            reason,
            "Job failed permanently"
        );
        self.apply_retention(JobState::Failed, job.options.remove_on_fail)
            .await;
        self.handler.on_final_failure(job, payload, reason).await;
    }

    async fn apply_retention(&self, state: JobState, keep: KeepJobs) {
        let Some(keep) = keep.limit() else {
            return;
        };
        match self.store.trim(state, keep).await {
            Ok(0) => {}
            Ok(removed) => debug!(queue = %self.queue_name(), %state, removed, "Trimmed finished jobs"),
            Err(e) => warn!(queue = %self.queue_name(), error = %e, "Failed to trim finished jobs"),
        }
    }

    async fn check_stalled(&self) {
        let report = match self
            .store
            .recover_stalled(now_ms(), self.options.max_stalled)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(queue = %self.queue_name(), error = %e, "Stalled job check failed");
                return;
            }
        };
        if report.is_empty() {
            return;
        }

        warn!(
            queue = %self.queue_name(),
            requeued = report.requeued.len(),
            failed = report.failed.len(),
            "Recovered stalled jobs"
        );

        for id in report.failed {
            let job = match self.store.get(id).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Could not load stalled job");
                    continue;
                }
            };
            let payload: Option<H::Payload> = serde_json::from_value(job.payload.clone()).ok();
            self.handler
                .on_final_failure(&job, payload.as_ref(), STALLED_REASON)
                .await;
        }
    }
}

/// Renew the job lock every half lock period until stopped or the lock is lost
async fn heartbeat(
    store: Arc<dyn JobStore>,
    id: JobId,
    token: String,
    lock_duration: Duration,
    stop: CancellationToken,
) {
    let interval = lock_duration / 2;
    let lock_ms = i64::try_from(lock_duration.as_millis()).unwrap_or(i64::MAX);

    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        match store
            .extend_lock(id, &token, now_ms().saturating_add(lock_ms))
            .await
        {
            Ok(true) => debug!(job_id = %id, "Lock extended"),
            Ok(false) => {
                warn!(job_id = %id, "Job lock lost");
                return;
            }
            Err(e) => warn!(job_id = %id, error = %e, "Failed to extend job lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_job_error_classification() {
        assert!(JobError::retryable("timeout").is_retryable());
        assert!(!JobError::permanent("bad input").is_retryable());
        assert_eq!(JobError::permanent("bad input").to_string(), "bad input");
    }

    #[rstest]
    #[case(0, 1)]
    #[case(4, 4)]
    fn test_options_from_config_clamps_concurrency(#[case] requested: usize, #[case] expected: usize) {
        let config = talentflow_shared_config::QueueConfig::default();
        let options = WorkerOptions::from_config(&config, requested);
        assert_eq!(options.concurrency, expected);
        assert_eq!(options.lock_duration, Duration::from_millis(config.lock_duration_ms));
        assert_eq!(options.lock_ms(), config.lock_duration_ms);
    }
}
