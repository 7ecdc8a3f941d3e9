//! Typed producer and inspection API over a [`JobStore`]

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobId, JobOptions, JobRecord, JobState, QueueCounts};
use crate::progress::{average_duration_ms, estimate_remaining_ms, throughput_per_min};
use crate::store::JobStore;

/// Completed jobs sampled for duration and throughput figures
pub const STATS_SAMPLE_SIZE: usize = 100;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Polling view of a single job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub queue: String,
    pub name: String,
    pub state: JobState,
    pub progress: u8,
    pub attempts_made: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 1-based place in line, waiting jobs only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub estimated_remaining_ms: Option<u64>,
}

/// Queue-wide figures for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    pub counts: QueueCounts,
    pub avg_processing_ms: Option<u64>,
    pub throughput_per_min: usize,
}

/// Producer side of a queue carrying payloads of type `P`
///
/// Cheap to clone. Clones share the closed flag, so closing one handle closes
/// them all.
pub struct QueueService<P> {
    store: Arc<dyn JobStore>,
    defaults: JobOptions,
    concurrency_hint: usize,
    closed: Arc<AtomicBool>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for QueueService<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            defaults: self.defaults.clone(),
            concurrency_hint: self.concurrency_hint,
            closed: Arc::clone(&self.closed),
            _payload: PhantomData,
        }
    }
}

impl<P> std::fmt::Debug for QueueService<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("queue", &self.store.queue_name())
            .field("defaults", &self.defaults)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl<P> QueueService<P>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn JobStore>, defaults: JobOptions) -> Self {
        Self {
            store,
            defaults,
            concurrency_hint: 1,
            closed: Arc::new(AtomicBool::new(false)),
            _payload: PhantomData,
        }
    }

    /// Number of workers expected to drain this queue, used for estimates
    pub fn with_concurrency_hint(mut self, concurrency: usize) -> Self {
        self.concurrency_hint = concurrency.max(1);
        self
    }

    pub fn name(&self) -> &str {
        self.store.queue_name()
    }

    pub fn defaults(&self) -> &JobOptions {
        &self.defaults
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Enqueue a job, using the queue defaults unless `options` is given
    #[instrument(skip(self, payload, options), fields(queue = %self.name()))]
    pub async fn add(
        &self,
        name: &str,
        payload: &P,
        options: Option<JobOptions>,
    ) -> QueueResult<JobId> {
        if self.is_closed() {
            return Err(QueueError::Closed(self.name().to_string()));
        }

        let options = options.unwrap_or_else(|| self.defaults.clone());
        options.validate().map_err(QueueError::InvalidOptions)?;

        let payload = serde_json::to_value(payload)?;
        let job = JobRecord::new(self.name(), name, payload, options, now_ms());
        self.store.insert(&job).await?;

        info!(job_id = %job.id, state = %job.state, "Job added");
        Ok(job.id)
    }

    pub async fn get_job(&self, id: JobId) -> QueueResult<Option<JobRecord>> {
        self.store.get(id).await
    }

    /// Decode the payload stored with a job
    pub fn payload_of(&self, job: &JobRecord) -> QueueResult<P> {
        Ok(serde_json::from_value(job.payload.clone())?)
    }

    /// Status of a job, with position and a remaining-time estimate
    pub async fn status(&self, id: JobId) -> QueueResult<Option<JobStatus>> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(None);
        };

        let position = if job.state == JobState::Waiting {
            self.store.wait_position(id).await?
        } else {
            None
        };

        let average = if job.state.is_finished() {
            None
        } else {
            let recent = self
                .store
                .list(JobState::Completed, 0, STATS_SAMPLE_SIZE)
                .await?;
            average_duration_ms(&recent)
        };

        let estimate =
            estimate_remaining_ms(&job, now_ms(), position, average, self.concurrency_hint);

        Ok(Some(JobStatus {
            id: job.id,
            queue: job.queue,
            name: job.name,
            state: job.state,
            progress: job.progress,
            attempts_made: job.attempts_made,
            max_attempts: job.options.attempts,
            result: job.return_value,
            error: job.failed_reason,
            created_at: to_datetime(job.created_at),
            processed_at: job.processed_at.and_then(to_datetime),
            finished_at: job.finished_at.and_then(to_datetime),
            position,
            estimated_remaining_ms: estimate,
        }))
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let counts = self.store.counts().await?;
        let recent = self
            .store
            .list(JobState::Completed, 0, STATS_SAMPLE_SIZE)
            .await?;

        Ok(QueueStats {
            queue: self.name().to_string(),
            counts,
            avg_processing_ms: average_duration_ms(&recent),
            throughput_per_min: throughput_per_min(&recent, now_ms()),
        })
    }

    /// Jobs in `state`; oldest first for pending states, newest first for
    /// finished ones
    pub async fn list(
        &self,
        state: JobState,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        self.store.list(state, offset, limit).await
    }

    /// Put a failed job back in line with a fresh attempt budget
    #[instrument(skip(self), fields(queue = %self.name()))]
    pub async fn retry(&self, id: JobId) -> QueueResult<()> {
        self.store.retry(id, None).await?;
        info!(job_id = %id, "Job re-queued");
        Ok(())
    }

    /// Like [`retry`](Self::retry), storing `payload` in place of the old one
    #[instrument(skip(self, payload), fields(queue = %self.name()))]
    pub async fn retry_with_payload(
        &self,
        id: JobId,
        payload: &serde_json::Value,
    ) -> QueueResult<()> {
        self.store.retry(id, Some(payload)).await?;
        info!(job_id = %id, "Job re-queued with a new payload");
        Ok(())
    }

    /// Delete a job that is not currently running. Returns false when the job
    /// does not exist.
    #[instrument(skip(self), fields(queue = %self.name()))]
    pub async fn remove(&self, id: JobId) -> QueueResult<bool> {
        let removed = self.store.remove(id).await?;
        debug!(job_id = %id, removed, "Job removal");
        Ok(removed)
    }

    /// Remove up to `limit` finished jobs that finished more than `grace` ago
    #[instrument(skip(self), fields(queue = %self.name()))]
    pub async fn clean(
        &self,
        grace: Duration,
        state: JobState,
        limit: usize,
    ) -> QueueResult<Vec<JobId>> {
        let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        let older_than = now_ms().saturating_sub(grace_ms);
        let removed = self.store.clean(state, older_than, limit).await?;
        if !removed.is_empty() {
            info!(state = %state, count = removed.len(), "Cleaned finished jobs");
        }
        Ok(removed)
    }

    /// Refuse new jobs from now on. Jobs already queued are unaffected.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(queue = %self.name(), "Queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
