//! Storage backends for the job queue
//!
//! A [`JobStore`] owns the authoritative copy of every job and performs each
//! state transition atomically. Two implementations ship with the crate:
//!
//! - [`RedisJobStore`] - production backend, one Lua script per transition
//! - [`MemoryJobStore`] - in-process backend with the same semantics
//!
//! All timestamps are milliseconds since the Unix epoch and are passed in by
//! the caller, which keeps stores free of clock reads.

mod memory;
mod redis_store;

pub use self::memory::MemoryJobStore;
pub use self::redis_store::RedisJobStore;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::job::{JobId, JobRecord, JobState, QueueCounts, StalledReport};

/// Persistence and state transitions for one named queue
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Name of the queue this store serves
    fn queue_name(&self) -> &str;

    /// Persist a new job in `Waiting` or `Delayed`, as its record says
    async fn insert(&self, job: &JobRecord) -> QueueResult<()>;

    async fn get(&self, id: JobId) -> QueueResult<Option<JobRecord>>;

    /// Move delayed jobs whose `run_at <= now` to the wait list
    async fn promote_delayed(&self, now: i64) -> QueueResult<usize>;

    /// Promote due delayed jobs, then take the oldest waiting job
    ///
    /// The job becomes `Active`, locked until `now + lock_ms` under a fresh
    /// `token` that must accompany every later transition.
    async fn claim_next(&self, now: i64, lock_ms: u64, token: &str)
        -> QueueResult<Option<JobRecord>>;

    /// Push the lock expiry of an active job; `false` when the lock is gone
    async fn extend_lock(&self, id: JobId, token: &str, until: i64) -> QueueResult<bool>;

    async fn update_progress(&self, id: JobId, token: &str, progress: u8) -> QueueResult<()>;

    /// `Active` -> `Completed`
    async fn complete(
        &self,
        id: JobId,
        token: &str,
        return_value: &serde_json::Value,
        now: i64,
    ) -> QueueResult<()>;

    /// `Active` -> `Delayed` (when `retry_at` is set) or `Failed`
    async fn fail(
        &self,
        id: JobId,
        token: &str,
        reason: &str,
        retry_at: Option<i64>,
        now: i64,
    ) -> QueueResult<()>;

    /// `Failed` -> `Waiting`, resetting attempts and progress; `payload`
    /// replaces the stored payload when given
    async fn retry(&self, id: JobId, payload: Option<&serde_json::Value>) -> QueueResult<()>;

    /// Delete a job that is not active; `false` when it did not exist
    async fn remove(&self, id: JobId) -> QueueResult<bool>;

    async fn counts(&self) -> QueueResult<QueueCounts>;

    /// Page through one state
    ///
    /// Waiting jobs come in processing order, delayed jobs by `run_at`,
    /// finished jobs newest first.
    async fn list(&self, state: JobState, offset: usize, limit: usize)
        -> QueueResult<Vec<JobRecord>>;

    /// 1-based position of a waiting job, `None` when it is not waiting
    async fn wait_position(&self, id: JobId) -> QueueResult<Option<usize>>;

    /// Remove up to `limit` finished jobs that finished at or before `older_than`
    async fn clean(&self, state: JobState, older_than: i64, limit: usize)
        -> QueueResult<Vec<JobId>>;

    /// Keep only the newest `keep` jobs of a finished state
    async fn trim(&self, state: JobState, keep: usize) -> QueueResult<usize>;

    /// Requeue active jobs whose lock expired before `now`
    ///
    /// A job stalling more than `max_stalled` times is failed instead.
    async fn recover_stalled(&self, now: i64, max_stalled: u32) -> QueueResult<StalledReport>;
}

/// Only finished states can be cleaned or trimmed
pub(crate) fn ensure_finished(state: JobState) -> QueueResult<()> {
    if state.is_finished() {
        Ok(())
    } else {
        Err(crate::error::QueueError::InvalidOptions(format!(
            "cannot clean {} jobs, only completed or failed",
            state
        )))
    }
}
