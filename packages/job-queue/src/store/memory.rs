//! In-process job store
//!
//! Mirrors the Redis layout (a wait list plus one sorted collection per
//! state) so both backends order and transition jobs identically. Used by
//! the test suites and by the API when it runs without Redis in development.
//!
//! Locks recover from poisoning: a panicking test must not take the whole
//! store down with it.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{ensure_finished, JobStore};
use crate::error::{QueueError, QueueResult};
use crate::job::{JobId, JobRecord, JobState, QueueCounts, StalledReport, STALLED_REASON};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    /// Front is the next job to run
    wait: VecDeque<JobId>,
    /// Lock expiry per active job
    active: HashMap<JobId, i64>,
    delayed: BTreeSet<(i64, JobId)>,
    completed: BTreeSet<(i64, JobId)>,
    failed: BTreeSet<(i64, JobId)>,
}

impl Inner {
    fn promote(&mut self, now: i64) -> usize {
        let due: Vec<(i64, JobId)> = self
            .delayed
            .iter()
            .take_while(|(run_at, _)| *run_at <= now)
            .copied()
            .collect();

        for entry in &due {
            self.delayed.remove(entry);
            let id = entry.1;
            if let Some(job) = self.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                job.run_at = None;
                self.wait.push_back(id);
            }
        }

        due.len()
    }

    fn owns(&self, id: JobId, token: &str) -> bool {
        self.active.contains_key(&id)
            && self
                .jobs
                .get(&id)
                .and_then(|job| job.lock_token.as_deref())
                == Some(token)
    }

    fn finished_set(&mut self, state: JobState) -> &mut BTreeSet<(i64, JobId)> {
        match state {
            JobState::Failed => &mut self.failed,
            _ => &mut self.completed,
        }
    }

    fn detach(&mut self, id: JobId) {
        self.wait.retain(|queued| *queued != id);
        self.active.remove(&id);
        self.delayed.retain(|(_, queued)| *queued != id);
        self.completed.retain(|(_, queued)| *queued != id);
        self.failed.retain(|(_, queued)| *queued != id);
    }
}

/// Job store keeping everything in memory
///
/// Clones share the same underlying data.
#[derive(Debug, Clone)]
pub struct MemoryJobStore {
    queue: String,
    inner: Arc<RwLock<Inner>>,
}

impl MemoryJobStore {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock expiry of an active job (for tests and diagnostics)
    pub fn lock_expiry(&self, id: JobId) -> Option<i64> {
        self.read().active.get(&id).copied()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn insert(&self, job: &JobRecord) -> QueueResult<()> {
        let mut inner = self.write();
        match (job.state, job.run_at) {
            (JobState::Delayed, Some(run_at)) => {
                inner.delayed.insert((run_at, job.id));
            }
            (JobState::Waiting, _) => inner.wait.push_back(job.id),
            (state, _) => {
                return Err(QueueError::InvalidState {
                    id: job.id,
                    state,
                    expected: "waiting or delayed",
                })
            }
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> QueueResult<Option<JobRecord>> {
        Ok(self.read().jobs.get(&id).cloned())
    }

    async fn promote_delayed(&self, now: i64) -> QueueResult<usize> {
        Ok(self.write().promote(now))
    }

    async fn claim_next(
        &self,
        now: i64,
        lock_ms: u64,
        token: &str,
    ) -> QueueResult<Option<JobRecord>> {
        let mut inner = self.write();
        inner.promote(now);

        while let Some(id) = inner.wait.pop_front() {
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            job.state = JobState::Active;
            job.processed_at = Some(now);
            job.lock_token = Some(token.to_string());
            let claimed = job.clone();
            inner
                .active
                .insert(id, now.saturating_add(lock_ms as i64));
            return Ok(Some(claimed));
        }

        Ok(None)
    }

    async fn extend_lock(&self, id: JobId, token: &str, until: i64) -> QueueResult<bool> {
        let mut inner = self.write();
        if !inner.owns(id, token) {
            return Ok(false);
        }
        inner.active.insert(id, until);
        Ok(true)
    }

    async fn update_progress(&self, id: JobId, token: &str, progress: u8) -> QueueResult<()> {
        let mut inner = self.write();
        if !inner.owns(id, token) {
            return Err(QueueError::LockLost(id));
        }
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.progress = progress.min(100);
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: JobId,
        token: &str,
        return_value: &serde_json::Value,
        now: i64,
    ) -> QueueResult<()> {
        let mut inner = self.write();
        if !inner.owns(id, token) {
            return Err(QueueError::LockLost(id));
        }
        inner.active.remove(&id);
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.state = JobState::Completed;
            job.attempts_made += 1;
            job.progress = 100;
            job.finished_at = Some(now);
            job.return_value = Some(return_value.clone());
            job.failed_reason = None;
            job.lock_token = None;
        }
        inner.completed.insert((now, id));
        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        token: &str,
        reason: &str,
        retry_at: Option<i64>,
        now: i64,
    ) -> QueueResult<()> {
        let mut inner = self.write();
        if !inner.owns(id, token) {
            return Err(QueueError::LockLost(id));
        }
        inner.active.remove(&id);
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.attempts_made += 1;
            job.failed_reason = Some(reason.to_string());
            job.lock_token = None;
            match retry_at {
                Some(at) => {
                    job.state = JobState::Delayed;
                    job.run_at = Some(at);
                }
                None => {
                    job.state = JobState::Failed;
                    job.finished_at = Some(now);
                }
            }
        }
        match retry_at {
            Some(at) => inner.delayed.insert((at, id)),
            None => inner.failed.insert((now, id)),
        };
        Ok(())
    }

    async fn retry(&self, id: JobId, payload: Option<&serde_json::Value>) -> QueueResult<()> {
        let mut inner = self.write();
        let state = inner
            .jobs
            .get(&id)
            .map(|job| job.state)
            .ok_or(QueueError::NotFound(id))?;
        if state != JobState::Failed {
            return Err(QueueError::InvalidState {
                id,
                state,
                expected: "failed",
            });
        }

        inner.failed.retain(|(_, queued)| *queued != id);
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.state = JobState::Waiting;
            job.attempts_made = 0;
            job.progress = 0;
            job.stalled_count = 0;
            job.failed_reason = None;
            job.finished_at = None;
            job.processed_at = None;
            job.return_value = None;
            if let Some(payload) = payload {
                job.payload = payload.clone();
            }
        }
        inner.wait.push_back(id);
        Ok(())
    }

    async fn remove(&self, id: JobId) -> QueueResult<bool> {
        let mut inner = self.write();
        let Some(state) = inner.jobs.get(&id).map(|job| job.state) else {
            return Ok(false);
        };
        if state == JobState::Active {
            return Err(QueueError::InvalidState {
                id,
                state,
                expected: "not active",
            });
        }
        inner.detach(id);
        inner.jobs.remove(&id);
        Ok(true)
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let inner = self.read();
        Ok(QueueCounts {
            waiting: inner.wait.len(),
            active: inner.active.len(),
            delayed: inner.delayed.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
        })
    }

    async fn list(
        &self,
        state: JobState,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        let inner = self.read();
        let ids: Vec<JobId> = match state {
            JobState::Waiting => inner.wait.iter().copied().skip(offset).take(limit).collect(),
            JobState::Active => {
                let mut active: Vec<(i64, JobId)> =
                    inner.active.iter().map(|(id, until)| (*until, *id)).collect();
                active.sort();
                active
                    .into_iter()
                    .map(|(_, id)| id)
                    .skip(offset)
                    .take(limit)
                    .collect()
            }
            JobState::Delayed => inner
                .delayed
                .iter()
                .map(|(_, id)| *id)
                .skip(offset)
                .take(limit)
                .collect(),
            JobState::Completed => inner
                .completed
                .iter()
                .rev()
                .map(|(_, id)| *id)
                .skip(offset)
                .take(limit)
                .collect(),
            JobState::Failed => inner
                .failed
                .iter()
                .rev()
                .map(|(_, id)| *id)
                .skip(offset)
                .take(limit)
                .collect(),
        };

        Ok(ids
            .into_iter()
            .filter_map(|id| inner.jobs.get(&id).cloned())
            .collect())
    }

    async fn wait_position(&self, id: JobId) -> QueueResult<Option<usize>> {
        Ok(self
            .read()
            .wait
            .iter()
            .position(|queued| *queued == id)
            .map(|index| index + 1))
    }

    async fn clean(
        &self,
        state: JobState,
        older_than: i64,
        limit: usize,
    ) -> QueueResult<Vec<JobId>> {
        ensure_finished(state)?;
        let mut inner = self.write();
        let set = inner.finished_set(state);
        let expired: Vec<(i64, JobId)> = set
            .iter()
            .take_while(|(finished_at, _)| *finished_at <= older_than)
            .take(limit)
            .copied()
            .collect();
        for entry in &expired {
            set.remove(entry);
        }

        let ids: Vec<JobId> = expired.into_iter().map(|(_, id)| id).collect();
        for id in &ids {
            inner.jobs.remove(id);
        }
        Ok(ids)
    }

    async fn trim(&self, state: JobState, keep: usize) -> QueueResult<usize> {
        ensure_finished(state)?;
        let mut inner = self.write();
        let set = inner.finished_set(state);
        let excess = set.len().saturating_sub(keep);
        let oldest: Vec<(i64, JobId)> = set.iter().take(excess).copied().collect();
        for entry in &oldest {
            set.remove(entry);
        }
        for (_, id) in &oldest {
            inner.jobs.remove(id);
        }
        Ok(oldest.len())
    }

    async fn recover_stalled(&self, now: i64, max_stalled: u32) -> QueueResult<StalledReport> {
        let mut inner = self.write();
        let mut expired: Vec<(i64, JobId)> = inner
            .active
            .iter()
            .filter(|(_, until)| **until < now)
            .map(|(id, until)| (*until, *id))
            .collect();
        expired.sort();

        let mut report = StalledReport::default();
        for (_, id) in expired {
            inner.active.remove(&id);
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            job.stalled_count += 1;
            job.lock_token = None;
            if job.stalled_count > max_stalled {
                job.state = JobState::Failed;
                job.failed_reason = Some(STALLED_REASON.to_string());
                job.finished_at = Some(now);
                inner.failed.insert((now, id));
                report.failed.push(id);
            } else {
                job.state = JobState::Waiting;
                inner.wait.push_front(id);
                report.requeued.push(id);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOptions;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn job(options: JobOptions, now: i64) -> JobRecord {
        JobRecord::new("test", "work", json!({"n": 1}), options, now)
    }

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let store = MemoryJobStore::new("test");
        let first = job(JobOptions::default(), 0);
        let second = job(JobOptions::default(), 1);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let claimed = store.claim_next(10, 1_000, "t1").await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.processed_at, Some(10));
        assert_eq!(store.lock_expiry(first.id), Some(1_010));
    }

    #[tokio::test]
    async fn test_delayed_job_waits_until_due() {
        let store = MemoryJobStore::new("test");
        let delayed = job(JobOptions::default().with_delay_ms(500), 0);
        store.insert(&delayed).await.unwrap();

        assert!(store.claim_next(499, 1_000, "t").await.unwrap().is_none());
        let claimed = store.claim_next(500, 1_000, "t").await.unwrap().unwrap();
        assert_eq!(claimed.id, delayed.id);
        assert!(claimed.run_at.is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_matching_token() {
        let store = MemoryJobStore::new("test");
        let record = job(JobOptions::default(), 0);
        store.insert(&record).await.unwrap();
        store.claim_next(0, 1_000, "mine").await.unwrap();

        let err = store
            .complete(record.id, "theirs", &json!(null), 5)
            .await
            .unwrap_err();
        assert_matches!(err, QueueError::LockLost(id) if id == record.id);

        store
            .complete(record.id, "mine", &json!({"ok": true}), 5)
            .await
            .unwrap();
        let done = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.attempts_made, 1);
        assert_eq!(done.progress, 100);
        assert_eq!(done.return_value, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_fail_with_retry_moves_to_delayed() {
        let store = MemoryJobStore::new("test");
        let record = job(JobOptions::default(), 0);
        store.insert(&record).await.unwrap();
        store.claim_next(0, 1_000, "t").await.unwrap();

        store
            .fail(record.id, "t", "boom", Some(2_000), 10)
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.active, 0);
        let failed = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Delayed);
        assert_eq!(failed.failed_reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_remove_refuses_active_jobs() {
        let store = MemoryJobStore::new("test");
        let record = job(JobOptions::default(), 0);
        store.insert(&record).await.unwrap();
        store.claim_next(0, 1_000, "t").await.unwrap();

        assert_matches!(
            store.remove(record.id).await,
            Err(QueueError::InvalidState { state: JobState::Active, .. })
        );
        assert!(!store.remove(JobId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_trim_keeps_newest() {
        let store = MemoryJobStore::new("test");
        let mut ids = Vec::new();
        for i in 0..4 {
            let record = job(JobOptions::default(), i);
            store.insert(&record).await.unwrap();
            store.claim_next(i, 1_000, "t").await.unwrap();
            store.complete(record.id, "t", &json!(i), 100 + i).await.unwrap();
            ids.push(record.id);
        }

        assert_eq!(store.trim(JobState::Completed, 2).await.unwrap(), 2);
        assert!(store.get(ids[0]).await.unwrap().is_none());
        assert!(store.get(ids[1]).await.unwrap().is_none());
        assert!(store.get(ids[3]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_trim_rejects_unfinished_states() {
        let store = MemoryJobStore::new("test");
        assert!(store.trim(JobState::Waiting, 1).await.is_err());
    }
}
