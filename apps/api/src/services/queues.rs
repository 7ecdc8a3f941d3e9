//! Producer handles for the TalentFlow job queues
//!
//! The API enqueues and inspects jobs; the worker binary runs them. Both
//! sides share the store layout, so a `RedisJobStore` built here sees the
//! same jobs the worker claims.

use std::sync::Arc;
use std::time::Duration;

use talentflow_job_queue::{
    CvAnalysisPayload, InterviewScoringPayload, JobId, JobKind, JobOptions, JobRecord, JobState,
    JobStatus, JobStore, MemoryJobStore, QueueResult, QueueService, QueueStats, RedisJobStore,
};

/// One typed queue per job kind
#[derive(Clone, Debug)]
pub struct JobQueues {
    pub cv_analysis: QueueService<CvAnalysisPayload>,
    pub interview_scoring: QueueService<InterviewScoringPayload>,
}

impl JobQueues {
    pub fn new(
        cv_store: Arc<dyn JobStore>,
        scoring_store: Arc<dyn JobStore>,
        defaults: JobOptions,
    ) -> Self {
        Self {
            cv_analysis: QueueService::new(cv_store, defaults.clone()),
            interview_scoring: QueueService::new(scoring_store, defaults),
        }
    }

    /// Queues backed by Redis, shared with the worker
    pub fn redis(client: &redis::Client, prefix: &str, defaults: JobOptions) -> Self {
        Self::new(
            Arc::new(RedisJobStore::new(
                client.clone(),
                prefix,
                JobKind::CvAnalysis.queue_name(),
            )),
            Arc::new(RedisJobStore::new(
                client.clone(),
                prefix,
                JobKind::InterviewScoring.queue_name(),
            )),
            defaults,
        )
    }

    /// Process-local queues; nothing runs them unless a worker shares the process
    pub fn in_memory(defaults: JobOptions) -> Self {
        Self::new(
            Arc::new(MemoryJobStore::new(JobKind::CvAnalysis.queue_name())),
            Arc::new(MemoryJobStore::new(JobKind::InterviewScoring.queue_name())),
            defaults,
        )
    }

    /// Tell each queue how many workers drain it, for wait estimates
    pub fn with_concurrency_hints(mut self, cv_analysis: usize, interview_scoring: usize) -> Self {
        self.cv_analysis = self.cv_analysis.with_concurrency_hint(cv_analysis);
        self.interview_scoring = self
            .interview_scoring
            .with_concurrency_hint(interview_scoring);
        self
    }

    pub async fn get_job(&self, kind: JobKind, id: JobId) -> QueueResult<Option<JobRecord>> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.get_job(id).await,
            JobKind::InterviewScoring => self.interview_scoring.get_job(id).await,
        }
    }

    pub async fn status(&self, kind: JobKind, id: JobId) -> QueueResult<Option<JobStatus>> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.status(id).await,
            JobKind::InterviewScoring => self.interview_scoring.status(id).await,
        }
    }

    pub async fn stats(&self, kind: JobKind) -> QueueResult<QueueStats> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.stats().await,
            JobKind::InterviewScoring => self.interview_scoring.stats().await,
        }
    }

    pub async fn list(
        &self,
        kind: JobKind,
        state: JobState,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.list(state, offset, limit).await,
            JobKind::InterviewScoring => self.interview_scoring.list(state, offset, limit).await,
        }
    }

    pub async fn retry(&self, kind: JobKind, id: JobId) -> QueueResult<()> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.retry(id).await,
            JobKind::InterviewScoring => self.interview_scoring.retry(id).await,
        }
    }

    pub async fn retry_with_payload(
        &self,
        kind: JobKind,
        id: JobId,
        payload: &serde_json::Value,
    ) -> QueueResult<()> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.retry_with_payload(id, payload).await,
            JobKind::InterviewScoring => {
                self.interview_scoring.retry_with_payload(id, payload).await
            }
        }
    }

    pub async fn remove(&self, kind: JobKind, id: JobId) -> QueueResult<bool> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.remove(id).await,
            JobKind::InterviewScoring => self.interview_scoring.remove(id).await,
        }
    }

    pub async fn clean(
        &self,
        kind: JobKind,
        grace: Duration,
        state: JobState,
        limit: usize,
    ) -> QueueResult<Vec<JobId>> {
        match kind {
            JobKind::CvAnalysis => self.cv_analysis.clean(grace, state, limit).await,
            JobKind::InterviewScoring => {
                self.interview_scoring.clean(grace, state, limit).await
            }
        }
    }

    /// Stop accepting jobs on every queue
    pub fn close(&self) {
        self.cv_analysis.close();
        self.interview_scoring.close();
    }
}
