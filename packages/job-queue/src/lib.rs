//! TalentFlow job queue
//!
//! Background jobs with retries, exponential backoff, progress reporting and
//! stalled-job recovery. Producers enqueue through a typed [`QueueService`];
//! [`Worker`]s claim jobs under a renewable lock and run them through a
//! [`JobHandler`].
//!
//! ```ignore
//! let store = Arc::new(RedisJobStore::new(client, "talentflow", "cv-analysis"));
//! let queue: QueueService<CvAnalysisPayload> = QueueService::new(store, JobOptions::default());
//! let id = queue.add("analyze", &payload, None).await?;
//! let status = queue.status(id).await?;
//! ```

pub mod error;
pub mod job;
pub mod payload;
pub mod progress;
pub mod service;
pub mod store;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use job::{
    Backoff, JobId, JobOptions, JobRecord, JobState, KeepJobs, QueueCounts, StalledReport,
    MAX_BACKOFF_MS, STALLED_REASON,
};
pub use payload::{
    payload_owner, payload_reservation, with_reservation, CvAnalysisPayload, CvDocument,
    InterviewAnswer, InterviewScoringPayload, JobKind,
};
pub use service::{now_ms, JobStatus, QueueService, QueueStats};
pub use store::{JobStore, MemoryJobStore, RedisJobStore};
pub use worker::{JobContext, JobError, JobHandler, Worker, WorkerOptions};
