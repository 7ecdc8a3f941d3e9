//! TalentFlow background job processor
//!
//! Consumes the `cv-analysis` and `interview-scoring` queues. Each job calls
//! the LLM, stores its result in Postgres, and announces the outcome to the
//! workflow engine. Jobs that fail for good give their credits back.

pub mod config;
pub mod credits;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod shutdown;

use sqlx::PgPool;
use talentflow_llm_client::LlmClient;

use jobs::document::DocumentFetcher;

pub use config::Config;
pub use error::{ErrorSeverity, WorkerError, WorkerResult};
pub use notify::{WorkflowEvent, WorkflowNotifier};
pub use shutdown::ShutdownSignal;

/// Shared handles every job handler works with
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub db: PgPool,
    pub llm: LlmClient,
    /// Downloads CV documents given by URL
    pub documents: DocumentFetcher,
    /// `None` when no n8n webhook is configured
    pub notifier: Option<WorkflowNotifier>,
}
