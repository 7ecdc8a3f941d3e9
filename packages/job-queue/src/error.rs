//! Error types for the job queue

use thiserror::Error;

use crate::job::{JobId, JobState};

/// Errors raised by queue services, stores and workers
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis command or script failed
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload or record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No job with this id exists
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Operation not allowed in the job's current state
    #[error("job {id} is {state}, expected {expected}")]
    InvalidState {
        id: JobId,
        state: JobState,
        expected: &'static str,
    },

    /// The worker no longer owns the job (lock expired or job was moved)
    #[error("lock lost for job {0}")]
    LockLost(JobId),

    /// The queue no longer accepts jobs
    #[error("queue '{0}' is closed")]
    Closed(String),

    /// Job options failed validation
    #[error("invalid job options: {0}")]
    InvalidOptions(String),

    /// A stored record could not be decoded
    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl QueueError {
    /// Check if this error is transient (backend hiccup)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_))
    }

    pub(crate) fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let id: JobId = "6f1c0f3e-2f8e-4d6a-9a43-0b2f1e7b9c10".parse().unwrap();
        let err = QueueError::InvalidState {
            id,
            state: JobState::Active,
            expected: "failed",
        };
        assert_eq!(
            err.to_string(),
            "job 6f1c0f3e-2f8e-4d6a-9a43-0b2f1e7b9c10 is active, expected failed"
        );
    }

    #[test]
    fn test_only_backend_errors_are_retryable() {
        assert!(!QueueError::Closed("cv".into()).is_retryable());
        assert!(!QueueError::NotFound(JobId::new()).is_retryable());
    }
}
