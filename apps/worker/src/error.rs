//! Error handling for the TalentFlow worker
//!
//! One error type for every job, classified into retryable and permanent
//! failures so the queue knows whether another attempt can help.

use talentflow_job_queue::{JobError, QueueError};
use talentflow_llm_client::LlmError;
use thiserror::Error;

/// Main worker error type
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== Job Processing Errors ==========
    /// Invalid job payload (missing or malformed fields)
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Job data could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Redis/Queue Errors ==========
    /// Redis operation failed
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    // ========== Document Errors ==========
    /// CV document could not be downloaded
    #[error("document fetch failed for '{url}': {reason}")]
    DocumentFetch {
        url: String,
        reason: String,
        retryable: bool,
    },

    /// CV document exceeds the size limit
    #[error("document too large: {size} bytes, limit is {limit}")]
    DocumentTooLarge { size: usize, limit: usize },

    // ========== LLM Errors ==========
    /// LLM endpoint unreachable or timing out
    #[error("LLM service unavailable: {0}")]
    LlmUnavailable(String),

    /// LLM provider is throttling us
    #[error("LLM rate limited")]
    LlmRateLimited,

    /// LLM answered with something we could not use
    #[error("invalid LLM response: {0}")]
    LlmInvalidResponse(String),

    /// LLM rejected the request
    #[error("LLM request rejected: {status} - {message}")]
    LlmRejected { status: u16, message: String },

    /// Client-level retries exhausted
    #[error("failed after {attempts} attempts: {reason}")]
    MaxRetriesExceeded { attempts: u32, reason: String },

    // ========== HTTP/External Service Errors ==========
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Workflow webhook returned an error
    #[error("workflow webhook error: {status} - {message}")]
    Workflow { status: u16, message: String },

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal worker error (catch-all for unexpected errors)
    #[error("internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DocumentFetch { retryable, .. } => *retryable,
            Self::Workflow { status, .. } => *status >= 500 || *status == 429,
            Self::Queue(e) => e.is_retryable(),
            _ => matches!(
                self,
                Self::Database(_)
                    | Self::Redis(_)
                    | Self::Http(_)
                    | Self::LlmUnavailable(_)
                    | Self::LlmRateLimited
                    | Self::LlmInvalidResponse(_)
                    | Self::MaxRetriesExceeded { .. }
            ),
        }
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Configuration(_) | Self::LlmRejected { .. } => ErrorSeverity::Critical,

            Self::Database(_)
            | Self::Redis(_)
            | Self::Queue(_)
            | Self::MaxRetriesExceeded { .. }
            | Self::Internal(_) => ErrorSeverity::Error,

            Self::LlmUnavailable(_)
            | Self::LlmRateLimited
            | Self::LlmInvalidResponse(_)
            | Self::Http(_)
            | Self::Workflow { .. }
            | Self::DocumentFetch { .. } => ErrorSeverity::Warning,

            _ => ErrorSeverity::Info,
        }
    }

    /// Get the area this error is related to, if applicable
    pub fn job_context(&self) -> Option<&'static str> {
        match self {
            Self::DocumentFetch { .. } | Self::DocumentTooLarge { .. } => Some("document"),
            Self::LlmUnavailable(_)
            | Self::LlmRateLimited
            | Self::LlmInvalidResponse(_)
            | Self::LlmRejected { .. }
            | Self::MaxRetriesExceeded { .. } => Some("llm"),
            Self::Workflow { .. } => Some("workflow"),
            Self::Queue(_) | Self::Redis(_) => Some("queue"),
            _ => None,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        let context = self.job_context().unwrap_or("general");
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Critical worker error"
                );
            }
            ErrorSeverity::Error => {
                tracing::error!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Worker error"
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Worker warning"
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error = %self,
                    context = context,
                    retryable = self.is_retryable(),
                    "Worker info"
                );
            }
        }
    }

    /// Create a document fetch error
    pub fn document_fetch(url: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        Self::DocumentFetch {
            url: url.into(),
            reason: reason.into(),
            retryable,
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

// ========== Conversion Implementations ==========

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<WorkerError>() {
            Ok(worker_err) => worker_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<LlmError> for WorkerError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ConnectionRefused(url) => {
                Self::LlmUnavailable(format!("connection refused to {}", url))
            }
            LlmError::Timeout(secs) => Self::LlmUnavailable(format!("timed out after {}s", secs)),
            LlmError::RateLimited { .. } => Self::LlmRateLimited,
            LlmError::InvalidResponse(msg) => Self::LlmInvalidResponse(msg),
            LlmError::JsonError(e) => Self::LlmInvalidResponse(e.to_string()),
            LlmError::Unauthorized => {
                Self::Configuration("LLM API key rejected by provider".to_string())
            }
            LlmError::ApiError { status, message } if status >= 500 => {
                Self::LlmUnavailable(format!("{} - {}", status, message))
            }
            LlmError::ApiError { status, message } => Self::LlmRejected { status, message },
            LlmError::RetriesExhausted {
                attempts,
                last_error,
            } => Self::MaxRetriesExceeded {
                attempts,
                reason: last_error,
            },
            LlmError::HttpError(e) => Self::Http(e),
        }
    }
}

/// Queue-facing view: the queue only cares whether to try again
impl From<WorkerError> for JobError {
    fn from(err: WorkerError) -> Self {
        if err.is_retryable() {
            JobError::retryable(err)
        } else {
            JobError::permanent(err)
        }
    }
}
