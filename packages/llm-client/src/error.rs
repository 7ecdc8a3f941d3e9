//! Error types for the LLM client

use thiserror::Error;

/// Errors that can occur when talking to a chat completion provider
#[derive(Error, Debug)]
pub enum LlmError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to serialize/deserialize JSON
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Provider returned a non-success status
    #[error("LLM API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Provider asked us to slow down (HTTP 429)
    #[error("rate limited by LLM provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// API key missing or rejected
    #[error("LLM provider rejected credentials")]
    Unauthorized,

    /// Request timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Provider unreachable
    #[error("Connection refused. Is the LLM provider reachable at {0}?")]
    ConnectionRefused(String),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// All retry attempts exhausted
    #[error("All {attempts} retry attempts failed. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl LlmError {
    /// Check if this error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::ConnectionRefused(_) | LlmError::RateLimited { .. } => {
                true
            }
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
