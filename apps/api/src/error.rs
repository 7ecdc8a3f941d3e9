//! Unified error handling for the TalentFlow API
//!
//! Every handler returns [`ApiResult`]; [`ApiError`] maps itself to an HTTP
//! status and a `{code, message, details?}` JSON body via Axum's
//! `IntoResponse`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use talentflow_job_queue::QueueError;
use talentflow_llm_client::LlmError;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Authentication & Authorization ==========
    /// Invalid or missing authentication credentials
    #[error("authentication required")]
    Unauthorized,

    /// Invalid token (expired, malformed, etc.)
    #[error("invalid authentication token: {0}")]
    InvalidToken(String),

    /// User lacks permission for the requested operation
    #[error("insufficient permissions: {0}")]
    Forbidden(String),

    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Resource is in a state that forbids the operation
    #[error("{0}")]
    Conflict(String),

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Invalid request body format
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Webhook signature missing, malformed, stale or wrong
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    // ========== Credits & Payments ==========
    /// Balance does not cover the operation
    #[error("insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    /// Stripe rejected or failed a request
    #[error("payment provider error: {0}")]
    Payment(String),

    /// Stripe is not configured on this deployment
    #[error("payments are not enabled")]
    PaymentsDisabled,

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database connection pool exhausted
    #[error("database connection unavailable")]
    DatabaseUnavailable,

    // ========== Queue Errors ==========
    /// Job queue operation failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    // ========== External Service Errors ==========
    /// Redis operation failed
    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),

    /// LLM provider error
    #[error("AI service error: {0}")]
    AiService(String),

    /// LLM provider is overloaded or throttling us
    #[error("AI service busy, retry later")]
    AiServiceBusy,

    /// HTTP client error (for external API calls)
    #[error("external service error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// JWT encoding/decoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized
            Self::Unauthorized | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,

            // 402 Payment Required
            Self::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            Self::Forbidden(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::Conflict(_) => StatusCode::CONFLICT,

            // 400 Bad Request
            Self::ValidationError(_) | Self::InvalidBody(_) | Self::InvalidSignature(_) => {
                StatusCode::BAD_REQUEST
            }

            // 422 Unprocessable Entity
            Self::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,

            Self::Queue(err) => match err {
                QueueError::NotFound(_) => StatusCode::NOT_FOUND,
                QueueError::InvalidState { .. } => StatusCode::CONFLICT,
                QueueError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
                QueueError::Closed(_) | QueueError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
                QueueError::LockLost(_)
                | QueueError::Serialization(_)
                | QueueError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },

            // 503 Service Unavailable
            Self::DatabaseUnavailable | Self::PaymentsDisabled | Self::AiServiceBusy => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 502 Bad Gateway (external service errors)
            Self::AiService(_) | Self::Payment(_) | Self::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::Database(_)
            | Self::Redis(_)
            | Self::Configuration(_)
            | Self::Internal(_)
            | Self::Jwt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidBody(_) => "INVALID_BODY",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            Self::Payment(_) => "PAYMENT_ERROR",
            Self::PaymentsDisabled => "PAYMENTS_DISABLED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
            Self::Queue(err) => match err {
                QueueError::NotFound(_) => "JOB_NOT_FOUND",
                QueueError::InvalidState { .. } => "INVALID_JOB_STATE",
                QueueError::InvalidOptions(_) => "INVALID_JOB_OPTIONS",
                QueueError::Closed(_) => "QUEUE_CLOSED",
                _ => "QUEUE_ERROR",
            },
            Self::Redis(_) => "CACHE_ERROR",
            Self::AiService(_) => "AI_SERVICE_ERROR",
            Self::AiServiceBusy => "AI_SERVICE_BUSY",
            Self::HttpClient(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Jwt(_) => "JWT_ERROR",
        }
    }

    /// Structured extras for the response body
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientCredits {
                required,
                available,
            } => Some(serde_json::json!({
                "required": required,
                "available": available,
            })),
            _ => None,
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Authorization error"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
            details: self.details(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// ========== Conversion Implementations ==========

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::ValidationError(rejection.body_text())
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { .. } => Self::AiServiceBusy,
            LlmError::Unauthorized => {
                Self::Configuration("LLM provider rejected the API key".to_string())
            }
            other => Self::AiService(other.to_string()),
        }
    }
}
