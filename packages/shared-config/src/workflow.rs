//! Workflow-automation (n8n) webhook configuration types

use crate::{get_required_env, parse_env, ConfigError, ConfigResult};

/// Outbound workflow webhook configuration
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Webhook URL the workflow engine listens on
    pub webhook_url: String,

    /// Optional shared secret sent in the `X-Webhook-Secret` header
    pub secret: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Delivery attempts before the notification is dropped
    pub max_attempts: u32,
}

impl WorkflowConfig {
    /// Load workflow configuration from environment variables
    ///
    /// Returns an error if `N8N_WEBHOOK_URL` is not set; notifications are optional.
    pub fn from_env() -> ConfigResult<Self> {
        let webhook_url = get_required_env("N8N_WEBHOOK_URL")?;
        if !(webhook_url.starts_with("http://") || webhook_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(
                "N8N_WEBHOOK_URL".to_string(),
                webhook_url,
            ));
        }

        Ok(Self {
            webhook_url,
            secret: std::env::var("N8N_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout_secs: parse_env("N8N_TIMEOUT", 10)?,
            max_attempts: parse_env("N8N_MAX_ATTEMPTS", 3)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            webhook_url: url.into(),
            secret: None,
            timeout_secs: 10,
            max_attempts: 3,
        }
    }
}
