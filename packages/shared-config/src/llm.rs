//! LLM provider configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};

/// OpenAI-compatible chat completion provider configuration
#[derive(Clone)]
pub struct LlmConfig {
    /// Base API URL, including the version segment (e.g. https://api.openai.com/v1)
    pub base_url: String,

    /// API key sent as a bearer token (optional for self-hosted gateways)
    pub api_key: Option<String>,

    /// Chat model used for CV analysis, question generation and scoring
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens for a completion
    pub max_tokens: u32,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
}

impl LlmConfig {
    /// Load LLM configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            base_url: get_env_or_default("LLM_BASE_URL", "https://api.openai.com/v1"),
            api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|s| !s.is_empty()),
            model: get_env_or_default("LLM_MODEL", "gpt-4o-mini"),
            timeout_secs: parse_env("LLM_TIMEOUT", 120)?,
            max_tokens: parse_env("LLM_MAX_TOKENS", 2048)?,
            temperature: parse_env("LLM_TEMPERATURE", 0.2)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            base_url: url.into(),
            ..Self::default()
        }
    }

    /// Get the full URL for the chat completions endpoint
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Get the full URL for the model listing endpoint
    pub fn models_url(&self) -> String {
        format!("{}/models", self.base_url.trim_end_matches('/'))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

// The API key never reaches logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}
