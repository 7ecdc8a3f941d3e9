//! OpenAI-compatible HTTP client with retry logic and connection pooling

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use talentflow_shared_config::LlmConfig;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};
use crate::models::{
    ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatOptions,
    ModelList, ResponseFormat,
};

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Default retry configuration
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Chat completion client with retry logic and connection pooling
#[derive(Debug, Clone)]
pub struct LlmClient {
    /// HTTP client with connection pool
    http_client: Client,
    config: LlmConfig,
    /// Number of attempts for transient failures
    retry_attempts: u32,
    /// Base delay for exponential backoff (milliseconds)
    retry_base_delay_ms: u64,
}

impl LlmClient {
    /// Create a new client from configuration
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(LlmError::HttpError)?;

        Ok(Self::with_client(config, http_client))
    }

    /// Create a client with a custom HTTP client (for testing)
    pub fn with_client(config: &LlmConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, attempts: u32, base_delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Model used for completions
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Execute an async operation with retry logic
    async fn with_retry<T, F, Fut>(&self, operation: F) -> LlmResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        if self.retry_attempts == 0 {
            return operation().await;
        }

        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt + 1 < self.retry_attempts => {
                    let backoff = self
                        .retry_base_delay_ms
                        .saturating_mul(2_u64.saturating_pow(attempt));
                    // Honour Retry-After when the provider sends one
                    let delay = match &e {
                        LlmError::RateLimited {
                            retry_after_secs: Some(secs),
                        } => backoff.max(secs.saturating_mul(1000)),
                        _ => backoff,
                    };
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retry_attempts,
                        delay_ms = delay,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.retry_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Truncate error body to prevent memory exhaustion
    /// Safely handles UTF-8 boundaries to avoid panics on multi-byte characters
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_connect() {
            LlmError::ConnectionRefused(self.config.base_url.clone())
        } else if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            LlmError::HttpError(e)
        }
    }

    /// Map a non-success response to an error
    async fn error_from_response(response: Response) -> LlmError {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return LlmError::RateLimited { retry_after_secs };
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return LlmError::Unauthorized;
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) => parsed.error.message,
            Err(_) => Self::truncate_error_body(body),
        };

        LlmError::ApiError {
            status: status.as_u16(),
            message,
        }
    }

    /// Check if the provider is reachable and accepts our credentials
    pub async fn health_check(&self) -> LlmResult<bool> {
        let request = self.authorized(self.http_client.get(self.config.models_url()));

        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(self.send_error(e)),
        }
    }

    /// List model ids offered by the provider
    pub async fn list_models(&self) -> LlmResult<Vec<String>> {
        let response = self
            .authorized(self.http_client.get(self.config.models_url()))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Internal chat (single request, no retry)
    async fn chat_internal(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> LlmResult<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
            max_tokens: Some(options.max_tokens.unwrap_or(self.config.max_tokens)),
            response_format: options.json_mode.then(ResponseFormat::json_object),
        };

        let response = self
            .authorized(self.http_client.post(self.config.chat_completions_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let completion: ChatCompletionResponse = response.json().await?;
        if let Some(usage) = completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("completion has no choices".to_string()))
    }

    /// Chat with the model using configured defaults
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> LlmResult<String> {
        self.chat_with_options(messages, ChatOptions::default())
            .await
    }

    /// Chat with custom options and retry logic
    pub async fn chat_with_options(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> LlmResult<String> {
        debug!(
            model = %self.config.model,
            message_count = messages.len(),
            json_mode = options.json_mode,
            "Sending chat request"
        );

        let result = self
            .with_retry(|| {
                let messages = messages.clone();
                let options = options.clone();
                async move { self.chat_internal(&messages, &options).await }
            })
            .await?;

        debug!(response_len = result.len(), "Chat response received");

        Ok(result)
    }

    /// Chat in JSON mode and decode the answer into `T`
    ///
    /// Models sometimes wrap JSON in markdown code fences or add a sentence
    /// around it; [`extract_json`] strips that before decoding.
    pub async fn chat_json<T: DeserializeOwned>(&self, messages: Vec<ChatMessage>) -> LlmResult<T> {
        let content = self.chat_with_options(messages, ChatOptions::json()).await?;
        serde_json::from_str(extract_json(&content)).map_err(|e| {
            warn!(error = %e, content_len = content.len(), "Model returned unparseable JSON");
            LlmError::InvalidResponse(format!("model returned invalid JSON: {}", e))
        })
    }
}

/// Cut the JSON document out of a model answer
///
/// Handles markdown code fences (with or without a language tag) and prose
/// before or after the JSON value.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let unfenced = strip_code_fence(trimmed).unwrap_or(trimmed);

    let start = unfenced.find(|c| c == '{' || c == '[');
    let end = unfenced.rfind(|c| c == '}' || c == ']');
    match (start, end) {
        (Some(start), Some(end)) if end > start => &unfenced[start..=end],
        _ => unfenced,
    }
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let body_start = rest.find('\n')? + 1;
    let body = rest[body_start..].trim_end();
    Some(body.strip_suffix("```").unwrap_or(body).trim())
}
