//! Mock OpenAI-compatible server for chat completion tests
//!
//! Provides a [`MockLlmServer`] that answers `/v1/chat/completions` and
//! `/v1/models` so AI features can be tested without a real provider.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";

/// Mock chat completion provider
///
/// # Example
///
/// ```rust,ignore
/// use talentflow_test_utils::MockLlmServer;
///
/// #[tokio::test]
/// async fn test_analysis() {
///     let llm = MockLlmServer::start().await;
///     llm.mock_chat_with_json(serde_json::json!({"score": 80})).await;
///
///     let config = LlmConfig::with_url(llm.url());
///     // ... run your test
/// }
/// ```
pub struct MockLlmServer {
    server: MockServer,
}

/// Completion body in the OpenAI wire format
pub fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 34, "total_tokens": 46}
    })
}

impl MockLlmServer {
    /// Start a new mock provider
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base API URL, including the `/v1` segment
    pub fn url(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Answer every chat request with `content`
    pub async fn mock_chat_success(&self, content: &str) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
            .mount(&self.server)
            .await;
    }

    /// Answer every chat request with `value` serialized as the message content
    pub async fn mock_chat_with_json(&self, value: serde_json::Value) {
        self.mock_chat_success(&value.to_string()).await;
    }

    /// Answer the next `times` chat requests with `content`, then fall through
    /// to whatever is mounted afterwards
    pub async fn mock_chat_once(&self, content: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Fail chat requests with an OpenAI-style error envelope
    pub async fn mock_chat_failure(&self, status_code: u16, error_message: &str) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "error": {"message": error_message, "type": "server_error"}
            })))
            .mount(&self.server)
            .await;
    }

    /// Fail the next `times` chat requests, then fall through
    pub async fn mock_chat_failure_times(&self, status_code: u16, times: u64) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "error": {"message": "temporarily unavailable"}
            })))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Rate-limit chat requests
    pub async fn mock_rate_limit(&self, retry_after_secs: u64) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", retry_after_secs.to_string().as_str())
                    .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
            )
            .mount(&self.server)
            .await;
    }

    /// Delay chat responses
    pub async fn mock_timeout(&self, delay_ms: u64) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(delay_ms))
                    .set_body_json(completion_body("too late")),
            )
            .mount(&self.server)
            .await;
    }

    /// List the given models
    pub async fn mock_models(&self, models: &[&str]) {
        let data: Vec<serde_json::Value> = models
            .iter()
            .map(|id| json!({"id": id, "object": "model", "owned_by": "test"}))
            .collect();

        Mock::given(method("GET"))
            .and(path(MODELS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": data
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of chat completion requests received so far
    pub async fn chat_calls(&self) -> usize {
        self.chat_requests().await.len()
    }

    /// Bodies of the chat completion requests received so far
    pub async fn chat_requests(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == CHAT_PATH)
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Get reference to the underlying mock server for custom mock setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_llm_server_starts() {
        let server = MockLlmServer::start().await;
        assert!(server.url().starts_with("http://"));
        assert!(server.url().ends_with("/v1"));
    }

    #[tokio::test]
    async fn test_mock_chat_records_requests() {
        let server = MockLlmServer::start().await;
        server.mock_chat_success("Hello").await;

        let response = reqwest::Client::new()
            .post(format!("{}/chat/completions", server.url()))
            .json(&json!({"model": "m", "messages": [{"role": "user", "content": "Hi"}]}))
            .send()
            .await
            .unwrap();

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], "Hello");
        assert_eq!(server.chat_calls().await, 1);
        assert_eq!(server.chat_requests().await[0]["model"], "m");
    }
}
