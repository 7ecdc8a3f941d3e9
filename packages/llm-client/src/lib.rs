//! OpenAI-compatible chat completion client for TalentFlow AI features
//!
//! Works against any provider exposing `POST {base}/chat/completions` and
//! `GET {base}/models` (OpenAI, Azure-style gateways, LiteLLM, vLLM).
//!
//! # Thread Safety
//!
//! `LlmClient` is `Clone + Send + Sync` and can be shared across tasks. It
//! uses a shared HTTP client connection pool.
//!
//! # Example
//!
//! ```no_run
//! use talentflow_llm_client::{ChatMessage, LlmClient};
//! use talentflow_shared_config::LlmConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LlmClient::new(&LlmConfig::default())?;
//!
//! let answer = client
//!     .chat(vec![
//!         ChatMessage::system("You are a recruiting assistant."),
//!         ChatMessage::user("Summarise this CV in one sentence: ..."),
//!     ])
//!     .await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod models;

pub use client::{extract_json, LlmClient};
pub use error::{LlmError, LlmResult};
pub use models::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatOptions, ChatRole,
    ModelInfo, ModelList, ResponseFormat, Usage,
};
