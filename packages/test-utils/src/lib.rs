//! Shared test utilities for TalentFlow workspace
//!
//! Mock implementations of external services for testing without network
//! dependencies. Used across the worker and API test suites.
//!
//! # Mock Services
//!
//! - [`MockLlmServer`] - OpenAI-compatible chat completion provider
//! - [`MockWorkflowServer`] - n8n webhook receiver
//! - [`MockStripeServer`] - Stripe checkout API, plus [`stripe_signature`]
//!   for signing webhook payloads
//!
//! # Example
//!
//! ```rust,ignore
//! use talentflow_test_utils::MockLlmServer;
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let llm = MockLlmServer::start().await;
//!     llm.mock_chat_success("Hello").await;
//!
//!     // Use llm.url() to configure your client
//! }
//! ```

mod llm;
mod stripe;
mod workflow;

pub use llm::{completion_body, MockLlmServer};
pub use stripe::{checkout_completed_event, checkout_event, stripe_signature, MockStripeServer};
pub use workflow::MockWorkflowServer;
