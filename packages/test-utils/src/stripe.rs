//! Stripe test helpers: a mock API server and webhook signature generation

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_PATH: &str = "/v1/checkout/sessions";

/// Build a `Stripe-Signature` header value for `payload` signed at `timestamp`
pub fn stripe_signature(secret: &str, payload: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// A `checkout.session.completed` event body
pub fn checkout_completed_event(
    event_id: &str,
    user_id: uuid::Uuid,
    credits: i64,
) -> serde_json::Value {
    checkout_event("checkout.session.completed", event_id, user_id, credits)
}

/// A paid checkout session event of any `checkout.session.*` type
pub fn checkout_event(
    event_type: &str,
    event_id: &str,
    user_id: uuid::Uuid,
    credits: i64,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "data": {
            "object": {
                "id": format!("cs_test_{}", event_id),
                "object": "checkout.session",
                "client_reference_id": user_id.to_string(),
                "payment_status": "paid",
                "amount_total": 4900,
                "currency": "eur",
                "metadata": {
                    "user_id": user_id.to_string(),
                    "credits": credits.to_string()
                }
            }
        }
    })
}

/// Mock Stripe REST API
pub struct MockStripeServer {
    server: MockServer,
}

impl MockStripeServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// API base to configure as `STRIPE_API_BASE`
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Create checkout sessions successfully
    pub async fn mock_checkout_session(&self, session_id: &str, session_url: &str) {
        Mock::given(method("POST"))
            .and(path(CHECKOUT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": session_id,
                "object": "checkout.session",
                "url": session_url,
                "status": "open"
            })))
            .mount(&self.server)
            .await;
    }

    /// Fail checkout session creation with a Stripe error envelope
    pub async fn mock_checkout_failure(&self, status_code: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(CHECKOUT_PATH))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "error": {"type": "invalid_request_error", "message": message}
            })))
            .mount(&self.server)
            .await;
    }

    /// Form bodies of the checkout requests received so far
    pub async fn checkout_requests(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == CHECKOUT_PATH)
            .map(|request| String::from_utf8_lossy(&request.body).into_owned())
            .collect()
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}
