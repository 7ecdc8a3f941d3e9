//! Stripe integration: Checkout sessions and signed webhook events

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use talentflow_shared_config::StripeConfig;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::CreditPackage;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Sent when a delayed payment method settles after checkout completed
pub const CHECKOUT_ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

/// Whether the event carries a checkout session that may owe credits
pub fn is_checkout_payment_event(event_type: &str) -> bool {
    matches!(
        event_type,
        CHECKOUT_COMPLETED | CHECKOUT_ASYNC_PAYMENT_SUCCEEDED
    )
}

/// Check a `Stripe-Signature` header against the raw request body
///
/// The header looks like `t=<unix>,v1=<hex>[,v1=<hex>...]`; the signed
/// message is `"{t}.{body}"`. Any matching `v1` is accepted so secrets can
/// be rolled.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    tolerance_secs: i64,
    now: i64,
) -> ApiResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| ApiError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(ApiError::InvalidSignature(
            "no v1 signature present".to_string(),
        ));
    }
    let skew = now.checked_sub(timestamp).and_then(i64::checked_abs);
    if skew.map_or(true, |skew| skew > tolerance_secs) {
        return Err(ApiError::InvalidSignature(
            "timestamp outside the tolerance window".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Configuration(format!("invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures
        .iter()
        .any(|signature| mac.clone().verify_slice(signature).is_ok());
    if matched {
        Ok(())
    } else {
        Err(ApiError::InvalidSignature(
            "signature does not match".to_string(),
        ))
    }
}

/// Envelope of every webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Credits owed for a paid checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompletion {
    pub session_id: String,
    pub user_id: Uuid,
    pub credits: i64,
    pub package: Option<String>,
}

impl CheckoutCompletion {
    /// Read a `checkout.session.completed` or
    /// `checkout.session.async_payment_succeeded` event
    ///
    /// Returns `Ok(None)` for sessions that are not paid yet; delayed payment
    /// methods are credited by the later `async_payment_succeeded` event.
    pub fn from_event(event: &StripeEvent) -> ApiResult<Option<Self>> {
        #[derive(Deserialize)]
        struct Session {
            id: String,
            #[serde(default)]
            payment_status: Option<String>,
            #[serde(default)]
            client_reference_id: Option<String>,
            #[serde(default)]
            metadata: std::collections::HashMap<String, String>,
        }

        let session: Session = serde_json::from_value(event.data.object.clone())
            .map_err(|e| ApiError::InvalidBody(format!("malformed checkout session: {}", e)))?;

        match session.payment_status.as_deref() {
            Some("paid") | Some("no_payment_required") => {}
            other => {
                tracing::info!(
                    event_id = %event.id,
                    session_id = %session.id,
                    payment_status = ?other,
                    "Checkout completed without payment, nothing to credit"
                );
                return Ok(None);
            }
        }

        let user_id = session
            .metadata
            .get("user_id")
            .or(session.client_reference_id.as_ref())
            .and_then(|id| id.parse::<Uuid>().ok())
            .ok_or_else(|| ApiError::InvalidBody("checkout session has no user id".to_string()))?;

        let credits = session
            .metadata
            .get("credits")
            .and_then(|c| c.parse::<i64>().ok())
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                ApiError::InvalidBody("checkout session has no credit amount".to_string())
            })?;

        Ok(Some(Self {
            session_id: session.id,
            user_id,
            credits,
            package: session.metadata.get("package").cloned(),
        }))
    }
}

/// Hosted Checkout page for a credit purchase
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe API client plus webhook verification
#[derive(Clone)]
pub struct PaymentService {
    http_client: reqwest::Client,
    config: StripeConfig,
}

impl std::fmt::Debug for PaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentService")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl PaymentService {
    pub fn new(config: StripeConfig) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Verify a webhook delivery and decode its event
    pub fn parse_webhook(&self, payload: &[u8], signature: &str) -> ApiResult<StripeEvent> {
        verify_signature(
            &self.config.webhook_secret,
            payload,
            signature,
            self.config.signature_tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;

        serde_json::from_slice(payload)
            .map_err(|e| ApiError::InvalidBody(format!("malformed Stripe event: {}", e)))
    }

    /// Start a hosted Checkout for `package`
    #[tracing::instrument(skip(self, email, package), fields(package = %package.id))]
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        package: &CreditPackage,
        currency: &str,
    ) -> ApiResult<CheckoutSession> {
        let mut form: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
            ("client_reference_id", user_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", currency.to_string()),
            (
                "line_items[0][price_data][unit_amount]",
                package.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("TalentFlow credits: {} ({} credits)", package.id, package.credits),
            ),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[credits]", package.credits.to_string()),
            ("metadata[package]", package.id.clone()),
        ];
        if let Some(email) = email {
            form.push(("customer_email", email.to_string()));
        }

        let response = self
            .http_client
            .post(self.config.api_url("checkout/sessions"))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("status {}", status.as_u16()));
            tracing::warn!(status = status.as_u16(), %message, "Stripe rejected checkout session");
            return Err(ApiError::Payment(message));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| ApiError::Payment(format!("unexpected checkout response: {}", e)))?;

        tracing::info!(session_id = %session.id, %user_id, "Checkout session created");
        Ok(session)
    }
}
