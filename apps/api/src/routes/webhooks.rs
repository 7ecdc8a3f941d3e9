//! `POST /webhooks/stripe` - signed Stripe events
//!
//! The body is read raw: the signature covers the exact bytes Stripe sent.
//! Processing is idempotent on the event id, so Stripe redeliveries are
//! acknowledged without crediting twice. A session is credited at most once
//! whether it arrives as `completed` or later as `async_payment_succeeded`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::payments::{is_checkout_payment_event, CheckoutCompletion, SIGNATURE_HEADER};

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe", post(stripe_webhook))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let payments = state.payments.as_ref().ok_or(ApiError::PaymentsDisabled)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::InvalidSignature(format!("missing {} header", SIGNATURE_HEADER))
        })?;

    let event = payments.parse_webhook(&body, signature)?;

    if !is_checkout_payment_event(&event.event_type) {
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring Stripe event");
        return Ok(Json(json!({ "received": true })));
    }

    if let Some(completion) = CheckoutCompletion::from_event(&event)? {
        match state
            .credits
            .apply_checkout(&event.id, &event.event_type, &completion)
            .await?
        {
            Some(balance) => tracing::info!(
                event_id = %event.id,
                user_id = %completion.user_id,
                credits = completion.credits,
                balance,
                "Credits purchased"
            ),
            None => tracing::info!(event_id = %event.id, "Duplicate Stripe delivery acknowledged"),
        }
    }

    Ok(Json(json!({ "received": true })))
}
