//! Credit routes
//!
//! - `GET /api/credits` - Balance and recent ledger rows
//! - `GET /api/credits/packages` - Packages for sale
//! - `POST /api/credits/checkout` - Start a Stripe Checkout for a package

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::{CreditBalance, CreditPackage};

const RECENT_TRANSACTIONS: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/credits", get(get_balance))
        .route("/credits/packages", get(list_packages))
        .route("/credits/checkout", post(create_checkout))
}

async fn get_balance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<CreditBalance>> {
    let balance = state.credits.balance(auth.user_id).await?;
    let transactions = state
        .credits
        .recent_transactions(auth.user_id, RECENT_TRANSACTIONS)
        .await?;

    Ok(Json(CreditBalance {
        balance,
        transactions,
    }))
}

#[derive(Debug, Serialize)]
struct PackageList {
    currency: String,
    packages: Vec<CreditPackage>,
}

async fn list_packages(State(state): State<AppState>) -> Json<PackageList> {
    Json(PackageList {
        currency: state.currency.clone(),
        packages: state.packages.as_ref().clone(),
    })
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    package: String,
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    session_id: String,
    url: String,
}

async fn create_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<CheckoutResponse>> {
    let Json(request) = body?;

    let package = state
        .packages
        .iter()
        .find(|package| package.id == request.package)
        .ok_or_else(|| {
            ApiError::validation(format!("unknown credit package '{}'", request.package))
        })?;

    let payments = state.payments.as_ref().ok_or(ApiError::PaymentsDisabled)?;

    let session = payments
        .create_checkout_session(
            auth.user_id,
            auth.claims.email.as_deref(),
            package,
            &state.currency,
        )
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        package = %package.id,
        session_id = %session.id,
        "Checkout session created"
    );

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}
