//! HTTP route handlers for the TalentFlow API
//!
//! - `/health`: liveness and readiness
//! - `/api/cv-analysis`, `/api/interview-scoring`, `/api/jobs`: async jobs
//! - `/api/interview-questions`: synchronous question generation
//! - `/api/credits`: balance and Stripe Checkout
//! - `/webhooks/stripe`: payment events

pub mod credits;
pub mod health;
pub mod interview;
pub mod jobs;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;
use talentflow_llm_client::LlmClient;

use crate::config::{Config, CreditPricing};
use crate::models::CreditPackage;
use crate::repositories::CreditRepository;
use crate::services::{JobQueues, PaymentService};

pub use health::{health_router, HealthState};

/// State shared by the `/api` and `/webhooks` handlers
#[derive(Clone)]
pub struct AppState {
    pub credits: CreditRepository,
    pub queues: JobQueues,
    pub llm: LlmClient,
    /// `None` when Stripe is not configured
    pub payments: Option<PaymentService>,
    pub pricing: CreditPricing,
    pub packages: Arc<Vec<CreditPackage>>,
    pub currency: String,
}

impl AppState {
    pub fn new(
        config: &Config,
        credits: CreditRepository,
        queues: JobQueues,
        llm: LlmClient,
        payments: Option<PaymentService>,
    ) -> Self {
        Self {
            credits,
            queues,
            llm,
            payments,
            pricing: config.pricing,
            packages: Arc::new(config.credit_packages.clone()),
            currency: config.currency.clone(),
        }
    }
}

/// Router for everything outside `/health`
pub fn api_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(jobs::router())
        .merge(interview::router())
        .merge(credits::router());

    Router::new()
        .nest("/api", api)
        .nest("/webhooks", webhooks::router())
        .with_state(state)
}
