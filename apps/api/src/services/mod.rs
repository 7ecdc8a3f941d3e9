//! Business logic services for TalentFlow
//!
//! - Access token verification
//! - Job queue producers
//! - Interview question generation
//! - Stripe payments
//! - Health checks

pub mod auth;
pub mod health;
pub mod interview;
pub mod payments;
pub mod queues;

pub use auth::{AuthConfig, AuthService};
pub use health::HealthService;
pub use payments::PaymentService;
pub use queues::JobQueues;
