//! Middleware components for the TalentFlow API
//!
//! Authentication extractors for Axum handlers:
//! - `AuthUser`: requires a valid access token, 401 otherwise
//! - `AdminUser`: also requires the admin role, 403 otherwise

pub mod auth;

pub use auth::{AdminUser, AuthRejection, AuthUser};
