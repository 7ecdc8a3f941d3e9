//! Stripe payments configuration types

use crate::{get_env_or_default, get_required_env, parse_env, ConfigError, ConfigResult};

/// Stripe API and webhook configuration
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... / sk_test_...)
    pub secret_key: String,

    /// Signing secret of the webhook endpoint (whsec_...)
    pub webhook_secret: String,

    /// API base URL (overridable for tests)
    pub api_base: String,

    /// Accepted clock skew for webhook signatures, in seconds
    pub signature_tolerance_secs: i64,

    /// Where Checkout redirects after a successful purchase
    pub success_url: String,

    /// Where Checkout redirects when the purchase is abandoned
    pub cancel_url: String,
}

impl StripeConfig {
    /// Load Stripe configuration from environment variables
    ///
    /// Returns an error if the secret key or webhook secret are not set, so
    /// callers can use `.ok()` to treat payments as optional.
    pub fn from_env() -> ConfigResult<Self> {
        let secret_key = get_required_env("STRIPE_SECRET_KEY")?;
        let webhook_secret = get_required_env("STRIPE_WEBHOOK_SECRET")?;

        if !webhook_secret.starts_with("whsec_") {
            return Err(ConfigError::InvalidValue(
                "STRIPE_WEBHOOK_SECRET".to_string(),
                "expected a whsec_ signing secret".to_string(),
            ));
        }

        Ok(Self {
            secret_key,
            webhook_secret,
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com/v1"),
            signature_tolerance_secs: parse_env("STRIPE_SIGNATURE_TOLERANCE", 300)?,
            success_url: get_env_or_default(
                "STRIPE_SUCCESS_URL",
                "http://localhost:3000/billing/success",
            ),
            cancel_url: get_env_or_default(
                "STRIPE_CANCEL_URL",
                "http://localhost:3000/billing/cancel",
            ),
        })
    }

    /// Create a configuration with explicit secrets (useful for testing)
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: "https://api.stripe.com/v1".to_string(),
            signature_tolerance_secs: 300,
            success_url: "http://localhost:3000/billing/success".to_string(),
            cancel_url: "http://localhost:3000/billing/cancel".to_string(),
        }
    }

    /// Get the full URL for an API path
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .finish()
    }
}
