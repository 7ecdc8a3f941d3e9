//! API server configuration

use std::env;

use anyhow::{bail, Context, Result};
use talentflow_shared_config::{
    get_env_or_default, parse_env, CommonConfig, ConfigError, DatabaseConfig, Environment,
    LlmConfig, QueueConfig, RedisConfig, StripeConfig,
};

use crate::models::CreditPackage;

/// Minimum required length for JWT_SECRET to be considered secure
const MIN_JWT_SECRET_LENGTH: usize = 32;

const DEFAULT_CREDIT_PACKAGES: &str = "starter:10:900,growth:50:3900,scale:200:12900";

/// Credits charged per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPricing {
    pub cv_analysis: i64,
    pub interview_scoring: i64,
    pub interview_questions: i64,
}

impl Default for CreditPricing {
    fn default() -> Self {
        Self {
            cv_analysis: 1,
            interview_scoring: 2,
            interview_questions: 1,
        }
    }
}

impl CreditPricing {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let pricing = Self {
            cv_analysis: parse_env("CREDIT_COST_CV_ANALYSIS", defaults.cv_analysis)?,
            interview_scoring: parse_env(
                "CREDIT_COST_INTERVIEW_SCORING",
                defaults.interview_scoring,
            )?,
            interview_questions: parse_env(
                "CREDIT_COST_INTERVIEW_QUESTIONS",
                defaults.interview_questions,
            )?,
        };

        if pricing.cv_analysis < 0 || pricing.interview_scoring < 0 || pricing.interview_questions < 0
        {
            bail!("credit costs cannot be negative");
        }
        Ok(pricing)
    }
}

/// API server configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Common configuration shared with the worker
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// Shared secret the auth platform signs access tokens with
    pub jwt_secret: String,

    /// Expected `iss` claim, when set
    pub jwt_issuer: Option<String>,

    /// Expected `aud` claim, when set
    pub jwt_audience: Option<String>,

    /// Stripe settings; payments are disabled without them
    pub stripe: Option<StripeConfig>,

    /// ISO currency for checkout sessions (default: eur)
    pub currency: String,

    /// Packages offered at checkout
    pub credit_packages: Vec<CreditPackage>,

    pub pricing: CreditPricing,

    /// Worker concurrency per queue, used for wait-time estimates
    pub cv_concurrency_hint: usize,
    pub scoring_concurrency_hint: usize,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.common.environment)
            .field("port", &self.port)
            .field("payments_enabled", &self.stripe.is_some())
            .field("currency", &self.currency)
            .field("credit_packages", &self.credit_packages)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production mode, this function requires:
    /// - `JWT_SECRET`: Must be set and at least 32 characters long
    /// - `STRIPE_SECRET_KEY` and `STRIPE_WEBHOOK_SECRET`
    /// - `DATABASE_URL`: Must be explicitly set (no insecure defaults)
    ///
    /// In development/staging mode, sensible defaults are used for convenience.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();
        let is_production = environment.is_production();

        let jwt_secret = Self::load_jwt_secret(is_production)?;
        let stripe = Self::load_stripe(is_production)?;

        if is_production {
            Self::validate_database_url()?;
        }

        let common = CommonConfig::from_env().context("Failed to load config")?;

        let currency = get_env_or_default("STRIPE_CURRENCY", "eur").to_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("STRIPE_CURRENCY must be a three-letter ISO code (got '{}')", currency);
        }

        let credit_packages =
            CreditPackage::parse_list(&get_env_or_default("CREDIT_PACKAGES", DEFAULT_CREDIT_PACKAGES))
                .map_err(|e| anyhow::anyhow!("Invalid CREDIT_PACKAGES: {}", e))?;

        Ok(Self {
            common,
            port: parse_env("PORT", 8080)?,
            jwt_secret,
            jwt_issuer: non_empty_env("JWT_ISSUER"),
            jwt_audience: non_empty_env("JWT_AUDIENCE"),
            stripe,
            currency,
            credit_packages,
            pricing: CreditPricing::from_env()?,
            cv_concurrency_hint: parse_env("WORKER_CV_CONCURRENCY", 2)?,
            scoring_concurrency_hint: parse_env("WORKER_SCORING_CONCURRENCY", 4)?,
            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    /// Load and validate JWT_SECRET
    ///
    /// In production it must be set and at least MIN_JWT_SECRET_LENGTH
    /// characters. In development a default is used with a warning.
    fn load_jwt_secret(is_production: bool) -> Result<String> {
        match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => {
                if is_production && secret.len() < MIN_JWT_SECRET_LENGTH {
                    bail!(
                        "JWT_SECRET must be at least {} characters in production (got {})",
                        MIN_JWT_SECRET_LENGTH,
                        secret.len()
                    );
                }
                Ok(secret)
            }
            _ if is_production => {
                bail!(
                    "JWT_SECRET environment variable is required in production. \
                     Please set the signing secret of your auth provider."
                );
            }
            _ => {
                tracing::warn!(
                    "JWT_SECRET not set, using insecure default. \
                     This is only acceptable in development mode."
                );
                Ok("development-secret-change-in-production".to_string())
            }
        }
    }

    /// Stripe is optional in development, mandatory in production
    fn load_stripe(is_production: bool) -> Result<Option<StripeConfig>> {
        match StripeConfig::from_env() {
            Ok(stripe) => Ok(Some(stripe)),
            Err(ConfigError::MissingEnvVar(name)) if !is_production => {
                tracing::warn!(missing = %name, "Stripe not configured, payments disabled");
                Ok(None)
            }
            Err(ConfigError::MissingEnvVar(name)) => bail!(
                "{} environment variable is required in production",
                name
            ),
            Err(e) => Err(e).context("Invalid Stripe configuration"),
        }
    }

    /// Validate that DATABASE_URL is explicitly set in production
    fn validate_database_url() -> Result<()> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(()),
            _ => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please set your PostgreSQL connection string."
                );
            }
        }
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get LLM configuration
    pub fn llm(&self) -> &LlmConfig {
        &self.common.llm
    }

    /// Get queue defaults
    pub fn queue(&self) -> &QueueConfig {
        &self.common.queue
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_VARS: [&str; 13] = [
        "ENVIRONMENT",
        "JWT_SECRET",
        "JWT_AUDIENCE",
        "DATABASE_URL",
        "STRIPE_SECRET_KEY",
        "STRIPE_WEBHOOK_SECRET",
        "STRIPE_CURRENCY",
        "CREDIT_PACKAGES",
        "CREDIT_COST_CV_ANALYSIS",
        "CREDIT_COST_INTERVIEW_SCORING",
        "CREDIT_COST_INTERVIEW_QUESTIONS",
        "CORS_ORIGINS",
        "PORT",
    ];

    const PRODUCTION_SECRET: &str = "a-production-secret-that-is-long-enough";

    /// Every API variable unset except the given overrides
    fn vars_with(
        overrides: &[(&'static str, &'static str)],
    ) -> Vec<(&'static str, Option<&'static str>)> {
        API_VARS
            .iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| *value);
                (*name, value)
            })
            .collect()
    }

    #[test]
    fn test_development_defaults() {
        temp_env::with_vars(vars_with(&[]), || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.port, 8080);
            assert_eq!(config.jwt_secret, "development-secret-change-in-production");
            assert!(config.stripe.is_none());
            assert_eq!(config.currency, "eur");
            assert_eq!(config.credit_packages.len(), 3);
            assert_eq!(config.pricing, CreditPricing::default());
            assert!(config.jwt_audience.is_none());
            assert!(config.cors_allowed_origins.is_none());
        });
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let vars = vars_with(&[
            ("ENVIRONMENT", "production"),
            ("DATABASE_URL", "postgres://db/talentflow"),
        ]);
        temp_env::with_vars(vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("JWT_SECRET"));
        });
    }

    #[test]
    fn test_production_rejects_short_jwt_secret() {
        let vars = vars_with(&[
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", "short"),
            ("DATABASE_URL", "postgres://db/talentflow"),
        ]);
        temp_env::with_vars(vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("at least 32 characters"));
        });
    }

    #[test]
    fn test_production_requires_stripe() {
        let vars = vars_with(&[
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", PRODUCTION_SECRET),
            ("DATABASE_URL", "postgres://db/talentflow"),
            ("STRIPE_SECRET_KEY", "sk_live_123"),
        ]);
        temp_env::with_vars(vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
        });
    }

    #[test]
    fn test_production_with_everything_set() {
        let vars = vars_with(&[
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", PRODUCTION_SECRET),
            ("DATABASE_URL", "postgres://db/talentflow"),
            ("STRIPE_SECRET_KEY", "sk_live_123"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
            ("CORS_ORIGINS", "https://app.talentflow.io, https://admin.talentflow.io"),
        ]);
        temp_env::with_vars(vars, || {
            let config = Config::from_env().unwrap();
            assert!(config.is_production());
            assert!(config.stripe.is_some());
            assert_eq!(
                config.cors_allowed_origins,
                Some(vec![
                    "https://app.talentflow.io".to_string(),
                    "https://admin.talentflow.io".to_string()
                ])
            );
        });
    }

    #[test]
    fn test_invalid_webhook_secret_fails_in_development() {
        let vars = vars_with(&[
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_WEBHOOK_SECRET", "not-a-signing-secret"),
        ]);
        temp_env::with_vars(vars, || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn test_custom_pricing_and_packages() {
        let vars = vars_with(&[
            ("CREDIT_COST_CV_ANALYSIS", "3"),
            ("CREDIT_PACKAGES", "solo:5:500"),
            ("STRIPE_CURRENCY", "USD"),
            ("JWT_AUDIENCE", "authenticated"),
        ]);
        temp_env::with_vars(vars, || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.pricing.cv_analysis, 3);
            assert_eq!(config.credit_packages[0].id, "solo");
            assert_eq!(config.currency, "usd");
            assert_eq!(config.jwt_audience.as_deref(), Some("authenticated"));
        });
    }

    #[test]
    fn test_negative_cost_is_rejected() {
        let vars = vars_with(&[("CREDIT_COST_INTERVIEW_SCORING", "-1")]);
        temp_env::with_vars(vars, || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn test_invalid_currency_is_rejected() {
        let vars = vars_with(&[("STRIPE_CURRENCY", "euro")]);
        temp_env::with_vars(vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("STRIPE_CURRENCY"));
        });
    }
}
