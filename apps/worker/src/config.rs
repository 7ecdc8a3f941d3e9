//! Worker configuration loaded from environment variables
//!
//! Defaults suit a development machine; production deployments mostly tune
//! the per-queue concurrency.

use anyhow::{Context, Result};
use talentflow_shared_config::{
    parse_env, CommonConfig, DatabaseConfig, Environment, LlmConfig, QueueConfig, RedisConfig,
    WorkflowConfig,
};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Parallel CV analysis jobs
    pub cv_concurrency: usize,

    /// Parallel interview scoring jobs
    pub scoring_concurrency: usize,

    /// Idle poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// How often finished jobs past their grace period are purged, in seconds
    pub clean_interval_secs: u64,

    /// Timeout for downloading CV documents, in seconds
    pub document_timeout_secs: u64,

    /// Largest CV document accepted, in bytes
    pub max_document_bytes: usize,

    /// Let CV downloads reach loopback and private addresses
    pub allow_private_document_hosts: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env().context("Failed to load config")?;

        let config = Self {
            common,
            cv_concurrency: parse_env("WORKER_CV_CONCURRENCY", 2)?,
            scoring_concurrency: parse_env("WORKER_SCORING_CONCURRENCY", 4)?,
            poll_interval_ms: parse_env("WORKER_POLL_INTERVAL_MS", 500)?,
            clean_interval_secs: parse_env("WORKER_CLEAN_INTERVAL", 3_600)?,
            document_timeout_secs: parse_env("DOCUMENT_FETCH_TIMEOUT", 30)?,
            max_document_bytes: parse_env("DOCUMENT_MAX_BYTES", 2 * 1024 * 1024)?,
            allow_private_document_hosts: parse_env("DOCUMENT_ALLOW_PRIVATE_HOSTS", false)?,
        };

        if config.cv_concurrency == 0 || config.scoring_concurrency == 0 {
            anyhow::bail!("worker concurrency must be at least 1");
        }
        if config.allow_private_document_hosts && config.environment().is_production() {
            anyhow::bail!("DOCUMENT_ALLOW_PRIVATE_HOSTS cannot be enabled in production");
        }

        Ok(config)
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

    /// Get n8n configuration (if configured)
    pub fn workflow(&self) -> Option<&WorkflowConfig> {
        self.common.workflow.as_ref()
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }
}
