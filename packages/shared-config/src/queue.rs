//! Background job queue configuration types

use crate::{parse_env, ConfigError, ConfigResult};

/// Tuning shared by queue producers (API) and consumers (worker)
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts per job before it is marked failed
    pub attempts: u32,

    /// Base backoff delay between attempts in milliseconds (exponential)
    pub backoff_ms: u64,

    /// Per-attempt timeout in seconds
    pub job_timeout_secs: u64,

    /// How long a claimed job stays locked without a heartbeat, in milliseconds
    pub lock_duration_ms: u64,

    /// How many times a job may stall before it is failed
    pub max_stalled: u32,

    /// Completed jobs to keep per queue
    pub keep_completed: usize,

    /// Failed jobs to keep per queue
    pub keep_failed: usize,

    /// Age after which finished jobs are removed by the periodic cleaner, in seconds
    pub clean_grace_secs: u64,
}

impl QueueConfig {
    /// Load queue configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            attempts: parse_env("QUEUE_JOB_ATTEMPTS", 3)?,
            backoff_ms: parse_env("QUEUE_BACKOFF_MS", 2_000)?,
            job_timeout_secs: parse_env("QUEUE_JOB_TIMEOUT", 300)?,
            lock_duration_ms: parse_env("QUEUE_LOCK_DURATION_MS", 30_000)?,
            max_stalled: parse_env("QUEUE_MAX_STALLED", 1)?,
            keep_completed: parse_env("QUEUE_KEEP_COMPLETED", 100)?,
            keep_failed: parse_env("QUEUE_KEEP_FAILED", 500)?,
            clean_grace_secs: parse_env("QUEUE_CLEAN_GRACE", 86_400)?,
        };

        if config.attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "QUEUE_JOB_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if config.job_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "QUEUE_JOB_TIMEOUT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if config.lock_duration_ms < 1_000 {
            return Err(ConfigError::InvalidValue(
                "QUEUE_LOCK_DURATION_MS".to_string(),
                "must be at least 1000".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 2_000,
            job_timeout_secs: 300,
            lock_duration_ms: 30_000,
            max_stalled: 1,
            keep_completed: 100,
            keep_failed: 500,
            clean_grace_secs: 86_400,
        }
    }
}
