//! Job records, states and per-job options

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for a single backoff delay (1 hour)
pub const MAX_BACKOFF_MS: u64 = 60 * 60 * 1000;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a job
///
/// A job is in exactly one state, and in exactly one store collection, at
/// any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Delayed,
        JobState::Completed,
        JobState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Delayed => "delayed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed jobs will not run again unless retried
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" | "wait" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "delayed" => Ok(Self::Delayed),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

/// Delay strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed { delay_ms: u64 },
    /// `delay_ms * 2^(attempts_made - 1)`
    Exponential { delay_ms: u64 },
}

impl Backoff {
    /// Delay before the next attempt, given how many attempts already ran
    pub fn delay_ms(&self, attempts_made: u32) -> u64 {
        let delay = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential { delay_ms } => {
                let exponent = attempts_made.saturating_sub(1);
                2_u64
                    .checked_pow(exponent)
                    .and_then(|factor| delay_ms.checked_mul(factor))
                    .unwrap_or(u64::MAX)
            }
        };
        delay.min(MAX_BACKOFF_MS)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential { delay_ms: 2_000 }
    }
}

/// How many finished jobs to keep around for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepJobs {
    All,
    None,
    Count(usize),
}

impl KeepJobs {
    /// Number of records to keep, `None` meaning unbounded
    pub fn limit(&self) -> Option<usize> {
        match *self {
            Self::All => None,
            Self::None => Some(0),
            Self::Count(n) => Some(n),
        }
    }
}

/// Options attached to a job at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub backoff: Backoff,
    /// Initial delay before the job becomes eligible to run
    #[serde(default)]
    pub delay_ms: u64,
    /// Per-attempt timeout, overriding the worker default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub remove_on_complete: KeepJobs,
    pub remove_on_fail: KeepJobs,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::default(),
            delay_ms: 0,
            timeout_ms: None,
            remove_on_complete: KeepJobs::Count(100),
            remove_on_fail: KeepJobs::Count(500),
        }
    }
}

impl JobOptions {
    /// Build queue defaults from shared configuration
    pub fn from_config(config: &talentflow_shared_config::QueueConfig) -> Self {
        Self {
            attempts: config.attempts,
            backoff: Backoff::Exponential {
                delay_ms: config.backoff_ms,
            },
            delay_ms: 0,
            timeout_ms: Some(config.job_timeout_secs.saturating_mul(1000)),
            remove_on_complete: KeepJobs::Count(config.keep_completed),
            remove_on_fail: KeepJobs::Count(config.keep_failed),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.attempts == 0 {
            return Err("attempts must be at least 1".to_string());
        }
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// A job as persisted by a [`crate::JobStore`]
///
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
    pub state: JobState,
    /// Attempts that ran to an outcome (success, error or timeout)
    pub attempts_made: u32,
    pub progress: u8,
    pub created_at: i64,
    pub processed_at: Option<i64>,
    pub finished_at: Option<i64>,
    /// When a delayed job becomes eligible to run
    pub run_at: Option<i64>,
    pub failed_reason: Option<String>,
    pub return_value: Option<serde_json::Value>,
    pub stalled_count: u32,
    /// Token of the worker currently holding the job; only set while active
    #[serde(skip)]
    pub lock_token: Option<String>,
}

impl JobRecord {
    /// New job in `Waiting`, or `Delayed` when the options ask for a delay
    pub fn new(
        queue: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
        now: i64,
    ) -> Self {
        let (state, run_at) = if options.delay_ms > 0 {
            (
                JobState::Delayed,
                Some(now.saturating_add(options.delay_ms as i64)),
            )
        } else {
            (JobState::Waiting, None)
        };

        Self {
            id: JobId::new(),
            queue: queue.into(),
            name: name.into(),
            payload,
            options,
            state,
            attempts_made: 0,
            progress: 0,
            created_at: now,
            processed_at: None,
            finished_at: None,
            run_at,
            failed_reason: None,
            return_value: None,
            stalled_count: 0,
            lock_token: None,
        }
    }

    /// Attempts left after the ones already made
    pub fn attempts_remaining(&self) -> u32 {
        self.options.attempts.saturating_sub(self.attempts_made)
    }

    /// Processing time of a finished job
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.processed_at, self.finished_at) {
            (Some(start), Some(end)) if end >= start => Some((end - start) as u64),
            _ => None,
        }
    }
}

/// Number of jobs per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.delayed + self.completed + self.failed
    }

    pub fn get(&self, state: JobState) -> usize {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Delayed => self.delayed,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
        }
    }
}

/// Outcome of a stalled-job sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalledReport {
    /// Jobs put back on the wait list
    pub requeued: Vec<JobId>,
    /// Jobs that stalled too often and were failed
    pub failed: Vec<JobId>,
}

impl StalledReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

/// Reason recorded for jobs failed by the stalled-job sweep
pub const STALLED_REASON: &str = "job stalled more than allowable limit";
