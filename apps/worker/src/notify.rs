//! Outbound n8n webhook for finished jobs
//!
//! Delivery is best-effort: a few attempts with exponential backoff, then the
//! failure is logged and the job outcome stands.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use talentflow_job_queue::JobId;
use talentflow_shared_config::WorkflowConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex hmac of the body>` when a secret is configured
pub const SIGNATURE_HEADER: &str = "X-TalentFlow-Signature";

const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowEventKind {
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
}

/// Body posted to the workflow engine
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    pub event: WorkflowEventKind,
    pub job_id: JobId,
    pub user_id: Uuid,
    pub queue: String,
    pub occurred_at: DateTime<Utc>,
    /// Job result on completion, failure reason on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl WorkflowEvent {
    pub fn completed(
        job_id: JobId,
        user_id: Uuid,
        queue: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self {
            event: WorkflowEventKind::JobCompleted,
            job_id,
            user_id,
            queue: queue.into(),
            occurred_at: Utc::now(),
            data: Some(result),
        }
    }

    pub fn failed(job_id: JobId, user_id: Uuid, queue: impl Into<String>, reason: &str) -> Self {
        Self {
            event: WorkflowEventKind::JobFailed,
            job_id,
            user_id,
            queue: queue.into(),
            occurred_at: Utc::now(),
            data: Some(serde_json::json!({ "reason": reason })),
        }
    }
}

/// Posts job events to the configured n8n webhook
#[derive(Debug, Clone)]
pub struct WorkflowNotifier {
    http_client: Client,
    config: WorkflowConfig,
    retry_base_delay_ms: u64,
}

impl WorkflowNotifier {
    pub fn new(config: &WorkflowConfig) -> WorkerResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            config: config.clone(),
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        })
    }

    /// Override the backoff base (tests use a few milliseconds)
    pub fn with_retry_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    /// Deliver an event, retrying transient failures
    pub async fn notify(&self, event: &WorkflowEvent) -> WorkerResult<()> {
        let body = serde_json::to_vec(event)?;
        let signature = self
            .config
            .secret
            .as_deref()
            .map(|secret| sign(secret, &body))
            .transpose()?;
        let attempts = self.config.max_attempts.max(1);

        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry_base_delay_ms.saturating_mul(1 << (attempt - 1).min(16));
                debug!(attempt, delay_ms = delay, "Retrying workflow webhook");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.send(&body, signature.as_deref()).await {
                Ok(()) => {
                    info!(
                        job_id = %event.job_id,
                        event = ?event.event,
                        attempt = attempt + 1,
                        "Workflow webhook delivered"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    warn!(job_id = %event.job_id, attempt = attempt + 1, error = %e, "Workflow webhook failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| WorkerError::Internal("no delivery attempt made".into())))
    }

    async fn send(&self, body: &[u8], signature: Option<&str>) -> WorkerResult<()> {
        let mut request = self
            .http_client
            .post(&self.config.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", signature));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(WorkerError::Workflow {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        })
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> WorkerResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WorkerError::Configuration(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("secret", b"{\"event\":\"job.completed\"}").unwrap();
        let b = sign("secret", b"{\"event\":\"job.completed\"}").unwrap();
        let other = sign("other", b"{\"event\":\"job.completed\"}").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_event_wire_format() {
        let job_id = JobId::new();
        let user_id = Uuid::new_v4();
        let event = WorkflowEvent::failed(job_id, user_id, "cv-analysis", "boom");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "job.failed");
        assert_eq!(value["job_id"], job_id.to_string());
        assert_eq!(value["user_id"], user_id.to_string());
        assert_eq!(value["queue"], "cv-analysis");
        assert_eq!(value["data"]["reason"], "boom");
    }
}
