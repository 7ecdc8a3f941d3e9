//! Health checks for the services the API depends on
//!
//! - PostgreSQL (credit ledger, results)
//! - Redis (job queues), skipped when running on the in-memory queue
//! - The LLM provider

use serde::Serialize;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use talentflow_llm_client::LlmClient;

/// Status of an individual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is healthy and responding
    Healthy,
    /// Service is unhealthy or unreachable
    Unhealthy,
    /// Service check was skipped (e.g., optional service not configured)
    Skipped,
}

/// Result of a single service health check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Name of the service
    pub name: &'static str,
    /// Current status
    pub status: ServiceStatus,
    /// Response time in milliseconds (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional details about the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceHealth {
    /// Create a healthy service result
    pub fn healthy(name: &'static str, response_time: Duration) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: None,
        }
    }

    /// Create a healthy service result with details
    pub fn healthy_with_details(
        name: &'static str,
        response_time: Duration,
        details: serde_json::Value,
    ) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: Some(details),
        }
    }

    /// Create an unhealthy service result
    pub fn unhealthy(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error.into()),
            details: None,
        }
    }

    /// Create an unhealthy service result with response time
    pub fn unhealthy_with_time(
        name: &'static str,
        error: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: Some(error.into()),
            details: None,
        }
    }

    /// Create a skipped service result (for optional services not configured)
    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Skipped,
            response_time_ms: None,
            error: None,
            details: Some(serde_json::json!({ "reason": reason.into() })),
        }
    }
}

/// Aggregated health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Overall status (healthy only if all required services are healthy)
    pub status: ServiceStatus,
    /// Individual service health results
    pub services: Vec<ServiceHealth>,
    /// Total time to complete all health checks
    pub total_time_ms: u64,
    /// API version
    pub version: &'static str,
}

impl HealthCheckResponse {
    /// Create a new health check response from individual service results
    pub fn new(services: Vec<ServiceHealth>, total_time: Duration) -> Self {
        let status = if services
            .iter()
            .all(|s| s.status == ServiceStatus::Healthy || s.status == ServiceStatus::Skipped)
        {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            services,
            total_time_ms: total_time.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Check if overall health is good
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Upper bound for a single dependency check
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health check service for verifying external dependencies
#[derive(Clone)]
pub struct HealthService {
    db: PgPool,
    redis: Option<redis::Client>,
    llm: LlmClient,
}

impl HealthService {
    /// `redis` is `None` when the queues run in memory
    pub fn new(db: PgPool, redis: Option<redis::Client>, llm: LlmClient) -> Self {
        Self { db, redis, llm }
    }

    /// Check PostgreSQL through the shared pool
    pub async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        let query = sqlx::query_scalar::<_, String>("SELECT version()").fetch_one(&self.db);
        match tokio::time::timeout(CHECK_TIMEOUT, query).await {
            Ok(Ok(version)) => ServiceHealth::healthy_with_details(
                "database",
                start.elapsed(),
                serde_json::json!({ "version": version }),
            ),
            Ok(Err(e)) => ServiceHealth::unhealthy_with_time(
                "database",
                format!("Query failed: {}", e),
                start.elapsed(),
            ),
            Err(_) => ServiceHealth::unhealthy_with_time("database", "Timed out", start.elapsed()),
        }
    }

    /// Check Redis connectivity
    pub async fn check_redis(&self) -> ServiceHealth {
        let Some(client) = &self.redis else {
            return ServiceHealth::skipped("redis", "queues run in memory");
        };
        let start = Instant::now();

        let ping = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        };

        match tokio::time::timeout(CHECK_TIMEOUT, ping).await {
            Ok(Ok(response)) if response == "PONG" => {
                ServiceHealth::healthy("redis", start.elapsed())
            }
            Ok(Ok(response)) => ServiceHealth::unhealthy_with_time(
                "redis",
                format!("Unexpected PING response: {}", response),
                start.elapsed(),
            ),
            Ok(Err(e)) => ServiceHealth::unhealthy_with_time(
                "redis",
                format!("PING failed: {}", e),
                start.elapsed(),
            ),
            Err(_) => ServiceHealth::unhealthy_with_time("redis", "Timed out", start.elapsed()),
        }
    }

    /// Check the LLM provider by listing its models
    pub async fn check_llm(&self) -> ServiceHealth {
        let start = Instant::now();
        let details = serde_json::json!({ "model": self.llm.model() });

        match tokio::time::timeout(CHECK_TIMEOUT, self.llm.health_check()).await {
            Ok(Ok(true)) => ServiceHealth::healthy_with_details("llm", start.elapsed(), details),
            Ok(Ok(false)) => ServiceHealth::unhealthy_with_time(
                "llm",
                "Provider answered with an error status",
                start.elapsed(),
            ),
            Ok(Err(e)) => ServiceHealth::unhealthy_with_time(
                "llm",
                format!("Request failed: {}", e),
                start.elapsed(),
            ),
            Err(_) => ServiceHealth::unhealthy_with_time("llm", "Timed out", start.elapsed()),
        }
    }

    /// Run all health checks in parallel
    pub async fn check_all(&self) -> HealthCheckResponse {
        let start = Instant::now();

        let (db_health, redis_health, llm_health) =
            tokio::join!(self.check_database(), self.check_redis(), self.check_llm());

        HealthCheckResponse::new(vec![db_health, redis_health, llm_health], start.elapsed())
    }
}
