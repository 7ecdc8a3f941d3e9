use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use talentflow_api::repositories::CreditRepository;
use talentflow_api::services::{HealthService, JobQueues, PaymentService};
use talentflow_api::{build_app, AppState, AuthConfig, AuthService, Config, HealthState};
use talentflow_job_queue::JobOptions;
use talentflow_llm_client::LlmClient;
use talentflow_shared_config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.common.log_format);

    tracing::info!(
        environment = %config.environment(),
        port = config.port,
        "Starting TalentFlow API"
    );

    let database = config.database();
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(database.idle_timeout_secs))
        .connect(&database.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations completed successfully");

    let defaults = JobOptions::from_config(config.queue());
    let redis_client = connect_redis(&config).await?;
    let queues = match &redis_client {
        Some(client) => JobQueues::redis(client, &config.redis().key_prefix, defaults),
        None => JobQueues::in_memory(defaults),
    }
    .with_concurrency_hints(config.cv_concurrency_hint, config.scoring_concurrency_hint);

    let llm = LlmClient::new(config.llm()).context("Failed to build LLM client")?;

    let payments = match &config.stripe {
        Some(stripe) => Some(
            PaymentService::new(stripe.clone()).context("Failed to build Stripe client")?,
        ),
        None => {
            tracing::warn!("Stripe not configured, credit purchases disabled");
            None
        }
    };

    let auth_service = AuthService::new(AuthConfig::from_config(&config));

    let health_state = HealthState::new(HealthService::new(
        pool.clone(),
        redis_client.clone(),
        llm.clone(),
    ));
    let state = AppState::new(
        &config,
        CreditRepository::new(pool.clone()),
        queues.clone(),
        llm,
        payments,
    );

    let app = build_app(&config, health_state, state, auth_service);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(queues))
        .await?;

    tracing::info!("API stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "talentflow_api=debug,tower_http=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Redis for the queues; `None` means in-memory queues
///
/// Only development may run without Redis. Jobs queued in memory are not
/// seen by the worker process.
async fn connect_redis(config: &Config) -> anyhow::Result<Option<redis::Client>> {
    let attempt = async {
        let client = redis::Client::open(config.redis().connection_url())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok::<_, redis::RedisError>(client)
    };

    match attempt.await {
        Ok(client) => {
            tracing::info!("Redis connected, queues shared with the worker");
            Ok(Some(client))
        }
        Err(e) if config.is_production() => {
            Err(e).context("Redis is required in production for the job queues")
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Redis unavailable, using in-memory queues; jobs will not reach the worker"
            );
            Ok(None)
        }
    }
}

async fn shutdown_signal(queues: JobQueues) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, refusing new jobs");
    queues.close();
}
