use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use talentflow_job_queue::{
    JobKind, JobState, JobStore, RedisJobStore, Worker, WorkerOptions,
};
use talentflow_llm_client::LlmClient;
use talentflow_shared_config::LogFormat;
use talentflow_worker::jobs::document::DocumentFetcher;
use talentflow_worker::jobs::{CvAnalysisHandler, InterviewScoringHandler};
use talentflow_worker::{Config, ShutdownSignal, WorkerState, WorkflowNotifier};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Finished jobs removed per state per clean run
const CLEAN_BATCH: usize = 1_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.common.log_format);

    tracing::info!(environment = %config.environment(), "Starting TalentFlow worker");

    let db = PgPoolOptions::new()
        .max_connections(config.database().max_connections)
        .min_connections(config.database().min_connections)
        .acquire_timeout(Duration::from_secs(config.database().connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database().idle_timeout_secs))
        .connect(&config.database().url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    let redis = redis::Client::open(config.redis().connection_url())
        .context("Invalid Redis URL")?;
    // Fail fast when Redis is unreachable rather than on the first poll
    let mut conn = redis
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis did not answer PING")?;
    tracing::info!("Connected to Redis");

    let llm = LlmClient::new(config.llm()).context("Failed to build LLM client")?;
    let notifier = config
        .workflow()
        .map(WorkflowNotifier::new)
        .transpose()
        .context("Failed to build workflow notifier")?;
    if notifier.is_none() {
        tracing::info!("N8N_WEBHOOK_URL not set, workflow notifications disabled");
    }

    if config.allow_private_document_hosts {
        tracing::warn!("DOCUMENT_ALLOW_PRIVATE_HOSTS set, CV downloads may reach internal addresses");
    }
    let documents = DocumentFetcher::new(
        Duration::from_secs(config.document_timeout_secs),
        config.max_document_bytes,
    )
    .allow_private_hosts(config.allow_private_document_hosts);

    let state = Arc::new(WorkerState {
        db,
        llm,
        documents,
        notifier,
    });

    let prefix = config.redis().key_prefix.clone();
    let store_for = |kind: JobKind| -> Arc<dyn JobStore> {
        Arc::new(RedisJobStore::new(redis.clone(), &prefix, kind.queue_name()))
    };
    let options_for = |concurrency: usize| WorkerOptions {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        ..WorkerOptions::from_config(config.queue(), concurrency)
    };

    let cv_store = store_for(JobKind::CvAnalysis);
    let scoring_store = store_for(JobKind::InterviewScoring);

    let shutdown_signal =
        ShutdownSignal::install().context("Failed to install signal handlers")?;
    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let cv_worker = Worker::new(
        cv_store.clone(),
        Arc::new(CvAnalysisHandler::new(state.clone())),
        options_for(config.cv_concurrency),
    );
    tasks.push(spawn_worker(cv_worker, shutdown.clone()));

    let scoring_worker = Worker::new(
        scoring_store.clone(),
        Arc::new(InterviewScoringHandler::new(state.clone())),
        options_for(config.scoring_concurrency),
    );
    tasks.push(spawn_worker(scoring_worker, shutdown.clone()));

    tasks.push(tokio::spawn(clean_loop(
        vec![cv_store, scoring_store],
        Duration::from_secs(config.queue().clean_grace_secs),
        Duration::from_secs(config.clean_interval_secs.max(1)),
        shutdown.clone(),
    )));

    shutdown_signal
        .recv()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for in-flight jobs");
    shutdown.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "talentflow_worker=debug,talentflow_job_queue=info".into());

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

fn spawn_worker<H>(worker: Worker<H>, shutdown: CancellationToken) -> JoinHandle<()>
where
    H: talentflow_job_queue::JobHandler,
{
    tokio::spawn(async move {
        let queue = worker.queue_name().to_string();
        if let Err(e) = worker.run(shutdown).await {
            tracing::error!(queue = %queue, error = %e, "Worker exited with error");
        }
    })
}

/// Periodically drop finished jobs older than the grace period
async fn clean_loop(
    stores: Vec<Arc<dyn JobStore>>,
    grace: Duration,
    every: Duration,
    shutdown: CancellationToken,
) {
    let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let older_than = talentflow_job_queue::now_ms().saturating_sub(grace_ms);
        for store in &stores {
            for state in [JobState::Completed, JobState::Failed] {
                match store.clean(state, older_than, CLEAN_BATCH).await {
                    Ok(removed) if !removed.is_empty() => tracing::info!(
                        queue = store.queue_name(),
                        state = %state,
                        count = removed.len(),
                        "Cleaned finished jobs"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(
                        queue = store.queue_name(),
                        error = %e,
                        "Failed to clean finished jobs"
                    ),
                }
            }
        }
    }
}
