//! Async job routes
//!
//! - `POST /api/cv-analysis` - Queue a CV analysis (charges credits)
//! - `POST /api/interview-scoring` - Queue interview scoring (charges credits)
//! - `GET /api/jobs/:queue/:id` - Job status, own jobs only unless admin
//! - `GET /api/jobs/:queue` - List jobs by state (admin)
//! - `GET /api/jobs/:queue/stats` - Queue counters and throughput (admin)
//! - `POST /api/jobs/:queue/:id/retry` - Retry a failed job, charging its
//!   owner again (admin)
//! - `DELETE /api/jobs/:queue/:id` - Remove a job that is not running (admin)
//! - `POST /api/jobs/:queue/clean` - Purge old finished jobs (admin)

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use talentflow_job_queue::{
    payload_owner, payload_reservation, with_reservation, CvAnalysisPayload,
    InterviewScoringPayload, JobId, JobKind, JobRecord, JobState, JobStatus, QueueError,
    QueueService, QueueStats,
};
use uuid::Uuid;

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminUser, AuthUser};
use crate::models::{CvAnalysisRequest, InterviewScoringRequest, JobAccepted};

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;
const DEFAULT_CLEAN_LIMIT: usize = 1_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cv-analysis", post(submit_cv_analysis))
        .route("/interview-scoring", post(submit_interview_scoring))
        .route("/jobs/:queue", get(list_jobs))
        .route("/jobs/:queue/stats", get(queue_stats))
        .route("/jobs/:queue/clean", post(clean_queue))
        .route("/jobs/:queue/:id", get(job_status).delete(remove_job))
        .route("/jobs/:queue/:id/retry", post(retry_job))
}

fn parse_kind(queue: &str) -> ApiResult<JobKind> {
    queue
        .parse()
        .map_err(|_| ApiError::not_found("queue", queue))
}

fn parse_job_id(id: &str) -> ApiResult<JobId> {
    id.parse()
        .map_err(|_| ApiError::validation(format!("invalid job id '{}'", id)))
}

async fn submit_cv_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<CvAnalysisRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let Json(request) = body?;
    let document = request.validate()?;

    let cost = state.pricing.cv_analysis;
    let payload = CvAnalysisPayload {
        user_id: auth.user_id,
        candidate_name: request.candidate_name.trim().to_string(),
        document,
        job_description: request.job_description(),
        credits_charged: cost,
        reservation_id: Uuid::new_v4(),
    };

    let job_id = enqueue_charged(
        &state,
        &state.queues.cv_analysis,
        JobKind::CvAnalysis,
        auth.user_id,
        payload.reservation_id,
        cost,
        &payload,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted::new(JobKind::CvAnalysis, job_id, cost)),
    ))
}

async fn submit_interview_scoring(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<InterviewScoringRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let Json(request) = body?;
    request.validate()?;

    let cost = state.pricing.interview_scoring;
    let payload = InterviewScoringPayload {
        user_id: auth.user_id,
        interview_id: request.interview_id.unwrap_or_else(Uuid::new_v4),
        role: request.role.trim().to_string(),
        answers: request.answers,
        credits_charged: cost,
        reservation_id: Uuid::new_v4(),
    };

    let job_id = enqueue_charged(
        &state,
        &state.queues.interview_scoring,
        JobKind::InterviewScoring,
        auth.user_id,
        payload.reservation_id,
        cost,
        &payload,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted::new(JobKind::InterviewScoring, job_id, cost)),
    ))
}

/// Reserve `cost` credits, then enqueue; the reservation is released if the
/// job never makes it into the queue
async fn enqueue_charged<P>(
    state: &AppState,
    queue: &QueueService<P>,
    kind: JobKind,
    user_id: Uuid,
    reservation_id: Uuid,
    cost: i64,
    payload: &P,
) -> ApiResult<JobId>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    reserve_credits(state, kind, user_id, reservation_id, cost).await?;

    match queue.add(kind.job_name(), payload, None).await {
        Ok(job_id) => {
            tracing::info!(%job_id, %user_id, queue = %kind, "Job queued");
            Ok(job_id)
        }
        Err(e) => {
            release_reservation(state, kind, user_id, reservation_id, cost).await;
            Err(e.into())
        }
    }
}

/// Take `cost` credits under `reservation_id`; 402 when the balance is short
async fn reserve_credits(
    state: &AppState,
    kind: JobKind,
    user_id: Uuid,
    reservation_id: Uuid,
    cost: i64,
) -> ApiResult<()> {
    if cost <= 0 {
        return Ok(());
    }

    let description = format!("{} job", kind);
    match state
        .credits
        .spend(user_id, cost, reservation_id, &description)
        .await?
    {
        Some(balance) => {
            tracing::debug!(%user_id, cost, balance, queue = %kind, "Credits reserved");
            Ok(())
        }
        None => {
            let available = state.credits.balance(user_id).await?;
            Err(ApiError::InsufficientCredits {
                required: cost,
                available,
            })
        }
    }
}

async fn release_reservation(
    state: &AppState,
    kind: JobKind,
    user_id: Uuid,
    reservation_id: Uuid,
    cost: i64,
) {
    if cost <= 0 {
        return;
    }

    let reason = format!("{} job could not be queued", kind);
    if let Err(e) = state
        .credits
        .refund(user_id, cost, reservation_id, &reason)
        .await
    {
        tracing::error!(
            %user_id,
            %reservation_id,
            error = %e,
            "Failed to release credit reservation"
        );
    }
}

async fn job_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((queue, id)): Path<(String, String)>,
) -> ApiResult<Json<JobStatus>> {
    let kind = parse_kind(&queue)?;
    let job_id = parse_job_id(&id)?;

    // Other users' jobs are reported as missing, not forbidden
    let record = state
        .queues
        .get_job(kind, job_id)
        .await?
        .filter(|record| auth.can_access(payload_owner(&record.payload)))
        .ok_or_else(|| ApiError::not_found("job", id.as_str()))?;

    let status = state
        .queues
        .status(kind, record.id)
        .await?
        .ok_or_else(|| ApiError::not_found("job", id.as_str()))?;

    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    state: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn list_jobs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(queue): Path<String>,
    query: Result<Query<ListQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let kind = parse_kind(&queue)?;
    let Query(query) = query?;

    let job_state = match query.state.as_deref() {
        Some(raw) => raw.parse::<JobState>().map_err(ApiError::validation)?,
        None => JobState::Waiting,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let jobs = state
        .queues
        .list(kind, job_state, query.offset.unwrap_or(0), limit)
        .await?;
    Ok(Json(jobs))
}

async fn queue_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(queue): Path<String>,
) -> ApiResult<Json<QueueStats>> {
    let kind = parse_kind(&queue)?;
    Ok(Json(state.queues.stats(kind).await?))
}

async fn retry_job(
    State(state): State<AppState>,
    admin: AdminUser,
    Path((queue, id)): Path<(String, String)>,
) -> ApiResult<Json<JobStatus>> {
    let kind = parse_kind(&queue)?;
    let job_id = parse_job_id(&id)?;

    let record = state
        .queues
        .get_job(kind, job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("job", id.as_str()))?;
    if record.state != JobState::Failed {
        return Err(QueueError::InvalidState {
            id: job_id,
            state: record.state,
            expected: "failed",
        }
        .into());
    }

    // A job that failed for good has been refunded, so the rerun is charged
    // under a fresh reservation that a second final failure can refund
    match (
        payload_owner(&record.payload),
        payload_reservation(&record.payload),
    ) {
        (Some(user_id), Some((cost, _))) if cost > 0 => {
            let reservation_id = Uuid::new_v4();
            reserve_credits(&state, kind, user_id, reservation_id, cost).await?;

            let payload = with_reservation(&record.payload, reservation_id);
            if let Err(e) = state
                .queues
                .retry_with_payload(kind, job_id, &payload)
                .await
            {
                release_reservation(&state, kind, user_id, reservation_id, cost).await;
                return Err(e.into());
            }
            tracing::info!(%job_id, %user_id, cost, %reservation_id, "Retry charged");
        }
        _ => state.queues.retry(kind, job_id).await?,
    }
    tracing::info!(%job_id, queue = %kind, admin = %admin.user_id, "Job retried");

    let status = state
        .queues
        .status(kind, job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("job", id.as_str()))?;
    Ok(Json(status))
}

async fn remove_job(
    State(state): State<AppState>,
    admin: AdminUser,
    Path((queue, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let kind = parse_kind(&queue)?;
    let job_id = parse_job_id(&id)?;

    if !state.queues.remove(kind, job_id).await? {
        return Err(ApiError::not_found("job", id));
    }

    tracing::info!(%job_id, queue = %kind, admin = %admin.user_id, "Job removed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CleanRequest {
    state: String,
    #[serde(default)]
    grace_secs: u64,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CleanResponse {
    removed: usize,
    job_ids: Vec<JobId>,
}

async fn clean_queue(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(queue): Path<String>,
    body: Result<Json<CleanRequest>, JsonRejection>,
) -> ApiResult<Json<CleanResponse>> {
    let kind = parse_kind(&queue)?;
    let Json(request) = body?;

    let job_state = request
        .state
        .parse::<JobState>()
        .map_err(ApiError::validation)?;
    if !job_state.is_finished() {
        return Err(ApiError::validation(
            "only completed or failed jobs can be cleaned",
        ));
    }

    let job_ids = state
        .queues
        .clean(
            kind,
            Duration::from_secs(request.grace_secs),
            job_state,
            request.limit.unwrap_or(DEFAULT_CLEAN_LIMIT),
        )
        .await?;

    tracing::info!(
        queue = %kind,
        state = %job_state,
        removed = job_ids.len(),
        admin = %admin.user_id,
        "Queue cleaned"
    );
    Ok(Json(CleanResponse {
        removed: job_ids.len(),
        job_ids,
    }))
}
