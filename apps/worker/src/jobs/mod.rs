//! Job handlers, one per queue
//!
//! - `cv_analysis`: score a CV against an optional job description
//! - `interview_scoring`: grade interview answers and compute an overall score
//!
//! Both share the completion and final-failure side effects below.

pub mod cv_analysis;
pub mod document;
pub mod interview_scoring;

pub use cv_analysis::{CvAnalysis, CvAnalysisHandler, Recommendation};
pub use interview_scoring::{AnswerScore, InterviewScore, InterviewScoringHandler};

use talentflow_job_queue::{payload_owner, payload_reservation, JobRecord};
use uuid::Uuid;

use crate::credits::refund_credits;
use crate::notify::WorkflowEvent;
use crate::WorkerState;

/// Round an LLM score into 0-100
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Truncate to at most `max_chars` characters
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub(crate) async fn announce_completion(
    state: &WorkerState,
    job: &JobRecord,
    user_id: Uuid,
    result: &serde_json::Value,
) {
    let Some(notifier) = &state.notifier else {
        return;
    };

    let event = WorkflowEvent::completed(job.id, user_id, job.queue.as_str(), result.clone());
    if let Err(e) = notifier.notify(&event).await {
        e.log();
    }
}

/// Refund the reservation and tell the workflow engine
pub(crate) async fn settle_failure(
    state: &WorkerState,
    job: &JobRecord,
    user_id: Uuid,
    credits_charged: i64,
    reservation_id: Uuid,
    reason: &str,
) {
    if let Err(e) =
        refund_credits(&state.db, user_id, credits_charged, reservation_id, reason).await
    {
        tracing::error!(
            job_id = %job.id,
            %user_id,
            credits_charged,
            error = %e,
            "Credit refund failed"
        );
    }

    if let Some(notifier) = &state.notifier {
        let event = WorkflowEvent::failed(job.id, user_id, job.queue.as_str(), reason);
        if let Err(e) = notifier.notify(&event).await {
            e.log();
        }
    }
}

/// Final failure of a job whose payload no longer decodes
///
/// Refunds whatever the raw payload still tells us about the reservation.
pub(crate) async fn settle_undecodable(state: &WorkerState, job: &JobRecord, reason: &str) {
    let reservation = payload_reservation(&job.payload);
    match (payload_owner(&job.payload), reservation) {
        (Some(user_id), Some((credits, reservation_id))) => {
            settle_failure(state, job, user_id, credits, reservation_id, reason).await
        }
        _ => tracing::error!(
            job_id = %job.id,
            queue = %job.queue,
            "Cannot refund credits: payload lacks owner or reservation"
        ),
    }
}
