//! `POST /api/interview-questions` - synchronous question generation
//!
//! Credits are only taken once the model has answered, so a provider
//! failure costs nothing.

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use uuid::Uuid;

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::{InterviewQuestionsRequest, InterviewQuestionsResponse};
use crate::services::interview::generate_questions;

pub fn router() -> Router<AppState> {
    Router::new().route("/interview-questions", post(interview_questions))
}

async fn interview_questions(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<InterviewQuestionsRequest>, JsonRejection>,
) -> ApiResult<Json<InterviewQuestionsResponse>> {
    let Json(request) = body?;
    request.validate()?;

    let cost = state.pricing.interview_questions;

    // Skip the LLM call for callers who could not pay for it anyway
    if cost > 0 {
        let available = state.credits.balance(auth.user_id).await?;
        if available < cost {
            return Err(ApiError::InsufficientCredits {
                required: cost,
                available,
            });
        }
    }

    let questions = generate_questions(&state.llm, &request).await?;

    let balance = if cost > 0 {
        let charged = state
            .credits
            .spend(
                auth.user_id,
                cost,
                Uuid::new_v4(),
                "Interview question generation",
            )
            .await?;
        match charged {
            Some(balance) => balance,
            None => {
                // Balance was spent elsewhere while the model was answering
                let available = state.credits.balance(auth.user_id).await?;
                return Err(ApiError::InsufficientCredits {
                    required: cost,
                    available,
                });
            }
        }
    } else {
        state.credits.balance(auth.user_id).await?
    };

    tracing::info!(
        user_id = %auth.user_id,
        questions = questions.len(),
        cost,
        "Interview questions generated"
    );

    Ok(Json(InterviewQuestionsResponse {
        questions,
        credits_charged: cost,
        balance,
    }))
}
