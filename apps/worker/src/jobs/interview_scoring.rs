//! Interview scoring job
//!
//! Grades every question/answer pair with the LLM, one request per answer,
//! and stores the overall score (the mean) in `interview_scores`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use talentflow_job_queue::{
    InterviewAnswer, InterviewScoringPayload, JobContext, JobError, JobHandler, JobId, JobRecord,
};
use talentflow_llm_client::{ChatMessage, LlmClient};
use uuid::Uuid;

use super::cv_analysis::Recommendation;
use super::{announce_completion, clamp_score, settle_failure, truncate_chars};
use crate::error::{WorkerError, WorkerResult};
use crate::WorkerState;

const MAX_PROMPT_ANSWER_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str = r#"You are an interviewer grading a candidate's answer to one interview question.
Judge correctness, depth, and clarity for the stated role.

Respond ONLY with a JSON object of this shape:
{
  "score": <integer 0-100>,
  "feedback": "<one or two sentences>"
}"#;

#[derive(Debug, Deserialize)]
struct RawAnswerScore {
    score: f64,
    #[serde(default)]
    feedback: String,
}

/// Grade of one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerScore {
    /// 0-based position in the interview
    pub index: usize,
    pub question: String,
    pub score: u8,
    pub feedback: String,
}

/// Stored and returned result of an interview scoring job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewScore {
    pub interview_id: Uuid,
    pub role: String,
    /// Mean of the answer scores, one decimal
    pub overall_score: f32,
    pub answers: Vec<AnswerScore>,
    pub recommendation: Recommendation,
}

/// Mean of the answer scores rounded to one decimal; 0 for no answers
pub fn overall_score(scores: &[u8]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: u32 = scores.iter().map(|s| u32::from(*s)).sum();
    let mean = f64::from(sum) / scores.len() as f64;
    ((mean * 10.0).round() / 10.0) as f32
}

/// Build the chat prompt for one answer
pub fn build_messages(role: &str, answer: &InterviewAnswer) -> Vec<ChatMessage> {
    let prompt = format!(
        "Role: {}\n\nQuestion:\n{}\n\nCandidate answer:\n{}\n",
        role,
        truncate_chars(answer.question.trim(), MAX_PROMPT_ANSWER_CHARS),
        truncate_chars(answer.answer.trim(), MAX_PROMPT_ANSWER_CHARS)
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

/// Ask the model to grade one answer
pub async fn score_answer(
    llm: &LlmClient,
    role: &str,
    index: usize,
    answer: &InterviewAnswer,
) -> WorkerResult<AnswerScore> {
    let raw: RawAnswerScore = llm.chat_json(build_messages(role, answer)).await?;
    Ok(AnswerScore {
        index,
        question: answer.question.clone(),
        score: clamp_score(raw.score),
        feedback: raw.feedback.trim().to_string(),
    })
}

/// Combine answer grades into the interview result
pub fn summarize(interview_id: Uuid, role: &str, answers: Vec<AnswerScore>) -> InterviewScore {
    let scores: Vec<u8> = answers.iter().map(|a| a.score).collect();
    let overall = overall_score(&scores);

    InterviewScore {
        interview_id,
        role: role.to_string(),
        overall_score: overall,
        answers,
        recommendation: Recommendation::from_score(overall.round() as u8),
    }
}

/// Progress after `done` of `total` answers, spread over 10-90
fn answer_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    (10 + 80 * done.min(total) / total) as u8
}

async fn persist(
    state: &WorkerState,
    job_id: JobId,
    payload: &InterviewScoringPayload,
    score: &InterviewScore,
) -> WorkerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO interview_scores (id, job_id, user_id, interview_id, role, overall_score, result)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (job_id) DO UPDATE
        SET overall_score = EXCLUDED.overall_score,
            result = EXCLUDED.result
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job_id.0)
    .bind(payload.user_id)
    .bind(payload.interview_id)
    .bind(&payload.role)
    .bind(score.overall_score)
    .bind(serde_json::to_value(score)?)
    .execute(&state.db)
    .await?;

    Ok(())
}

async fn execute(
    state: &WorkerState,
    ctx: &JobContext<InterviewScoringPayload>,
) -> WorkerResult<InterviewScore> {
    let payload = &ctx.payload;
    if payload.answers.is_empty() {
        return Err(WorkerError::InvalidPayload(
            "interview has no answers".to_string(),
        ));
    }

    tracing::info!(
        job_id = %ctx.id,
        interview_id = %payload.interview_id,
        answers = payload.answers.len(),
        attempt = ctx.attempt,
        "Scoring interview"
    );

    ctx.report_progress(10).await;
    let total = payload.answers.len();
    let mut graded = Vec::with_capacity(total);
    for (index, answer) in payload.answers.iter().enumerate() {
        let grade = score_answer(&state.llm, &payload.role, index, answer).await?;
        tracing::debug!(job_id = %ctx.id, index, score = grade.score, "Answer graded");
        graded.push(grade);
        ctx.report_progress(answer_progress(index + 1, total)).await;
    }

    let score = summarize(payload.interview_id, &payload.role, graded);
    persist(state, ctx.id, payload, &score).await?;

    tracing::info!(
        job_id = %ctx.id,
        overall_score = score.overall_score,
        "Interview scoring finished"
    );
    Ok(score)
}

/// Queue handler for `interview-scoring`
pub struct InterviewScoringHandler {
    state: Arc<WorkerState>,
}

impl InterviewScoringHandler {
    pub fn new(state: Arc<WorkerState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl JobHandler for InterviewScoringHandler {
    type Payload = InterviewScoringPayload;

    async fn handle(
        &self,
        ctx: &JobContext<Self::Payload>,
    ) -> Result<serde_json::Value, JobError> {
        let score = execute(&self.state, ctx).await.map_err(|e| {
            e.log();
            JobError::from(e)
        })?;
        ctx.report_progress(100).await;

        serde_json::to_value(&score).map_err(|e| JobError::from(WorkerError::from(e)))
    }

    async fn on_completed(
        &self,
        job: &JobRecord,
        payload: &Self::Payload,
        result: &serde_json::Value,
    ) {
        announce_completion(&self.state, job, payload.user_id, result).await;
    }

    async fn on_final_failure(
        &self,
        job: &JobRecord,
        payload: Option<&Self::Payload>,
        reason: &str,
    ) {
        match payload {
            Some(payload) => {
                settle_failure(
                    &self.state,
                    job,
                    payload.user_id,
                    payload.credits_charged,
                    payload.reservation_id,
                    reason,
                )
                .await
            }
            None => super::settle_undecodable(&self.state, job, reason).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], 0.0)]
    #[case(&[80], 80.0)]
    #[case(&[80, 60], 70.0)]
    #[case(&[100, 90, 85], 91.7)]
    #[case(&[1, 2], 1.5)]
    fn test_overall_score(#[case] scores: &[u8], #[case] expected: f32) {
        assert_eq!(overall_score(scores), expected);
    }

    #[rstest]
    #[case(0, 4, 10)]
    #[case(1, 4, 30)]
    #[case(2, 4, 50)]
    #[case(4, 4, 90)]
    #[case(1, 3, 36)]
    fn test_answer_progress(#[case] done: usize, #[case] total: usize, #[case] expected: u8) {
        assert_eq!(answer_progress(done, total), expected);
    }

    #[test]
    fn test_summarize_derives_recommendation() {
        let answers = vec![
            AnswerScore {
                index: 0,
                question: "Q1".to_string(),
                score: 70,
                feedback: String::new(),
            },
            AnswerScore {
                index: 1,
                question: "Q2".to_string(),
                score: 60,
                feedback: String::new(),
            },
        ];
        let score = summarize(Uuid::nil(), "Backend engineer", answers);

        assert_eq!(score.overall_score, 65.0);
        assert_eq!(score.recommendation, Recommendation::Yes);
        assert_eq!(score.answers.len(), 2);
    }

    #[test]
    fn test_build_messages_contains_answer() {
        let answer = InterviewAnswer {
            question: " What is ownership? ".to_string(),
            answer: "Each value has one owner.".to_string(),
        };
        let messages = build_messages("Rust developer", &answer);

        assert!(messages[1].content.contains("Role: Rust developer"));
        assert!(messages[1].content.contains("Question:\nWhat is ownership?"));
        assert!(messages[1].content.contains("Each value has one owner."));
    }
}
