//! CV analysis job
//!
//! Loads the CV text, asks the LLM for a structured assessment against the
//! optional job description, and stores the result in `cv_analyses`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use talentflow_job_queue::{CvAnalysisPayload, JobContext, JobError, JobHandler, JobId, JobRecord};
use talentflow_llm_client::{ChatMessage, LlmClient};
use uuid::Uuid;

use super::{announce_completion, clamp_score, settle_failure, truncate_chars};
use crate::error::{WorkerError, WorkerResult};
use crate::WorkerState;

/// CV text beyond this is cut before prompting
const MAX_PROMPT_CV_CHARS: usize = 30_000;
const MAX_PROMPT_JD_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str = r#"You are an experienced technical recruiter screening CVs.
Assess the candidate's CV. When a job description is given, assess fit for that role; otherwise assess overall strength.

Respond ONLY with a JSON object of this shape:
{
  "score": <integer 0-100>,
  "summary": "<two or three sentences>",
  "skills": ["<skill>", ...],
  "experience_years": <number or null>,
  "strengths": ["<strength>", ...],
  "weaknesses": ["<weakness>", ...],
  "recommendation": "strong_yes" | "yes" | "maybe" | "no"
}"#;

/// Hiring recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongYes,
    Yes,
    Maybe,
    No,
}

impl Recommendation {
    /// Fallback when the model gives none or an unknown value
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=100 => Self::StrongYes,
            65..=79 => Self::Yes,
            45..=64 => Self::Maybe,
            _ => Self::No,
        }
    }

    /// Lenient parse of a model answer ("Strong Yes", "strong-yes", ...)
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "strong_yes" => Some(Self::StrongYes),
            "yes" => Some(Self::Yes),
            "maybe" => Some(Self::Maybe),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongYes => "strong_yes",
            Self::Yes => "yes",
            Self::Maybe => "maybe",
            Self::No => "no",
        }
    }
}

/// What the model answers; every field but the score is optional
#[derive(Debug, Deserialize)]
struct RawCvAnalysis {
    score: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    experience_years: Option<f64>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

/// Stored and returned result of a CV analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvAnalysis {
    pub candidate_name: String,
    pub score: u8,
    pub summary: String,
    pub skills: Vec<String>,
    pub experience_years: Option<f32>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: Recommendation,
}

impl CvAnalysis {
    fn from_raw(candidate_name: &str, raw: RawCvAnalysis) -> Self {
        let score = clamp_score(raw.score);
        let recommendation = raw
            .recommendation
            .as_deref()
            .and_then(Recommendation::parse)
            .unwrap_or_else(|| Recommendation::from_score(score));

        Self {
            candidate_name: candidate_name.to_string(),
            score,
            summary: raw.summary.trim().to_string(),
            skills: clean_list(raw.skills),
            experience_years: raw
                .experience_years
                .filter(|years| years.is_finite() && *years >= 0.0)
                .map(|years| years as f32),
            strengths: clean_list(raw.strengths),
            weaknesses: clean_list(raw.weaknesses),
            recommendation,
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Build the chat prompt for one CV
pub fn build_messages(
    candidate_name: &str,
    cv_text: &str,
    job_description: Option<&str>,
) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "Candidate: {}\n\nCV:\n{}\n",
        candidate_name,
        truncate_chars(cv_text, MAX_PROMPT_CV_CHARS)
    );
    match job_description.map(str::trim).filter(|jd| !jd.is_empty()) {
        Some(jd) => {
            prompt.push_str("\nJob description:\n");
            prompt.push_str(truncate_chars(jd, MAX_PROMPT_JD_CHARS));
            prompt.push('\n');
        }
        None => prompt.push_str("\nNo job description was provided.\n"),
    }

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

/// Ask the model for an assessment of one CV
pub async fn analyze(
    llm: &LlmClient,
    candidate_name: &str,
    cv_text: &str,
    job_description: Option<&str>,
) -> WorkerResult<CvAnalysis> {
    let messages = build_messages(candidate_name, cv_text, job_description);
    request_analysis(llm, candidate_name, messages).await
}

async fn request_analysis(
    llm: &LlmClient,
    candidate_name: &str,
    messages: Vec<ChatMessage>,
) -> WorkerResult<CvAnalysis> {
    let raw: RawCvAnalysis = llm.chat_json(messages).await?;
    Ok(CvAnalysis::from_raw(candidate_name, raw))
}

async fn persist(
    state: &WorkerState,
    job_id: JobId,
    payload: &CvAnalysisPayload,
    analysis: &CvAnalysis,
) -> WorkerResult<()> {
    // Upsert so a retry after a late failure does not duplicate the row
    sqlx::query(
        r#"
        INSERT INTO cv_analyses (id, job_id, user_id, candidate_name, score, recommendation, result)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (job_id) DO UPDATE
        SET score = EXCLUDED.score,
            recommendation = EXCLUDED.recommendation,
            result = EXCLUDED.result
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job_id.0)
    .bind(payload.user_id)
    .bind(&payload.candidate_name)
    .bind(i16::from(analysis.score))
    .bind(analysis.recommendation.as_str())
    .bind(serde_json::to_value(analysis)?)
    .execute(&state.db)
    .await?;

    Ok(())
}

async fn execute(
    state: &WorkerState,
    ctx: &JobContext<CvAnalysisPayload>,
) -> WorkerResult<CvAnalysis> {
    let payload = &ctx.payload;
    tracing::info!(
        job_id = %ctx.id,
        user_id = %payload.user_id,
        attempt = ctx.attempt,
        "Analyzing CV"
    );

    ctx.report_progress(10).await;
    let cv_text = state.documents.load(&payload.document).await?;

    ctx.report_progress(30).await;
    let messages = build_messages(
        &payload.candidate_name,
        &cv_text,
        payload.job_description.as_deref(),
    );

    ctx.report_progress(40).await;
    let analysis = request_analysis(&state.llm, &payload.candidate_name, messages).await?;
    ctx.report_progress(80).await;

    persist(state, ctx.id, payload, &analysis).await?;
    ctx.report_progress(90).await;

    tracing::info!(
        job_id = %ctx.id,
        score = analysis.score,
        recommendation = analysis.recommendation.as_str(),
        "CV analysis finished"
    );
    Ok(analysis)
}

/// Queue handler for `cv-analysis`
pub struct CvAnalysisHandler {
    state: Arc<WorkerState>,
}

impl CvAnalysisHandler {
    pub fn new(state: Arc<WorkerState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl JobHandler for CvAnalysisHandler {
    type Payload = CvAnalysisPayload;

    async fn handle(
        &self,
        ctx: &JobContext<Self::Payload>,
    ) -> Result<serde_json::Value, JobError> {
        let analysis = execute(&self.state, ctx).await.map_err(|e| {
            e.log();
            JobError::from(e)
        })?;
        ctx.report_progress(100).await;

        serde_json::to_value(&analysis).map_err(|e| JobError::from(WorkerError::from(e)))
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

    fn raw(score: f64, recommendation: Option<&str>) -> RawCvAnalysis {
        RawCvAnalysis {
            score,
            summary: "  Solid backend engineer. ".to_string(),
            skills: vec!["Rust".to_string(), " ".to_string(), " SQL ".to_string()],
            experience_years: Some(6.5),
            strengths: vec![],
            weaknesses: vec![],
            recommendation: recommendation.map(str::to_string),
        }
    }

    #[rstest]
    #[case("strong_yes", Some(Recommendation::StrongYes))]
    #[case("Strong Yes", Some(Recommendation::StrongYes))]
    #[case("strong-yes", Some(Recommendation::StrongYes))]
    #[case(" MAYBE ", Some(Recommendation::Maybe))]
    #[case("hire", None)]
    fn test_recommendation_parse(#[case] input: &str, #[case] expected: Option<Recommendation>) {
        assert_eq!(Recommendation::parse(input), expected);
    }

    #[rstest]
    #[case(95, Recommendation::StrongYes)]
    #[case(80, Recommendation::StrongYes)]
    #[case(70, Recommendation::Yes)]
    #[case(50, Recommendation::Maybe)]
    #[case(10, Recommendation::No)]
    fn test_recommendation_from_score(#[case] score: u8, #[case] expected: Recommendation) {
        assert_eq!(Recommendation::from_score(score), expected);
    }

    #[test]
    fn test_from_raw_normalizes_model_output() {
        let analysis = CvAnalysis::from_raw("Ada", raw(123.0, None));

        assert_eq!(analysis.score, 100);
        assert_eq!(analysis.recommendation, Recommendation::StrongYes);
        assert_eq!(analysis.summary, "Solid backend engineer.");
        assert_eq!(analysis.skills, vec!["Rust", "SQL"]);
        assert_eq!(analysis.experience_years, Some(6.5));
    }

    #[test]
    fn test_from_raw_keeps_model_recommendation() {
        let analysis = CvAnalysis::from_raw("Ada", raw(90.0, Some("maybe")));
        assert_eq!(analysis.recommendation, Recommendation::Maybe);
    }

    #[test]
    fn test_negative_experience_is_dropped() {
        let mut input = raw(50.0, None);
        input.experience_years = Some(-2.0);
        assert_eq!(CvAnalysis::from_raw("Ada", input).experience_years, None);
    }

    #[test]
    fn test_build_messages_with_job_description() {
        let messages = build_messages("Ada", "CV body", Some("Rust developer"));

        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Candidate: Ada"));
        assert!(messages[1].content.contains("Job description:\nRust developer"));
    }

    #[test]
    fn test_build_messages_without_job_description() {
        let messages = build_messages("Ada", "CV body", Some("   "));
        assert!(messages[1]
            .content
            .contains("No job description was provided."));
    }

    #[test]
    fn test_build_messages_truncates_long_cv() {
        let cv = "a".repeat(MAX_PROMPT_CV_CHARS + 500);
        let messages = build_messages("Ada", &cv, None);
        assert!(messages[1].content.len() < MAX_PROMPT_CV_CHARS + 200);
    }
}
