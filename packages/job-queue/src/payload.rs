//! Job payloads shared by the API (producer) and the worker (consumer)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The queues TalentFlow runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    CvAnalysis,
    InterviewScoring,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::CvAnalysis, JobKind::InterviewScoring];

    /// Queue name, also used in Redis keys and URLs
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::CvAnalysis => "cv-analysis",
            Self::InterviewScoring => "interview-scoring",
        }
    }

    /// Job name recorded on every job of this kind
    pub fn job_name(&self) -> &'static str {
        match self {
            Self::CvAnalysis => "analyze-cv",
            Self::InterviewScoring => "score-interview",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.queue_name() == s)
            .ok_or_else(|| format!("unknown queue '{}'", s))
    }
}

/// Where the CV text comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CvDocument {
    /// Text extracted client-side
    Text { text: String },
    /// Plain-text document to download
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvAnalysisPayload {
    pub user_id: Uuid,
    pub candidate_name: String,
    pub document: CvDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    /// Credits taken at submission, refunded if the job fails for good
    pub credits_charged: i64,
    pub reservation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewScoringPayload {
    pub user_id: Uuid,
    pub interview_id: Uuid,
    /// Role the candidate interviewed for
    pub role: String,
    pub answers: Vec<InterviewAnswer>,
    pub credits_charged: i64,
    pub reservation_id: Uuid,
}

/// Owner of a job, read from the `user_id` field every payload carries
pub fn payload_owner(payload: &serde_json::Value) -> Option<Uuid> {
    payload
        .get("user_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

/// Credits charged and reservation id recorded on a payload
pub fn payload_reservation(payload: &serde_json::Value) -> Option<(i64, Uuid)> {
    let credits = payload.get("credits_charged")?.as_i64()?;
    let reservation_id = payload.get("reservation_id")?.as_str()?.parse().ok()?;
    Some((credits, reservation_id))
}

/// Copy of `payload` pointing at a new credit reservation
pub fn with_reservation(payload: &serde_json::Value, reservation_id: Uuid) -> serde_json::Value {
    let mut payload = payload.clone();
    if let Some(fields) = payload.as_object_mut() {
        fields.insert(
            "reservation_id".to_string(),
            serde_json::Value::String(reservation_id.to_string()),
        );
    }
    payload
}
