//! Async job submissions

use serde::{Deserialize, Serialize};
use talentflow_job_queue::{CvDocument, InterviewAnswer, JobId, JobKind};
use url::Url;
use uuid::Uuid;

use super::{char_len, require_text};
use crate::error::{ApiError, ApiResult};

pub const MAX_CANDIDATE_NAME_CHARS: usize = 200;
pub const MIN_CV_TEXT_CHARS: usize = 50;
pub const MAX_CV_TEXT_CHARS: usize = 100_000;
pub const MAX_JOB_DESCRIPTION_CHARS: usize = 20_000;
pub const MAX_ROLE_CHARS: usize = 200;
pub const MAX_ANSWERS: usize = 50;
pub const MAX_ANSWER_CHARS: usize = 10_000;

/// `POST /api/cv-analysis`
///
/// Exactly one of `cv_text` and `cv_url` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct CvAnalysisRequest {
    pub candidate_name: String,
    #[serde(default)]
    pub cv_text: Option<String>,
    #[serde(default)]
    pub cv_url: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
}

impl CvAnalysisRequest {
    /// Validate the request and resolve where the CV comes from
    pub fn validate(&self) -> ApiResult<CvDocument> {
        require_text("candidate_name", &self.candidate_name, MAX_CANDIDATE_NAME_CHARS)?;

        if let Some(description) = &self.job_description {
            if char_len(description) > MAX_JOB_DESCRIPTION_CHARS {
                return Err(ApiError::validation(format!(
                    "job_description must be at most {} characters",
                    MAX_JOB_DESCRIPTION_CHARS
                )));
            }
        }

        match (&self.cv_text, &self.cv_url) {
            (Some(text), None) => {
                let len = char_len(text.trim());
                if !(MIN_CV_TEXT_CHARS..=MAX_CV_TEXT_CHARS).contains(&len) {
                    return Err(ApiError::validation(format!(
                        "cv_text must be between {} and {} characters",
                        MIN_CV_TEXT_CHARS, MAX_CV_TEXT_CHARS
                    )));
                }
                Ok(CvDocument::Text {
                    text: text.trim().to_string(),
                })
            }
            (None, Some(url)) => {
                let parsed = Url::parse(url.trim())
                    .map_err(|e| ApiError::validation(format!("cv_url is not a valid URL: {}", e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ApiError::validation("cv_url must be an http(s) URL"));
                }
                Ok(CvDocument::Url {
                    url: parsed.to_string(),
                })
            }
            (Some(_), Some(_)) => Err(ApiError::validation(
                "provide either cv_text or cv_url, not both",
            )),
            (None, None) => Err(ApiError::validation("cv_text or cv_url is required")),
        }
    }

    /// Job description with surrounding whitespace removed, if not blank
    pub fn job_description(&self) -> Option<String> {
        self.job_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }
}

/// `POST /api/interview-scoring`
#[derive(Debug, Clone, Deserialize)]
pub struct InterviewScoringRequest {
    /// Client-side interview id; generated when absent
    #[serde(default)]
    pub interview_id: Option<Uuid>,
    pub role: String,
    pub answers: Vec<InterviewAnswer>,
}

impl InterviewScoringRequest {
    pub fn validate(&self) -> ApiResult<()> {
        require_text("role", &self.role, MAX_ROLE_CHARS)?;

        if self.answers.is_empty() || self.answers.len() > MAX_ANSWERS {
            return Err(ApiError::validation(format!(
                "answers must contain between 1 and {} entries",
                MAX_ANSWERS
            )));
        }

        for (index, answer) in self.answers.iter().enumerate() {
            require_text(
                &format!("answers[{}].question", index),
                &answer.question,
                MAX_ANSWER_CHARS,
            )?;
            require_text(
                &format!("answers[{}].answer", index),
                &answer.answer,
                MAX_ANSWER_CHARS,
            )?;
        }

        Ok(())
    }
}

/// 202 body for an accepted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub queue: String,
    pub status_url: String,
    pub credits_charged: i64,
}

impl JobAccepted {
    pub fn new(kind: JobKind, job_id: JobId, credits_charged: i64) -> Self {
        Self {
            job_id,
            queue: kind.queue_name().to_string(),
            status_url: format!("/api/jobs/{}/{}", kind.queue_name(), job_id),
            credits_charged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn cv_request(text: Option<&str>, url: Option<&str>) -> CvAnalysisRequest {
        CvAnalysisRequest {
            candidate_name: "Ada Lovelace".to_string(),
            cv_text: text.map(str::to_string),
            cv_url: url.map(str::to_string),
            job_description: None,
        }
    }

    fn answer(question: &str, answer: &str) -> InterviewAnswer {
        InterviewAnswer {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn test_inline_cv_text_is_trimmed() {
        let text = format!("  {}  ", "x".repeat(60));
        let document = cv_request(Some(&text), None).validate().unwrap();
        assert_eq!(document, CvDocument::Text { text: "x".repeat(60) });
    }

    #[rstest]
    #[case(Some("too short"), None)]
    #[case(None, Some("ftp://example.com/cv.txt"))]
    #[case(None, Some("not a url"))]
    #[case(Some("plenty of characters in this CV text to pass the minimum length"), Some("https://example.com/cv.txt"))]
    #[case(None, None)]
    fn test_invalid_cv_sources(#[case] text: Option<&str>, #[case] url: Option<&str>) {
        assert_matches!(
            cv_request(text, url).validate(),
            Err(ApiError::ValidationError(_))
        );
    }

    #[test]
    fn test_cv_url_is_accepted() {
        let document = cv_request(None, Some("https://files.example.com/cv.txt"))
            .validate()
            .unwrap();
        assert_matches!(document, CvDocument::Url { url } if url == "https://files.example.com/cv.txt");
    }

    #[test]
    fn test_candidate_name_limits() {
        let mut request = cv_request(Some(&"x".repeat(60)), None);
        request.candidate_name = "   ".to_string();
        assert_matches!(request.validate(), Err(ApiError::ValidationError(msg)) if msg.contains("candidate_name"));

        request.candidate_name = "n".repeat(MAX_CANDIDATE_NAME_CHARS + 1);
        assert_matches!(request.validate(), Err(ApiError::ValidationError(_)));
    }

    #[test]
    fn test_job_description_limit() {
        let mut request = cv_request(Some(&"x".repeat(60)), None);
        request.job_description = Some("d".repeat(MAX_JOB_DESCRIPTION_CHARS + 1));
        assert_matches!(request.validate(), Err(ApiError::ValidationError(msg)) if msg.contains("job_description"));

        request.job_description = Some("   ".to_string());
        assert!(request.validate().is_ok());
        assert_eq!(request.job_description(), None);
    }

    #[test]
    fn test_interview_scoring_validation() {
        let valid = InterviewScoringRequest {
            interview_id: None,
            role: "Backend engineer".to_string(),
            answers: vec![answer("What is a mutex?", "A lock.")],
        };
        assert!(valid.validate().is_ok());

        let empty = InterviewScoringRequest {
            answers: vec![],
            ..valid.clone()
        };
        assert_matches!(empty.validate(), Err(ApiError::ValidationError(_)));

        let too_many = InterviewScoringRequest {
            answers: vec![answer("Q", "A"); MAX_ANSWERS + 1],
            ..valid.clone()
        };
        assert_matches!(too_many.validate(), Err(ApiError::ValidationError(_)));

        let blank_answer = InterviewScoringRequest {
            answers: vec![answer("Q", "A"), answer("Q2", "  ")],
            ..valid
        };
        assert_matches!(
            blank_answer.validate(),
            Err(ApiError::ValidationError(msg)) if msg.contains("answers[1].answer")
        );
    }

    #[test]
    fn test_job_accepted_status_url() {
        let id = JobId::new();
        let accepted = JobAccepted::new(JobKind::InterviewScoring, id, 2);
        assert_eq!(accepted.status_url, format!("/api/jobs/interview-scoring/{}", id));
        assert_eq!(accepted.queue, "interview-scoring");
    }
}
