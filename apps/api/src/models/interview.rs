//! Interview question generation

use serde::{Deserialize, Serialize};

use super::{char_len, require_text};
use crate::error::{ApiError, ApiResult};
use crate::models::jobs::{MAX_JOB_DESCRIPTION_CHARS, MAX_ROLE_CHARS};

pub const MAX_QUESTION_COUNT: u32 = 20;
pub const MAX_SKILLS: usize = 20;
const MAX_SKILL_CHARS: usize = 100;

fn default_count() -> u32 {
    5
}

/// `POST /api/interview-questions`
#[derive(Debug, Clone, Deserialize)]
pub struct InterviewQuestionsRequest {
    pub role: String,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    /// Skills the questions should assess
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_count")]
    pub count: u32,
}

impl InterviewQuestionsRequest {
    pub fn validate(&self) -> ApiResult<()> {
        require_text("role", &self.role, MAX_ROLE_CHARS)?;

        if !(1..=MAX_QUESTION_COUNT).contains(&self.count) {
            return Err(ApiError::validation(format!(
                "count must be between 1 and {}",
                MAX_QUESTION_COUNT
            )));
        }
        if let Some(seniority) = &self.seniority {
            require_text("seniority", seniority, MAX_SKILL_CHARS)?;
        }
        if let Some(description) = &self.job_description {
            if char_len(description) > MAX_JOB_DESCRIPTION_CHARS {
                return Err(ApiError::validation(format!(
                    "job_description must be at most {} characters",
                    MAX_JOB_DESCRIPTION_CHARS
                )));
            }
        }
        if self.skills.len() > MAX_SKILLS {
            return Err(ApiError::validation(format!(
                "at most {} skills are allowed",
                MAX_SKILLS
            )));
        }
        for skill in &self.skills {
            require_text("skills", skill, MAX_SKILL_CHARS)?;
        }

        Ok(())
    }
}

/// One generated question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewQuestionsResponse {
    pub questions: Vec<GeneratedQuestion>,
    pub credits_charged: i64,
    pub balance: i64,
}
