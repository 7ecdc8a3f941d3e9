//! Request, response and row types for the TalentFlow API
//!
//! - `user`: JWT claims issued by the auth platform
//! - `jobs`: async job submissions (CV analysis, interview scoring)
//! - `interview`: synchronous interview question generation
//! - `credits`: balances, ledger rows and purchasable packages

pub mod credits;
pub mod interview;
pub mod jobs;
pub mod user;

pub use credits::{CreditBalance, CreditPackage, CreditTransaction, TransactionKind};
pub use interview::{GeneratedQuestion, InterviewQuestionsRequest, InterviewQuestionsResponse};
pub use jobs::{CvAnalysisRequest, InterviewScoringRequest, JobAccepted};
pub use user::{Claims, UserRole};

/// Character count, not byte length
pub(crate) fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Reject blank values and values over `max` characters
pub(crate) fn require_text(field: &str, value: &str, max: usize) -> crate::ApiResult<()> {
    let len = char_len(value.trim());
    if len == 0 {
        return Err(crate::ApiError::validation(format!("{} is required", field)));
    }
    if char_len(value) > max {
        return Err(crate::ApiError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}
