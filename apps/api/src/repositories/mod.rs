//! Database repository layer for TalentFlow
//!
//! Job results (`cv_analyses`, `interview_scores`) are written by the
//! worker; the API owns the credit ledger.

pub mod credits;

pub use credits::CreditRepository;
