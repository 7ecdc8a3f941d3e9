//! Credit refunds for jobs that failed for good

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WorkerResult;

/// Give back the credits reserved for a job
///
/// A second refund for the same reservation is a no-op. Returns whether
/// credits were actually returned.
#[tracing::instrument(skip(pool, reason))]
pub async fn refund_credits(
    pool: &PgPool,
    user_id: Uuid,
    amount: i64,
    reservation_id: Uuid,
    reason: &str,
) -> WorkerResult<bool> {
    let refunded = talentflow_credit_ledger::refund(
        pool,
        user_id,
        amount,
        reservation_id,
        &refund_description(reason),
    )
    .await?;
    if refunded {
        tracing::info!(%user_id, amount, %reservation_id, "Refunded credits for failed job");
    } else {
        tracing::debug!(%user_id, %reservation_id, "Reservation already refunded");
    }

    Ok(refunded)
}

/// Ledger description, capped so provider error dumps stay readable
fn refund_description(reason: &str) -> String {
    const MAX_REASON_CHARS: usize = 200;
    let reason: String = reason.chars().take(MAX_REASON_CHARS).collect();
    format!("Refund for failed job: {}", reason)
}
