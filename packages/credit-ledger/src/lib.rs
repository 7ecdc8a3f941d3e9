//! Credit ledger statements shared by the API and the worker
//!
//! Both processes give credits back for the same reservations (the API when
//! an enqueue fails, the worker when a job fails for good), so the refund
//! statement lives here once.

use sqlx::PgPool;
use uuid::Uuid;

/// `credit_transactions.kind` of refund rows
pub const REFUND_KIND: &str = "refund";

/// Give back `amount` credits reserved under `reservation_id`
///
/// The ledger row and the balance update are one statement. The unique
/// `(kind, reference)` index makes a second refund for the same reservation a
/// no-op. Returns whether credits were actually returned.
#[tracing::instrument(skip(pool, description))]
pub async fn refund(
    pool: &PgPool,
    user_id: Uuid,
    amount: i64,
    reservation_id: Uuid,
    description: &str,
) -> Result<bool, sqlx::Error> {
    if amount <= 0 {
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        WITH refund AS (
            INSERT INTO credit_transactions (id, user_id, amount, kind, reference, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kind, reference) WHERE reference IS NOT NULL DO NOTHING
            RETURNING user_id, amount
        )
        UPDATE users
        SET credits = users.credits + refund.amount, updated_at = NOW()
        FROM refund
        WHERE users.id = refund.user_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(amount)
    .bind(REFUND_KIND)
    .bind(reservation_id.to_string())
    .bind(description)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_amount_skips_database() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();

        let refunded = refund(&pool, Uuid::new_v4(), 0, Uuid::new_v4(), "nothing reserved")
            .await
            .unwrap();
        assert!(!refunded);
    }
}
