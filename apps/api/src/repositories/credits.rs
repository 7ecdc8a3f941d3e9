//! Credit balances and the credit ledger
//!
//! Every balance change writes a `credit_transactions` row in the same
//! statement or transaction as the `users.credits` update. References make
//! purchases (checkout session id) and refunds (reservation id) idempotent.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreditTransaction, TransactionKind};
use crate::services::payments::CheckoutCompletion;

/// Repository for credit operations
#[derive(Clone, Debug)]
pub struct CreditRepository {
    pool: PgPool,
}

impl CreditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current balance; users the ledger has never seen have none
    #[tracing::instrument(skip(self))]
    pub async fn balance(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let balance = sqlx::query_scalar::<_, i64>("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(balance.unwrap_or(0))
    }

    /// Newest ledger rows first
    #[tracing::instrument(skip(self))]
    pub async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT id, amount, kind, reference, description, created_at
            FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Take `amount` credits if the balance covers them
    ///
    /// The conditional decrement and the usage row are one statement, so
    /// concurrent requests can never overdraw. Returns the new balance, or
    /// `None` when the balance was too low.
    #[tracing::instrument(skip(self, description))]
    pub async fn spend(
        &self,
        user_id: Uuid,
        amount: i64,
        reference: Uuid,
        description: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            WITH debited AS (
                UPDATE users
                SET credits = credits - $2, updated_at = NOW()
                WHERE id = $1 AND credits >= $2
                RETURNING id, credits
            ),
            ledger AS (
                INSERT INTO credit_transactions (id, user_id, amount, kind, reference, description)
                SELECT $3, debited.id, -($2::BIGINT), $4, $5, $6
                FROM debited
            )
            SELECT credits FROM debited
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(Uuid::new_v4())
        .bind(TransactionKind::Usage.as_str())
        .bind(reference.to_string())
        .bind(description)
        .fetch_optional(&self.pool)
        .await
    }

    /// Give back credits taken by [`spend`](Self::spend)
    ///
    /// At most once per reference. Returns whether credits were returned.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        user_id: Uuid,
        amount: i64,
        reference: Uuid,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        talentflow_credit_ledger::refund(&self.pool, user_id, amount, reference, reason).await
    }

    /// Credit a paid checkout session
    ///
    /// Records the webhook event and the purchase in one transaction.
    /// Returns the new balance, or `None` when the event or the session was
    /// already processed.
    #[tracing::instrument(skip(self, completion), fields(user_id = %completion.user_id, credits = completion.credits))]
    pub async fn apply_checkout(
        &self,
        event_id: &str,
        event_type: &str,
        completion: &CheckoutCompletion,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO stripe_events (id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tracing::info!(event_id, "Stripe event already processed");
            return Ok(None);
        }

        // The buyer may not have used a paid feature yet
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(completion.user_id)
            .execute(&mut *tx)
            .await?;

        let description = match &completion.package {
            Some(package) => format!("Purchase of package '{}'", package),
            None => "Credit purchase".to_string(),
        };
        let purchase = sqlx::query(
            r#"
            INSERT INTO credit_transactions (id, user_id, amount, kind, reference, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kind, reference) WHERE reference IS NOT NULL DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(completion.user_id)
        .bind(completion.credits)
        .bind(TransactionKind::Purchase.as_str())
        .bind(&completion.session_id)
        .bind(description)
        .execute(&mut *tx)
        .await?;

        if purchase.rows_affected() == 0 {
            // Same session delivered under a different event id
            tx.commit().await?;
            tracing::info!(session_id = %completion.session_id, "Checkout session already credited");
            return Ok(None);
        }

        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users
            SET credits = credits + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING credits
            "#,
        )
        .bind(completion.user_id)
        .bind(completion.credits)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(balance))
    }
}
