//! Postgres for the ledger suites
//!
//! Set `DATABASE_URL` to run them; without it those tests return early.
//! Every test works on fresh user ids, so a shared database is fine.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connected and migrated pool, or `None` when `DATABASE_URL` is unset
pub async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("DATABASE_URL must point at a reachable Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    Some(pool)
}

/// Insert a user holding `credits`
pub async fn seed_user(pool: &PgPool, credits: i64) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, credits) VALUES ($1, $2)")
        .bind(user_id)
        .bind(credits)
        .execute(pool)
        .await
        .expect("seed user");
    user_id
}

/// Ledger rows of one kind for a user
pub async fn ledger_rows(pool: &PgPool, user_id: Uuid, kind: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1 AND kind = $2")
        .bind(user_id)
        .bind(kind)
        .fetch_one(pool)
        .await
        .expect("count ledger rows")
}
