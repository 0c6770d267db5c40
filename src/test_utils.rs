//! Fixtures shared by the database-backed tests.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::user::User,
    services::{user_service, wallet_service},
};

/// Register a Nigerian customer and mark them active and KYC-approved.
pub async fn customer(pool: &PgPool, email: &str) -> User {
    let (user, _, _) = user_service::register(pool, email, "Test Customer", "NG", "NGN")
        .await
        .expect("Failed to register test customer");

    sqlx::query_as::<_, User>(
        "UPDATE users SET status = 'active', kyc_status = 'approved' WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .fetch_one(pool)
    .await
    .expect("Failed to activate test customer")
}

/// Customer with `amount_cents` already deposited.
pub async fn funded_customer(pool: &PgPool, email: &str, amount_cents: i64) -> User {
    let user = customer(pool, email).await;
    wallet_service::deposit(pool, user.id, amount_cents, None)
        .await
        .expect("Failed to fund test customer");
    user
}

pub async fn balance(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read balance")
}

/// Ledger rows whose reference starts with `prefix`.
pub async fn ledger_entries(pool: &PgPool, user_id: Uuid, prefix: &str) -> i64 {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM transactions t
        JOIN wallets w ON w.id = t.wallet_id
        WHERE w.user_id = $1 AND t.reference LIKE $2 || '%'
        "#,
    )
    .bind(user_id)
    .bind(prefix)
    .fetch_one(pool)
    .await
    .expect("Failed to count ledger entries")
}
