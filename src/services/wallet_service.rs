//! Wallet service - balance reads, deposits, withdrawals and admin corrections.
//!
//! # Atomicity Guarantees
//!
//! Every mutation locks the wallet row with `FOR UPDATE` inside one
//! PostgreSQL transaction, so balance checks and writes cannot interleave.

use serde_json::json;
use uuid::Uuid;

use crate::{
    crypto,
    db::DbPool,
    error::AppError,
    models::{
        PageParams,
        transaction::{NewEntry, Transaction, TransactionKind, TransactionResponse},
        wallet::{LedgerReceipt, Wallet},
    },
    services::{
        ledger,
        limits::{self, OperationKind},
        notification_service,
    },
};

pub async fn get_wallet(pool: &DbPool, user_id: Uuid) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("wallet"))
}

/// Credit the caller's wallet.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `NotFound`: the user has no wallet
pub async fn deposit(
    pool: &DbPool,
    user_id: Uuid,
    amount_cents: i64,
    description: Option<String>,
) -> Result<LedgerReceipt, AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }

    let reference = crypto::new_reference("DEP");
    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    let mut entry = NewEntry::credit(TransactionKind::Deposit, amount_cents, &reference);
    if let Some(description) = description {
        entry = entry.with_description(description);
    }
    let credit = ledger::apply_entry(&mut tx, &mut wallet, entry).await?;

    tx.commit().await?;

    tracing::info!(%user_id, amount_cents, %reference, "wallet deposit");

    Ok(LedgerReceipt {
        reference,
        amount_cents,
        fee_cents: 0,
        balance_after_cents: wallet.balance_cents,
        entries: vec![credit.into()],
    })
}

/// Debit `amount_cents` plus the withdrawal fee.
///
/// The caller must already have passed `ensure_can_transact`.
///
/// # Errors
///
/// - `LimitExceeded`: single, daily or monthly withdrawal limit
/// - `InsufficientBalance`: balance below amount + fee
pub async fn withdraw(
    pool: &DbPool,
    user_id: Uuid,
    amount_cents: i64,
    description: Option<String>,
) -> Result<LedgerReceipt, AppError> {
    let fee_cents = limits::calculate_fee(OperationKind::Withdrawal, amount_cents);
    let reference = crypto::new_reference("WDR");

    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    limits::enforce_limits(&mut tx, user_id, OperationKind::Withdrawal, amount_cents).await?;
    ledger::ensure_sufficient(wallet.balance_cents, amount_cents, fee_cents)?;

    let mut entry = NewEntry::debit(TransactionKind::Withdrawal, amount_cents, &reference);
    if let Some(description) = description {
        entry = entry.with_description(description);
    }
    let mut entries: Vec<TransactionResponse> =
        vec![ledger::apply_entry(&mut tx, &mut wallet, entry).await?.into()];

    if fee_cents > 0 {
        let fee = NewEntry::debit(TransactionKind::Fee, fee_cents, format!("{reference}-FEE"))
            .with_description("Withdrawal fee");
        entries.push(ledger::apply_entry(&mut tx, &mut wallet, fee).await?.into());
    }

    tx.commit().await?;

    tracing::info!(%user_id, amount_cents, fee_cents, %reference, "wallet withdrawal");

    Ok(LedgerReceipt {
        reference,
        amount_cents,
        fee_cents,
        balance_after_cents: wallet.balance_cents,
        entries,
    })
}

/// Paginated history, newest first.
pub async fn list_transactions(
    pool: &DbPool,
    user_id: Uuid,
    kind: Option<TransactionKind>,
    page: PageParams,
) -> Result<Vec<Transaction>, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        r#"
        SELECT t.*
        FROM transactions t
        JOIN wallets w ON w.id = t.wallet_id
        WHERE w.user_id = $1
          AND ($2::transaction_kind IS NULL OR t.kind = $2)
        ORDER BY t.created_at DESC, t.id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(transactions)
}

/// Admin correction: positive `delta_cents` credits, negative debits.
///
/// # Errors
///
/// - `InvalidRequest`: delta is zero
/// - `InsufficientBalance`: a debit would take the balance below zero
pub async fn adjust_balance(
    pool: &DbPool,
    admin_id: Uuid,
    user_id: Uuid,
    delta_cents: i64,
    reason: &str,
) -> Result<Transaction, AppError> {
    let amount_cents = delta_cents
        .checked_abs()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| AppError::InvalidRequest("Adjustment must be non-zero".to_string()))?;

    let reference = crypto::new_reference("ADJ");
    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    let entry = if delta_cents > 0 {
        NewEntry::credit(TransactionKind::Adjustment, amount_cents, &reference)
    } else {
        NewEntry::debit(TransactionKind::Adjustment, amount_cents, &reference)
    }
    .with_description(reason)
    .with_metadata(json!({ "admin_id": admin_id, "reason": reason }));

    let transaction = ledger::apply_entry(&mut tx, &mut wallet, entry).await?;
    tx.commit().await?;

    tracing::warn!(%admin_id, %user_id, delta_cents, %reference, "wallet balance adjusted");

    notification_service::notify(
        pool,
        user_id,
        "Balance adjusted",
        &format!(
            "Your balance was adjusted by {delta_cents}. New balance: {}.",
            wallet.balance_cents
        ),
    )
    .await;

    Ok(transaction)
}

/// Admin reset of a wallet to zero. Returns `None` when already empty.
pub async fn clear_balance(
    pool: &DbPool,
    admin_id: Uuid,
    user_id: Uuid,
    reason: &str,
) -> Result<Option<Transaction>, AppError> {
    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    if wallet.balance_cents == 0 {
        return Ok(None);
    }

    let reference = crypto::new_reference("ADJ");
    let entry = NewEntry::debit(TransactionKind::Adjustment, wallet.balance_cents, &reference)
        .with_description(reason)
        .with_metadata(json!({ "admin_id": admin_id, "reason": reason, "cleared": true }));
    let transaction = ledger::apply_entry(&mut tx, &mut wallet, entry).await?;

    tx.commit().await?;

    tracing::warn!(%admin_id, %user_id, cleared_cents = transaction.amount_cents, "wallet balance cleared");

    notification_service::notify(pool, user_id, "Balance cleared", reason).await;

    Ok(Some(transaction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use sqlx::PgPool;

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn concurrent_withdrawals_never_overdraw(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "race@example.com", 10_000).await;

        // 3_000 plus the 100 minimum fee each; only three fit.
        let user_id = user.id;
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let pool = pool.clone();
            set.spawn(async move { withdraw(&pool, user_id, 3_000, None).await });
        }
        let results = set.join_all().await;

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 3);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, AppError::InsufficientBalance))
        );
        assert_eq!(test_utils::balance(&pool, user.id).await, 700);

        let lowest: i64 = sqlx::query_scalar(
            r#"
            SELECT MIN(t.balance_after_cents)
            FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            WHERE w.user_id = $1
            "#,
        )
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(lowest >= 0);
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn deposit_rejects_non_positive_amounts(pool: PgPool) {
        let user = test_utils::customer(&pool, "zero@example.com").await;
        assert!(matches!(
            deposit(&pool, user.id, 0, None).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert_eq!(test_utils::balance(&pool, user.id).await, 0);
    }
}
