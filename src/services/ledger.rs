//! Ledger primitives shared by every money-moving service.
//!
//! All functions take an open connection (normally an open `sqlx::Transaction`) so callers can
//! compose several entries into one atomic unit:
//!
//! 1. Lock the wallet row(s) with `SELECT ... FOR UPDATE`
//! 2. Validate the business rule
//! 3. Apply one or more entries
//! 4. Commit (or drop the transaction to roll back)

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        transaction::{EntryDirection, NewEntry, Transaction},
        wallet::Wallet,
    },
};

/// Balance after applying `amount_cents` in `direction`.
///
/// # Errors
///
/// - `InsufficientBalance` if a debit would go below zero
/// - `InvalidRequest` for non-positive amounts or overflow
pub fn next_balance(
    balance_cents: i64,
    direction: EntryDirection,
    amount_cents: i64,
) -> Result<i64, AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }

    match direction {
        EntryDirection::Credit => balance_cents
            .checked_add(amount_cents)
            .ok_or_else(|| AppError::InvalidRequest("Amount is too large".to_string())),
        EntryDirection::Debit => {
            let next = balance_cents - amount_cents;
            if next < 0 {
                Err(AppError::InsufficientBalance)
            } else {
                Ok(next)
            }
        }
    }
}

/// Reject when `balance` cannot cover `amount + fee`.
pub fn ensure_sufficient(balance_cents: i64, amount_cents: i64, fee_cents: i64) -> Result<(), AppError> {
    let required = amount_cents
        .checked_add(fee_cents)
        .ok_or_else(|| AppError::InvalidRequest("Amount is too large".to_string()))?;

    if balance_cents < required {
        return Err(AppError::InsufficientBalance);
    }
    Ok(())
}

/// Lock and return the wallet owned by `user_id`.
pub async fn lock_wallet_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("wallet"))
}

/// Lock two wallets in ascending id order so concurrent transfers in
/// opposite directions cannot deadlock. Returns them as `(first, second)`
/// matching the argument order.
pub async fn lock_wallet_pair(
    conn: &mut PgConnection,
    first_id: Uuid,
    second_id: Uuid,
) -> Result<(Wallet, Wallet), AppError> {
    let mut wallets = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(vec![first_id, second_id])
    .fetch_all(&mut *conn)
    .await?;

    let second_pos = wallets
        .iter()
        .position(|w| w.id == second_id)
        .ok_or(AppError::NotFound("wallet"))?;
    let second = wallets.swap_remove(second_pos);
    let first = wallets
        .into_iter()
        .find(|w| w.id == first_id)
        .ok_or(AppError::NotFound("wallet"))?;

    Ok((first, second))
}

/// Apply one entry to a locked wallet: update the balance and record the
/// transaction row. `wallet.balance_cents` is updated in place.
pub async fn apply_entry(
    conn: &mut PgConnection,
    wallet: &mut Wallet,
    entry: NewEntry,
) -> Result<Transaction, AppError> {
    let balance_after = next_balance(wallet.balance_cents, entry.direction, entry.amount_cents)?;

    sqlx::query("UPDATE wallets SET balance_cents = $1, updated_at = NOW() WHERE id = $2")
        .bind(balance_after)
        .bind(wallet.id)
        .execute(&mut *conn)
        .await?;

    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            wallet_id,
            kind,
            direction,
            amount_cents,
            balance_after_cents,
            status,
            reference,
            description,
            metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(wallet.id)
    .bind(entry.kind)
    .bind(entry.direction)
    .bind(entry.amount_cents)
    .bind(balance_after)
    .bind(entry.status)
    .bind(&entry.reference)
    .bind(entry.description)
    .bind(entry.metadata)
    .fetch_one(&mut *conn)
    .await?;

    wallet.balance_cents = balance_after;
    Ok(transaction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_adds_and_debit_subtracts() {
        assert_eq!(next_balance(1_000, EntryDirection::Credit, 250).unwrap(), 1_250);
        assert_eq!(next_balance(1_000, EntryDirection::Debit, 1_000).unwrap(), 0);
    }

    #[test]
    fn debit_below_zero_is_insufficient() {
        assert!(matches!(
            next_balance(999, EntryDirection::Debit, 1_000),
            Err(AppError::InsufficientBalance)
        ));
    }

    #[test]
    fn rejects_non_positive_and_overflowing_amounts() {
        assert!(matches!(
            next_balance(0, EntryDirection::Credit, 0),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            next_balance(i64::MAX, EntryDirection::Credit, 1),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn withdrawal_fails_when_balance_below_amount_plus_fee() {
        assert!(ensure_sufficient(10_100, 10_000, 100).is_ok());
        assert!(matches!(
            ensure_sufficient(10_099, 10_000, 100),
            Err(AppError::InsufficientBalance)
        ));
    }
}
