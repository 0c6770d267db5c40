//! Gateway-backed deposits and withdrawals, and webhook reconciliation.
//!
//! # Deposits
//!
//! 1. `initiate_deposit` records a pending payment and returns a checkout URL
//! 2. The wallet is credited once, by `verify_deposit` or a `charge.success`
//!    webhook, whichever arrives first
//!
//! # Withdrawals
//!
//! The wallet is debited before the gateway is called. If the payout fails
//! (synchronously or via a later webhook) a `reversal` entry refunds amount
//! and fee in a separate transaction.

use uuid::Uuid;

use crate::{
    crypto,
    db::DbPool,
    error::AppError,
    gateway::{
        ChargeEventData, ChargeStatus, PaymentGateway, PayoutBeneficiary, PayoutStatus,
        TransferEventData, WebhookEvent,
    },
    models::{
        PageParams,
        payment::{InitiateWithdrawalRequest, Payment, PaymentStatus, Withdrawal, WithdrawalStatus},
        transaction::{NewEntry, TransactionKind, TransactionStatus},
    },
    services::{
        ledger,
        limits::{self, OperationKind},
        notification_service,
    },
};

/// Start a gateway deposit. Returns the pending payment with its checkout URL.
pub async fn initiate_deposit(
    pool: &DbPool,
    gateway: &PaymentGateway,
    user_id: Uuid,
    email: &str,
    amount_cents: i64,
) -> Result<Payment, AppError> {
    let currency: String = sqlx::query_scalar("SELECT currency FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("wallet"))?;
    let reference = crypto::new_reference("DEP");

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (user_id, reference, provider, amount_cents, currency)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&reference)
    .bind(gateway.provider_name())
    .bind(amount_cents)
    .bind(&currency)
    .fetch_one(pool)
    .await?;

    let charge = match gateway
        .initialize_charge(email, amount_cents, &currency, &reference)
        .await
    {
        Ok(charge) => charge,
        Err(e) => {
            tracing::warn!(%reference, error = %e, "deposit initialization failed");
            sqlx::query(
                "UPDATE payments SET status = 'failed', gateway_response = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(payment.id)
            .bind(e.to_string())
            .execute(pool)
            .await?;
            return Err(e.into());
        }
    };

    let payment = sqlx::query_as::<_, Payment>(
        "UPDATE payments SET authorization_url = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(payment.id)
    .bind(&charge.authorization_url)
    .fetch_one(pool)
    .await?;

    tracing::info!(%user_id, %reference, amount_cents, provider = gateway.provider_name(), "deposit initialized");
    Ok(payment)
}

/// Ask the gateway about a deposit and settle it.
///
/// Already successful payments are returned without another gateway call.
pub async fn verify_deposit(
    pool: &DbPool,
    gateway: &PaymentGateway,
    user_id: Uuid,
    reference: &str,
) -> Result<Payment, AppError> {
    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE reference = $1 AND user_id = $2",
    )
    .bind(reference)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("payment"))?;

    if payment.status == PaymentStatus::Success {
        return Ok(payment);
    }

    let verification = gateway.verify_charge(reference).await?;
    reconcile_charge(
        pool,
        reference,
        verification.status,
        verification.amount_cents,
        verification.gateway_response,
    )
    .await
}

/// Next payment status for a charge outcome. `None` leaves the row unchanged.
///
/// Only `pending` payments move; success, failed and abandoned are final.
fn charge_transition(
    current: PaymentStatus,
    outcome: ChargeStatus,
    expected_cents: i64,
    reported_cents: Option<i64>,
) -> Option<PaymentStatus> {
    if current != PaymentStatus::Pending {
        return None;
    }
    match outcome {
        ChargeStatus::Success => match reported_cents {
            Some(amount) if amount != expected_cents => Some(PaymentStatus::Failed),
            _ => Some(PaymentStatus::Success),
        },
        ChargeStatus::Failed => Some(PaymentStatus::Failed),
        ChargeStatus::Abandoned => Some(PaymentStatus::Abandoned),
        ChargeStatus::Pending => None,
    }
}

/// Apply a charge outcome to the payment with `reference`, crediting the
/// wallet exactly once on success.
pub async fn reconcile_charge(
    pool: &DbPool,
    reference: &str,
    outcome: ChargeStatus,
    reported_cents: Option<i64>,
    gateway_response: Option<String>,
) -> Result<Payment, AppError> {
    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE reference = $1 FOR UPDATE",
    )
    .bind(reference)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("payment"))?;

    let Some(next) = charge_transition(payment.status, outcome, payment.amount_cents, reported_cents)
    else {
        return Ok(payment);
    };

    let gateway_response = if outcome == ChargeStatus::Success && next == PaymentStatus::Failed {
        tracing::warn!(
            %reference,
            expected = payment.amount_cents,
            reported = ?reported_cents,
            "charged amount does not match payment"
        );
        Some("Amount mismatch".to_string())
    } else {
        gateway_response
    };

    if next == PaymentStatus::Success {
        let mut wallet = ledger::lock_wallet_for_user(&mut tx, payment.user_id).await?;
        ledger::apply_entry(
            &mut tx,
            &mut wallet,
            NewEntry::credit(TransactionKind::Deposit, payment.amount_cents, &payment.reference)
                .with_description(format!("Deposit via {}", payment.provider)),
        )
        .await?;
    }

    let updated = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET status = $2,
            gateway_response = COALESCE($3, gateway_response),
            paid_at = CASE WHEN $2 = 'success'::payment_status THEN NOW() ELSE paid_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(payment.id)
    .bind(next)
    .bind(gateway_response)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%reference, status = ?updated.status, "deposit reconciled");

    if updated.status == PaymentStatus::Success {
        notification_service::notify(
            pool,
            updated.user_id,
            "Deposit received",
            &format!(
                "{} has been added to your wallet ({}).",
                updated.amount_cents, updated.reference
            ),
        )
        .await;
    }

    Ok(updated)
}

/// Debit the wallet and pay out to a bank account.
///
/// A declined payout is refunded and the failed withdrawal returned. A
/// transport error is refunded too and surfaces as a gateway error.
pub async fn initiate_withdrawal(
    pool: &DbPool,
    gateway: &PaymentGateway,
    user_id: Uuid,
    request: InitiateWithdrawalRequest,
) -> Result<Withdrawal, AppError> {
    let amount_cents = request.amount_cents;
    let fee_cents = limits::calculate_fee(OperationKind::Withdrawal, amount_cents);
    let reference = crypto::new_reference("WDR");

    let mut tx = pool.begin().await?;

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, user_id).await?;
    limits::enforce_limits(&mut tx, user_id, OperationKind::Withdrawal, amount_cents).await?;
    ledger::ensure_sufficient(wallet.balance_cents, amount_cents, fee_cents)?;

    ledger::apply_entry(
        &mut tx,
        &mut wallet,
        NewEntry::debit(TransactionKind::Withdrawal, amount_cents, &reference)
            .with_status(TransactionStatus::Pending)
            .with_description(format!(
                "Withdrawal to {} ({})",
                request.account_number, request.bank_code
            )),
    )
    .await?;
    if fee_cents > 0 {
        ledger::apply_entry(
            &mut tx,
            &mut wallet,
            NewEntry::debit(TransactionKind::Fee, fee_cents, format!("{reference}-FEE"))
                .with_description("Withdrawal fee"),
        )
        .await?;
    }

    let withdrawal = sqlx::query_as::<_, Withdrawal>(
        r#"
        INSERT INTO withdrawals (
            user_id, reference, provider, amount_cents, fee_cents, currency,
            bank_code, account_number, account_name
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&reference)
    .bind(gateway.provider_name())
    .bind(amount_cents)
    .bind(fee_cents)
    .bind(&wallet.currency)
    .bind(request.bank_code.trim())
    .bind(request.account_number.trim())
    .bind(request.account_name.trim())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%user_id, %reference, amount_cents, fee_cents, "withdrawal debited, calling gateway");

    let payout = gateway
        .send_payout(
            PayoutBeneficiary {
                account_name: &withdrawal.account_name,
                account_number: &withdrawal.account_number,
                bank_code: &withdrawal.bank_code,
                currency: &withdrawal.currency,
            },
            amount_cents,
            &reference,
            "Wallet withdrawal",
        )
        .await;

    match payout {
        Ok((recipient_code, receipt)) => match receipt.status {
            PayoutStatus::Success => {
                complete_withdrawal(pool, &reference, Some(receipt.transfer_code), Some(recipient_code))
                    .await
            }
            PayoutStatus::Pending => {
                let processing = sqlx::query_as::<_, Withdrawal>(
                    r#"
                    UPDATE withdrawals
                    SET status = 'processing', recipient_code = $2, transfer_code = $3, updated_at = NOW()
                    WHERE id = $1 AND status = 'pending'
                    RETURNING *
                    "#,
                )
                .bind(withdrawal.id)
                .bind(recipient_code)
                .bind(receipt.transfer_code)
                .fetch_optional(pool)
                .await?;
                // A webhook may already have settled it.
                match processing {
                    Some(w) => Ok(w),
                    None => get_withdrawal(pool, user_id, withdrawal.id).await,
                }
            }
            PayoutStatus::Failed => {
                refund_withdrawal(pool, &reference, WithdrawalStatus::Failed, "Payout declined by the gateway")
                    .await
            }
        },
        Err(e) => {
            tracing::error!(%reference, error = %e, "payout failed, refunding");
            refund_withdrawal(pool, &reference, WithdrawalStatus::Failed, "Payment gateway unavailable")
                .await?;
            Err(e.into())
        }
    }
}

async fn get_withdrawal(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Withdrawal, AppError> {
    sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("withdrawal"))
}

async fn lock_withdrawal(
    conn: &mut sqlx::PgConnection,
    reference: &str,
) -> Result<Withdrawal, AppError> {
    sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE reference = $1 FOR UPDATE")
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("withdrawal"))
}

/// A refund is due unless the money has already been returned.
fn needs_refund(status: WithdrawalStatus) -> bool {
    !matches!(status, WithdrawalStatus::Failed | WithdrawalStatus::Reversed)
}

/// Mark a withdrawal paid out. Idempotent for terminal withdrawals.
pub async fn complete_withdrawal(
    pool: &DbPool,
    reference: &str,
    transfer_code: Option<String>,
    recipient_code: Option<String>,
) -> Result<Withdrawal, AppError> {
    let mut tx = pool.begin().await?;

    let withdrawal = lock_withdrawal(&mut tx, reference).await?;
    if withdrawal.status.is_terminal() {
        return Ok(withdrawal);
    }

    sqlx::query("UPDATE transactions SET status = 'completed' WHERE reference = $1")
        .bind(reference)
        .execute(&mut *tx)
        .await?;

    let completed = sqlx::query_as::<_, Withdrawal>(
        r#"
        UPDATE withdrawals
        SET status = 'completed',
            transfer_code = COALESCE($2, transfer_code),
            recipient_code = COALESCE($3, recipient_code),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(withdrawal.id)
    .bind(transfer_code)
    .bind(recipient_code)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%reference, "withdrawal completed");
    notification_service::notify(
        pool,
        completed.user_id,
        "Withdrawal completed",
        &format!(
            "{} was sent to {} ({}).",
            completed.amount_cents, completed.account_name, completed.reference
        ),
    )
    .await;

    Ok(completed)
}

/// Return amount and fee to the wallet and close the withdrawal as
/// `final_status`. Does nothing if it was already refunded.
pub async fn refund_withdrawal(
    pool: &DbPool,
    reference: &str,
    final_status: WithdrawalStatus,
    reason: &str,
) -> Result<Withdrawal, AppError> {
    let mut tx = pool.begin().await?;

    let withdrawal = lock_withdrawal(&mut tx, reference).await?;
    if !needs_refund(withdrawal.status) {
        return Ok(withdrawal);
    }

    let mut wallet = ledger::lock_wallet_for_user(&mut tx, withdrawal.user_id).await?;
    ledger::apply_entry(
        &mut tx,
        &mut wallet,
        NewEntry::credit(
            TransactionKind::Reversal,
            withdrawal.amount_cents + withdrawal.fee_cents,
            format!("{reference}-REV"),
        )
        .with_description(format!("Refund of withdrawal {reference}")),
    )
    .await?;

    sqlx::query("UPDATE transactions SET status = 'reversed' WHERE reference = $1")
        .bind(reference)
        .execute(&mut *tx)
        .await?;

    let refunded = sqlx::query_as::<_, Withdrawal>(
        r#"
        UPDATE withdrawals
        SET status = $2, failure_reason = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(withdrawal.id)
    .bind(final_status)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::warn!(%reference, ?final_status, reason, "withdrawal refunded");
    notification_service::notify(
        pool,
        refunded.user_id,
        "Withdrawal refunded",
        &format!(
            "Withdrawal {} could not be completed ({reason}). {} has been returned to your wallet.",
            refunded.reference,
            refunded.amount_cents + refunded.fee_cents
        ),
    )
    .await;

    Ok(refunded)
}

/// Dispatch a signature-checked gateway event.
pub async fn handle_webhook(pool: &DbPool, event: WebhookEvent) -> Result<(), AppError> {
    let decode_error =
        |e: serde_json::Error| AppError::InvalidRequest(format!("Malformed webhook data: {e}"));

    match event.event.as_str() {
        "charge.success" => {
            let data: ChargeEventData = serde_json::from_value(event.data).map_err(decode_error)?;
            reconcile_charge(
                pool,
                &data.reference,
                ChargeStatus::Success,
                data.amount,
                data.gateway_response,
            )
            .await?;
        }
        "transfer.success" => {
            let data: TransferEventData =
                serde_json::from_value(event.data).map_err(decode_error)?;
            complete_withdrawal(pool, &data.reference, data.transfer_code, None).await?;
        }
        "transfer.failed" | "transfer.reversed" => {
            let data: TransferEventData =
                serde_json::from_value(event.data).map_err(decode_error)?;
            let status = if event.event == "transfer.failed" {
                WithdrawalStatus::Failed
            } else {
                WithdrawalStatus::Reversed
            };
            let reason = data
                .reason
                .unwrap_or_else(|| format!("Gateway reported {}", event.event));
            refund_withdrawal(pool, &data.reference, status, &reason).await?;
        }
        other => {
            tracing::debug!(event = other, "ignoring webhook event");
        }
    }

    Ok(())
}

pub async fn list_payments(
    pool: &DbPool,
    user_id: Uuid,
    page: PageParams,
) -> Result<Vec<Payment>, AppError> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(payments)
}

pub async fn list_withdrawals(
    pool: &DbPool,
    user_id: Uuid,
    page: PageParams,
) -> Result<Vec<Withdrawal>, AppError> {
    let withdrawals = sqlx::query_as::<_, Withdrawal>(
        "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(withdrawals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::DemoGateway, test_utils};
    use serde_json::json;
    use sqlx::PgPool;

    #[test]
    fn successful_payments_are_never_reconciled_twice() {
        assert_eq!(
            charge_transition(PaymentStatus::Success, ChargeStatus::Success, 5_000, Some(5_000)),
            None
        );
        assert_eq!(
            charge_transition(PaymentStatus::Success, ChargeStatus::Failed, 5_000, None),
            None
        );
    }

    #[test]
    fn failed_and_abandoned_payments_are_final() {
        for current in [PaymentStatus::Failed, PaymentStatus::Abandoned] {
            assert_eq!(
                charge_transition(current, ChargeStatus::Success, 5_000, Some(5_000)),
                None
            );
            assert_eq!(
                charge_transition(current, ChargeStatus::Failed, 5_000, None),
                None
            );
        }
    }

    #[test]
    fn charge_success_requires_matching_amount() {
        assert_eq!(
            charge_transition(PaymentStatus::Pending, ChargeStatus::Success, 5_000, Some(5_000)),
            Some(PaymentStatus::Success)
        );
        assert_eq!(
            charge_transition(PaymentStatus::Pending, ChargeStatus::Success, 5_000, None),
            Some(PaymentStatus::Success)
        );
        assert_eq!(
            charge_transition(PaymentStatus::Pending, ChargeStatus::Success, 5_000, Some(500)),
            Some(PaymentStatus::Failed)
        );
    }

    #[test]
    fn pending_charges_leave_payment_untouched() {
        assert_eq!(
            charge_transition(PaymentStatus::Pending, ChargeStatus::Pending, 5_000, None),
            None
        );
        assert_eq!(
            charge_transition(PaymentStatus::Pending, ChargeStatus::Abandoned, 5_000, None),
            Some(PaymentStatus::Abandoned)
        );
    }

    #[test]
    fn refunds_happen_at_most_once() {
        assert!(needs_refund(WithdrawalStatus::Pending));
        assert!(needs_refund(WithdrawalStatus::Processing));
        assert!(needs_refund(WithdrawalStatus::Completed));
        assert!(!needs_refund(WithdrawalStatus::Failed));
        assert!(!needs_refund(WithdrawalStatus::Reversed));
    }

    fn demo(success_rate: f64) -> PaymentGateway {
        PaymentGateway::Demo(DemoGateway::new(success_rate, "test_webhook_secret".into()))
    }

    fn withdrawal_request(amount_cents: i64) -> InitiateWithdrawalRequest {
        InitiateWithdrawalRequest {
            amount_cents,
            bank_code: "058".into(),
            account_number: "0123456789".into(),
            account_name: "Ada Obi".into(),
        }
    }

    fn event(name: &str, data: serde_json::Value) -> WebhookEvent {
        WebhookEvent {
            event: name.into(),
            data,
        }
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn racing_failure_events_refund_once(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "payout@example.com", 1_000_000).await;
        let withdrawal = initiate_withdrawal(&pool, &demo(1.0), user.id, withdrawal_request(10_000))
            .await
            .unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Completed);
        assert_eq!(test_utils::balance(&pool, user.id).await, 1_000_000 - 10_100);

        let data = json!({ "reference": withdrawal.reference });
        let (failed, reversed) = tokio::join!(
            handle_webhook(&pool, event("transfer.failed", data.clone())),
            handle_webhook(&pool, event("transfer.reversed", data)),
        );
        failed.unwrap();
        reversed.unwrap();

        let refunds =
            test_utils::ledger_entries(&pool, user.id, &format!("{}-REV", withdrawal.reference)).await;
        assert_eq!(refunds, 1);
        assert_eq!(test_utils::balance(&pool, user.id).await, 1_000_000);
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn declined_payout_is_not_refunded_again(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "declined@example.com", 1_000_000).await;
        let withdrawal = initiate_withdrawal(&pool, &demo(0.0), user.id, withdrawal_request(10_000))
            .await
            .unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Failed);

        handle_webhook(
            &pool,
            event("transfer.failed", json!({ "reference": withdrawal.reference })),
        )
        .await
        .unwrap();

        let refunds =
            test_utils::ledger_entries(&pool, user.id, &format!("{}-REV", withdrawal.reference)).await;
        assert_eq!(refunds, 1);
        assert_eq!(test_utils::balance(&pool, user.id).await, 1_000_000);
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn duplicate_charge_events_credit_once(pool: PgPool) {
        let user = test_utils::customer(&pool, "deposit@example.com").await;
        let payment = initiate_deposit(&pool, &demo(1.0), user.id, &user.email, 50_000)
            .await
            .unwrap();

        let data = json!({ "reference": payment.reference, "amount": 50_000 });
        let (first, second) = tokio::join!(
            handle_webhook(&pool, event("charge.success", data.clone())),
            handle_webhook(&pool, event("charge.success", data)),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(test_utils::balance(&pool, user.id).await, 50_000);
        assert_eq!(
            test_utils::ledger_entries(&pool, user.id, &payment.reference).await,
            1
        );
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn events_for_unknown_references_are_not_found(pool: PgPool) {
        let result = handle_webhook(
            &pool,
            event("charge.success", json!({ "reference": "DEP_UNKNOWN", "amount": 100 })),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound("payment"))));
    }
}

