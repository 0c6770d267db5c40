//! Transfers between wallets and to external beneficiaries.
//!
//! Internal transfers settle immediately. Domestic and international
//! transfers are recorded as `pending_verification` and the sender is only
//! debited when the last verification step passes.
//!
//! Callers must have checked `user_service::ensure_can_transact` first.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    crypto,
    db::DbPool,
    error::AppError,
    models::{
        PageParams, is_account_number,
        transaction::{NewEntry, TransactionKind},
        transfer::{
            DomesticTransferRequest, InternalTransferRequest, InternationalTransferRequest,
            Transfer, TransferKind, TransferStatus,
        },
        user::UserStatus,
    },
    services::{
        ledger,
        limits::{self, OperationKind},
        notification_service,
        verification::{self, OTP_STEP, StepOutcome},
    },
};

/// Fields of a transfer row known at creation time.
struct TransferDraft {
    sender_id: Uuid,
    kind: TransferKind,
    amount_cents: i64,
    fee_cents: i64,
    currency: String,
    status: TransferStatus,
    recipient_wallet_id: Option<Uuid>,
    beneficiary_name: Option<String>,
    beneficiary_bank: Option<String>,
    beneficiary_account: Option<String>,
    swift_code: Option<String>,
    beneficiary_country: Option<String>,
    required_steps: Vec<String>,
    code_hashes: Vec<String>,
    otp_hash: Option<String>,
    otp_expires_at: Option<DateTime<Utc>>,
    reference: String,
    narration: Option<String>,
}

async fn insert_transfer(conn: &mut PgConnection, draft: TransferDraft) -> Result<Transfer, AppError> {
    let completed = draft.status == TransferStatus::Completed;

    let transfer = sqlx::query_as::<_, Transfer>(
        r#"
        INSERT INTO transfers (
            sender_id, kind, amount_cents, fee_cents, currency, status,
            recipient_wallet_id, beneficiary_name, beneficiary_bank, beneficiary_account,
            swift_code, beneficiary_country, required_steps, code_hashes, otp_hash,
            otp_expires_at, reference, narration, completed_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            CASE WHEN $19 THEN NOW() ELSE NULL END
        )
        RETURNING *
        "#,
    )
    .bind(draft.sender_id)
    .bind(draft.kind)
    .bind(draft.amount_cents)
    .bind(draft.fee_cents)
    .bind(draft.currency)
    .bind(draft.status)
    .bind(draft.recipient_wallet_id)
    .bind(draft.beneficiary_name)
    .bind(draft.beneficiary_bank)
    .bind(draft.beneficiary_account)
    .bind(draft.swift_code)
    .bind(draft.beneficiary_country)
    .bind(draft.required_steps)
    .bind(draft.code_hashes)
    .bind(draft.otp_hash)
    .bind(draft.otp_expires_at)
    .bind(draft.reference)
    .bind(draft.narration)
    .bind(completed)
    .fetch_one(&mut *conn)
    .await?;

    Ok(transfer)
}

/// SWIFT/BIC: 4 letters bank, 2 letters country, 2 alphanumeric location,
/// optional 3 alphanumeric branch.
pub fn is_valid_swift(code: &str) -> bool {
    let bytes = code.as_bytes();
    matches!(bytes.len(), 8 | 11)
        && bytes[..6].iter().all(u8::is_ascii_alphabetic)
        && bytes[6..].iter().all(u8::is_ascii_alphanumeric)
}

/// Verification steps for an external transfer: the OTP, then any
/// admin-assigned codes in order.
pub fn required_steps(kind: TransferKind, assigned_codes: Vec<String>) -> Vec<String> {
    let mut steps = vec![OTP_STEP.to_string()];
    if kind == TransferKind::International {
        steps.extend(assigned_codes);
    }
    steps
}

fn operation_for(kind: TransferKind) -> OperationKind {
    match kind {
        TransferKind::Internal => OperationKind::Internal,
        TransferKind::Domestic => OperationKind::Domestic,
        TransferKind::International => OperationKind::International,
    }
}

/// New OTP with its digest and expiry.
fn issue_otp(ttl_seconds: i64) -> (String, String, DateTime<Utc>) {
    let otp = crypto::random_digits(6);
    let hash = crypto::sha256_hex(&otp);
    (otp, hash, Utc::now() + Duration::seconds(ttl_seconds))
}

async fn send_otp(pool: &DbPool, transfer: &Transfer, otp: &str, ttl_seconds: i64) {
    notification_service::notify(
        pool,
        transfer.sender_id,
        "Transfer verification code",
        &format!(
            "Your one-time code for transfer {} is {otp}. It expires in {} minutes.",
            transfer.reference,
            ttl_seconds / 60
        ),
    )
    .await;
}

/// Move funds to another wallet on the platform immediately.
///
/// # Errors
///
/// - `NotFound`: no wallet with that account number
/// - `InvalidRequest`: sending to your own account, or recipient inactive
/// - `LimitExceeded` / `InsufficientBalance`
pub async fn internal_transfer(
    pool: &DbPool,
    sender_id: Uuid,
    request: InternalTransferRequest,
) -> Result<Transfer, AppError> {
    let recipient: Option<(Uuid, Uuid, UserStatus)> = sqlx::query_as(
        r#"
        SELECT w.id, u.id, u.status
        FROM wallets w
        JOIN users u ON u.id = w.user_id
        WHERE w.account_number = $1
        "#,
    )
    .bind(request.recipient_account_number.trim())
    .fetch_optional(pool)
    .await?;
    let (recipient_wallet_id, recipient_id, recipient_status) =
        recipient.ok_or(AppError::NotFound("recipient account"))?;

    if recipient_id == sender_id {
        return Err(AppError::InvalidRequest(
            "Cannot transfer to your own account".to_string(),
        ));
    }
    if recipient_status != UserStatus::Active {
        return Err(AppError::InvalidRequest(
            "Recipient account cannot receive funds".to_string(),
        ));
    }

    let amount_cents = request.amount_cents;
    let fee_cents = limits::calculate_fee(OperationKind::Internal, amount_cents);
    let reference = crypto::new_reference("TRF");

    let sender_wallet_id: Uuid = sqlx::query_scalar("SELECT id FROM wallets WHERE user_id = $1")
        .bind(sender_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("wallet"))?;

    let mut tx = pool.begin().await?;

    let (mut sender_wallet, mut recipient_wallet) =
        ledger::lock_wallet_pair(&mut tx, sender_wallet_id, recipient_wallet_id).await?;
    limits::enforce_limits(&mut tx, sender_id, OperationKind::Internal, amount_cents).await?;
    ledger::ensure_sufficient(sender_wallet.balance_cents, amount_cents, fee_cents)?;

    let narration = request.narration.filter(|n| !n.trim().is_empty());
    let description = narration.clone().unwrap_or_else(|| "Transfer".to_string());

    ledger::apply_entry(
        &mut tx,
        &mut sender_wallet,
        NewEntry::debit(TransactionKind::TransferOut, amount_cents, format!("{reference}-OUT"))
            .with_description(format!("{description} to {}", recipient_wallet.account_number)),
    )
    .await?;
    ledger::apply_entry(
        &mut tx,
        &mut recipient_wallet,
        NewEntry::credit(TransactionKind::TransferIn, amount_cents, format!("{reference}-IN"))
            .with_description(format!("{description} from {}", sender_wallet.account_number)),
    )
    .await?;
    if fee_cents > 0 {
        ledger::apply_entry(
            &mut tx,
            &mut sender_wallet,
            NewEntry::debit(TransactionKind::Fee, fee_cents, format!("{reference}-FEE"))
                .with_description("Transfer fee"),
        )
        .await?;
    }

    let transfer = insert_transfer(
        &mut tx,
        TransferDraft {
            sender_id,
            kind: TransferKind::Internal,
            amount_cents,
            fee_cents,
            currency: sender_wallet.currency.clone(),
            status: TransferStatus::Completed,
            recipient_wallet_id: Some(recipient_wallet.id),
            beneficiary_name: None,
            beneficiary_bank: None,
            beneficiary_account: Some(recipient_wallet.account_number.clone()),
            swift_code: None,
            beneficiary_country: None,
            required_steps: Vec::new(),
            code_hashes: Vec::new(),
            otp_hash: None,
            otp_expires_at: None,
            reference,
            narration,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        transfer_id = %transfer.id,
        %sender_id,
        %recipient_id,
        amount_cents,
        "internal transfer completed"
    );

    notification_service::notify(
        pool,
        sender_id,
        "Transfer sent",
        &format!(
            "You sent {amount_cents} to {}. Reference {}.",
            recipient_wallet.account_number, transfer.reference
        ),
    )
    .await;
    notification_service::notify(
        pool,
        recipient_id,
        "Transfer received",
        &format!(
            "You received {amount_cents} from {}. Reference {}.",
            sender_wallet.account_number, transfer.reference
        ),
    )
    .await;

    Ok(transfer)
}

/// Beneficiary details of an external transfer.
struct Beneficiary {
    name: String,
    bank: String,
    account: String,
    swift_code: Option<String>,
    country: Option<String>,
}

/// Record a pending external transfer and issue its OTP.
async fn initiate_external(
    pool: &DbPool,
    sender_id: Uuid,
    kind: TransferKind,
    amount_cents: i64,
    beneficiary: Beneficiary,
    narration: Option<String>,
    otp_ttl_seconds: i64,
) -> Result<(Transfer, String), AppError> {
    let operation = operation_for(kind);
    let fee_cents = limits::calculate_fee(operation, amount_cents);

    let mut tx = pool.begin().await?;

    let wallet = ledger::lock_wallet_for_user(&mut tx, sender_id).await?;
    limits::enforce_limits(&mut tx, sender_id, operation, amount_cents).await?;
    ledger::ensure_sufficient(wallet.balance_cents, amount_cents, fee_cents)?;

    // Codes are captured now; later admin edits only affect new transfers.
    let assigned: Vec<(String, String)> = if kind == TransferKind::International {
        sqlx::query_as(
            "SELECT step_name, code_hash FROM transfer_codes WHERE user_id = $1 ORDER BY position",
        )
        .bind(sender_id)
        .fetch_all(&mut *tx)
        .await?
    } else {
        Vec::new()
    };
    let (step_names, code_hashes): (Vec<String>, Vec<String>) = assigned.into_iter().unzip();

    let (otp, otp_hash, otp_expires_at) = issue_otp(otp_ttl_seconds);

    let transfer = insert_transfer(
        &mut tx,
        TransferDraft {
            sender_id,
            kind,
            amount_cents,
            fee_cents,
            currency: wallet.currency.clone(),
            status: TransferStatus::PendingVerification,
            recipient_wallet_id: None,
            beneficiary_name: Some(beneficiary.name),
            beneficiary_bank: Some(beneficiary.bank),
            beneficiary_account: Some(beneficiary.account),
            swift_code: beneficiary.swift_code,
            beneficiary_country: beneficiary.country,
            required_steps: required_steps(kind, step_names),
            code_hashes,
            otp_hash: Some(otp_hash),
            otp_expires_at: Some(otp_expires_at),
            reference: crypto::new_reference("TRF"),
            narration: narration.filter(|n| !n.trim().is_empty()),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        transfer_id = %transfer.id,
        %sender_id,
        ?kind,
        amount_cents,
        fee_cents,
        steps = transfer.required_steps.len(),
        "transfer awaiting verification"
    );

    send_otp(pool, &transfer, &otp, otp_ttl_seconds).await;

    Ok((transfer, otp))
}

/// Start a transfer to a local bank account. Returns the transfer and its OTP.
pub async fn initiate_domestic(
    pool: &DbPool,
    sender_id: Uuid,
    request: DomesticTransferRequest,
    otp_ttl_seconds: i64,
) -> Result<(Transfer, String), AppError> {
    if !is_account_number(&request.account_number) {
        return Err(AppError::InvalidRequest(
            "Account number must be exactly 10 digits".to_string(),
        ));
    }

    initiate_external(
        pool,
        sender_id,
        TransferKind::Domestic,
        request.amount_cents,
        Beneficiary {
            name: request.account_name.trim().to_string(),
            bank: request.bank_name.trim().to_string(),
            account: request.account_number,
            swift_code: None,
            country: None,
        },
        request.narration,
        otp_ttl_seconds,
    )
    .await
}

/// Start a transfer abroad. Returns the transfer and its OTP.
pub async fn initiate_international(
    pool: &DbPool,
    sender_id: Uuid,
    request: InternationalTransferRequest,
    otp_ttl_seconds: i64,
) -> Result<(Transfer, String), AppError> {
    let swift_code = request.swift_code.trim().to_uppercase();
    if !is_valid_swift(&swift_code) {
        return Err(AppError::InvalidRequest(
            "SWIFT/BIC must be 8 or 11 characters".to_string(),
        ));
    }
    let account: String = request
        .account_number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if !account.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidRequest(
            "Account number may only contain letters and digits".to_string(),
        ));
    }

    initiate_external(
        pool,
        sender_id,
        TransferKind::International,
        request.amount_cents,
        Beneficiary {
            name: request.beneficiary_name.trim().to_string(),
            bank: request.bank_name.trim().to_string(),
            account,
            swift_code: Some(swift_code),
            country: Some(request.country.trim().to_uppercase()),
        },
        request.narration,
        otp_ttl_seconds,
    )
    .await
}

async fn lock_transfer(
    conn: &mut PgConnection,
    sender_id: Uuid,
    transfer_id: Uuid,
) -> Result<Transfer, AppError> {
    sqlx::query_as::<_, Transfer>(
        "SELECT * FROM transfers WHERE id = $1 AND sender_id = $2 FOR UPDATE",
    )
    .bind(transfer_id)
    .bind(sender_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("transfer"))
}

async fn mark_failed(
    conn: &mut PgConnection,
    transfer_id: Uuid,
    reason: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE transfers
        SET status = 'failed', failure_reason = $2, otp_hash = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(transfer_id)
    .bind(reason)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Debit the sender and mark the transfer completed.
async fn settle(conn: &mut PgConnection, transfer: &Transfer) -> Result<Transfer, AppError> {
    let mut wallet = ledger::lock_wallet_for_user(conn, transfer.sender_id).await?;
    ledger::ensure_sufficient(wallet.balance_cents, transfer.amount_cents, transfer.fee_cents)?;

    let beneficiary = transfer.beneficiary_name.as_deref().unwrap_or("beneficiary");
    let description = transfer
        .narration
        .clone()
        .unwrap_or_else(|| format!("Transfer to {beneficiary}"));

    ledger::apply_entry(
        conn,
        &mut wallet,
        NewEntry::debit(
            TransactionKind::TransferOut,
            transfer.amount_cents,
            format!("{}-OUT", transfer.reference),
        )
        .with_description(description),
    )
    .await?;
    if transfer.fee_cents > 0 {
        ledger::apply_entry(
            conn,
            &mut wallet,
            NewEntry::debit(
                TransactionKind::Fee,
                transfer.fee_cents,
                format!("{}-FEE", transfer.reference),
            )
            .with_description("Transfer fee"),
        )
        .await?;
    }

    let settled = sqlx::query_as::<_, Transfer>(
        r#"
        UPDATE transfers
        SET status = 'completed',
            current_step = current_step + 1,
            otp_hash = NULL,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(transfer.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(settled)
}

/// Check `code` against the transfer's current step.
///
/// Returns the updated transfer when the code is accepted. The final step
/// debits the sender; if the balance no longer covers amount + fee the
/// transfer stays pending on that step.
///
/// # Errors
///
/// - `VerificationFailed`: wrong code, expired OTP or too many attempts
/// - `Conflict`: transfer is not awaiting verification
pub async fn verify(
    pool: &DbPool,
    sender_id: Uuid,
    transfer_id: Uuid,
    code: &str,
) -> Result<Transfer, AppError> {
    let mut tx = pool.begin().await?;

    let transfer = lock_transfer(&mut tx, sender_id, transfer_id).await?;
    let outcome = verification::evaluate(&transfer, code, Utc::now())?;

    match outcome {
        StepOutcome::Expired => {
            mark_failed(&mut tx, transfer.id, "OTP expired").await?;
            tx.commit().await?;
            tracing::info!(%transfer_id, "transfer failed: OTP expired");
            Err(AppError::VerificationFailed(
                "The OTP has expired and the transfer was cancelled".to_string(),
            ))
        }
        StepOutcome::Locked => {
            mark_failed(&mut tx, transfer.id, "Too many incorrect codes").await?;
            tx.commit().await?;
            tracing::warn!(%transfer_id, %sender_id, "transfer failed: too many incorrect codes");
            notification_service::notify(
                pool,
                sender_id,
                "Transfer failed",
                &format!(
                    "Transfer {} failed after too many incorrect codes.",
                    transfer.reference
                ),
            )
            .await;
            Err(AppError::VerificationFailed(
                "Too many incorrect codes; the transfer has failed".to_string(),
            ))
        }
        StepOutcome::Rejected { attempts_left } => {
            sqlx::query(
                "UPDATE transfers SET failed_attempts = failed_attempts + 1, updated_at = NOW() WHERE id = $1",
            )
            .bind(transfer.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Err(AppError::VerificationFailed(format!(
                "Incorrect code, {attempts_left} attempt(s) left"
            )))
        }
        StepOutcome::Advanced { next_step } => {
            let advanced = sqlx::query_as::<_, Transfer>(
                r#"
                UPDATE transfers
                SET current_step = current_step + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(transfer.id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(%transfer_id, %next_step, "transfer verification step passed");
            Ok(advanced)
        }
        StepOutcome::Completed => {
            let settled = settle(&mut tx, &transfer).await?;
            tx.commit().await?;

            tracing::info!(
                %transfer_id,
                %sender_id,
                amount_cents = settled.amount_cents,
                fee_cents = settled.fee_cents,
                "external transfer completed"
            );
            notification_service::notify(
                pool,
                sender_id,
                "Transfer completed",
                &format!(
                    "Your transfer of {} ({}) has been sent. {} was debited including fees.",
                    settled.amount_cents,
                    settled.reference,
                    settled.total_debit_cents()
                ),
            )
            .await;

            Ok(settled)
        }
    }
}

/// Issue a fresh OTP while the transfer is still on the OTP step.
pub async fn resend_otp(
    pool: &DbPool,
    sender_id: Uuid,
    transfer_id: Uuid,
    otp_ttl_seconds: i64,
) -> Result<(Transfer, String), AppError> {
    let mut tx = pool.begin().await?;

    let transfer = lock_transfer(&mut tx, sender_id, transfer_id).await?;
    if transfer.status != TransferStatus::PendingVerification
        || transfer.pending_step() != Some(OTP_STEP)
    {
        return Err(AppError::Conflict(
            "Transfer is not waiting for an OTP".to_string(),
        ));
    }

    let (otp, otp_hash, otp_expires_at) = issue_otp(otp_ttl_seconds);
    let transfer = sqlx::query_as::<_, Transfer>(
        r#"
        UPDATE transfers
        SET otp_hash = $2, otp_expires_at = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(transfer.id)
    .bind(otp_hash)
    .bind(otp_expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    send_otp(pool, &transfer, &otp, otp_ttl_seconds).await;

    Ok((transfer, otp))
}

/// Cancel a transfer that has not been verified yet. Nothing was debited.
pub async fn cancel(pool: &DbPool, sender_id: Uuid, transfer_id: Uuid) -> Result<Transfer, AppError> {
    let mut tx = pool.begin().await?;

    let transfer = lock_transfer(&mut tx, sender_id, transfer_id).await?;
    if transfer.status != TransferStatus::PendingVerification {
        return Err(AppError::Conflict(
            "Only transfers awaiting verification can be cancelled".to_string(),
        ));
    }

    let cancelled = sqlx::query_as::<_, Transfer>(
        r#"
        UPDATE transfers
        SET status = 'cancelled', otp_hash = NULL, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(transfer.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%transfer_id, %sender_id, "transfer cancelled");
    Ok(cancelled)
}

pub async fn get_transfer(
    pool: &DbPool,
    sender_id: Uuid,
    transfer_id: Uuid,
) -> Result<Transfer, AppError> {
    sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = $1 AND sender_id = $2")
        .bind(transfer_id)
        .bind(sender_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("transfer"))
}

pub async fn list_transfers(
    pool: &DbPool,
    sender_id: Uuid,
    kind: Option<TransferKind>,
    status: Option<TransferStatus>,
    page: PageParams,
) -> Result<Vec<Transfer>, AppError> {
    let transfers = sqlx::query_as::<_, Transfer>(
        r#"
        SELECT * FROM transfers
        WHERE sender_id = $1
          AND ($2::transfer_kind IS NULL OR kind = $2)
          AND ($3::transfer_status IS NULL OR status = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(sender_id)
    .bind(kind)
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(transfers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::user::TransferCodeInput, services::user_service, test_utils};
    use sqlx::PgPool;

    #[test]
    fn domestic_transfers_only_need_an_otp() {
        let steps = required_steps(TransferKind::Domestic, vec!["cot".into()]);
        assert_eq!(steps, vec!["otp"]);
    }

    #[test]
    fn international_transfers_append_assigned_codes_in_order() {
        let steps = required_steps(
            TransferKind::International,
            vec!["cot".into(), "imf".into(), "tax".into()],
        );
        assert_eq!(steps, vec!["otp", "cot", "imf", "tax"]);
    }

    #[test]
    fn swift_codes_are_eight_or_eleven_characters() {
        assert!(is_valid_swift("NWBKGB2L"));
        assert!(is_valid_swift("DEUTDEFF500"));
        assert!(!is_valid_swift("NWBKGB2"));
        assert!(!is_valid_swift("NWBKGB2LX"));
        assert!(!is_valid_swift("1234GB2L"));
    }

    #[test]
    fn otp_is_six_digits_with_future_expiry() {
        let (otp, hash, expires_at) = issue_otp(900);
        assert_eq!(otp.len(), 6);
        assert!(crypto::matches_hash(&otp, &hash));
        assert!(expires_at > Utc::now() + Duration::seconds(890));
    }

    #[test]
    fn each_transfer_kind_has_its_own_limits() {
        assert_eq!(operation_for(TransferKind::Internal), OperationKind::Internal);
        assert_eq!(operation_for(TransferKind::Domestic), OperationKind::Domestic);
        assert_eq!(
            operation_for(TransferKind::International),
            OperationKind::International
        );
    }

    const OTP_TTL: i64 = 900;

    fn domestic(amount_cents: i64) -> DomesticTransferRequest {
        DomesticTransferRequest {
            bank_name: "First Bank".into(),
            account_number: "3012345678".into(),
            account_name: "Ada Obi".into(),
            amount_cents,
            narration: None,
        }
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn pending_transfers_count_toward_daily_limit(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "limits@example.com", 100_000_000).await;

        for _ in 0..2 {
            initiate_domestic(&pool, user.id, domestic(20_000_000), OTP_TTL)
                .await
                .unwrap();
        }
        // 40M pending, the next 20M would exceed the 50M daily limit.
        let third = initiate_domestic(&pool, user.id, domestic(20_000_000), OTP_TTL).await;
        assert!(matches!(third, Err(AppError::LimitExceeded(_))));

        assert_eq!(test_utils::balance(&pool, user.id).await, 100_000_000);
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn cancelled_transfer_never_moves_money(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "cancel@example.com", 1_000_000).await;
        let (transfer, otp) = initiate_domestic(&pool, user.id, domestic(500_000), OTP_TTL)
            .await
            .unwrap();

        let cancelled = cancel(&pool, user.id, transfer.id).await.unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);
        assert!(matches!(
            cancel(&pool, user.id, transfer.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            verify(&pool, user.id, transfer.id, &otp).await,
            Err(AppError::Conflict(_))
        ));

        assert_eq!(test_utils::balance(&pool, user.id).await, 1_000_000);
        assert_eq!(
            test_utils::ledger_entries(&pool, user.id, &transfer.reference).await,
            0
        );
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn locked_transfer_never_moves_money(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "locked@example.com", 1_000_000).await;
        let (transfer, otp) = initiate_domestic(&pool, user.id, domestic(500_000), OTP_TTL)
            .await
            .unwrap();

        for _ in 0..verification::MAX_FAILED_ATTEMPTS {
            let result = verify(&pool, user.id, transfer.id, &format!("{otp}0")).await;
            assert!(matches!(result, Err(AppError::VerificationFailed(_))));
        }

        let failed = get_transfer(&pool, user.id, transfer.id).await.unwrap();
        assert_eq!(failed.status, TransferStatus::Failed);
        assert!(matches!(
            verify(&pool, user.id, transfer.id, &otp).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(test_utils::balance(&pool, user.id).await, 1_000_000);
        assert_eq!(
            test_utils::ledger_entries(&pool, user.id, &transfer.reference).await,
            0
        );
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn completed_transfer_debits_exactly_once(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "settle@example.com", 1_000_000).await;
        let (transfer, otp) = initiate_domestic(&pool, user.id, domestic(500_000), OTP_TTL)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            verify(&pool, user.id, transfer.id, &otp),
            verify(&pool, user.id, transfer.id, &otp),
        );
        assert_eq!(u8::from(first.is_ok()) + u8::from(second.is_ok()), 1);

        let settled = get_transfer(&pool, user.id, transfer.id).await.unwrap();
        assert_eq!(settled.status, TransferStatus::Completed);
        assert_eq!(
            test_utils::balance(&pool, user.id).await,
            1_000_000 - settled.total_debit_cents()
        );
        // Transfer-out and fee
        assert_eq!(
            test_utils::ledger_entries(&pool, user.id, &transfer.reference).await,
            2
        );
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn codes_are_fixed_when_transfer_is_created(pool: PgPool) {
        let user = test_utils::funded_customer(&pool, "codes@example.com", 5_000_000).await;
        let codes = |code: &str| {
            vec![TransferCodeInput {
                name: "cot".into(),
                code: code.into(),
            }]
        };
        user_service::set_transfer_codes(&pool, user.id, &codes("COT-1111"))
            .await
            .unwrap();

        let (transfer, otp) = initiate_international(
            &pool,
            user.id,
            InternationalTransferRequest {
                beneficiary_name: "Jane Doe".into(),
                bank_name: "Barclays".into(),
                account_number: "GB29 NWBK 6016 1331 9268 19".into(),
                swift_code: "NWBKGB2L".into(),
                country: "GB".into(),
                amount_cents: 1_000_000,
                narration: None,
            },
            OTP_TTL,
        )
        .await
        .unwrap();
        assert_eq!(transfer.required_steps, vec!["otp", "cot"]);

        user_service::set_transfer_codes(&pool, user.id, &codes("COT-2222"))
            .await
            .unwrap();

        verify(&pool, user.id, transfer.id, &otp).await.unwrap();
        assert!(matches!(
            verify(&pool, user.id, transfer.id, "COT-2222").await,
            Err(AppError::VerificationFailed(_))
        ));
        let settled = verify(&pool, user.id, transfer.id, "COT-1111").await.unwrap();
        assert_eq!(settled.status, TransferStatus::Completed);
    }
}

