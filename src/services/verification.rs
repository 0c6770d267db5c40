//! Step-by-step verification of pending transfers.
//!
//! A transfer carries an ordered list of steps (`["otp", "cot", ...]`).
//! Each call checks one code against the current step; this module only
//! decides the outcome, the transfer service persists it.

use chrono::{DateTime, Utc};

use crate::{
    crypto,
    error::AppError,
    models::transfer::{Transfer, TransferStatus},
};

pub const OTP_STEP: &str = "otp";

/// Wrong codes allowed before a transfer is failed.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Code accepted, `next_step` is now awaited
    Advanced { next_step: String },
    /// Code accepted and it was the last step
    Completed,
    /// Wrong code, transfer stays pending
    Rejected { attempts_left: i32 },
    /// Wrong code and no attempts left
    Locked,
    /// The OTP lifetime elapsed before it was used
    Expired,
}

/// Digest the current step's code must match: the OTP hash for the `otp`
/// step, otherwise the code hash captured when the transfer was created.
pub fn expected_hash(transfer: &Transfer) -> Result<&str, AppError> {
    let step = transfer
        .pending_step()
        .ok_or_else(|| AppError::Conflict("Transfer has no pending step".to_string()))?;

    if step == OTP_STEP {
        return transfer
            .otp_hash
            .as_deref()
            .ok_or_else(|| AppError::Conflict("No OTP has been issued".to_string()));
    }

    usize::try_from(transfer.current_step)
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| transfer.code_hashes.get(index))
        .map(String::as_str)
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "No {} code is configured for this transfer, contact support",
                step.to_uppercase()
            ))
        })
}

/// Decide what submitting `code` does to `transfer`.
pub fn evaluate(
    transfer: &Transfer,
    code: &str,
    now: DateTime<Utc>,
) -> Result<StepOutcome, AppError> {
    if transfer.status != TransferStatus::PendingVerification {
        return Err(AppError::Conflict(
            "Transfer is not awaiting verification".to_string(),
        ));
    }
    let step = transfer
        .pending_step()
        .ok_or_else(|| AppError::Conflict("Transfer has no pending step".to_string()))?;

    if step == OTP_STEP && transfer.otp_expires_at.is_none_or(|expires| expires <= now) {
        return Ok(StepOutcome::Expired);
    }

    if crypto::matches_hash(code, expected_hash(transfer)?) {
        let next_index = transfer.current_step as usize + 1;
        return Ok(match transfer.required_steps.get(next_index) {
            Some(next) => StepOutcome::Advanced {
                next_step: next.clone(),
            },
            None => StepOutcome::Completed,
        });
    }

    let attempts = transfer.failed_attempts + 1;
    if attempts >= MAX_FAILED_ATTEMPTS {
        Ok(StepOutcome::Locked)
    } else {
        Ok(StepOutcome::Rejected {
            attempts_left: MAX_FAILED_ATTEMPTS - attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transfer::TransferKind;
    use chrono::Duration;
    use uuid::Uuid;

    fn pending(steps: &[&str], current_step: i32, failed_attempts: i32) -> Transfer {
        let now = Utc::now();
        Transfer {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            kind: TransferKind::International,
            amount_cents: 100_000,
            fee_cents: 5_000,
            currency: "NGN".into(),
            status: TransferStatus::PendingVerification,
            recipient_wallet_id: None,
            beneficiary_name: Some("Jane Doe".into()),
            beneficiary_bank: Some("Barclays".into()),
            beneficiary_account: Some("GB29NWBK60161331926819".into()),
            swift_code: Some("NWBKGB2L".into()),
            beneficiary_country: Some("GB".into()),
            required_steps: steps.iter().map(|s| s.to_string()).collect(),
            code_hashes: steps
                .iter()
                .skip(1)
                .map(|s| crypto::sha256_hex(&format!("{}-991", s.to_uppercase())))
                .collect(),
            current_step,
            otp_hash: Some(crypto::sha256_hex("123456")),
            otp_expires_at: Some(now + Duration::minutes(15)),
            failed_attempts,
            reference: "TRF_TEST".into(),
            narration: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn correct_otp_advances_to_next_code() {
        let transfer = pending(&["otp", "cot", "imf"], 0, 0);
        let outcome = evaluate(&transfer, "123456", Utc::now()).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Advanced {
                next_step: "cot".into()
            }
        );
    }

    #[test]
    fn last_step_completes() {
        let transfer = pending(&["otp", "cot"], 1, 0);
        let outcome = evaluate(&transfer, "COT-991", Utc::now()).unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
    }

    #[test]
    fn admin_codes_do_not_expire_with_the_otp() {
        let mut transfer = pending(&["otp", "cot"], 1, 0);
        transfer.otp_expires_at = Some(Utc::now() - Duration::hours(1));
        assert_eq!(
            evaluate(&transfer, "COT-991", Utc::now()).unwrap(),
            StepOutcome::Completed
        );
    }

    #[test]
    fn wrong_code_counts_down_then_locks() {
        let transfer = pending(&["otp"], 0, 0);
        assert_eq!(
            evaluate(&transfer, "000000", Utc::now()).unwrap(),
            StepOutcome::Rejected { attempts_left: 4 }
        );

        let transfer = pending(&["otp"], 0, MAX_FAILED_ATTEMPTS - 1);
        assert_eq!(
            evaluate(&transfer, "000000", Utc::now()).unwrap(),
            StepOutcome::Locked
        );
    }

    #[test]
    fn expired_otp_is_reported_even_for_right_code() {
        let transfer = pending(&["otp"], 0, 0);
        let later = Utc::now() + Duration::minutes(16);
        assert_eq!(
            evaluate(&transfer, "123456", later).unwrap(),
            StepOutcome::Expired
        );
    }

    #[test]
    fn settled_transfers_cannot_be_verified() {
        let mut transfer = pending(&["otp"], 0, 0);
        transfer.status = TransferStatus::Cancelled;
        assert!(matches!(
            evaluate(&transfer, "123456", Utc::now()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn admin_codes_match_by_position() {
        let transfer = pending(&["otp", "cot", "imf"], 2, 0);
        assert_eq!(
            expected_hash(&transfer).unwrap(),
            crypto::sha256_hex("IMF-991")
        );
        assert_eq!(
            evaluate(&transfer, "COT-991", Utc::now()).unwrap(),
            StepOutcome::Rejected { attempts_left: 4 }
        );
        assert_eq!(
            evaluate(&transfer, "IMF-991", Utc::now()).unwrap(),
            StepOutcome::Completed
        );
    }

    #[test]
    fn missing_code_snapshot_is_a_conflict() {
        let mut transfer = pending(&["otp", "cot"], 1, 0);
        transfer.code_hashes.clear();
        assert!(matches!(
            evaluate(&transfer, "COT-991", Utc::now()),
            Err(AppError::Conflict(_))
        ));
    }
}
