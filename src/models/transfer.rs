//! Transfer models for the three transfer variants.
//!
//! Internal transfers settle immediately between two wallets. Domestic and
//! international transfers leave the platform, so they are created in
//! `PendingVerification` and only debit the sender once every verification
//! step in `required_steps` has been passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Internal,
    Domestic,
    International,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    PendingVerification,
    Completed,
    Failed,
    Cancelled,
}

/// Represents a row of the `transfers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transfer {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub kind: TransferKind,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub currency: String,
    pub status: TransferStatus,

    /// Set for internal transfers only
    pub recipient_wallet_id: Option<Uuid>,

    pub beneficiary_name: Option<String>,
    pub beneficiary_bank: Option<String>,

    /// NUBAN for domestic, IBAN or account number for international
    pub beneficiary_account: Option<String>,

    pub swift_code: Option<String>,
    pub beneficiary_country: Option<String>,

    /// Ordered verification steps, e.g. `["otp", "cot", "imf"]`
    pub required_steps: Vec<String>,

    /// Digests of the admin-assigned codes, captured at initiation and
    /// aligned with `required_steps[1..]`
    pub code_hashes: Vec<String>,

    /// Index into `required_steps` of the step awaiting a code
    pub current_step: i32,

    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub reference: String,
    pub narration: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Name of the step waiting for a code, if any remain.
    pub fn pending_step(&self) -> Option<&str> {
        usize::try_from(self.current_step)
            .ok()
            .and_then(|index| self.required_steps.get(index))
            .map(String::as_str)
    }

    pub fn total_debit_cents(&self) -> i64 {
        self.amount_cents + self.fee_cents
    }
}

/// `POST /api/v1/transfers/internal`
///
/// ```json
/// {
///   "recipient_account_number": "0123456789",
///   "amount_cents": 250000,
///   "narration": "Rent"
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct InternalTransferRequest {
    #[validate(custom(function = "crate::models::validate_account_number"))]
    pub recipient_account_number: String,

    #[validate(range(min = 1))]
    pub amount_cents: i64,

    #[validate(length(max = 140))]
    pub narration: Option<String>,
}

/// `POST /api/v1/transfers/domestic`
#[derive(Debug, Deserialize, Validate)]
pub struct DomesticTransferRequest {
    #[validate(length(min = 2, max = 100))]
    pub bank_name: String,

    #[validate(custom(function = "crate::models::validate_account_number"))]
    pub account_number: String,

    #[validate(length(min = 2, max = 120))]
    pub account_name: String,

    #[validate(range(min = 1))]
    pub amount_cents: i64,

    #[validate(length(max = 140))]
    pub narration: Option<String>,
}

/// `POST /api/v1/transfers/international`
#[derive(Debug, Deserialize, Validate)]
pub struct InternationalTransferRequest {
    #[validate(length(min = 2, max = 120))]
    pub beneficiary_name: String,

    #[validate(length(min = 2, max = 100))]
    pub bank_name: String,

    /// IBAN or foreign account number
    #[validate(length(min = 5, max = 34))]
    pub account_number: String,

    /// SWIFT/BIC, 8 or 11 characters
    #[validate(length(min = 8, max = 11))]
    pub swift_code: String,

    #[validate(length(equal = 2))]
    pub country: String,

    #[validate(range(min = 1))]
    pub amount_cents: i64,

    #[validate(length(max = 140))]
    pub narration: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyTransferRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferQuery {
    pub kind: Option<TransferKind>,
    pub status: Option<TransferStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub id: Uuid,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub currency: String,
    pub reference: String,
    pub beneficiary_name: Option<String>,
    pub beneficiary_bank: Option<String>,
    pub beneficiary_account: Option<String>,
    pub swift_code: Option<String>,
    pub beneficiary_country: Option<String>,
    pub narration: Option<String>,

    /// Step that the next `verify` call must satisfy
    pub next_step: Option<String>,
    pub steps_remaining: usize,

    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transfer> for TransferResponse {
    fn from(transfer: Transfer) -> Self {
        let pending = transfer.status == TransferStatus::PendingVerification;
        let next_step = pending
            .then(|| transfer.pending_step().map(str::to_string))
            .flatten();
        let steps_remaining = if pending {
            let done = usize::try_from(transfer.current_step).unwrap_or(0);
            transfer.required_steps.len().saturating_sub(done)
        } else {
            0
        };

        Self {
            id: transfer.id,
            kind: transfer.kind,
            status: transfer.status,
            amount_cents: transfer.amount_cents,
            fee_cents: transfer.fee_cents,
            currency: transfer.currency,
            reference: transfer.reference,
            beneficiary_name: transfer.beneficiary_name,
            beneficiary_bank: transfer.beneficiary_bank,
            beneficiary_account: transfer.beneficiary_account,
            swift_code: transfer.swift_code,
            beneficiary_country: transfer.beneficiary_country,
            narration: transfer.narration,
            next_step,
            steps_remaining,
            failure_reason: transfer.failure_reason,
            created_at: transfer.created_at,
            completed_at: transfer.completed_at,
        }
    }
}

/// Response to domestic/international initiation and OTP resend.
#[derive(Debug, Serialize)]
pub struct TransferInitiatedResponse {
    pub transfer: TransferResponse,

    /// Echoed only in demo mode; otherwise delivered as a notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(steps: &[&str], current_step: i32, status: TransferStatus) -> Transfer {
        let now = Utc::now();
        Transfer {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            kind: TransferKind::International,
            amount_cents: 10_000,
            fee_cents: 500,
            currency: "NGN".into(),
            status,
            recipient_wallet_id: None,
            beneficiary_name: Some("Jane Doe".into()),
            beneficiary_bank: Some("Barclays".into()),
            beneficiary_account: Some("GB29NWBK60161331926819".into()),
            swift_code: Some("NWBKGB2L".into()),
            beneficiary_country: Some("GB".into()),
            required_steps: steps.iter().map(|s| s.to_string()).collect(),
            code_hashes: Vec::new(),
            current_step,
            otp_hash: None,
            otp_expires_at: None,
            failed_attempts: 0,
            reference: "TRF_TEST".into(),
            narration: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn response_reports_next_step_while_pending() {
        let response = TransferResponse::from(transfer(
            &["otp", "cot", "imf"],
            1,
            TransferStatus::PendingVerification,
        ));
        assert_eq!(response.next_step.as_deref(), Some("cot"));
        assert_eq!(response.steps_remaining, 2);
    }

    #[test]
    fn settled_transfer_has_no_next_step() {
        let response = TransferResponse::from(transfer(&["otp"], 1, TransferStatus::Completed));
        assert!(response.next_step.is_none());
        assert_eq!(response.steps_remaining, 0);
    }

    #[test]
    fn total_debit_includes_fee() {
        assert_eq!(
            transfer(&[], 0, TransferStatus::Completed).total_debit_cents(),
            10_500
        );
    }

    fn domestic(account_number: &str) -> DomesticTransferRequest {
        DomesticTransferRequest {
            bank_name: "First Bank".into(),
            account_number: account_number.into(),
            account_name: "Ada Obi".into(),
            amount_cents: 500_000,
            narration: None,
        }
    }

    #[test]
    fn domestic_account_number_must_be_ten_digits() {
        assert!(domestic("0123456789").validate().is_ok());

        let errors = domestic(" 123456789").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("account_number"));
        assert!(domestic("012345678a").validate().is_err());
        assert!(domestic("01234567890").validate().is_err());
    }
}
