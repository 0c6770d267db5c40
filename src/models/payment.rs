//! Gateway-backed deposits (`payments`) and payouts (`withdrawals`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Wallet debited, gateway not yet called
    Pending,
    /// Gateway accepted the payout; waiting for the webhook
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl WithdrawalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Failed | WithdrawalStatus::Reversed
        )
    }
}

/// Represents a row of the `payments` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference: String,
    pub provider: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub authorization_url: Option<String>,
    pub gateway_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Represents a row of the `withdrawals` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference: String,
    pub provider: String,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub currency: String,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    #[serde(skip_serializing)]
    pub recipient_code: Option<String>,
    pub transfer_code: Option<String>,
    pub status: WithdrawalStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `POST /api/v1/payments/deposits`
#[derive(Debug, Deserialize, Validate)]
pub struct InitiateDepositRequest {
    /// Minimum charge is 100 minor units
    #[validate(range(min = 100))]
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct DepositInitiatedResponse {
    pub reference: String,
    pub provider: String,
    pub amount_cents: i64,
    pub currency: String,
    pub authorization_url: String,
}

/// `POST /api/v1/payments/withdrawals`
///
/// ```json
/// {
///   "amount_cents": 1000000,
///   "bank_code": "058",
///   "account_number": "0123456789",
///   "account_name": "Ada Obi"
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct InitiateWithdrawalRequest {
    #[validate(range(min = 100))]
    pub amount_cents: i64,

    #[validate(length(min = 3, max = 10))]
    pub bank_code: String,

    #[validate(custom(function = "crate::models::validate_account_number"))]
    pub account_number: String,

    #[validate(length(min = 2, max = 120))]
    pub account_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdrawal_account_number_must_be_ten_digits() {
        let request = |account_number: &str| InitiateWithdrawalRequest {
            amount_cents: 10_000,
            bank_code: "058".into(),
            account_number: account_number.into(),
            account_name: "Ada Obi".into(),
        };
        assert!(request("0123456789").validate().is_ok());
        assert!(request(" 123456789").validate().is_err());
        assert!(request("123456789 ").validate().is_err());
    }
}
