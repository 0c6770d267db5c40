//! Wallet data models and API request/response types.
//!
//! Balances are stored as `i64` minor units (cents, kobo) to avoid
//! floating-point precision issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::transaction::TransactionResponse;

/// Represents a row of the `wallets` table. One wallet per user.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,

    /// 10-digit account number used for internal transfers
    pub account_number: String,

    /// Current balance in minor units
    ///
    /// Must be >= 0 (enforced by database CHECK constraint).
    pub balance_cents: i64,

    /// Currency code (ISO 4217)
    pub currency: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub account_number: String,
    pub balance_cents: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            account_number: wallet.account_number,
            balance_cents: wallet.balance_cents,
            currency: wallet.currency,
            updated_at: wallet.updated_at,
        }
    }
}

/// Request to credit the caller's wallet directly.
///
/// ```json
/// {
///   "amount_cents": 500000,
///   "description": "Cash deposit"
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct DepositRequest {
    #[validate(range(min = 1))]
    pub amount_cents: i64,

    #[validate(length(max = 255))]
    pub description: Option<String>,
}

/// Request to withdraw from the caller's wallet. The withdrawal fee is
/// charged on top of `amount_cents`.
#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawRequest {
    #[validate(range(min = 1))]
    pub amount_cents: i64,

    #[validate(length(max = 255))]
    pub description: Option<String>,
}

/// Admin balance adjustment. Positive values credit, negative values debit.
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustBalanceRequest {
    pub amount_cents: i64,

    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClearBalanceRequest {
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

/// Result of a ledger operation: the wallet's new balance and the rows written.
#[derive(Debug, Serialize)]
pub struct LedgerReceipt {
    pub reference: String,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub balance_after_cents: i64,
    pub entries: Vec<TransactionResponse>,
}
