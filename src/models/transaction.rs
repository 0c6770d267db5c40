//! Ledger entry models.
//!
//! Every balance change writes exactly one row to `transactions`, carrying
//! the wallet balance after the change so history can be audited without
//! replaying it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Fee,
    CardFunding,
    CardWithdrawal,
    Adjustment,
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entry_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

/// Represents a row of the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: TransactionKind,
    pub direction: EntryDirection,

    /// Always positive; `direction` carries the sign
    pub amount_cents: i64,

    pub balance_after_cents: i64,
    pub status: TransactionStatus,

    /// Unique per entry; related entries share a prefix (`TRF_..-OUT`, `TRF_..-FEE`)
    pub reference: String,

    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Entry to be written by the ledger.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: TransactionKind,
    pub direction: EntryDirection,
    pub amount_cents: i64,
    pub status: TransactionStatus,
    pub reference: String,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewEntry {
    pub fn credit(kind: TransactionKind, amount_cents: i64, reference: impl Into<String>) -> Self {
        Self {
            kind,
            direction: EntryDirection::Credit,
            amount_cents,
            status: TransactionStatus::Completed,
            reference: reference.into(),
            description: None,
            metadata: None,
        }
    }

    pub fn debit(kind: TransactionKind, amount_cents: i64, reference: impl Into<String>) -> Self {
        Self {
            direction: EntryDirection::Debit,
            ..Self::credit(kind, amount_cents, reference)
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub direction: EntryDirection,
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    pub status: TransactionStatus,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            kind: transaction.kind,
            direction: transaction.direction,
            amount_cents: transaction.amount_cents,
            balance_after_cents: transaction.balance_after_cents,
            status: transaction.status,
            reference: transaction.reference,
            description: transaction.description,
            created_at: transaction.created_at,
        }
    }
}

/// `GET /api/v1/wallet/transactions` query.
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub kind: Option<TransactionKind>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
