//! Virtual card models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "card_brand", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "card_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Frozen,
    /// Irreversible; the remaining balance has been returned to the wallet
    Terminated,
}

/// Represents a row of the `cards` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Uuid,
    pub brand: CardBrand,
    pub pan: String,
    pub last4: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub cvv_hash: String,
    pub balance_cents: i64,
    pub currency: String,
    pub status: CardStatus,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Card as listed to its owner: PAN masked, CVV never included.
#[derive(Debug, Serialize)]
pub struct CardResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub brand: CardBrand,
    pub masked_pan: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub balance_cents: i64,
    pub currency: String,
    pub status: CardStatus,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Card> for CardResponse {
    fn from(card: Card) -> Self {
        Self {
            id: card.id,
            user_id: card.user_id,
            brand: card.brand,
            masked_pan: format!("**** **** **** {}", card.last4),
            expiry_month: card.expiry_month,
            expiry_year: card.expiry_year,
            balance_cents: card.balance_cents,
            currency: card.currency,
            status: card.status,
            label: card.label,
            created_at: card.created_at,
        }
    }
}

/// Issuance response; the only time the full PAN and CVV are shown.
#[derive(Debug, Serialize)]
pub struct IssuedCardResponse {
    pub card: CardResponse,
    pub pan: String,
    pub cvv: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct IssueCardRequest {
    pub brand: CardBrand,

    #[validate(length(min = 1, max = 40))]
    pub label: Option<String>,
}

/// Body of `POST /cards/{id}/fund` and `POST /cards/{id}/withdraw`.
#[derive(Debug, Deserialize, Validate)]
pub struct CardAmountRequest {
    #[validate(range(min = 1))]
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CardStatusRequest {
    pub status: CardStatus,
}

#[derive(Debug, Deserialize)]
pub struct CardListQuery {
    pub status: Option<CardStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
