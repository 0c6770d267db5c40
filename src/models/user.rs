//! User model, roles and lifecycle statuses.
//!
//! A user owns exactly one wallet and authenticates with an API key whose
//! SHA-256 hash is stored in `users.api_key_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::wallet::WalletResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

/// Account lifecycle. New users stay `Pending` until KYC approval activates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "kyc_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

/// Represents a row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub kyc_status: KycStatus,
    pub api_key_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/users/register`.
///
/// ```json
/// {
///   "email": "ada@example.com",
///   "full_name": "Ada Obi",
///   "country": "NG"
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 120))]
    pub full_name: String,

    #[validate(custom(function = "crate::models::validate_country_code"))]
    pub country: String,
}

/// Public view of a user (no key hash).
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub country: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            country: user.country,
            role: user.role,
            status: user.status,
            kyc_status: user.kyc_status,
            created_at: user.created_at,
        }
    }
}

/// Returned once by registration. The API key cannot be recovered later.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    pub wallet: WalletResponse,
    pub api_key: String,
}

/// `GET /api/v1/me`
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub wallet: WalletResponse,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub status: Option<UserStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub status: UserStatus,
}

/// One admin-assigned verification code for international transfers.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TransferCodeInput {
    #[validate(length(min = 2, max = 32))]
    pub name: String,

    #[validate(length(min = 4, max = 32))]
    pub code: String,
}

/// `PUT /api/v1/admin/users/{id}/transfer-codes`. Codes are checked in list order.
#[derive(Debug, Deserialize, Validate)]
pub struct TransferCodesRequest {
    #[validate(length(max = 5), nested)]
    pub codes: Vec<TransferCodeInput>,
}

#[derive(Debug, Serialize)]
pub struct TransferCodesResponse {
    pub user_id: Uuid,
    pub steps: Vec<String>,
}
