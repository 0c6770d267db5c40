//! User registration, lookup and admin account management.

use uuid::Uuid;

use crate::{
    crypto,
    db::DbPool,
    error::AppError,
    models::{
        PageParams,
        user::{KycStatus, TransferCodeInput, User, UserStatus},
        wallet::Wallet,
    },
    services::{notification_service, verification::OTP_STEP},
};

const ACCOUNT_NUMBER_ATTEMPTS: usize = 5;

/// Money can only move for active users whose KYC has been approved.
pub fn ensure_can_transact(status: UserStatus, kyc_status: KycStatus) -> Result<(), AppError> {
    if status != UserStatus::Active {
        return Err(AppError::AccountInactive);
    }
    if kyc_status != KycStatus::Approved {
        return Err(AppError::KycRequired);
    }
    Ok(())
}

async fn fresh_account_number(tx: &mut sqlx::PgConnection) -> Result<String, AppError> {
    for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
        let candidate = crypto::random_digits(10);
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM wallets WHERE account_number = $1)")
                .bind(&candidate)
                .fetch_one(&mut *tx)
                .await?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(
        "Could not allocate an account number, please retry".to_string(),
    ))
}

async fn insert_user_with_wallet(
    tx: &mut sqlx::PgConnection,
    email: &str,
    full_name: &str,
    country: &str,
    api_key_hash: &str,
    currency: &str,
    admin: bool,
) -> Result<(User, Wallet), AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, full_name, country, role, status, kyc_status, api_key_hash)
        VALUES (
            $1, $2, $3,
            CASE WHEN $4 THEN 'admin'::user_role ELSE 'user'::user_role END,
            CASE WHEN $4 THEN 'active'::user_status ELSE 'pending'::user_status END,
            CASE WHEN $4 THEN 'approved'::kyc_status ELSE 'not_submitted'::kyc_status END,
            $5
        )
        RETURNING *
        "#,
    )
    .bind(email)
    .bind(full_name)
    .bind(country)
    .bind(admin)
    .bind(api_key_hash)
    .fetch_one(&mut *tx)
    .await?;

    let account_number = fresh_account_number(tx).await?;

    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (user_id, account_number, currency)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&account_number)
    .bind(currency)
    .fetch_one(&mut *tx)
    .await?;

    Ok((user, wallet))
}

/// Create a user, their wallet and an API key.
///
/// # Returns
///
/// The user, the wallet and the plain API key (shown only once).
///
/// # Errors
///
/// - `Conflict`: email already registered
pub async fn register(
    pool: &DbPool,
    email: &str,
    full_name: &str,
    country: &str,
    currency: &str,
) -> Result<(User, Wallet, String), AppError> {
    let email = email.trim().to_lowercase();
    let country = country.trim().to_uppercase();

    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;
    if exists {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let api_key = crypto::generate_api_key();
    let (user, wallet) = insert_user_with_wallet(
        &mut tx,
        &email,
        full_name.trim(),
        &country,
        &crypto::sha256_hex(&api_key),
        currency,
        false,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, account_number = %wallet.account_number, "user registered");

    notification_service::notify(
        pool,
        user.id,
        "Welcome",
        "Your wallet is ready. Complete KYC verification to activate your account.",
    )
    .await;

    Ok((user, wallet, api_key))
}

/// Ensure an admin identified by `api_key` exists. Used at startup.
pub async fn bootstrap_admin(pool: &DbPool, api_key: &str, currency: &str) -> Result<(), AppError> {
    let key_hash = crypto::sha256_hex(api_key);

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE api_key_hash = $1)")
            .bind(&key_hash)
            .fetch_one(pool)
            .await?;
    if exists {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    let (admin, _) = insert_user_with_wallet(
        &mut tx,
        &format!("admin+{}@bank.local", &key_hash[..8]),
        "Administrator",
        "NG",
        &key_hash,
        currency,
        true,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %admin.id, "bootstrap admin created");
    Ok(())
}

pub async fn get_user(pool: &DbPool, user_id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("user"))
}

pub async fn get_wallet(pool: &DbPool, user_id: Uuid) -> Result<Wallet, AppError> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("wallet"))
}

pub async fn list_users(
    pool: &DbPool,
    status: Option<UserStatus>,
    page: PageParams,
) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE ($1::user_status IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Activate or suspend a user.
///
/// # Errors
///
/// - `InvalidRequest`: target status is `pending`, or an admin targets themselves
pub async fn set_status(
    pool: &DbPool,
    admin_id: Uuid,
    user_id: Uuid,
    status: UserStatus,
) -> Result<User, AppError> {
    if status == UserStatus::Pending {
        return Err(AppError::InvalidRequest(
            "Users can only be set to active or suspended".to_string(),
        ));
    }
    if admin_id == user_id {
        return Err(AppError::InvalidRequest(
            "Administrators cannot change their own status".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("user"))?;

    tracing::info!(%admin_id, %user_id, ?status, "user status changed");

    let body = match status {
        UserStatus::Suspended => "Your account has been suspended. Contact support for help.",
        _ => "Your account is active.",
    };
    notification_service::notify(pool, user_id, "Account status updated", body).await;

    Ok(user)
}

/// Check step names before replacing a user's transfer codes.
pub fn validate_transfer_codes(codes: &[TransferCodeInput]) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::new();
    for code in codes {
        let name = code.name.trim().to_lowercase();
        if name == OTP_STEP {
            return Err(AppError::InvalidRequest(format!(
                "'{OTP_STEP}' is reserved for one-time passwords"
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::InvalidRequest(format!(
                "Step name '{name}' may only contain letters, digits and underscores"
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(AppError::InvalidRequest(format!(
                "Duplicate step name '{name}'"
            )));
        }
    }
    Ok(())
}

/// Replace the ordered international transfer codes for `user_id`.
///
/// Returns the step names in order. An empty list removes all codes.
pub async fn set_transfer_codes(
    pool: &DbPool,
    user_id: Uuid,
    codes: &[TransferCodeInput],
) -> Result<Vec<String>, AppError> {
    validate_transfer_codes(codes)?;

    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(AppError::NotFound("user"));
    }

    sqlx::query("DELETE FROM transfer_codes WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let mut steps = Vec::with_capacity(codes.len());
    for (position, code) in codes.iter().enumerate() {
        let name = code.name.trim().to_lowercase();
        sqlx::query(
            "INSERT INTO transfer_codes (user_id, step_name, code_hash, position) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(&name)
        .bind(crypto::sha256_hex(code.code.trim()))
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
        steps.push(name);
    }

    tx.commit().await?;

    tracing::info!(%user_id, steps = steps.len(), "transfer codes replaced");
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(name: &str) -> TransferCodeInput {
        TransferCodeInput {
            name: name.to_string(),
            code: "1234".to_string(),
        }
    }

    #[test]
    fn kyc_must_be_approved_before_transacting() {
        assert!(matches!(
            ensure_can_transact(UserStatus::Active, KycStatus::Pending),
            Err(AppError::KycRequired)
        ));
        assert!(matches!(
            ensure_can_transact(UserStatus::Active, KycStatus::Rejected),
            Err(AppError::KycRequired)
        ));
        assert!(ensure_can_transact(UserStatus::Active, KycStatus::Approved).is_ok());
    }

    #[test]
    fn inactive_accounts_cannot_transact() {
        assert!(matches!(
            ensure_can_transact(UserStatus::Suspended, KycStatus::Approved),
            Err(AppError::AccountInactive)
        ));
        assert!(matches!(
            ensure_can_transact(UserStatus::Pending, KycStatus::Approved),
            Err(AppError::AccountInactive)
        ));
    }

    #[test]
    fn transfer_codes_reject_reserved_and_duplicate_names() {
        assert!(validate_transfer_codes(&[code("cot"), code("imf")]).is_ok());
        assert!(validate_transfer_codes(&[code("OTP")]).is_err());
        assert!(validate_transfer_codes(&[code("cot"), code("COT")]).is_err());
        assert!(validate_transfer_codes(&[code("tax code")]).is_err());
    }
}
