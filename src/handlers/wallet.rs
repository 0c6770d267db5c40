//! Wallet HTTP handlers.
//!
//! - GET /api/v1/wallet - Balance
//! - GET /api/v1/wallet/transactions - Ledger history
//! - POST /api/v1/wallet/deposit - Direct credit
//! - POST /api/v1/wallet/withdraw - Debit with withdrawal fee
//! - GET /api/v1/limits - Fees, limits and current usage

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        PageParams,
        transaction::{TransactionQuery, TransactionResponse},
        wallet::{DepositRequest, LedgerReceipt, WalletResponse, WithdrawRequest},
    },
    services::{
        limits::{self, LimitOverview},
        wallet_service,
    },
};

/// `GET /api/v1/wallet`
pub async fn get_wallet(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_service::get_wallet(&pool, auth.user_id).await?;
    Ok(Json(wallet.into()))
}

/// Newest first; `?kind=fee&page=2&per_page=50`.
pub async fn list_transactions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let transactions = wallet_service::list_transactions(
        &pool,
        auth.user_id,
        query.kind,
        PageParams::new(query.page, query.per_page),
    )
    .await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

/// Credit the caller's wallet.
///
/// # Request Body
///
/// ```json
/// { "amount_cents": 500000, "description": "Cash deposit" }
/// ```
pub async fn deposit(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<LedgerReceipt>), AppError> {
    request.validate()?;

    let receipt =
        wallet_service::deposit(&pool, auth.user_id, request.amount_cents, request.description)
            .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Withdraw from the wallet.
///
/// # Response
///
/// - **201 Created**: receipt with the withdrawal and fee entries
/// - **403**: account inactive or KYC not approved
/// - **422**: insufficient balance or limit exceeded
pub async fn withdraw(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<LedgerReceipt>), AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let receipt =
        wallet_service::withdraw(&pool, auth.user_id, request.amount_cents, request.description)
            .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /api/v1/limits`
///
/// Fee and limit rules per operation with today's and this month's usage.
pub async fn get_limits(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<LimitOverview>>, AppError> {
    let mut conn = pool.acquire().await?;
    let overview = limits::overview(&mut conn, auth.user_id).await?;
    Ok(Json(overview))
}
