//! Admin tooling. Every route here sits behind `require_admin`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        PageParams,
        card::{CardListQuery, CardResponse, CardStatusRequest},
        kyc::{KycSubmission, ReviewKycRequest},
        support::{SupportMessage, SupportTicket, TicketQuery, TicketReplyRequest, TicketStatusRequest},
        transaction::TransactionResponse,
        user::{
            ProfileResponse, TransferCodesRequest, TransferCodesResponse, UpdateUserStatusRequest,
            UserListQuery, UserResponse,
        },
        wallet::{AdjustBalanceRequest, ClearBalanceRequest},
    },
    services::{card_service, kyc_service, support_service, user_service, wallet_service},
};

/// `GET /api/v1/admin/users?status=pending`
pub async fn list_users(
    State(pool): State<DbPool>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users =
        user_service::list_users(&pool, query.status, PageParams::new(query.page, query.per_page))
            .await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// `GET /api/v1/admin/users/{id}`
pub async fn get_user(
    State(pool): State<DbPool>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = user_service::get_user(&pool, user_id).await?;
    let wallet = user_service::get_wallet(&pool, user_id).await?;
    Ok(Json(ProfileResponse {
        user: user.into(),
        wallet: wallet.into(),
    }))
}

/// `POST /api/v1/admin/users/{id}/status`
///
/// ```json
/// { "status": "suspended" }
/// ```
pub async fn set_user_status(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserStatusRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user_service::set_status(&pool, admin.user_id, user_id, request.status).await?;
    Ok(Json(user.into()))
}

/// `PUT /api/v1/admin/users/{id}/transfer-codes`
///
/// Replaces the codes international transfers must pass after the OTP,
/// checked in list order.
///
/// ```json
/// { "codes": [{ "name": "cot", "code": "COT-4471" }, { "name": "imf", "code": "IMF-0192" }] }
/// ```
pub async fn set_transfer_codes(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<TransferCodesRequest>,
) -> Result<Json<TransferCodesResponse>, AppError> {
    request.validate()?;

    let steps = user_service::set_transfer_codes(&pool, user_id, &request.codes).await?;
    tracing::info!(admin_id = %admin.user_id, %user_id, "transfer codes updated by admin");

    Ok(Json(TransferCodesResponse { user_id, steps }))
}

/// `POST /api/v1/admin/users/{id}/wallet/adjust`
pub async fn adjust_balance(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AdjustBalanceRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    request.validate()?;

    let transaction = wallet_service::adjust_balance(
        &pool,
        admin.user_id,
        user_id,
        request.amount_cents,
        request.reason.trim(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

#[derive(Debug, Serialize)]
pub struct ClearBalanceResponse {
    pub cleared: bool,
    pub transaction: Option<TransactionResponse>,
}

/// `POST /api/v1/admin/users/{id}/wallet/clear`. A zero balance is a no-op.
pub async fn clear_balance(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ClearBalanceRequest>,
) -> Result<Json<ClearBalanceResponse>, AppError> {
    request.validate()?;

    let transaction =
        wallet_service::clear_balance(&pool, admin.user_id, user_id, request.reason.trim()).await?;

    Ok(Json(ClearBalanceResponse {
        cleared: transaction.is_some(),
        transaction: transaction.map(Into::into),
    }))
}

/// `GET /api/v1/admin/kyc/pending`
///
/// Oldest submissions first.
pub async fn list_pending_kyc(
    State(pool): State<DbPool>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<KycSubmission>>, AppError> {
    Ok(Json(kyc_service::list_pending(&pool, page).await?))
}

/// `POST /api/v1/admin/kyc/{id}/review`
///
/// ```json
/// { "decision": "reject", "reason": "Selfie does not match ID photo" }
/// ```
pub async fn review_kyc(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(submission_id): Path<Uuid>,
    Json(request): Json<ReviewKycRequest>,
) -> Result<Json<KycSubmission>, AppError> {
    request.validate()?;

    let submission = kyc_service::review(
        &pool,
        admin.user_id,
        submission_id,
        request.decision,
        request.reason,
    )
    .await?;

    Ok(Json(submission))
}

/// `GET /api/v1/admin/cards`
///
/// Cards of every user, PANs masked.
pub async fn list_cards(
    State(pool): State<DbPool>,
    Query(query): Query<CardListQuery>,
) -> Result<Json<Vec<CardResponse>>, AppError> {
    let cards =
        card_service::list_all(&pool, query.status, PageParams::new(query.page, query.per_page))
            .await?;
    Ok(Json(cards.into_iter().map(Into::into).collect()))
}

/// `POST /api/v1/admin/cards/{id}/status`
///
/// Terminated cards cannot be changed again (409).
pub async fn set_card_status(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<CardStatusRequest>,
) -> Result<Json<CardResponse>, AppError> {
    let card = card_service::admin_set_status(&pool, admin.user_id, card_id, request.status).await?;
    Ok(Json(card.into()))
}

/// `GET /api/v1/admin/support/tickets?status=open`
pub async fn list_tickets(
    State(pool): State<DbPool>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<SupportTicket>>, AppError> {
    let tickets =
        support_service::list_all(&pool, query.status, PageParams::new(query.page, query.per_page))
            .await?;
    Ok(Json(tickets))
}

/// `POST /api/v1/admin/support/tickets/{id}/messages`
///
/// A staff reply moves an open ticket to `in_progress`.
pub async fn reply_ticket(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TicketReplyRequest>,
) -> Result<(StatusCode, Json<SupportMessage>), AppError> {
    request.validate()?;
    let message = support_service::staff_reply(&pool, admin.user_id, ticket_id, &request.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /api/v1/admin/support/tickets/{id}/status`
pub async fn set_ticket_status(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TicketStatusRequest>,
) -> Result<Json<SupportTicket>, AppError> {
    let ticket =
        support_service::set_status(&pool, admin.user_id, ticket_id, request.status).await?;
    Ok(Json(ticket))
}
