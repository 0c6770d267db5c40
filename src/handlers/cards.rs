//! Virtual card endpoints.

use axum::{
    Extension, Json,
    extract::{Path, State},
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
        card::{CardAmountRequest, CardResponse, IssueCardRequest, IssuedCardResponse},
        wallet::LedgerReceipt,
    },
    services::card_service,
};

/// Card plus the wallet ledger receipt of a funding or withdrawal.
#[derive(Debug, Serialize)]
pub struct CardMovementResponse {
    pub card: CardResponse,
    pub receipt: LedgerReceipt,
}

/// `POST /api/v1/cards`
///
/// The full PAN and CVV are returned only in this response.
pub async fn issue(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<IssueCardRequest>,
) -> Result<(StatusCode, Json<IssuedCardResponse>), AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let (card, cvv) = card_service::issue(&pool, auth.user_id, request.brand, request.label).await?;
    let pan = card.pan.clone();

    Ok((
        StatusCode::CREATED,
        Json(IssuedCardResponse {
            card: card.into(),
            pan,
            cvv,
        }),
    ))
}

/// `GET /api/v1/cards`
pub async fn list_cards(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<CardResponse>>, AppError> {
    let cards = card_service::list_cards(&pool, auth.user_id).await?;
    Ok(Json(cards.into_iter().map(Into::into).collect()))
}

/// `GET /api/v1/cards/{id}`. Cards of other users are 404.
pub async fn get_card(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardResponse>, AppError> {
    let card = card_service::get_card(&pool, auth.user_id, card_id).await?;
    Ok(Json(card.into()))
}

/// `POST /api/v1/cards/{id}/fund`
pub async fn fund(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<CardAmountRequest>,
) -> Result<Json<CardMovementResponse>, AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let (card, receipt) = card_service::fund(&pool, auth.user_id, card_id, request.amount_cents).await?;
    Ok(Json(CardMovementResponse {
        card: card.into(),
        receipt,
    }))
}

/// `POST /api/v1/cards/{id}/withdraw`
pub async fn withdraw(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<CardAmountRequest>,
) -> Result<Json<CardMovementResponse>, AppError> {
    request.validate()?;

    let (card, receipt) =
        card_service::withdraw(&pool, auth.user_id, card_id, request.amount_cents).await?;
    Ok(Json(CardMovementResponse {
        card: card.into(),
        receipt,
    }))
}

/// `POST /api/v1/cards/{id}/freeze`
pub async fn freeze(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardResponse>, AppError> {
    Ok(Json(card_service::freeze(&pool, auth.user_id, card_id).await?.into()))
}

/// `POST /api/v1/cards/{id}/unfreeze`
pub async fn unfreeze(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardResponse>, AppError> {
    Ok(Json(card_service::unfreeze(&pool, auth.user_id, card_id).await?.into()))
}

/// `POST /api/v1/cards/{id}/terminate`. Any remaining balance returns to the wallet.
pub async fn terminate(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardResponse>, AppError> {
    Ok(Json(card_service::terminate(&pool, auth.user_id, card_id).await?.into()))
}
