//! Transfer HTTP handlers.
//!
//! Internal transfers settle in the request. Domestic and international
//! transfers return `202 Accepted` with the first verification step; the
//! client then calls `POST /transfers/{id}/verify` once per step.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        PageParams,
        transfer::{
            DomesticTransferRequest, InternalTransferRequest, InternationalTransferRequest,
            Transfer, TransferInitiatedResponse, TransferQuery, TransferResponse,
            VerifyTransferRequest,
        },
    },
    services::transfer_service,
    state::AppState,
};

/// The OTP is only echoed back when the server runs in demo mode.
fn initiated(state: &AppState, transfer: Transfer, otp: String) -> TransferInitiatedResponse {
    TransferInitiatedResponse {
        transfer: transfer.into(),
        otp: state.config.demo_mode.then_some(otp),
    }
}

/// `POST /api/v1/transfers/internal`
pub async fn internal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<InternalTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let transfer = transfer_service::internal_transfer(&state.pool, auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(transfer.into())))
}

/// `POST /api/v1/transfers/domestic`
pub async fn domestic(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<DomesticTransferRequest>,
) -> Result<(StatusCode, Json<TransferInitiatedResponse>), AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let (transfer, otp) = transfer_service::initiate_domestic(
        &state.pool,
        auth.user_id,
        request,
        state.config.otp_ttl_seconds,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(initiated(&state, transfer, otp))))
}

/// `POST /api/v1/transfers/international`
pub async fn international(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<InternationalTransferRequest>,
) -> Result<(StatusCode, Json<TransferInitiatedResponse>), AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let (transfer, otp) = transfer_service::initiate_international(
        &state.pool,
        auth.user_id,
        request,
        state.config.otp_ttl_seconds,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(initiated(&state, transfer, otp))))
}

/// `POST /api/v1/transfers/{id}/verify`
///
/// ```json
/// { "code": "483920" }
/// ```
///
/// Returns the transfer with `next_step` set while more steps remain, or
/// `status: "completed"` after the last one.
pub async fn verify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(transfer_id): Path<Uuid>,
    Json(request): Json<VerifyTransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let transfer =
        transfer_service::verify(&state.pool, auth.user_id, transfer_id, &request.code).await?;
    Ok(Json(transfer.into()))
}

/// `POST /api/v1/transfers/{id}/resend-otp`
pub async fn resend_otp(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferInitiatedResponse>, AppError> {
    let (transfer, otp) = transfer_service::resend_otp(
        &state.pool,
        auth.user_id,
        transfer_id,
        state.config.otp_ttl_seconds,
    )
    .await?;

    Ok(Json(initiated(&state, transfer, otp)))
}

/// `POST /api/v1/transfers/{id}/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferResponse>, AppError> {
    let transfer = transfer_service::cancel(&state.pool, auth.user_id, transfer_id).await?;
    Ok(Json(transfer.into()))
}

/// `GET /api/v1/transfers/{id}`
pub async fn get_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferResponse>, AppError> {
    let transfer = transfer_service::get_transfer(&state.pool, auth.user_id, transfer_id).await?;
    Ok(Json(transfer.into()))
}

/// `GET /api/v1/transfers?kind=&status=&page=&per_page=`
pub async fn list_transfers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TransferQuery>,
) -> Result<Json<Vec<TransferResponse>>, AppError> {
    let transfers = transfer_service::list_transfers(
        &state.pool,
        auth.user_id,
        query.kind,
        query.status,
        PageParams::new(query.page, query.per_page),
    )
    .await?;

    Ok(Json(transfers.into_iter().map(Into::into).collect()))
}
