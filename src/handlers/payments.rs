//! Payment gateway endpoints and the inbound webhook.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    error::AppError,
    gateway::{SIGNATURE_HEADER, WebhookEvent},
    middleware::auth::AuthContext,
    models::{
        PageParams,
        payment::{
            DepositInitiatedResponse, InitiateDepositRequest, InitiateWithdrawalRequest, Payment,
            Withdrawal,
        },
    },
    services::payment_service,
    state::AppState,
};

/// `POST /api/v1/payments/deposits`
///
/// Returns the checkout URL the customer must visit to pay.
pub async fn initiate_deposit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<InitiateDepositRequest>,
) -> Result<(StatusCode, Json<DepositInitiatedResponse>), AppError> {
    request.validate()?;

    let payment = payment_service::initiate_deposit(
        &state.pool,
        &state.gateway,
        auth.user_id,
        &auth.email,
        request.amount_cents,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(DepositInitiatedResponse {
            reference: payment.reference,
            provider: payment.provider,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            authorization_url: payment.authorization_url.unwrap_or_default(),
        }),
    ))
}

/// `GET /api/v1/payments/deposits/{reference}/verify`
pub async fn verify_deposit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(reference): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let payment =
        payment_service::verify_deposit(&state.pool, &state.gateway, auth.user_id, &reference)
            .await?;
    Ok(Json(payment))
}

/// `GET /api/v1/payments/deposits`
pub async fn list_deposits(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let payments = payment_service::list_payments(&state.pool, auth.user_id, page).await?;
    Ok(Json(payments))
}

/// `POST /api/v1/payments/withdrawals`
///
/// # Response
///
/// - **201 Created**: withdrawal `completed`, `processing` or `failed` (refunded)
/// - **403**: account inactive or KYC not approved
/// - **422**: insufficient balance or limit exceeded
/// - **502**: gateway unreachable (the debit has been refunded)
pub async fn initiate_withdrawal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<InitiateWithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), AppError> {
    request.validate()?;
    auth.ensure_can_transact()?;

    let withdrawal =
        payment_service::initiate_withdrawal(&state.pool, &state.gateway, auth.user_id, request)
            .await?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// `GET /api/v1/payments/withdrawals`
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let withdrawals = payment_service::list_withdrawals(&state.pool, auth.user_id, page).await?;
    Ok(Json(withdrawals))
}

/// Gateway webhook.
///
/// # Endpoint
///
/// `POST /api/v1/payments/webhook` (public, signature-checked)
///
/// # Security
///
/// `x-paystack-signature` must be the hex HMAC-SHA512 of the raw body.
/// Once the signature checks out the response is always 200 so the gateway
/// does not retry; processing errors are logged.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    if !state.gateway.verify_webhook_signature(&body, signature) {
        tracing::warn!("webhook rejected: signature mismatch");
        return Err(AppError::InvalidSignature);
    }

    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => {
            let name = event.event.clone();
            tracing::info!(event = %name, "webhook received");
            if let Err(e) = payment_service::handle_webhook(&state.pool, event).await {
                tracing::error!(event = %name, error = %e, "webhook processing failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "webhook body is not a valid event");
        }
    }

    Ok(Json(json!({ "status": "ok" })))
}
