//! Registration and profile endpoints.

use axum::{Extension, Json, extract::State, http::StatusCode};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::user::{ProfileResponse, RegisterRequest, RegisterResponse},
    services::user_service,
    state::AppState,
};

/// Create a user and wallet.
///
/// # Endpoint
///
/// `POST /api/v1/users/register` (public)
///
/// # Response
///
/// - **201 Created**: user, wallet and the API key (shown only once)
/// - **400**: validation error
/// - **409**: email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    request.validate()?;

    let (user, wallet, api_key) = user_service::register(
        &state.pool,
        &request.email,
        &request.full_name,
        &request.country,
        &state.config.default_currency,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            wallet: wallet.into(),
            api_key,
        }),
    ))
}

/// `GET /api/v1/me`
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = user_service::get_user(&state.pool, auth.user_id).await?;
    let wallet = user_service::get_wallet(&state.pool, auth.user_id).await?;

    Ok(Json(ProfileResponse {
        user: user.into(),
        wallet: wallet.into(),
    }))
}
