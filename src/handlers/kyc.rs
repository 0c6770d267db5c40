//! KYC endpoints for customers.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::kyc::{KycStatusResponse, KycSubmission, SubmitKycRequest},
    services::kyc_service::{self, CountryRequirements},
};

/// `GET /api/v1/kyc/requirements/{country}`
pub async fn requirements(Path(country): Path<String>) -> Result<Json<CountryRequirements>, AppError> {
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::InvalidRequest(
            "Country must be a two-letter ISO code".to_string(),
        ));
    }
    Ok(Json(kyc_service::requirements(&country)))
}

/// `POST /api/v1/kyc`
///
/// # Response
///
/// - **201 Created**: submission stored, KYC now `pending`
/// - **400**: missing or malformed fields/documents (all problems listed)
/// - **409**: a submission is already pending or approved
pub async fn submit(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SubmitKycRequest>,
) -> Result<(StatusCode, Json<KycSubmission>), AppError> {
    request.validate()?;

    let submission = kyc_service::submit(
        &pool,
        auth.user_id,
        &request.country,
        request.fields,
        request.documents,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

/// `GET /api/v1/kyc`
pub async fn status(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<KycStatusResponse>, AppError> {
    Ok(Json(kyc_service::status(&pool, auth.user_id).await?))
}
