//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::gateway::GatewayError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, malformed or unknown.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Authenticated caller lacks the role for this route.
    #[error("{0}")]
    Forbidden(String),

    /// The caller's account is suspended or not yet activated.
    #[error("Account is not active")]
    AccountInactive,

    /// The operation requires an approved KYC submission.
    #[error("KYC verification must be approved before this operation")]
    KycRequired,

    /// Requested entity does not exist or is not visible to the caller.
    ///
    /// The payload is the entity name, e.g. `"wallet"`.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Balance cannot cover the amount (plus fees).
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// A daily, monthly or per-transaction limit would be exceeded.
    #[error("{0}")]
    LimitExceeded(String),

    /// Request body or parameters are invalid.
    #[error("{0}")]
    InvalidRequest(String),

    /// Request body failed declarative validation.
    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The entity is in a state that does not allow the operation.
    #[error("{0}")]
    Conflict(String),

    /// A transfer verification code was wrong or expired.
    #[error("{0}")]
    VerificationFailed(String),

    /// Webhook signature did not match the payload.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// The upstream payment gateway failed or rejected the call.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, String) {
        match self {
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key".into()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden".into()),
            AppError::AccountInactive => (StatusCode::FORBIDDEN, "account_inactive".into()),
            AppError::KycRequired => (StatusCode::FORBIDDEN, "kyc_required".into()),
            AppError::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                format!("{}_not_found", entity.replace(' ', "_")),
            ),
            AppError::InsufficientBalance => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_balance".into(),
            ),
            AppError::LimitExceeded(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "limit_exceeded".into())
            }
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request".into()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error".into()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict".into()),
            AppError::VerificationFailed(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "verification_failed".into(),
            ),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature".into()),
            AppError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error".into()),
            AppError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error".into())
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database and gateway details are logged but never sent to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal error occurred".to_string()
            }
            AppError::Gateway(e) => {
                tracing::error!(error = %e, "payment gateway error");
                "The payment provider could not process the request".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_business_errors_to_status_codes() {
        let cases = [
            (AppError::InvalidApiKey, StatusCode::UNAUTHORIZED),
            (AppError::KycRequired, StatusCode::FORBIDDEN),
            (AppError::AccountInactive, StatusCode::FORBIDDEN),
            (AppError::NotFound("wallet"), StatusCode::NOT_FOUND),
            (AppError::InsufficientBalance, StatusCode::UNPROCESSABLE_ENTITY),
            (
                AppError::LimitExceeded("daily".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::Conflict("busy".into()), StatusCode::CONFLICT),
            (AppError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (
                AppError::Gateway(GatewayError::Rejected("nope".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn not_found_code_names_the_entity() {
        let (_, code) = AppError::NotFound("support ticket").status_and_code();
        assert_eq!(code, "support_ticket_not_found");
    }

    #[tokio::test]
    async fn database_errors_hide_details() {
        let response = AppError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "internal_error");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
