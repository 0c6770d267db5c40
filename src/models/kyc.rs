//! KYC submission models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::models::user::KycStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "kyc_submission_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KycSubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    NationalId,
    DriversLicense,
    ProofOfAddress,
    Selfie,
}

/// A document reference. Uploads happen elsewhere; only the storage
/// reference (object key or URL) is recorded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycDocument {
    pub document_type: DocumentType,
    pub reference: String,
}

/// Represents a row of the `kyc_submissions` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct KycSubmission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub country: String,
    pub fields: Json<BTreeMap<String, String>>,
    pub documents: Json<Vec<KycDocument>>,
    pub status: KycSubmissionStatus,
    pub reviewer_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// `POST /api/v1/kyc`
///
/// ```json
/// {
///   "country": "NG",
///   "fields": { "bvn": "12345678901", "date_of_birth": "1990-04-01", ... },
///   "documents": [{ "document_type": "national_id", "reference": "uploads/abc.jpg" }]
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitKycRequest {
    /// Must match the country the user registered with
    #[validate(custom(function = "crate::models::validate_country_code"))]
    pub country: String,

    pub fields: BTreeMap<String, String>,

    #[validate(length(min = 1, max = 10))]
    pub documents: Vec<KycDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycDecision {
    Approve,
    Reject,
}

/// `POST /api/v1/admin/kyc/{id}/review`
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewKycRequest {
    pub decision: KycDecision,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// `GET /api/v1/kyc`: the user's KYC state and latest submission.
#[derive(Debug, Serialize)]
pub struct KycStatusResponse {
    pub kyc_status: KycStatus,
    pub submission: Option<KycSubmission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_country_must_be_an_iso_code() {
        let request: SubmitKycRequest = serde_json::from_str(
            r#"{"country":"1!","fields":{},"documents":[{"document_type":"passport","reference":"uploads/p.jpg"}]}"#,
        )
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("country"));
    }
}
