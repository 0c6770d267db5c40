//! KYC requirements, submissions and admin review.
//!
//! Each supported country declares the identity fields it needs (with a
//! format rule each) and groups of acceptable documents; one document from
//! every group must be supplied. Unknown countries fall back to a generic
//! passport-based rule set.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        PageParams,
        kyc::{
            DocumentType, KycDecision, KycDocument, KycStatusResponse, KycSubmission,
            KycSubmissionStatus,
        },
        user::KycStatus,
    },
    services::notification_service,
};

const MINIMUM_AGE: i32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldFormat {
    Digits { min: usize, max: usize },
    /// Letters, digits and hyphens
    Alphanumeric { min: usize, max: usize },
    Text { min: usize, max: usize },
    /// `YYYY-MM-DD`, holder at least 18 years old
    DateOfBirth,
    /// Optional leading `+`, then 7 to 15 digits
    Phone,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldRule {
    pub name: &'static str,
    pub label: &'static str,
    pub format: FieldFormat,
}

/// One of `any_of` must be supplied.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DocumentGroup {
    pub any_of: &'static [DocumentType],
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryRequirements {
    pub country: String,
    pub fields: &'static [FieldRule],
    pub documents: &'static [DocumentGroup],
}

const DATE_OF_BIRTH: FieldRule = FieldRule {
    name: "date_of_birth",
    label: "Date of birth",
    format: FieldFormat::DateOfBirth,
};
const ADDRESS: FieldRule = FieldRule {
    name: "address",
    label: "Residential address",
    format: FieldFormat::Text { min: 5, max: 200 },
};
const PHONE: FieldRule = FieldRule {
    name: "phone",
    label: "Phone number",
    format: FieldFormat::Phone,
};

const SELFIE: DocumentGroup = DocumentGroup {
    any_of: &[DocumentType::Selfie],
};
const PROOF_OF_ADDRESS: DocumentGroup = DocumentGroup {
    any_of: &[DocumentType::ProofOfAddress],
};

const NG_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: "bvn",
        label: "Bank Verification Number",
        format: FieldFormat::Digits { min: 11, max: 11 },
    },
    FieldRule {
        name: "nin",
        label: "National Identification Number",
        format: FieldFormat::Digits { min: 11, max: 11 },
    },
    DATE_OF_BIRTH,
    ADDRESS,
    PHONE,
];

const GH_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: "ghana_card_number",
        label: "Ghana Card number",
        format: FieldFormat::Alphanumeric { min: 13, max: 15 },
    },
    DATE_OF_BIRTH,
    ADDRESS,
    PHONE,
];

const KE_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: "national_id_number",
        label: "National ID number",
        format: FieldFormat::Digits { min: 7, max: 8 },
    },
    FieldRule {
        name: "kra_pin",
        label: "KRA PIN",
        format: FieldFormat::Alphanumeric { min: 11, max: 11 },
    },
    DATE_OF_BIRTH,
    ADDRESS,
    PHONE,
];

const US_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: "ssn_last4",
        label: "Last 4 digits of SSN",
        format: FieldFormat::Digits { min: 4, max: 4 },
    },
    FieldRule {
        name: "zip_code",
        label: "ZIP code",
        format: FieldFormat::Digits { min: 5, max: 5 },
    },
    DATE_OF_BIRTH,
    ADDRESS,
    PHONE,
];

const GB_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: "national_insurance_number",
        label: "National Insurance number",
        format: FieldFormat::Alphanumeric { min: 9, max: 9 },
    },
    FieldRule {
        name: "postcode",
        label: "Postcode",
        format: FieldFormat::Text { min: 5, max: 8 },
    },
    DATE_OF_BIRTH,
    ADDRESS,
    PHONE,
];

const DEFAULT_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: "id_number",
        label: "Government ID number",
        format: FieldFormat::Alphanumeric { min: 5, max: 20 },
    },
    DATE_OF_BIRTH,
    ADDRESS,
    PHONE,
];

const AFRICA_DOCUMENTS: &[DocumentGroup] = &[
    DocumentGroup {
        any_of: &[
            DocumentType::NationalId,
            DocumentType::Passport,
            DocumentType::DriversLicense,
        ],
    },
    SELFIE,
];

const WESTERN_DOCUMENTS: &[DocumentGroup] = &[
    DocumentGroup {
        any_of: &[DocumentType::Passport, DocumentType::DriversLicense],
    },
    PROOF_OF_ADDRESS,
];

const DEFAULT_DOCUMENTS: &[DocumentGroup] = &[
    DocumentGroup {
        any_of: &[DocumentType::Passport],
    },
    SELFIE,
    PROOF_OF_ADDRESS,
];

/// Requirement set for an ISO 3166-1 alpha-2 country code.
pub fn requirements(country: &str) -> CountryRequirements {
    let country = country.trim().to_uppercase();
    let (fields, documents) = match country.as_str() {
        "NG" => (NG_FIELDS, AFRICA_DOCUMENTS),
        "GH" => (GH_FIELDS, AFRICA_DOCUMENTS),
        "KE" => (KE_FIELDS, AFRICA_DOCUMENTS),
        "US" => (US_FIELDS, WESTERN_DOCUMENTS),
        "GB" => (GB_FIELDS, WESTERN_DOCUMENTS),
        _ => (DEFAULT_FIELDS, DEFAULT_DOCUMENTS),
    };
    CountryRequirements {
        country,
        fields,
        documents,
    }
}

fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Problem with `value` under `format`, if any.
fn check_format(format: FieldFormat, value: &str, today: NaiveDate) -> Option<String> {
    let len = value.chars().count();
    match format {
        FieldFormat::Digits { min, max } => {
            if !value.chars().all(|c| c.is_ascii_digit()) {
                Some("must contain only digits".to_string())
            } else if len < min || len > max {
                Some(length_message(min, max, "digits"))
            } else {
                None
            }
        }
        FieldFormat::Alphanumeric { min, max } => {
            if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                Some("must contain only letters, digits or hyphens".to_string())
            } else if len < min || len > max {
                Some(length_message(min, max, "characters"))
            } else {
                None
            }
        }
        FieldFormat::Text { min, max } => {
            (len < min || len > max).then(|| length_message(min, max, "characters"))
        }
        FieldFormat::DateOfBirth => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Err(_) => Some("must be a date in YYYY-MM-DD format".to_string()),
            Ok(birth) if birth > today => Some("cannot be in the future".to_string()),
            Ok(birth) if age_on(birth, today) < MINIMUM_AGE => {
                Some(format!("holder must be at least {MINIMUM_AGE} years old"))
            }
            Ok(_) => None,
        },
        FieldFormat::Phone => {
            let digits = value.strip_prefix('+').unwrap_or(value);
            let valid = digits.chars().all(|c| c.is_ascii_digit())
                && (7..=15).contains(&digits.len());
            (!valid).then(|| "must be 7 to 15 digits, optionally starting with +".to_string())
        }
    }
}

fn length_message(min: usize, max: usize, unit: &str) -> String {
    if min == max {
        format!("must be exactly {min} {unit}")
    } else {
        format!("must be {min} to {max} {unit}")
    }
}

/// Check a submission against the country's requirements, reporting every
/// problem at once.
pub fn validate_submission(
    requirements: &CountryRequirements,
    fields: &BTreeMap<String, String>,
    documents: &[KycDocument],
    today: NaiveDate,
) -> Result<(), AppError> {
    let mut problems = Vec::new();

    for rule in requirements.fields {
        match fields.get(rule.name).map(|v| v.trim()) {
            None | Some("") => problems.push(format!("{} is required", rule.label)),
            Some(value) => {
                if let Some(problem) = check_format(rule.format, value, today) {
                    problems.push(format!("{} {problem}", rule.label));
                }
            }
        }
    }

    if let Some(empty) = documents.iter().find(|d| d.reference.trim().is_empty()) {
        problems.push(format!(
            "Document {:?} is missing its reference",
            empty.document_type
        ));
    }

    for group in requirements.documents {
        let supplied = documents
            .iter()
            .any(|d| group.any_of.contains(&d.document_type) && !d.reference.trim().is_empty());
        if !supplied {
            let names: Vec<String> = group
                .any_of
                .iter()
                .map(|t| format!("{t:?}"))
                .collect();
            problems.push(format!("One of these documents is required: {}", names.join(", ")));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(problems.join("; ")))
    }
}

/// The submitted country must be the one on the user's profile; rules are
/// picked by country, so a mismatch would let a user choose laxer checks.
pub fn ensure_registered_country(registered: &str, submitted: &str) -> Result<(), AppError> {
    if registered.eq_ignore_ascii_case(submitted.trim()) {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(format!(
            "KYC country {} does not match registered country {}",
            submitted.trim(),
            registered
        )))
    }
}

/// Store a submission for review and mark the user's KYC pending.
///
/// Requirements come from the user's registered country.
///
/// # Errors
///
/// - `InvalidRequest`: country mismatch, missing or malformed fields/documents
/// - `Conflict`: a submission is already pending or approved
pub async fn submit(
    pool: &DbPool,
    user_id: Uuid,
    country: &str,
    fields: BTreeMap<String, String>,
    documents: Vec<KycDocument>,
) -> Result<KycSubmission, AppError> {
    let mut tx = pool.begin().await?;

    let (current, registered_country): (KycStatus, String) =
        sqlx::query_as("SELECT kyc_status, country FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("user"))?;
    match current {
        KycStatus::Pending => {
            return Err(AppError::Conflict(
                "A KYC submission is already under review".to_string(),
            ));
        }
        KycStatus::Approved => {
            return Err(AppError::Conflict("KYC is already approved".to_string()));
        }
        KycStatus::NotSubmitted | KycStatus::Rejected => {}
    }

    ensure_registered_country(&registered_country, country)?;
    let requirements = requirements(&registered_country);
    validate_submission(&requirements, &fields, &documents, Utc::now().date_naive())?;

    let fields: BTreeMap<String, String> = fields
        .into_iter()
        .map(|(k, v)| (k, v.trim().to_string()))
        .collect();

    let submission = sqlx::query_as::<_, KycSubmission>(
        r#"
        INSERT INTO kyc_submissions (user_id, country, fields, documents)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&requirements.country)
    .bind(Json(fields))
    .bind(Json(documents))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET kyc_status = 'pending', updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(%user_id, submission_id = %submission.id, country = %submission.country, "KYC submitted");
    Ok(submission)
}

pub async fn status(pool: &DbPool, user_id: Uuid) -> Result<KycStatusResponse, AppError> {
    let kyc_status: KycStatus = sqlx::query_scalar("SELECT kyc_status FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let submission = sqlx::query_as::<_, KycSubmission>(
        "SELECT * FROM kyc_submissions WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(KycStatusResponse {
        kyc_status,
        submission,
    })
}

/// Oldest first, so reviewers work the queue in order.
pub async fn list_pending(pool: &DbPool, page: PageParams) -> Result<Vec<KycSubmission>, AppError> {
    let submissions = sqlx::query_as::<_, KycSubmission>(
        r#"
        SELECT * FROM kyc_submissions
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(submissions)
}

/// Approve or reject a pending submission.
///
/// Approval also activates a `pending` account. Rejection requires a reason.
pub async fn review(
    pool: &DbPool,
    reviewer_id: Uuid,
    submission_id: Uuid,
    decision: KycDecision,
    reason: Option<String>,
) -> Result<KycSubmission, AppError> {
    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    if decision == KycDecision::Reject && reason.is_none() {
        return Err(AppError::InvalidRequest(
            "A reason is required to reject a submission".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let submission = sqlx::query_as::<_, KycSubmission>(
        "SELECT * FROM kyc_submissions WHERE id = $1 FOR UPDATE",
    )
    .bind(submission_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("KYC submission"))?;

    if submission.status != KycSubmissionStatus::Pending {
        return Err(AppError::Conflict(
            "Submission has already been reviewed".to_string(),
        ));
    }

    let (submission_status, user_kyc) = match decision {
        KycDecision::Approve => (KycSubmissionStatus::Approved, KycStatus::Approved),
        KycDecision::Reject => (KycSubmissionStatus::Rejected, KycStatus::Rejected),
    };

    let reviewed = sqlx::query_as::<_, KycSubmission>(
        r#"
        UPDATE kyc_submissions
        SET status = $2, reviewer_id = $3, rejection_reason = $4, reviewed_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(submission.id)
    .bind(submission_status)
    .bind(reviewer_id)
    .bind(&reason)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE users
        SET kyc_status = $2,
            status = CASE WHEN $2 = 'approved'::kyc_status AND status = 'pending' THEN 'active'::user_status ELSE status END,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(submission.user_id)
    .bind(user_kyc)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%reviewer_id, %submission_id, ?decision, "KYC reviewed");

    let (title, body) = match decision {
        KycDecision::Approve => (
            "KYC approved",
            "Your identity has been verified. Your account is now fully active.".to_string(),
        ),
        KycDecision::Reject => (
            "KYC rejected",
            format!(
                "Your KYC submission was rejected: {}. You can submit again.",
                reason.as_deref().unwrap_or_default()
            ),
        ),
    };
    notification_service::notify(pool, reviewed.user_id, title, &body).await;

    Ok(reviewed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use sqlx::PgPool;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn nigerian_fields() -> BTreeMap<String, String> {
        [
            ("bvn", "22123456789"),
            ("nin", "12345678901"),
            ("date_of_birth", "1990-04-01"),
            ("address", "12 Marina Road, Lagos"),
            ("phone", "+2348012345678"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn doc(document_type: DocumentType) -> KycDocument {
        KycDocument {
            document_type,
            reference: "uploads/doc.jpg".to_string(),
        }
    }

    #[test]
    fn accepts_complete_nigerian_submission() {
        let result = validate_submission(
            &requirements("ng"),
            &nigerian_fields(),
            &[doc(DocumentType::NationalId), doc(DocumentType::Selfie)],
            today(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn reports_missing_and_malformed_fields() {
        let mut fields = nigerian_fields();
        fields.remove("nin");
        fields.insert("bvn".into(), "12AB".into());

        let err = validate_submission(
            &requirements("NG"),
            &fields,
            &[doc(DocumentType::Passport), doc(DocumentType::Selfie)],
            today(),
        )
        .unwrap_err()
        .to_string();

        assert!(err.contains("National Identification Number is required"));
        assert!(err.contains("Bank Verification Number must contain only digits"));
    }

    #[test]
    fn requires_one_document_from_each_group() {
        let err = validate_submission(
            &requirements("NG"),
            &nigerian_fields(),
            &[doc(DocumentType::NationalId)],
            today(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Selfie"));
    }

    #[test]
    fn rejects_minors_and_bad_dates() {
        assert!(check_format(FieldFormat::DateOfBirth, "2010-01-01", today()).is_some());
        assert!(check_format(FieldFormat::DateOfBirth, "01/04/1990", today()).is_some());
        assert!(check_format(FieldFormat::DateOfBirth, "2007-06-15", today()).is_none());
        assert!(check_format(FieldFormat::DateOfBirth, "2007-06-16", today()).is_some());
    }

    #[test]
    fn unknown_countries_use_default_rules() {
        let reqs = requirements("fr");
        assert_eq!(reqs.country, "FR");
        assert!(reqs.fields.iter().any(|f| f.name == "id_number"));
    }

    #[test]
    fn phone_numbers_allow_leading_plus() {
        assert!(check_format(FieldFormat::Phone, "+447911123456", today()).is_none());
        assert!(check_format(FieldFormat::Phone, "12345", today()).is_some());
        assert!(check_format(FieldFormat::Phone, "080-1234-5678", today()).is_some());
    }

    #[test]
    fn submission_country_must_match_registration() {
        assert!(ensure_registered_country("NG", "NG").is_ok());
        assert!(ensure_registered_country("NG", "ng").is_ok());
        assert!(matches!(
            ensure_registered_country("NG", "US"),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[sqlx::test]
    #[ignore] // Requires PostgreSQL (DATABASE_URL)
    async fn submitting_under_another_country_is_rejected(pool: PgPool) {
        let user = test_utils::customer(&pool, "kyc-country@example.com").await;
        sqlx::query("UPDATE users SET kyc_status = 'not_submitted' WHERE id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        let result = submit(
            &pool,
            user.id,
            "US",
            nigerian_fields(),
            vec![doc(DocumentType::Passport), doc(DocumentType::ProofOfAddress)],
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));

        let status: KycStatus = sqlx::query_scalar("SELECT kyc_status FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, KycStatus::NotSubmitted);

        let submission = submit(
            &pool,
            user.id,
            "NG",
            nigerian_fields(),
            vec![doc(DocumentType::NationalId), doc(DocumentType::Selfie)],
        )
        .await
        .unwrap();
        assert_eq!(submission.country, "NG");
    }
}
