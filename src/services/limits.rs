//! Fees and transfer limits.
//!
//! Fees are a percentage (in basis points) clamped to a minimum and maximum.
//! Limits bound a single operation and the daily/monthly aggregate per
//! operation kind; aggregates are summed from the database in UTC periods.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Internal,
    Domestic,
    International,
    Withdrawal,
    CardFunding,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Internal,
        OperationKind::Domestic,
        OperationKind::International,
        OperationKind::Withdrawal,
        OperationKind::CardFunding,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeRule {
    pub basis_points: i64,
    pub min_cents: i64,
    pub max_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitRule {
    pub min_single_cents: i64,
    pub max_single_cents: i64,
    pub daily_cents: i64,
    pub monthly_cents: i64,
}

pub const fn fee_rule(kind: OperationKind) -> FeeRule {
    match kind {
        OperationKind::Internal => FeeRule {
            basis_points: 0,
            min_cents: 0,
            max_cents: 0,
        },
        // 0.5%, 10.00 to 500.00
        OperationKind::Domestic => FeeRule {
            basis_points: 50,
            min_cents: 1_000,
            max_cents: 50_000,
        },
        // 1.5%, 50.00 to 5,000.00
        OperationKind::International => FeeRule {
            basis_points: 150,
            min_cents: 5_000,
            max_cents: 500_000,
        },
        // 1%, 1.00 to 250.00
        OperationKind::Withdrawal => FeeRule {
            basis_points: 100,
            min_cents: 100,
            max_cents: 25_000,
        },
        // 1%, 0.50 to 100.00
        OperationKind::CardFunding => FeeRule {
            basis_points: 100,
            min_cents: 50,
            max_cents: 10_000,
        },
    }
}

pub const fn limit_rule(kind: OperationKind) -> LimitRule {
    match kind {
        OperationKind::Internal => LimitRule {
            min_single_cents: 100,
            max_single_cents: 50_000_000,
            daily_cents: 100_000_000,
            monthly_cents: 500_000_000,
        },
        OperationKind::Domestic => LimitRule {
            min_single_cents: 1_000,
            max_single_cents: 20_000_000,
            daily_cents: 50_000_000,
            monthly_cents: 200_000_000,
        },
        OperationKind::International => LimitRule {
            min_single_cents: 10_000,
            max_single_cents: 10_000_000,
            daily_cents: 25_000_000,
            monthly_cents: 100_000_000,
        },
        OperationKind::Withdrawal => LimitRule {
            min_single_cents: 100,
            max_single_cents: 20_000_000,
            daily_cents: 50_000_000,
            monthly_cents: 200_000_000,
        },
        OperationKind::CardFunding => LimitRule {
            min_single_cents: 100,
            max_single_cents: 5_000_000,
            daily_cents: 10_000_000,
            monthly_cents: 50_000_000,
        },
    }
}

/// Fee for `amount_cents`: `amount * bps / 10_000` rounded half up, clamped
/// to `[min, max]`. Zero-bps operations are free.
pub fn calculate_fee(kind: OperationKind, amount_cents: i64) -> i64 {
    let rule = fee_rule(kind);
    if rule.basis_points == 0 || amount_cents <= 0 {
        return 0;
    }

    let raw = (i128::from(amount_cents) * i128::from(rule.basis_points) + 5_000) / 10_000;
    let raw = i64::try_from(raw).unwrap_or(i64::MAX);
    raw.clamp(rule.min_cents, rule.max_cents)
}

/// Amounts already used in the current UTC day and month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub today_cents: i64,
    pub this_month_cents: i64,
}

/// Pure limit check for one operation.
pub fn check_limits(kind: OperationKind, amount_cents: i64, usage: Usage) -> Result<(), AppError> {
    let rule = limit_rule(kind);

    if amount_cents < rule.min_single_cents {
        return Err(AppError::LimitExceeded(format!(
            "Minimum amount is {} for this operation",
            rule.min_single_cents
        )));
    }
    if amount_cents > rule.max_single_cents {
        return Err(AppError::LimitExceeded(format!(
            "Maximum single amount is {} for this operation",
            rule.max_single_cents
        )));
    }
    if usage.today_cents.saturating_add(amount_cents) > rule.daily_cents {
        return Err(AppError::LimitExceeded(format!(
            "Daily limit of {} would be exceeded ({} already used)",
            rule.daily_cents, usage.today_cents
        )));
    }
    if usage.this_month_cents.saturating_add(amount_cents) > rule.monthly_cents {
        return Err(AppError::LimitExceeded(format!(
            "Monthly limit of {} would be exceeded ({} already used)",
            rule.monthly_cents, usage.this_month_cents
        )));
    }

    Ok(())
}

/// Start of the UTC day and UTC month containing `now`.
pub fn period_starts(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let day_start = today.and_time(chrono::NaiveTime::MIN).and_utc();
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
        .unwrap_or(today)
        .and_time(chrono::NaiveTime::MIN)
        .and_utc();
    (day_start, month_start)
}

/// Sum of amounts counted against `kind` since `since`.
///
/// Transfers count while pending verification so a user cannot queue
/// several unverified transfers past the limit.
async fn used_since(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: OperationKind,
    since: DateTime<Utc>,
) -> Result<i64, AppError> {
    let total: i64 = match kind {
        OperationKind::Internal | OperationKind::Domestic | OperationKind::International => {
            let transfer_kind = match kind {
                OperationKind::Internal => "internal",
                OperationKind::Domestic => "domestic",
                _ => "international",
            };
            sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
                FROM transfers
                WHERE sender_id = $1
                  AND kind = $2::transfer_kind
                  AND status IN ('pending_verification', 'completed')
                  AND created_at >= $3
                "#,
            )
            .bind(user_id)
            .bind(transfer_kind)
            .bind(since)
            .fetch_one(&mut *conn)
            .await?
        }
        OperationKind::Withdrawal | OperationKind::CardFunding => {
            let entry_kind = if kind == OperationKind::Withdrawal {
                "withdrawal"
            } else {
                "card_funding"
            };
            sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(t.amount_cents), 0)::BIGINT
                FROM transactions t
                JOIN wallets w ON w.id = t.wallet_id
                WHERE w.user_id = $1
                  AND t.kind = $2::transaction_kind
                  AND t.direction = 'debit'
                  AND t.status IN ('pending', 'completed')
                  AND t.created_at >= $3
                "#,
            )
            .bind(user_id)
            .bind(entry_kind)
            .bind(since)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    Ok(total)
}

pub async fn usage(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: OperationKind,
) -> Result<Usage, AppError> {
    let (day_start, month_start) = period_starts(Utc::now());
    Ok(Usage {
        today_cents: used_since(conn, user_id, kind, day_start).await?,
        this_month_cents: used_since(conn, user_id, kind, month_start).await?,
    })
}

/// Load current usage and check `amount_cents` against the limits.
///
/// Call inside the same transaction that records the operation, after the
/// user's wallet row is locked, so concurrent requests serialize.
pub async fn enforce_limits(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: OperationKind,
    amount_cents: i64,
) -> Result<(), AppError> {
    let usage = usage(conn, user_id, kind).await?;
    check_limits(kind, amount_cents, usage).inspect_err(|_| {
        tracing::info!(%user_id, ?kind, amount_cents, ?usage, "limit check rejected operation");
    })
}

/// One row of `GET /api/v1/limits`.
#[derive(Debug, Serialize)]
pub struct LimitOverview {
    pub operation: OperationKind,
    pub fee: FeeRule,
    pub limits: LimitRule,
    pub usage: Usage,
}

pub async fn overview(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<LimitOverview>, AppError> {
    let mut rows = Vec::with_capacity(OperationKind::ALL.len());
    for operation in OperationKind::ALL {
        rows.push(LimitOverview {
            operation,
            fee: fee_rule(operation),
            limits: limit_rule(operation),
            usage: usage(conn, user_id, operation).await?,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn internal_transfers_are_free() {
        assert_eq!(calculate_fee(OperationKind::Internal, 1_000_000), 0);
    }

    #[test]
    fn fee_is_clamped_to_minimum_and_maximum() {
        // 0.5% of 10,000 = 50 -> raised to the 1,000 minimum
        assert_eq!(calculate_fee(OperationKind::Domestic, 10_000), 1_000);
        // 0.5% of 1,000,000 = 5,000 -> inside bounds
        assert_eq!(calculate_fee(OperationKind::Domestic, 1_000_000), 5_000);
        // 0.5% of 100,000,000 = 500,000 -> capped at 50,000
        assert_eq!(calculate_fee(OperationKind::Domestic, 100_000_000), 50_000);
    }

    #[test]
    fn fee_rounds_half_up() {
        // 1% of 12,350 = 123.5 -> 124
        assert_eq!(calculate_fee(OperationKind::Withdrawal, 12_350), 124);
        // 1% of 12,349 = 123.49 -> 123
        assert_eq!(calculate_fee(OperationKind::Withdrawal, 12_349), 123);
    }

    #[test]
    fn rejects_amounts_outside_single_bounds() {
        let usage = Usage::default();
        assert!(matches!(
            check_limits(OperationKind::International, 9_999, usage),
            Err(AppError::LimitExceeded(_))
        ));
        assert!(matches!(
            check_limits(OperationKind::International, 10_000_001, usage),
            Err(AppError::LimitExceeded(_))
        ));
        assert!(check_limits(OperationKind::International, 10_000, usage).is_ok());
    }

    #[test]
    fn daily_limit_counts_prior_usage() {
        let rule = limit_rule(OperationKind::Domestic);
        let usage = Usage {
            today_cents: rule.daily_cents - 5_000,
            this_month_cents: rule.daily_cents - 5_000,
        };
        assert!(check_limits(OperationKind::Domestic, 5_000, usage).is_ok());
        assert!(check_limits(OperationKind::Domestic, 5_001, usage).is_err());
    }

    #[test]
    fn monthly_limit_applies_even_with_fresh_day() {
        let rule = limit_rule(OperationKind::Withdrawal);
        let usage = Usage {
            today_cents: 0,
            this_month_cents: rule.monthly_cents,
        };
        let err = check_limits(OperationKind::Withdrawal, 100, usage).unwrap_err();
        assert!(err.to_string().contains("Monthly"));
    }

    #[test]
    fn computes_utc_period_starts() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 15, 42, 7).unwrap();
        let (day, month) = period_starts(now);
        assert_eq!(day, Utc.with_ymd_and_hms(2025, 3, 17, 0, 0, 0).unwrap());
        assert_eq!(month, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }
}
