//! In-app notifications.
//!
//! Notifications are side effects: a failure to write one is logged and
//! never fails the operation that triggered it.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{PageParams, notification::Notification},
};

/// Record a notification for `user_id`, logging instead of failing.
pub async fn notify(pool: &DbPool, user_id: Uuid, title: &str, body: &str) {
    let result = sqlx::query("INSERT INTO notifications (user_id, title, body) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(title)
        .bind(body)
        .execute(pool)
        .await;

    if let Err(e) = result {
        tracing::warn!(%user_id, title, error = %e, "failed to record notification");
    }
}

pub async fn list_notifications(
    pool: &DbPool,
    user_id: Uuid,
    unread_only: bool,
    page: PageParams,
) -> Result<Vec<Notification>, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(notifications)
}

pub async fn mark_read(
    pool: &DbPool,
    user_id: Uuid,
    notification_id: Uuid,
) -> Result<Notification, AppError> {
    sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET read_at = COALESCE(read_at, NOW())
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("notification"))
}
