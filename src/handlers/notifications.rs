//! In-app notification endpoints.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        PageParams,
        notification::{Notification, NotificationQuery},
    },
    services::notification_service,
};

/// `GET /api/v1/notifications?unread_only=true`
pub async fn list_notifications(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = notification_service::list_notifications(
        &pool,
        auth.user_id,
        query.unread_only,
        PageParams::new(query.page, query.per_page),
    )
    .await?;
    Ok(Json(notifications))
}

/// `POST /api/v1/notifications/{id}/read`
pub async fn mark_read(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(
        notification_service::mark_read(&pool, auth.user_id, notification_id).await?,
    ))
}
