//! Customer support ticket endpoints.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        PageParams,
        support::{
            CreateTicketRequest, SupportMessage, SupportTicket, TicketDetail, TicketQuery,
            TicketReplyRequest,
        },
    },
    services::support_service,
};

/// `POST /api/v1/support/tickets`
///
/// ```json
/// {
///   "subject": "Card declined",
///   "category": "cards",
///   "priority": "high",
///   "message": "My card was declined at checkout."
/// }
/// ```
pub async fn create_ticket(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketDetail>), AppError> {
    request.validate()?;
    let ticket = support_service::create_ticket(&pool, auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// `GET /api/v1/support/tickets`
///
/// The caller's tickets, most recently updated first.
pub async fn list_tickets(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<SupportTicket>>, AppError> {
    let tickets = support_service::list_tickets(
        &pool,
        auth.user_id,
        query.status,
        PageParams::new(query.page, query.per_page),
    )
    .await?;
    Ok(Json(tickets))
}

/// `GET /api/v1/support/tickets/{id}`
///
/// The ticket with its full message thread.
pub async fn get_ticket(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketDetail>, AppError> {
    Ok(Json(support_service::get_ticket(&pool, auth.user_id, ticket_id).await?))
}

/// `POST /api/v1/support/tickets/{id}/messages`. Closed tickets return 409.
pub async fn reply(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TicketReplyRequest>,
) -> Result<(StatusCode, Json<SupportMessage>), AppError> {
    request.validate()?;
    let message = support_service::reply(&pool, auth.user_id, ticket_id, &request.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /api/v1/support/tickets/{id}/close`
pub async fn close(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<SupportTicket>, AppError> {
    Ok(Json(support_service::close(&pool, auth.user_id, ticket_id).await?))
}
