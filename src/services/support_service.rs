//! Support tickets and their message threads.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        PageParams,
        support::{
            CreateTicketRequest, SupportMessage, SupportTicket, TicketDetail, TicketStatus,
        },
    },
    services::notification_service,
};

/// Status after a staff reply: an open ticket moves to `in_progress`.
fn status_after_staff_reply(current: TicketStatus) -> TicketStatus {
    match current {
        TicketStatus::Open => TicketStatus::InProgress,
        other => other,
    }
}

fn ensure_accepts_replies(ticket: &SupportTicket) -> Result<(), AppError> {
    if ticket.status == TicketStatus::Closed {
        return Err(AppError::Conflict(
            "Ticket is closed; open a new ticket instead".to_string(),
        ));
    }
    Ok(())
}

async fn insert_message(
    conn: &mut sqlx::PgConnection,
    ticket_id: Uuid,
    author_id: Uuid,
    from_staff: bool,
    body: &str,
) -> Result<SupportMessage, AppError> {
    let message = sqlx::query_as::<_, SupportMessage>(
        r#"
        INSERT INTO support_messages (ticket_id, author_id, from_staff, body)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(ticket_id)
    .bind(author_id)
    .bind(from_staff)
    .bind(body.trim())
    .fetch_one(&mut *conn)
    .await?;
    Ok(message)
}

/// Open a ticket with its first message.
pub async fn create_ticket(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateTicketRequest,
) -> Result<TicketDetail, AppError> {
    let mut tx = pool.begin().await?;

    let ticket = sqlx::query_as::<_, SupportTicket>(
        r#"
        INSERT INTO support_tickets (user_id, subject, category, priority)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request.subject.trim())
    .bind(request.category.trim().to_lowercase())
    .bind(request.priority)
    .fetch_one(&mut *tx)
    .await?;

    let message = insert_message(&mut tx, ticket.id, user_id, false, &request.message).await?;

    tx.commit().await?;

    tracing::info!(%user_id, ticket_id = %ticket.id, priority = ?ticket.priority, "support ticket opened");

    Ok(TicketDetail {
        ticket,
        messages: vec![message],
    })
}

pub async fn list_tickets(
    pool: &DbPool,
    user_id: Uuid,
    status: Option<TicketStatus>,
    page: PageParams,
) -> Result<Vec<SupportTicket>, AppError> {
    let tickets = sqlx::query_as::<_, SupportTicket>(
        r#"
        SELECT * FROM support_tickets
        WHERE user_id = $1 AND ($2::ticket_status IS NULL OR status = $2)
        ORDER BY updated_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(tickets)
}

async fn messages_for(pool: &DbPool, ticket_id: Uuid) -> Result<Vec<SupportMessage>, AppError> {
    let messages = sqlx::query_as::<_, SupportMessage>(
        "SELECT * FROM support_messages WHERE ticket_id = $1 ORDER BY created_at ASC",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

pub async fn get_ticket(
    pool: &DbPool,
    user_id: Uuid,
    ticket_id: Uuid,
) -> Result<TicketDetail, AppError> {
    let ticket = sqlx::query_as::<_, SupportTicket>(
        "SELECT * FROM support_tickets WHERE id = $1 AND user_id = $2",
    )
    .bind(ticket_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("support ticket"))?;

    let messages = messages_for(pool, ticket.id).await?;
    Ok(TicketDetail { ticket, messages })
}

/// Locks the ticket; `owner` restricts the lookup to that user's tickets.
async fn lock_ticket(
    conn: &mut sqlx::PgConnection,
    ticket_id: Uuid,
    owner: Option<Uuid>,
) -> Result<SupportTicket, AppError> {
    sqlx::query_as::<_, SupportTicket>(
        r#"
        SELECT * FROM support_tickets
        WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)
        FOR UPDATE
        "#,
    )
    .bind(ticket_id)
    .bind(owner)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("support ticket"))
}

/// Customer reply on their own ticket. A resolved ticket is reopened.
pub async fn reply(
    pool: &DbPool,
    user_id: Uuid,
    ticket_id: Uuid,
    body: &str,
) -> Result<SupportMessage, AppError> {
    let mut tx = pool.begin().await?;

    let ticket = lock_ticket(&mut tx, ticket_id, Some(user_id)).await?;
    ensure_accepts_replies(&ticket)?;

    let message = insert_message(&mut tx, ticket.id, user_id, false, body).await?;

    sqlx::query(
        r#"
        UPDATE support_tickets
        SET status = CASE WHEN status = 'resolved' THEN 'open'::ticket_status ELSE status END,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(ticket.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(message)
}

pub async fn close(pool: &DbPool, user_id: Uuid, ticket_id: Uuid) -> Result<SupportTicket, AppError> {
    let mut tx = pool.begin().await?;

    let ticket = lock_ticket(&mut tx, ticket_id, Some(user_id)).await?;
    if ticket.status == TicketStatus::Closed {
        return Err(AppError::Conflict("Ticket is already closed".to_string()));
    }

    let closed = update_status(&mut tx, ticket.id, TicketStatus::Closed).await?;
    tx.commit().await?;

    tracing::info!(%user_id, %ticket_id, "support ticket closed by user");
    Ok(closed)
}

async fn update_status(
    conn: &mut sqlx::PgConnection,
    ticket_id: Uuid,
    status: TicketStatus,
) -> Result<SupportTicket, AppError> {
    let ticket = sqlx::query_as::<_, SupportTicket>(
        r#"
        UPDATE support_tickets
        SET status = $2,
            closed_at = CASE WHEN $2 = 'closed'::ticket_status THEN NOW() ELSE NULL END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(ticket_id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;
    Ok(ticket)
}

/// All tickets, optionally filtered by status, most urgent first.
pub async fn list_all(
    pool: &DbPool,
    status: Option<TicketStatus>,
    page: PageParams,
) -> Result<Vec<SupportTicket>, AppError> {
    let tickets = sqlx::query_as::<_, SupportTicket>(
        r#"
        SELECT * FROM support_tickets
        WHERE ($1::ticket_status IS NULL OR status = $1)
        ORDER BY priority DESC, created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(tickets)
}

/// Staff reply on any ticket; notifies the ticket owner.
pub async fn staff_reply(
    pool: &DbPool,
    staff_id: Uuid,
    ticket_id: Uuid,
    body: &str,
) -> Result<SupportMessage, AppError> {
    let mut tx = pool.begin().await?;

    let ticket = lock_ticket(&mut tx, ticket_id, None).await?;
    ensure_accepts_replies(&ticket)?;

    let message = insert_message(&mut tx, ticket.id, staff_id, true, body).await?;
    let next = status_after_staff_reply(ticket.status);
    if next != ticket.status {
        update_status(&mut tx, ticket.id, next).await?;
    } else {
        sqlx::query("UPDATE support_tickets SET updated_at = NOW() WHERE id = $1")
            .bind(ticket.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    notification_service::notify(
        pool,
        ticket.user_id,
        "Support replied",
        &format!("There is a new reply on your ticket \"{}\".", ticket.subject),
    )
    .await;

    Ok(message)
}

pub async fn set_status(
    pool: &DbPool,
    staff_id: Uuid,
    ticket_id: Uuid,
    status: TicketStatus,
) -> Result<SupportTicket, AppError> {
    let mut tx = pool.begin().await?;

    let ticket = lock_ticket(&mut tx, ticket_id, None).await?;
    let updated = update_status(&mut tx, ticket.id, status).await?;

    tx.commit().await?;

    tracing::info!(%staff_id, %ticket_id, from = ?ticket.status, to = ?status, "support ticket status set");

    if ticket.status != status {
        notification_service::notify(
            pool,
            ticket.user_id,
            "Ticket updated",
            &format!("Your ticket \"{}\" is now {:?}.", ticket.subject, status),
        )
        .await;
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ticket(status: TicketStatus) -> SupportTicket {
        let now = Utc::now();
        SupportTicket {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            subject: "Card declined".into(),
            category: "cards".into(),
            priority: Default::default(),
            status,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn closed_tickets_reject_replies() {
        assert!(matches!(
            ensure_accepts_replies(&ticket(TicketStatus::Closed)),
            Err(AppError::Conflict(_))
        ));
        assert!(ensure_accepts_replies(&ticket(TicketStatus::Resolved)).is_ok());
    }

    #[test]
    fn staff_reply_moves_open_ticket_in_progress() {
        assert_eq!(
            status_after_staff_reply(TicketStatus::Open),
            TicketStatus::InProgress
        );
        assert_eq!(
            status_after_staff_reply(TicketStatus::Resolved),
            TicketStatus::Resolved
        );
    }
}
