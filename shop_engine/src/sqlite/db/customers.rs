use chrono::{Datelike, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewSupportTicket, Subscriber, SupportTicket, TicketStatus},
    traits::CustomerError,
};

pub async fn fetch_subscriber(email: &str, conn: &mut SqliteConnection) -> Result<Option<Subscriber>, sqlx::Error> {
    let subscriber =
        sqlx::query_as("SELECT * FROM subscribers WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(subscriber)
}

/// Subscribes `email`, or updates its promo preference if it is already subscribed.
pub async fn upsert_subscriber(
    email: &str,
    receive_promo_emails: bool,
    conn: &mut SqliteConnection,
) -> Result<Subscriber, sqlx::Error> {
    let subscriber = sqlx::query_as(
        r#"
            INSERT INTO subscribers (email, receive_promo_emails, created_at) VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET receive_promo_emails = excluded.receive_promo_emails
            RETURNING *;
        "#,
    )
    .bind(email)
    .bind(receive_promo_emails)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(subscriber)
}

pub async fn remove_subscriber(email: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM subscribers WHERE email = $1").bind(email).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_ticket(id: i64, conn: &mut SqliteConnection) -> Result<Option<SupportTicket>, sqlx::Error> {
    let ticket = sqlx::query_as("SELECT * FROM support_tickets WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(ticket)
}

/// Inserts the ticket and stamps its case number, which is derived from the row id. Run inside a transaction.
pub async fn insert_ticket(
    ticket: NewSupportTicket,
    conn: &mut SqliteConnection,
) -> Result<SupportTicket, sqlx::Error> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO support_tickets (
                created_at,
                updated_at,
                priority,
                category,
                topic,
                subject,
                civility,
                email,
                first_name,
                last_name,
                order_reference,
                notes
            ) VALUES ($1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id;
        "#,
    )
    .bind(now)
    .bind(ticket.priority)
    .bind(ticket.category)
    .bind(ticket.topic)
    .bind(ticket.subject)
    .bind(ticket.civility)
    .bind(ticket.email)
    .bind(ticket.first_name)
    .bind(ticket.last_name)
    .bind(ticket.order_reference)
    .bind(ticket.notes)
    .fetch_one(&mut *conn)
    .await?;
    let case_number = format!("CS-{}-{id:05}", now.year());
    let ticket = sqlx::query_as("UPDATE support_tickets SET case_number = $1 WHERE id = $2 RETURNING *")
        .bind(&case_number)
        .bind(id)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Support ticket {case_number} created");
    Ok(ticket)
}

pub async fn update_ticket_status(
    id: i64,
    status: TicketStatus,
    internal_notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<SupportTicket, CustomerError> {
    let now = Utc::now();
    let resolved_at = (status == TicketStatus::Resolved).then_some(now);
    let ticket: Option<SupportTicket> = sqlx::query_as(
        r#"
            UPDATE support_tickets SET
                status = $1,
                updated_at = $2,
                resolved_at = COALESCE($3, resolved_at),
                internal_notes = COALESCE($4, internal_notes)
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(resolved_at)
    .bind(internal_notes)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    ticket.ok_or(CustomerError::TicketNotFound(id))
}

/// Newest tickets first.
pub async fn search_tickets(
    status: Option<TicketStatus>,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SupportTicket>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM support_tickets");
    if let Some(status) = status {
        builder.push(" WHERE status = ");
        builder.push_bind(status);
    }
    builder.push(" ORDER BY id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    trace!("🗃️ Executing query: {}", builder.sql());
    let tickets = builder.build_query_as::<SupportTicket>().fetch_all(conn).await?;
    Ok(tickets)
}
