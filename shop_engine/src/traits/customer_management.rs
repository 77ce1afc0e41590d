use std::future::Future;

use thiserror::Error;

use crate::db_types::{NewSupportTicket, Subscriber, SupportTicket, TicketStatus};

#[derive(Debug, Clone, Error)]
pub enum CustomerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Support ticket {0} does not exist")]
    TicketNotFound(i64),
}

impl From<sqlx::Error> for CustomerError {
    fn from(e: sqlx::Error) -> Self {
        CustomerError::DatabaseError(e.to_string())
    }
}

/// Newsletter subscribers and support tickets.
pub trait CustomerManagement: Clone + Send + Sync + 'static {
    /// Inserts the subscriber, or updates `receive_promo_emails` if the email is already subscribed.
    fn upsert_subscriber(
        &self,
        email: &str,
        receive_promo_emails: bool,
    ) -> impl Future<Output = Result<Subscriber, CustomerError>> + Send;

    /// Returns false if the email was not subscribed.
    fn remove_subscriber(&self, email: &str) -> impl Future<Output = Result<bool, CustomerError>> + Send;

    fn fetch_subscriber(&self, email: &str) -> impl Future<Output = Result<Option<Subscriber>, CustomerError>> + Send;

    /// Stores a new ticket with status `submitted` and assigns its case number, `CS-<year>-<id>`.
    fn insert_support_ticket(
        &self,
        ticket: NewSupportTicket,
    ) -> impl Future<Output = Result<SupportTicket, CustomerError>> + Send;

    /// Moves the ticket to `status`. Entering `resolved` stamps `resolved_at`.
    fn update_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
        internal_notes: Option<String>,
    ) -> impl Future<Output = Result<SupportTicket, CustomerError>> + Send;

    /// Newest first.
    fn search_tickets(
        &self,
        status: Option<TicketStatus>,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<SupportTicket>, CustomerError>> + Send;
}
