use std::sync::Arc;

use log::*;

use crate::{
    db_types::OrderStatusType,
    events::{
        EventHooks,
        NewSubscriberEvent,
        OrderAnnulledEvent,
        OrderConfirmedEvent,
        OrderShippedEvent,
        TicketSubmittedEvent,
    },
    traits::{Email, Mailer},
};

pub const MAIL_EVENT_BUFFER_SIZE: usize = 50;

/// Builds hooks that mail the buyer whenever an order is confirmed, shipped or annulled, welcome new newsletter
/// subscribers and acknowledge support tickets.
///
/// Delivery is fire-and-forget. A mailer failure is logged and never reaches the code that published the event.
pub fn mail_hooks(mailer: Arc<dyn Mailer>) -> EventHooks {
    let mut hooks = EventHooks::default();
    let m = Arc::clone(&mailer);
    hooks.on_order_confirmed(move |ev| {
        let mailer = Arc::clone(&m);
        Box::pin(async move { deliver(mailer.as_ref(), confirmation_email(&ev)).await })
    });
    let m = Arc::clone(&mailer);
    hooks.on_order_shipped(move |ev| {
        let mailer = Arc::clone(&m);
        Box::pin(async move { deliver(mailer.as_ref(), shipped_email(&ev)).await })
    });
    let m = Arc::clone(&mailer);
    hooks.on_order_annulled(move |ev| {
        let mailer = Arc::clone(&m);
        Box::pin(async move { deliver(mailer.as_ref(), annulled_email(&ev)).await })
    });
    let m = Arc::clone(&mailer);
    hooks.on_new_subscriber(move |ev| {
        let mailer = Arc::clone(&m);
        Box::pin(async move { deliver(mailer.as_ref(), welcome_email(&ev)).await })
    });
    hooks.on_ticket_submitted(move |ev| {
        let mailer = Arc::clone(&mailer);
        Box::pin(async move { deliver(mailer.as_ref(), ticket_email(&ev)).await })
    });
    hooks
}

async fn deliver(mailer: &dyn Mailer, email: Email) {
    let to = email.to.clone();
    let subject = email.subject.clone();
    match mailer.send(email).await {
        Ok(()) => debug!("📬️ Sent \"{subject}\" to {to}"),
        Err(e) => warn!("📬️ Could not send \"{subject}\". {e}"),
    }
}

pub fn confirmation_email(ev: &OrderConfirmedEvent) -> Email {
    Email {
        to: ev.buyer.email.clone(),
        subject: format!("Order {} confirmed", ev.order.uuid),
        body: format!(
            "Hi {},\n\nWe have received your payment of {} for order {}. We will let you know as soon as it ships.",
            ev.buyer.first_name, ev.payment.transaction_amount, ev.order.uuid
        ),
    }
}

pub fn shipped_email(ev: &OrderShippedEvent) -> Email {
    Email {
        to: ev.buyer.email.clone(),
        subject: format!("Order {} is on its way", ev.order.uuid),
        body: format!(
            "Hi {},\n\nYour order {} has shipped. Follow your parcel here: {}",
            ev.buyer.first_name, ev.order.uuid, ev.tracking_url
        ),
    }
}

pub fn annulled_email(ev: &OrderAnnulledEvent) -> Email {
    let (subject, reason) = match ev.status {
        OrderStatusType::Refunded => ("refunded", "Your order has been refunded."),
        _ => ("cancelled", "Your order has been cancelled and no payment was taken."),
    };
    Email {
        to: ev.buyer.email.clone(),
        subject: format!("Order {} {subject}", ev.order.uuid),
        body: format!("Hi {},\n\n{reason} Order reference: {}.", ev.buyer.first_name, ev.order.uuid),
    }
}

pub fn welcome_email(ev: &NewSubscriberEvent) -> Email {
    Email {
        to: ev.email.clone(),
        subject: "Welcome to our newsletter".to_string(),
        body: "Thanks for subscribing. You can unsubscribe at any time.".to_string(),
    }
}

pub fn ticket_email(ev: &TicketSubmittedEvent) -> Email {
    let ticket = &ev.ticket;
    Email {
        to: ticket.email.clone(),
        subject: format!("We received your request {}", ticket.case_number),
        body: format!(
            "Hi {},\n\nYour request \"{}\" has been logged as {}. We will get back to you soon.",
            ticket.first_name, ticket.subject, ticket.case_number
        ),
    }
}
