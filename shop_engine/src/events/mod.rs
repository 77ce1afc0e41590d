mod channel;
mod event_types;
mod hooks;
mod mail;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
pub use mail::{
    annulled_email,
    confirmation_email,
    mail_hooks,
    shipped_email,
    ticket_email,
    welcome_email,
    MAIL_EVENT_BUFFER_SIZE,
};
