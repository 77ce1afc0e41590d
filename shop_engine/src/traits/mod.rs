//! #  Storage backends and external collaborators.
//!
//! This module defines the interface contracts the shop engine consumes.
//!
//! ## Storage
//! The persistent store is the only mutator of stock, orders and payments. Backends implement
//!
//! * [`CatalogManagement`] for products, stock rows, promo codes, shipment carriers and archives.
//! * [`SettingsManagement`] for site-wide switches: availability, order size cap, payment method allowance, and the
//!   hero document.
//! * [`OrderManagement`] for the order aggregate: the submission transaction, order state transitions and payment
//!   rows.
//! * [`CustomerManagement`] for newsletter subscribers and support tickets.
//!
//! Every method that writes more than one row does so in a single transaction.
//!
//! ## Collaborators
//! The engine talks to the outside world through a handful of narrow async traits: a [`CardProcessor`] for card
//! payment intents, a [`ChainExplorer`] for incoming token transfers, a [`RateSource`] for exchange rates and a
//! [`Mailer`] for outgoing mail. HTTP implementations live in the `payment_integrations` crate.
mod catalog_management;
mod collaborators;
mod customer_management;
mod data_objects;
mod order_management;
mod settings_management;

pub use catalog_management::{CatalogError, CatalogManagement};
#[cfg(test)]
pub use collaborators::{MockCardProcessor, MockChainExplorer, MockMailer, MockRateSource};
pub use collaborators::{
    CardIntent,
    CardIntentRequest,
    CardIntentStatus,
    CardProcessor,
    CardProcessorError,
    ChainExplorer,
    Email,
    ExplorerError,
    Mailer,
    MailerError,
    RateSource,
    RateSourceError,
    TokenTransfer,
};
pub use customer_management::{CustomerError, CustomerManagement};
pub use data_objects::{
    InvoiceAssignment,
    OrderDetails,
    ProductDetails,
    ProductPage,
    Settlement,
    TransitionChange,
    TransitionOutcome,
};
pub use order_management::{OrderManagement, OrderStoreError};
pub use settings_management::SettingsManagement;
