//! # Crypto payment watcher
//!
//! Crypto payments are matched to orders by address: every unpaid crypto order is bound to one address from a
//! finite pool, and the payer is asked to send an exact integer amount of the token to that address. A
//! [`CryptoWatcher`] per payment method owns the pool and one monitor task per bound order.
//!
//! * [`AddressPool`] is the pool itself, with a reverse index from order to address.
//! * [`CryptoWatcher`] issues invoices and runs the monitors.
//! * [`PaymentWatchers`] groups the watchers of all configured methods.
mod address_pool;
mod registry;
mod watcher;

pub use address_pool::AddressPool;
pub use registry::PaymentWatchers;
pub use watcher::{CryptoWatcher, InvoiceHold, WatcherConfig, WatcherError};
