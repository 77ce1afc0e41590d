//! Shop Engine
//!
//! The transactional core of a small-merchant clothing shop. It owns everything between "a shopper has a cart" and
//! "the order is paid, shipped and delivered", and nothing about how requests arrive.
//!
//! The library is made of a few cooperating parts:
//! 1. The storage contracts ([`mod@traits`]) and their SQLite implementation. The database is the only place stock,
//!    orders and payments change. Every multi-row write runs in one transaction.
//! 2. In-memory services that sit in front of the database: the [`currency::CurrencyService`] for exchange rates and
//!    minimum charges, the [`reservations::ReservationManager`] for short-lived cart holds, and the
//!    [`rate_limiter::RateLimiter`] for abuse control.
//! 3. The order state machine ([`mod@order_state`]) and the public APIs built on it ([`mod@shop_api`]).
//! 4. The [`crypto_watcher`], which binds unpaid crypto orders to receiving addresses and settles them from the chain.
//!
//! The engine emits events when orders are confirmed, shipped or annulled, and when shoppers subscribe or ask for
//! help. Hook into them with [`events::EventHooks`] to send mail or anything else.
pub mod crypto_watcher;
pub mod currency;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod order_state;
pub mod rate_limiter;
pub mod reservations;
pub mod shop_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use shop_api::{
    admin_api::AdminApi,
    errors::{ErrorKind, ShopError},
    order_flow_api::OrderFlowApi,
    order_objects,
    storefront_api::StorefrontApi,
    transitions::OrderTransitions,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
