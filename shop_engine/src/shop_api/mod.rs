//! # Shop engine public API
//!
//! The API is split by audience, so that a transport can expose exactly what each caller may do.
//!
//! * [`order_flow_api`] prices carts, places orders and takes them through payment. It is the heart of the engine
//!   and the other two APIs are built on top of it.
//! * [`storefront_api`] is everything an anonymous shopper can do.
//! * [`admin_api`] is everything behind the admin token.
//!
//! Every API is created from a storage backend that implements the traits in [`crate::traits`]:
//!
//! ```rust,ignore
//! use shop_engine::{OrderFlowApi, SqliteDatabase, StorefrontApi};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let orders = OrderFlowApi::new(db, currency, reservations, rate_limiter, card, watchers, producers);
//! let storefront = StorefrontApi::new(orders);
//! let cart = storefront.validate_order_items(&ctx, &request).await?;
//! ```
pub mod admin_api;
pub mod catalog_objects;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod storefront_api;
pub mod transitions;
