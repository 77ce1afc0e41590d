//! # Shop server
//! The daemon that hosts the shop engine. It is responsible for:
//! * Reading its configuration from the environment. See [config](config/index.html) for more information.
//! * Opening and migrating the database.
//! * Wiring the engine to the card processor, chain explorers and exchange rate feeds.
//! * Running the background workers: reservation and rate limiter sweepers, the exchange rate refresher, the card
//!   payment expiry worker and one watcher per configured crypto method.
//! * Shutting all of it down cleanly on Ctrl-C.
//!
//! Storefront and admin operations are exposed as the engine's Rust APIs on [`server::Shop`].
pub mod cli;
pub mod config;
pub mod errors;
pub mod expiry_worker;
pub mod mailer;
pub mod server;
