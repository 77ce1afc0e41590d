//! SQLite backend for the shop engine.
//!
//! [`SqliteDatabase`] implements every storage trait in [`crate::traits`]. The free functions in [`db`] do the actual
//! work against a `&mut SqliteConnection`, so they compose inside a single transaction.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
