//! Value types shared by the shop engine, its payment integrations and the daemon.
pub mod helpers;
mod money;
pub mod op;
mod secret;

pub use money::{AmountConversionError, Measure, Money, Percentage};
pub use rust_decimal::Decimal;
pub use secret::Secret;
