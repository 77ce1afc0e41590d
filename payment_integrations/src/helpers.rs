use chrono::{DateTime, TimeZone, Utc};
use shop_common::{Decimal, Money};
use shop_engine::currency::precision;

use crate::IntegrationError;

/// Converts an amount to the integer number of minor units card processors expect, e.g. 20.50 EUR is 2050 and
/// 500 JPY is 500. Amounts are rounded half-up to the currency's precision first.
pub fn to_minor_units(amount: Money, currency: &str) -> Result<u128, IntegrationError> {
    let dp = precision(&currency.to_uppercase());
    let scale = Decimal::from(10u64.pow(dp));
    (amount.round_to(dp) * scale)
        .to_u128()
        .ok_or_else(|| IntegrationError::InvalidCurrencyAmount(format!("{amount} {currency}")))
}

pub(crate) fn from_unix_millis(ms: i64) -> Result<DateTime<Utc>, IntegrationError> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| IntegrationError::JsonError(format!("Invalid timestamp {ms}")))
}

pub(crate) fn from_unix_secs(secs: &str) -> Result<DateTime<Utc>, IntegrationError> {
    let secs = secs.parse::<i64>().map_err(|e| IntegrationError::JsonError(format!("Invalid timestamp {secs}. {e}")))?;
    from_unix_millis(secs.saturating_mul(1000))
}
