//! # Currency service
//!
//! Holds the exchange rate table, rounds amounts to each currency's precision and enforces the per-currency charge
//! minimums card processors impose.
//!
//! Rates are expressed as units of a currency per one unit of the base currency, so the base currency always has a
//! rate of exactly one. The table is replaced atomically by [`CurrencyService::refresh`], which fetches fiat and
//! crypto rates from two [`RateSource`]s. If either fetch fails, the last good table stays in place.
use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use log::*;
use serde::{Deserialize, Serialize};
use shop_common::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    db_types::Money,
    traits::{RateSource, RateSourceError},
};

/// Every currency the service quotes, with its display name.
pub const SUPPORTED_CURRENCIES: [(&str, &str); 22] = [
    ("EUR", "Euro"),
    ("USD", "US Dollar"),
    ("GBP", "Pound Sterling"),
    ("JPY", "Japanese Yen"),
    ("KRW", "South Korean Won"),
    ("CNY", "Chinese Yuan"),
    ("BTC", "Bitcoin"),
    ("ETH", "Ether"),
    ("CHF", "Swiss Franc"),
    ("CZK", "Czech Koruna"),
    ("DKK", "Danish Krone"),
    ("GEL", "Georgian Lari"),
    ("HKD", "Hong Kong Dollar"),
    ("HUF", "Hungarian Forint"),
    ("ILS", "Israeli New Shekel"),
    ("NOK", "Norwegian Krone"),
    ("PLN", "Polish Zloty"),
    ("RUB", "Russian Ruble"),
    ("SEK", "Swedish Krona"),
    ("SGD", "Singapore Dollar"),
    ("TRY", "Turkish Lira"),
    ("UAH", "Ukrainian Hryvnia"),
];

/// Currencies whose smallest unit has no fractional part.
pub const ZERO_DECIMAL_CURRENCIES: [&str; 16] = [
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV", "XAF", "XOF", "XPF",
];

/// Codes fetched from the crypto rate source rather than the fiat one.
pub const CRYPTO_CURRENCIES: [&str; 2] = ["BTC", "ETH"];

#[derive(Debug, Clone, Error)]
pub enum CurrencyError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
    #[error("{amount} {currency} is below the minimum charge of {minimum} {currency}")]
    BelowCurrencyMinimum { currency: String, amount: Money, minimum: Money },
    #[error("{0} cannot be represented as an on-chain amount")]
    AmountOverflow(String),
    #[error("Rate refresh failed: {0}")]
    RefreshFailed(String),
}

impl From<RateSourceError> for CurrencyError {
    fn from(e: RateSourceError) -> Self {
        CurrencyError::RefreshFailed(e.to_string())
    }
}

/// Number of fractional digits amounts in `code` are rounded to.
pub fn precision(code: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES.contains(&code) {
        0
    } else {
        2
    }
}

/// The smallest amount a card processor will charge in `code`, if it has one.
pub fn minimum_charge(code: &str) -> Option<Money> {
    match code {
        "EUR" | "USD" => Some(Money::new(50, 2)),
        "GBP" => Some(Money::new(30, 2)),
        "JPY" => Some(Money::from(50)),
        "KRW" => Some(Money::from(100)),
        "CNY" => Some(Money::new(100, 2)),
        _ => None,
    }
}

pub fn is_supported(code: &str) -> bool {
    SUPPORTED_CURRENCIES.iter().any(|(c, _)| *c == code)
}

fn description_of(code: &str) -> String {
    SUPPORTED_CURRENCIES.iter().find(|(c, _)| *c == code).map(|(_, d)| d.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub description: String,
    /// Units of this currency per one unit of the base currency
    pub rate: Decimal,
}

#[derive(Clone)]
pub struct CurrencyService {
    base: String,
    table: Arc<RwLock<HashMap<String, CurrencyRate>>>,
}

impl Debug for CurrencyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CurrencyService ({})", self.base)
    }
}

impl CurrencyService {
    /// Creates a service that only knows its base currency. Other currencies become available after the first
    /// successful [`Self::refresh`] or [`Self::set_rates`].
    pub fn new<S: Into<String>>(base: S) -> Self {
        let base = base.into().to_uppercase();
        let mut table = HashMap::new();
        table.insert(base.clone(), CurrencyRate { description: description_of(&base), rate: Decimal::ONE });
        Self { base, table: Arc::new(RwLock::new(table)) }
    }

    pub fn base_currency(&self) -> &str {
        self.base.as_str()
    }

    /// A snapshot of the current rate table.
    pub async fn get_rates(&self) -> HashMap<String, CurrencyRate> {
        self.table.read().await.clone()
    }

    pub async fn rate(&self, code: &str) -> Result<Decimal, CurrencyError> {
        let code = code.to_uppercase();
        self.table.read().await.get(&code).map(|r| r.rate).ok_or(CurrencyError::UnknownCurrency(code))
    }

    /// Converts an amount in the base currency to `code`, rounded half-up to `code`'s precision.
    pub async fn convert_from_base(&self, code: &str, amount: Money) -> Result<Money, CurrencyError> {
        let rate = self.rate(code).await?;
        let converted =
            amount.value().checked_mul(rate).ok_or_else(|| CurrencyError::AmountOverflow(amount.to_string()))?;
        Ok(Money::from(converted).round_to(precision(&code.to_uppercase())))
    }

    /// Converts an amount in `code` to the base currency, rounded half-up to the base currency's precision.
    pub async fn convert_to_base(&self, code: &str, amount: Money) -> Result<Money, CurrencyError> {
        let rate = self.rate(code).await?;
        if rate.is_zero() {
            return Err(CurrencyError::UnknownCurrency(code.to_uppercase()));
        }
        let converted =
            amount.value().checked_div(rate).ok_or_else(|| CurrencyError::AmountOverflow(amount.to_string()))?;
        Ok(Money::from(converted).round_to(precision(&self.base)))
    }

    /// Fails with [`CurrencyError::BelowCurrencyMinimum`] if `amount` is strictly less than the minimum charge for
    /// `code`. Currencies without a configured minimum always pass.
    pub fn check_minimum(&self, code: &str, amount: Money) -> Result<(), CurrencyError> {
        let code = code.to_uppercase();
        match minimum_charge(&code) {
            Some(minimum) if amount < minimum => {
                Err(CurrencyError::BelowCurrencyMinimum { currency: code, amount, minimum })
            },
            _ => Ok(()),
        }
    }

    /// The exact integer amount, in the token's smallest unit, a payer must send for `base_amount`.
    ///
    /// The conversion is not rounded to the payment currency's display precision, and the scaled value is truncated,
    /// never rounded.
    pub async fn to_on_chain_amount(
        &self,
        payment_currency: &str,
        base_amount: Money,
        token_decimals: u32,
    ) -> Result<u128, CurrencyError> {
        let rate = self.rate(payment_currency).await?;
        let overflow = || CurrencyError::AmountOverflow(base_amount.to_string());
        let scale = Decimal::from_i128_with_scale(10i128.pow(token_decimals.min(28)), 0);
        let scaled = base_amount.value().checked_mul(rate).and_then(|v| v.checked_mul(scale)).ok_or_else(overflow)?;
        Money::from(scaled).trunc().to_u128().ok_or_else(overflow)
    }

    /// Replaces the whole table with `rates` for the supported codes, keeping the base currency at exactly one.
    pub async fn set_rates(&self, rates: HashMap<String, Decimal>) {
        let table = self.build_table(rates);
        let count = table.len();
        *self.table.write().await = table;
        debug!("💱️ Rate table replaced. {count} currencies quoted against {}", self.base);
    }

    fn build_table(&self, rates: HashMap<String, Decimal>) -> HashMap<String, CurrencyRate> {
        let mut table = rates
            .into_iter()
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .filter(|(code, rate)| is_supported(code) && rate.is_sign_positive() && !rate.is_zero())
            .map(|(code, rate)| {
                let description = description_of(&code);
                (code, CurrencyRate { description, rate })
            })
            .collect::<HashMap<_, _>>();
        table.insert(self.base.clone(), CurrencyRate { description: description_of(&self.base), rate: Decimal::ONE });
        table
    }

    /// Fetches fiat and crypto rates and replaces the table in one step. On any failure the current table is left
    /// untouched and the error is returned.
    pub async fn refresh(&self, fiat: &dyn RateSource, crypto: &dyn RateSource) -> Result<(), CurrencyError> {
        let mut rates = fiat.fetch_rates(&self.base).await?;
        rates.retain(|code, _| !CRYPTO_CURRENCIES.contains(&code.to_uppercase().as_str()));
        let crypto_rates = crypto.fetch_rates(&self.base).await?;
        for (code, rate) in crypto_rates {
            if CRYPTO_CURRENCIES.contains(&code.to_uppercase().as_str()) {
                rates.insert(code, rate);
            }
        }
        self.set_rates(rates).await;
        Ok(())
    }

    /// Refreshes immediately and then every `interval` until `shutdown` is cancelled.
    pub async fn run_refresher(
        self,
        fiat: Arc<dyn RateSource>,
        crypto: Arc<dyn RateSource>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        info!("💱️ Exchange rate refresher started. Refreshing every {}s", interval.as_secs());
        let mut timer = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("💱️ Exchange rate refresher shutting down");
                    break;
                }
                _ = timer.tick() => {
                    match self.refresh(fiat.as_ref(), crypto.as_ref()).await {
                        Ok(()) => debug!("💱️ Exchange rates refreshed"),
                        Err(e) => warn!("💱️ Could not refresh exchange rates. Keeping the last good table. {e}"),
                    }
                }
            }
        }
    }
}
