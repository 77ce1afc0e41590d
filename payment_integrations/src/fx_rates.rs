use std::collections::HashMap;

use async_trait::async_trait;
use log::*;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use shop_common::Decimal;
use shop_engine::traits::{RateSource, RateSourceError};

use crate::{FxConfig, IntegrationError, RestClient};

/// CoinGecko coin ids for the crypto currencies the shop quotes.
const COIN_IDS: [(&str, &str); 2] = [("bitcoin", "BTC"), ("ethereum", "ETH")];

/// Coin id to a map of quote currency to price
type PriceTable = HashMap<String, HashMap<String, Decimal>>;

#[derive(Debug, Deserialize)]
struct FiatResponse {
    rates: HashMap<String, Decimal>,
}

/// Fiat exchange rates from a Frankfurter-compatible endpoint.
#[derive(Debug, Clone)]
pub struct FiatRates {
    client: RestClient,
}

impl FiatRates {
    pub fn new(config: &FxConfig) -> Result<Self, IntegrationError> {
        Ok(Self { client: RestClient::new(&config.fiat_url, HeaderMap::new(), config.timeout)? })
    }
}

#[async_trait]
impl RateSource for FiatRates {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, Decimal>, RateSourceError> {
        let response = self.client.get::<FiatResponse>("", &[("from", base)]).await?;
        debug!("💱️ Fetched {} fiat rates against {base}", response.rates.len());
        Ok(response.rates)
    }
}

/// Crypto prices from a CoinGecko-compatible `simple/price` endpoint. Prices arrive as the base currency per coin
/// and are inverted to coins per base unit.
#[derive(Debug, Clone)]
pub struct CryptoRates {
    client: RestClient,
}

impl CryptoRates {
    pub fn new(config: &FxConfig) -> Result<Self, IntegrationError> {
        Ok(Self { client: RestClient::new(&config.crypto_url, HeaderMap::new(), config.timeout)? })
    }
}

fn invert_prices(prices: PriceTable, base: &str) -> Result<HashMap<String, Decimal>, IntegrationError> {
    let vs = base.to_lowercase();
    COIN_IDS
        .iter()
        .map(|(id, code)| {
            let price = prices
                .get(*id)
                .and_then(|p| p.get(&vs))
                .filter(|p| !p.is_zero() && p.is_sign_positive())
                .ok_or_else(|| IntegrationError::JsonError(format!("No {base} price for {id}")))?;
            let rate = Decimal::ONE
                .checked_div(*price)
                .ok_or_else(|| IntegrationError::InvalidCurrencyAmount(format!("{price} {base}")))?;
            Ok((code.to_string(), rate))
        })
        .collect()
}

#[async_trait]
impl RateSource for CryptoRates {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, Decimal>, RateSourceError> {
        let ids = COIN_IDS.iter().map(|(id, _)| *id).collect::<Vec<_>>().join(",");
        let vs = base.to_lowercase();
        let params = [("ids", ids.as_str()), ("vs_currencies", vs.as_str())];
        let prices = self.client.get::<PriceTable>("", &params).await?;
        let rates = invert_prices(prices, base)?;
        debug!("💱️ Fetched {} crypto rates against {base}", rates.len());
        Ok(rates)
    }
}
