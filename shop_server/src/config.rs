use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use payment_integrations::IntegrationsConfig;
use shop_common::helpers::{parse_duration, parse_list};
use shop_engine::{
    crypto_watcher::WatcherConfig,
    db_types::PaymentMethod,
    rate_limiter::{BucketLimit, RateLimiterConfig},
    reservations::{ReservationConfig, ReservationLimits},
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/shop.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_BASE_CURRENCY: &str = "EUR";
const DEFAULT_FX_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_CARD_PAYMENT_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_CARD_EXPIRY_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_USDT_TRON_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

/// Looks up a configuration value by variable name. The daemon reads the process environment.
pub trait ConfigSource {
    fn get(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl ConfigSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok().filter(|s| !s.trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// The currency prices and carrier fees are stored in
    pub base_currency: String,
    pub fx_refresh_interval: Duration,
    /// How long a card payment may stay unpaid before its order is cancelled
    pub card_payment_ttl: Duration,
    /// How often the expiry worker looks for overdue payments
    pub card_expiry_interval: Duration,
    pub rate_limit_sweep_interval: Duration,
    /// Overrides the persisted item cap on startup when set
    pub max_order_items: Option<i64>,
    pub reservations: ReservationConfig,
    pub rate_limits: RateLimiterConfig,
    /// One entry for every crypto method that has receiving addresses configured
    pub crypto: Vec<WatcherConfig>,
    pub integrations: IntegrationsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            fx_refresh_interval: DEFAULT_FX_REFRESH_INTERVAL,
            card_payment_ttl: DEFAULT_CARD_PAYMENT_TTL,
            card_expiry_interval: DEFAULT_CARD_EXPIRY_INTERVAL,
            rate_limit_sweep_interval: DEFAULT_RATE_LIMIT_SWEEP_INTERVAL,
            max_order_items: None,
            reservations: ReservationConfig::default(),
            rate_limits: RateLimiterConfig::default(),
            crypto: Vec::new(),
            integrations: IntegrationsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let mut config = Self::from_source(&ProcessEnv);
        config.integrations = IntegrationsConfig::new_from_env_or_default();
        config
    }

    /// Everything except the integration endpoints, which always come from the process environment.
    pub fn from_source(src: &dyn ConfigSource) -> Self {
        let database_url = src.get("SHOP_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ SHOP_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}, instead.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = number_or(src, "SHOP_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let base_currency = src.get("SHOP_BASE_CURRENCY").map(|s| s.trim().to_uppercase()).unwrap_or_else(|| {
            info!("🪛️ SHOP_BASE_CURRENCY is not set. Prices are in {DEFAULT_BASE_CURRENCY}.");
            DEFAULT_BASE_CURRENCY.to_string()
        });
        let max_order_items = src.get("SHOP_MAX_ORDER_ITEMS").and_then(|s| match s.trim().parse::<i64>() {
            Ok(n) if n > 0 => Some(n),
            _ => {
                error!("🪛️ {s} is not a valid value for SHOP_MAX_ORDER_ITEMS. Keeping the stored setting.");
                None
            },
        });
        Self {
            database_url,
            max_connections,
            base_currency,
            fx_refresh_interval: duration_or(src, "SHOP_FX_REFRESH_INTERVAL", DEFAULT_FX_REFRESH_INTERVAL),
            card_payment_ttl: duration_or(src, "SHOP_CARD_PAYMENT_TTL", DEFAULT_CARD_PAYMENT_TTL),
            card_expiry_interval: duration_or(src, "SHOP_CARD_EXPIRY_INTERVAL", DEFAULT_CARD_EXPIRY_INTERVAL),
            rate_limit_sweep_interval: duration_or(
                src,
                "SHOP_RATE_LIMIT_SWEEP_INTERVAL",
                DEFAULT_RATE_LIMIT_SWEEP_INTERVAL,
            ),
            max_order_items,
            reservations: reservation_config(src),
            rate_limits: rate_limiter_config(src),
            crypto: crypto_configs(src),
            integrations: IntegrationsConfig::default(),
        }
    }
}

fn reservation_config(src: &dyn ConfigSource) -> ReservationConfig {
    let defaults = ReservationConfig::default();
    let limits = ReservationLimits {
        max_items_per_session: number_or(src, "SHOP_MAX_CART_ITEMS", defaults.limits.max_items_per_session),
        max_qty_per_item: number_or(src, "SHOP_MAX_QTY_PER_ITEM", defaults.limits.max_qty_per_item),
        max_total_reservations: number_or(src, "SHOP_MAX_RESERVATIONS", defaults.limits.max_total_reservations),
        max_ttl_refreshes: number_or(src, "SHOP_MAX_RESERVATION_REFRESHES", defaults.limits.max_ttl_refreshes),
        reserve_rate_per_session: number_or(
            src,
            "SHOP_RESERVE_RATE_PER_MINUTE",
            defaults.limits.reserve_rate_per_session,
        ),
    };
    ReservationConfig {
        cart_ttl: duration_or(src, "SHOP_CART_RESERVATION_TTL", defaults.cart_ttl),
        order_ttl: duration_or(src, "SHOP_ORDER_RESERVATION_TTL", defaults.order_ttl),
        sweep_interval: duration_or(src, "SHOP_RESERVATION_SWEEP_INTERVAL", defaults.sweep_interval),
        limits,
    }
}

fn rate_limiter_config(src: &dyn ConfigSource) -> RateLimiterConfig {
    let defaults = RateLimiterConfig::default();
    let per_hour = |var: &str, default: BucketLimit| BucketLimit::per_hour(number_or(src, var, default.max_requests));
    RateLimiterConfig {
        ip_order: per_hour("SHOP_ORDERS_PER_IP_PER_HOUR", defaults.ip_order),
        email_order: per_hour("SHOP_ORDERS_PER_EMAIL_PER_HOUR", defaults.email_order),
        ip_validate: BucketLimit::per_minute(number_or(
            src,
            "SHOP_VALIDATIONS_PER_IP_PER_MINUTE",
            defaults.ip_validate.max_requests,
        )),
        ip_support: per_hour("SHOP_TICKETS_PER_IP_PER_HOUR", defaults.ip_support),
        email_support: per_hour("SHOP_TICKETS_PER_EMAIL_PER_HOUR", defaults.email_support),
    }
}

/// The environment prefix for a crypto method's settings, e.g. `SHOP_USDT_TRON_TEST`.
pub fn method_prefix(method: PaymentMethod) -> String {
    format!("SHOP_{}", method.as_str().to_uppercase())
}

fn crypto_configs(src: &dyn ConfigSource) -> Vec<WatcherConfig> {
    PaymentMethod::ALL.into_iter().filter(|m| m.is_crypto()).filter_map(|m| crypto_config(src, m)).collect()
}

fn crypto_config(src: &dyn ConfigSource, method: PaymentMethod) -> Option<WatcherConfig> {
    let prefix = method_prefix(method);
    let addresses = src.get(&format!("{prefix}_ADDRESSES")).map(|s| parse_list(&s)).unwrap_or_default();
    if addresses.is_empty() {
        info!("🪛️ {prefix}_ADDRESSES is not set. {method} payments are unavailable.");
        return None;
    }
    let mut config = WatcherConfig::new(method, addresses);
    let contract = src.get(&format!("{prefix}_CONTRACT")).or_else(|| match method {
        PaymentMethod::UsdtTron => Some(DEFAULT_USDT_TRON_CONTRACT.to_string()),
        _ => None,
    });
    match (method, contract) {
        (PaymentMethod::UsdtTron | PaymentMethod::UsdtTronTest, None) => {
            error!("🪛️ {prefix}_CONTRACT is not set. {method} payments are unavailable.");
            return None;
        },
        (_, Some(contract)) => config = config.with_token_contract(contract.trim()),
        (_, None) => {},
    }
    config.token_decimals = number_or(src, &format!("{prefix}_DECIMALS"), config.token_decimals);
    if let Some(currency) = src.get(&format!("{prefix}_CURRENCY")) {
        config.payment_currency = currency.trim().to_uppercase();
    }
    config.check_interval = duration_or(src, "SHOP_CRYPTO_CHECK_INTERVAL", config.check_interval);
    config.invoice_expiration = duration_or(src, "SHOP_CRYPTO_INVOICE_EXPIRATION", config.invoice_expiration);
    config.explorer_timeout = duration_or(src, "SHOP_HTTP_TIMEOUT", config.explorer_timeout);
    info!("🪛️ {method} payments go to {} addresses", config.addresses.len());
    Some(config)
}

fn duration_or(src: &dyn ConfigSource, var: &str, default: Duration) -> Duration {
    match src.get(var) {
        None => {
            debug!("🪛️ {var} is not set. Using the default value of {}s.", default.as_secs());
            default
        },
        Some(s) => parse_duration(&s).unwrap_or_else(|| {
            let secs = default.as_secs();
            error!("🪛️ {s} is not a valid duration for {var}. Using the default, {secs}s, instead.");
            default
        }),
    }
}

fn number_or<T>(src: &dyn ConfigSource, var: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match src.get(var) {
        None => default,
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    struct Vars(HashMap<&'static str, &'static str>);

    impl ConfigSource for Vars {
        fn get(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|s| s.to_string())
        }
    }

    fn vars(pairs: &[(&'static str, &'static str)]) -> Vars {
        Vars(pairs.iter().copied().collect())
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::from_source(&vars(&[]));
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.base_currency, "EUR");
        assert_eq!(config.card_payment_ttl, Duration::from_secs(900));
        assert_eq!(config.card_expiry_interval, Duration::from_secs(60));
        assert_eq!(config.reservations, ReservationConfig::default());
        assert_eq!(config.rate_limits, RateLimiterConfig::default());
        assert!(config.crypto.is_empty());
        assert!(config.max_order_items.is_none());
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = ServerConfig::from_source(&vars(&[
            ("SHOP_BASE_CURRENCY", "usd"),
            ("SHOP_CARD_PAYMENT_TTL", "30m"),
            ("SHOP_CART_RESERVATION_TTL", "soon"),
            ("SHOP_MAX_QTY_PER_ITEM", "3"),
            ("SHOP_TICKETS_PER_IP_PER_HOUR", "-1"),
            ("SHOP_MAX_ORDER_ITEMS", "0"),
        ]));
        assert_eq!(config.base_currency, "USD");
        assert_eq!(config.card_payment_ttl, Duration::from_secs(1800));
        assert_eq!(config.reservations.cart_ttl, Duration::from_secs(900));
        assert_eq!(config.reservations.limits.max_qty_per_item, 3);
        assert_eq!(config.rate_limits.ip_support, BucketLimit::per_hour(2));
        assert!(config.max_order_items.is_none());
    }

    #[test]
    fn crypto_methods() {
        let config = ServerConfig::from_source(&vars(&[
            ("SHOP_USDT_TRON_ADDRESSES", "TAddressOne, TAddressTwo"),
            ("SHOP_USDT_TRON_TEST_ADDRESSES", "TTestOne"),
            ("SHOP_ETH_ADDRESSES", "0xshop"),
            ("SHOP_CRYPTO_INVOICE_EXPIRATION", "2h"),
        ]));
        // The test network has no default token contract
        assert_eq!(config.crypto.len(), 2);
        let usdt = config.crypto.iter().find(|c| c.method == PaymentMethod::UsdtTron).unwrap();
        assert_eq!(usdt.addresses, vec!["TAddressOne", "TAddressTwo"]);
        assert_eq!(usdt.token_contract.as_deref(), Some(DEFAULT_USDT_TRON_CONTRACT));
        assert_eq!(usdt.token_decimals, 6);
        assert_eq!(usdt.invoice_expiration, Duration::from_secs(7200));
        let eth = config.crypto.iter().find(|c| c.method == PaymentMethod::Eth).unwrap();
        assert!(eth.token_contract.is_none());
        assert_eq!(eth.token_decimals, 18);
        assert_eq!(eth.payment_currency, "ETH");
    }

    #[test]
    fn prefixes() {
        assert_eq!(method_prefix(PaymentMethod::UsdtTronTest), "SHOP_USDT_TRON_TEST");
        assert_eq!(method_prefix(PaymentMethod::Eth), "SHOP_ETH");
    }
}
