use std::{env, time::Duration};

use log::*;
use shop_common::{helpers::parse_duration, Secret};

const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com/v1";
const DEFAULT_TRONGRID_URL: &str = "https://api.trongrid.io";
const DEFAULT_TRONGRID_TEST_URL: &str = "https://api.shasta.trongrid.io";
const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io";
const DEFAULT_ETHERSCAN_TEST_URL: &str = "https://api-sepolia.etherscan.io";
const DEFAULT_FIAT_RATES_URL: &str = "https://api.frankfurter.app/latest";
const DEFAULT_CRYPTO_RATES_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    /// Used for the `card_test` payment method
    pub test_secret_key: Secret<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ExplorerConfig {
    pub url: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct FxConfig {
    pub fiat_url: String,
    pub crypto_url: String,
    pub timeout: Duration,
}

/// Endpoints and credentials for every external service the shop talks to.
#[derive(Debug, Clone, Default)]
pub struct IntegrationsConfig {
    pub stripe: StripeConfig,
    pub tron_grid: ExplorerConfig,
    pub tron_grid_test: ExplorerConfig,
    pub etherscan: ExplorerConfig,
    pub etherscan_test: ExplorerConfig,
    pub fx: FxConfig,
}

impl IntegrationsConfig {
    pub fn new_from_env_or_default() -> Self {
        let timeout = env::var("SHOP_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| {
                let timeout = parse_duration(&s);
                if timeout.is_none() {
                    warn!("🪛️ {s} is not a valid duration for SHOP_HTTP_TIMEOUT. Using the default instead.");
                }
                timeout
            })
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let stripe = StripeConfig {
            api_url: env_or("SHOP_STRIPE_API_URL", DEFAULT_STRIPE_API_URL),
            secret_key: secret("SHOP_STRIPE_SECRET_KEY"),
            test_secret_key: secret("SHOP_STRIPE_TEST_SECRET_KEY"),
            timeout,
        };
        let tron_key = secret("SHOP_TRONGRID_API_KEY");
        let tron_grid = ExplorerConfig {
            url: env_or("SHOP_TRONGRID_URL", DEFAULT_TRONGRID_URL),
            api_key: tron_key.clone(),
            timeout,
        };
        let tron_grid_test = ExplorerConfig {
            url: env_or("SHOP_TRONGRID_TEST_URL", DEFAULT_TRONGRID_TEST_URL),
            api_key: tron_key,
            timeout,
        };
        let etherscan_key = secret("SHOP_ETHERSCAN_API_KEY");
        let etherscan = ExplorerConfig {
            url: env_or("SHOP_ETHERSCAN_URL", DEFAULT_ETHERSCAN_URL),
            api_key: etherscan_key.clone(),
            timeout,
        };
        let etherscan_test = ExplorerConfig {
            url: env_or("SHOP_ETHERSCAN_TEST_URL", DEFAULT_ETHERSCAN_TEST_URL),
            api_key: etherscan_key,
            timeout,
        };
        let fx = FxConfig {
            fiat_url: env_or("SHOP_FX_FIAT_URL", DEFAULT_FIAT_RATES_URL),
            crypto_url: env_or("SHOP_FX_CRYPTO_URL", DEFAULT_CRYPTO_RATES_URL),
            timeout,
        };
        Self { stripe, tron_grid, tron_grid_test, etherscan, etherscan_test, fx }
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
        debug!("🪛️ {var} is not set. Using {default}");
        default.to_string()
    })
}

fn secret(var: &str) -> Secret<String> {
    let value = env::var(var).unwrap_or_else(|_| {
        warn!("🪛️ {var} is not set. The integration that needs it will refuse requests.");
        String::default()
    });
    Secret::new(value)
}
