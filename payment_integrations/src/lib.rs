//! HTTP implementations of the collaborator traits the shop engine depends on.
//!
//! * [`StripeCardProcessor`] creates, queries and cancels payment intents.
//! * [`TronGridExplorer`] and [`EtherscanExplorer`] report incoming transfers to a receiving address.
//! * [`FiatRates`] and [`CryptoRates`] feed the currency service.
//!
//! Every client shares the same [`RestClient`] plumbing and is configured from the environment through
//! [`IntegrationsConfig`].
mod config;
mod error;
mod etherscan;
mod fx_rates;
mod helpers;
mod rest_client;
mod stripe;
mod tron_grid;

pub use config::{ExplorerConfig, FxConfig, IntegrationsConfig, StripeConfig};
pub use error::IntegrationError;
pub use etherscan::EtherscanExplorer;
pub use fx_rates::{CryptoRates, FiatRates};
pub use helpers::to_minor_units;
pub use rest_client::RestClient;
pub use stripe::StripeCardProcessor;
pub use tron_grid::TronGridExplorer;
