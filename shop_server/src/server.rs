use std::sync::Arc;

use futures::future::join_all;
use log::*;
use payment_integrations::{
    CryptoRates,
    EtherscanExplorer,
    FiatRates,
    IntegrationError,
    IntegrationsConfig,
    StripeCardProcessor,
    TronGridExplorer,
};
use shop_engine::{
    crypto_watcher::{CryptoWatcher, PaymentWatchers, WatcherConfig},
    currency::CurrencyService,
    db_types::PaymentMethod,
    events::{mail_hooks, EventHandlers, MAIL_EVENT_BUFFER_SIZE},
    rate_limiter::RateLimiter,
    reservations::ReservationManager,
    traits::{CardProcessor, ChainExplorer, RateSource},
    AdminApi,
    OrderFlowApi,
    OrderTransitions,
    SqliteDatabase,
    StorefrontApi,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{config::ServerConfig, errors::ServerError, expiry_worker::start_expiry_worker, mailer::LogMailer};

/// A running shop: the public APIs plus the background tasks that serve them.
pub struct Shop {
    pub storefront: StorefrontApi<SqliteDatabase>,
    pub admin: AdminApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    db: SqliteDatabase,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Shop {
    /// Stops every worker and watcher and closes the database.
    pub async fn shutdown(self) {
        info!("🕰️ Stopping background workers");
        self.shutdown.cancel();
        self.orders.reservations().stop();
        self.orders.watchers().stop_all();
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                warn!("🕰️ A worker did not stop cleanly. {e}");
            }
        }
        self.db.pool().close().await;
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let shop = start_shop(config).await?;
    info!("🚀️ Shop is running. Press Ctrl-C to stop.");
    let signal = tokio::signal::ctrl_c().await;
    info!("🚀️ Shutting down");
    shop.shutdown().await;
    signal.map_err(ServerError::from)
}

/// Opens the database and wires the engine to the configured integrations.
pub async fn start_shop(config: ServerConfig) -> Result<Shop, ServerError> {
    let db = open_database(&config.database_url, config.max_connections).await?;
    let init = |e: IntegrationError| ServerError::InitializeError(e.to_string());
    let fiat: Arc<dyn RateSource> = Arc::new(FiatRates::new(&config.integrations.fx).map_err(init)?);
    let crypto: Arc<dyn RateSource> = Arc::new(CryptoRates::new(&config.integrations.fx).map_err(init)?);
    let card = Arc::new(StripeCardProcessor::new(&config.integrations.stripe).map_err(init)?);
    let explorers = config
        .crypto
        .iter()
        .map(|c| explorer_for(c, &config.integrations).map_err(init))
        .collect::<Result<Vec<_>, _>>()?;
    assemble(config, db, fiat, crypto, card, explorers).await
}

/// Builds the engine around the given collaborators. `explorers` pairs up with `config.crypto`.
pub async fn assemble(
    config: ServerConfig,
    db: SqliteDatabase,
    fiat: Arc<dyn RateSource>,
    crypto: Arc<dyn RateSource>,
    card: Arc<dyn CardProcessor>,
    explorers: Vec<Arc<dyn ChainExplorer>>,
) -> Result<Shop, ServerError> {
    let shutdown = CancellationToken::new();
    let mut workers = Vec::new();

    let currency = CurrencyService::new(config.base_currency.as_str());
    let refresher = currency.clone().run_refresher(fiat, crypto, config.fx_refresh_interval, shutdown.clone());
    workers.push(tokio::spawn(refresher));

    let handlers = EventHandlers::new(MAIL_EVENT_BUFFER_SIZE, mail_hooks(Arc::new(LogMailer)));
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let reservations = ReservationManager::new(config.reservations);
    workers.push(reservations.start_sweeper());
    let rate_limiter = RateLimiter::new(config.rate_limits.clone());
    let sweeper = rate_limiter.clone().run_sweeper(config.rate_limit_sweep_interval, shutdown.clone());
    workers.push(tokio::spawn(sweeper));

    let transitions = OrderTransitions::new(db.clone(), reservations.clone(), producers.clone());
    let mut watchers = PaymentWatchers::new();
    for (watcher_config, explorer) in config.crypto.into_iter().zip(explorers) {
        let watcher = CryptoWatcher::new(watcher_config, db.clone(), currency.clone(), explorer, transitions.clone());
        watchers = watchers.with_watcher(watcher);
    }
    let resumed = watchers.start_all().await;
    info!("⛓️ Watching {:?}. {resumed} unpaid crypto orders resumed", watchers.methods());

    let orders = OrderFlowApi::new(db.clone(), currency, reservations, rate_limiter, card, watchers, producers)
        .with_card_payment_ttl(config.card_payment_ttl);
    let storefront = StorefrontApi::new(orders.clone());
    let admin = AdminApi::new(&orders);
    if let Some(max) = config.max_order_items {
        admin.set_max_order_items(max).await?;
        info!("🪛️ Orders are limited to {max} items");
    }
    workers.push(start_expiry_worker(orders.clone(), config.card_expiry_interval, shutdown.clone()));
    Ok(Shop { storefront, admin, orders, db, shutdown, workers })
}

async fn open_database(url: &str, max_connections: u32) -> Result<SqliteDatabase, ServerError> {
    if !Sqlite::database_exists(url).await? {
        info!("🗃️ Creating database {url}");
        Sqlite::create_database(url).await?;
    }
    let db = SqliteDatabase::new_with_url(url, max_connections).await?;
    db.migrate().await?;
    Ok(db)
}

fn explorer_for(
    config: &WatcherConfig,
    integrations: &IntegrationsConfig,
) -> Result<Arc<dyn ChainExplorer>, IntegrationError> {
    let contract = config.token_contract.clone();
    let explorer: Arc<dyn ChainExplorer> = match config.method {
        PaymentMethod::UsdtTron => Arc::new(TronGridExplorer::new(&integrations.tron_grid, contract)?),
        PaymentMethod::UsdtTronTest => Arc::new(TronGridExplorer::new(&integrations.tron_grid_test, contract)?),
        PaymentMethod::Eth => Arc::new(EtherscanExplorer::new(&integrations.etherscan, contract)?),
        PaymentMethod::EthTest => Arc::new(EtherscanExplorer::new(&integrations.etherscan_test, contract)?),
        PaymentMethod::Card | PaymentMethod::CardTest => {
            return Err(IntegrationError::NotConfigured("chain explorer for card payments"));
        },
    };
    Ok(explorer)
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, time::Duration};

    use shop_common::Decimal;
    use shop_engine::{
        db_types::{OrderStatusType, PaymentMethod},
        order_objects::{CartItem, ClientContext},
        test_utils::{
            fakes::{FakeCardProcessor, FakeExplorer},
            fixtures::{order_request, seed_catalog, COAT_ID, PICKUP_ID, SIZE_XXS},
            prepare_env::{prepare_test_env, random_db_path},
            test_shop::{default_rates, USDT_CONTRACT},
        },
        traits::RateSourceError,
    };

    use super::*;

    struct FixedRates;

    #[async_trait::async_trait]
    impl RateSource for FixedRates {
        async fn fetch_rates(&self, _base: &str) -> Result<HashMap<String, Decimal>, RateSourceError> {
            Ok(default_rates())
        }
    }

    #[test]
    fn explorers_follow_the_method() {
        let integrations = IntegrationsConfig::default();
        let usdt = WatcherConfig::new(PaymentMethod::UsdtTron, vec!["TAddressOne".into()]);
        assert!(explorer_for(&usdt, &integrations).is_ok());
        let card = WatcherConfig::new(PaymentMethod::Card, vec![]);
        assert!(explorer_for(&card, &integrations).is_err());
    }

    #[tokio::test]
    async fn assembled_shop_takes_orders_and_shuts_down() {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error opening database");
        seed_catalog(&db).await;
        let usdt =
            WatcherConfig::new(PaymentMethod::UsdtTron, vec!["TAddressOne".into()]).with_token_contract(USDT_CONTRACT);
        let config = ServerConfig { database_url: url.clone(), crypto: vec![usdt], ..Default::default() };
        let explorer: Arc<dyn ChainExplorer> = Arc::new(FakeExplorer::new());
        let card = Arc::new(FakeCardProcessor::new());
        let shop = assemble(config, db, Arc::new(FixedRates), Arc::new(FixedRates), card, vec![explorer])
            .await
            .expect("Error assembling shop");
        assert_eq!(shop.orders.watchers().methods(), vec![PaymentMethod::UsdtTron]);

        let ctx = ClientContext::new("10.8.0.1", "server");
        let request = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::Card);
        let submitted = shop.storefront.submit_order(&ctx, request).await.expect("Error submitting order");
        let order = shop.storefront.get_order_by_uuid(&submitted.order_uuid).await.expect("Error fetching order");
        assert_eq!(order.status, OrderStatusType::AwaitingPayment);

        tokio::time::timeout(Duration::from_secs(5), shop.shutdown()).await.expect("Shutdown hung");
        let _ = Sqlite::drop_database(&url).await;
    }
}
