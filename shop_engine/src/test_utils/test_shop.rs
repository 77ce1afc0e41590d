use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use log::*;
use shop_common::Decimal;

use crate::{
    crypto_watcher::{CryptoWatcher, PaymentWatchers, WatcherConfig},
    currency::CurrencyService,
    db_types::{OrderStatusType, PaymentMethod},
    events::{mail_hooks, EventHandlers, MAIL_EVENT_BUFFER_SIZE},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    reservations::{ReservationConfig, ReservationManager},
    test_utils::{
        fakes::{FakeCardProcessor, FakeExplorer, RecordingMailer},
        fixtures::seed_catalog,
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::{CatalogManagement, OrderManagement},
    AdminApi,
    OrderFlowApi,
    OrderTransitions,
    SqliteDatabase,
    StorefrontApi,
};

pub const BASE_CURRENCY: &str = "EUR";
pub const USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
pub const USDT_ADDRESSES: [&str; 2] = ["TAddressOne", "TAddressTwo"];

#[derive(Debug, Clone)]
pub struct TestShopConfig {
    pub usdt_addresses: Vec<String>,
    pub check_interval: Duration,
    pub invoice_expiration: Duration,
    pub card_payment_ttl: Duration,
    pub rate_limits: RateLimiterConfig,
    pub reservations: ReservationConfig,
}

impl Default for TestShopConfig {
    fn default() -> Self {
        Self {
            usdt_addresses: USDT_ADDRESSES.iter().map(|s| s.to_string()).collect(),
            check_interval: Duration::from_millis(50),
            invoice_expiration: Duration::from_secs(60 * 60),
            card_payment_ttl: Duration::from_secs(15 * 60),
            rate_limits: RateLimiterConfig::default(),
            reservations: ReservationConfig::default(),
        }
    }
}

/// A complete engine on a fresh database with a seeded catalog and fake collaborators. EUR is the base currency and
/// one euro buys 1.10 USD. The only crypto method configured is `usdt_tron`.
pub struct TestShop {
    pub db: SqliteDatabase,
    pub currency: CurrencyService,
    pub card: Arc<FakeCardProcessor>,
    pub explorer: Arc<FakeExplorer>,
    pub mailer: Arc<RecordingMailer>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub storefront: StorefrontApi<SqliteDatabase>,
    pub admin: AdminApi<SqliteDatabase>,
}

impl TestShop {
    pub async fn new() -> Self {
        Self::with_config(TestShopConfig::default()).await
    }

    pub async fn with_config(config: TestShopConfig) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        seed_catalog(&db).await;

        let currency = CurrencyService::new(BASE_CURRENCY);
        currency.set_rates(default_rates()).await;
        let card = Arc::new(FakeCardProcessor::new());
        let explorer = Arc::new(FakeExplorer::new());
        let mailer = Arc::new(RecordingMailer::new());

        let handlers = EventHandlers::new(MAIL_EVENT_BUFFER_SIZE, mail_hooks(mailer.clone()));
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let reservations = ReservationManager::new(config.reservations);
        let transitions = OrderTransitions::new(db.clone(), reservations.clone(), producers.clone());
        let mut usdt = WatcherConfig::new(PaymentMethod::UsdtTron, config.usdt_addresses.clone())
            .with_token_contract(USDT_CONTRACT);
        usdt.check_interval = config.check_interval;
        usdt.invoice_expiration = config.invoice_expiration;
        let watcher = CryptoWatcher::new(usdt, db.clone(), currency.clone(), explorer.clone(), transitions);
        let watchers = PaymentWatchers::new().with_watcher(watcher);
        watchers.start_all().await;

        let orders = OrderFlowApi::new(
            db.clone(),
            currency.clone(),
            reservations,
            RateLimiter::new(config.rate_limits),
            card.clone(),
            watchers,
            producers,
        )
        .with_card_payment_ttl(config.card_payment_ttl);
        let storefront = StorefrontApi::new(orders.clone());
        let admin = AdminApi::new(&orders);
        info!("🚀️ Test shop ready on {url}");
        Self { db, currency, card, explorer, mailer, orders, storefront, admin }
    }

    pub async fn stock(&self, product_id: i64, size_id: i64) -> i64 {
        let size = self.db.fetch_product_size(product_id, size_id).await.expect("Error fetching stock");
        size.map(|s| s.quantity).unwrap_or_default()
    }

    pub async fn status_of(&self, uuid: &str) -> OrderStatusType {
        let order = self.db.fetch_order_by_uuid(uuid).await.expect("Error fetching order");
        order.expect("Order does not exist").status
    }

    /// Polls until the order reaches `status`. Returns false if it has not after `timeout`.
    pub async fn wait_for_status(&self, uuid: &str, status: OrderStatusType, timeout: Duration) -> bool {
        wait_until(timeout, move || async move { self.status_of(uuid).await == status }).await
    }

    /// Polls until an email whose subject contains `subject` has been sent to `to`.
    pub async fn wait_for_mail(&self, to: &str, subject: &str, timeout: Duration) -> bool {
        let sent = move || async move { self.mailer.sent_to(to).iter().any(|e| e.subject.contains(subject)) };
        wait_until(timeout, sent).await
    }

    pub fn usdt_watcher(&self) -> &CryptoWatcher<SqliteDatabase> {
        self.orders.watchers().get(PaymentMethod::UsdtTron).expect("usdt_tron watcher is configured")
    }
}

pub fn default_rates() -> HashMap<String, Decimal> {
    let mut rates = HashMap::new();
    rates.insert("USD".to_string(), Decimal::new(110, 2));
    rates.insert("GBP".to_string(), Decimal::new(85, 2));
    rates.insert("JPY".to_string(), Decimal::new(16250, 2));
    rates
}

/// Polls `check` every 20ms until it returns true or `timeout` has passed.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
