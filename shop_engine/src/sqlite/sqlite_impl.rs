//! `SqliteDatabase` is the concrete storage backend of the shop engine.
//!
//! It uses SQLite and implements all the storage traits defined in the [`crate::traits`] module. Every method that
//! touches more than one row opens a transaction, so a failure part-way through leaves the database unchanged.
use std::fmt::Debug;

use chrono::Utc;

use futures_util::future::BoxFuture;
use log::*;
use serde_json::Value;
use sqlx::{migrate, pool::PoolConnection, Sqlite, SqliteConnection, SqlitePool};

use super::db::{archives, carriers, customers, db_url, new_pool, orders, payments, products, promos, settings};
use crate::{
    db_types::{
        Archive,
        CarrierPrice,
        Money,
        NewArchive,
        NewOrder,
        NewProduct,
        NewPromoCode,
        NewShipmentCarrier,
        NewSupportTicket,
        Order,
        OrderStatusType,
        Payment,
        PaymentMethod,
        Product,
        ProductSize,
        PromoCode,
        ShipmentCarrier,
        ShopSettings,
        Subscriber,
        SupportTicket,
        TicketStatus,
    },
    order_state::{next_status, restocks_on_entry, OrderTrigger},
    shop_api::{catalog_objects::ProductQuery, order_objects::OrderQueryFilter},
    traits::{
        CatalogError,
        CatalogManagement,
        CustomerError,
        CustomerManagement,
        InvoiceAssignment,
        OrderDetails,
        OrderManagement,
        OrderStoreError,
        ProductDetails,
        ProductPage,
        SettingsManagement,
        TransitionChange,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs `f` inside a single write transaction. The transaction commits if `f` returns `Ok` and rolls back
    /// otherwise, so every row `f` writes lands together or not at all.
    ///
    /// The transaction is opened with `BEGIN IMMEDIATE`, taking the write lock before the first read. Two writers
    /// that read before they write queue up behind the busy timeout instead of failing with `SQLITE_BUSY_SNAPSHOT`.
    ///
    /// `f` receives the transaction's connection and should only capture owned data.
    pub async fn tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<sqlx::Error> + Send,
    {
        let mut tx = WriteTransaction::begin(&self.pool).await?;
        let result = match tx.conn.as_deref_mut() {
            Some(conn) => f(conn).await,
            None => return Err(sqlx::Error::PoolClosed.into()),
        };
        match result {
            Ok(value) => {
                tx.end("COMMIT").await?;
                Ok(value)
            },
            Err(e) => {
                if let Err(rollback) = tx.end("ROLLBACK").await {
                    warn!("🗃️ Could not roll back transaction: {rollback}");
                }
                Err(e)
            },
        }
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }
}

/// A pooled connection with an open `BEGIN IMMEDIATE` transaction. If it is dropped before `COMMIT` or `ROLLBACK`
/// succeeds (an error, or the caller's future being cancelled), the connection is detached from the pool and
/// closed, which makes SQLite roll the transaction back.
struct WriteTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTransaction {
    async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    async fn end(mut self, statement: &'static str) -> Result<(), sqlx::Error> {
        if let Some(conn) = self.conn.as_deref_mut() {
            sqlx::query(statement).execute(conn).await?;
        }
        // Back to the pool with no transaction open
        self.conn.take();
        Ok(())
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("🗃️ A write transaction was abandoned. Closing its connection.");
            drop(conn.detach());
        }
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_product(&self, id: i64) -> Result<Option<Product>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_product(id, &mut conn).await?)
    }

    async fn fetch_product_details(&self, id: i64) -> Result<Option<ProductDetails>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_product_details(id, &mut conn).await?)
    }

    async fn fetch_products_paged(&self, query: &ProductQuery) -> Result<ProductPage, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_products_paged(query, &mut conn).await?)
    }

    async fn fetch_product_size(&self, product_id: i64, size_id: i64) -> Result<Option<ProductSize>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_product_size(product_id, size_id, &mut conn).await?)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<ProductDetails, CatalogError> {
        self.tx(move |conn| Box::pin(async move { products::insert_product(product, conn).await })).await
    }

    async fn set_stock(&self, product_id: i64, size_id: i64, quantity: i64) -> Result<ProductSize, CatalogError> {
        if quantity < 0 {
            return Err(CatalogError::NegativeStock);
        }
        let size = self
            .tx(move |conn| {
                Box::pin(async move {
                    products::fetch_product(product_id, conn).await?.ok_or(CatalogError::ProductNotFound(product_id))?;
                    Ok::<_, CatalogError>(products::upsert_stock(product_id, size_id, quantity, conn).await?)
                })
            })
            .await?;
        debug!("🗃️ Stock of {product_id}/{size_id} set to {quantity}");
        Ok(size)
    }

    async fn set_product_hidden(&self, product_id: i64, hidden: bool) -> Result<Product, CatalogError> {
        self.tx(move |conn| Box::pin(async move { products::set_hidden(product_id, hidden, conn).await }))
            .await?
            .ok_or(CatalogError::ProductNotFound(product_id))
    }

    async fn fetch_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promos::fetch_promo_by_code(code, &mut conn).await?)
    }

    async fn insert_promo(&self, promo: NewPromoCode) -> Result<PromoCode, CatalogError> {
        self.tx(move |conn| Box::pin(async move { promos::insert_promo(promo, conn).await })).await
    }

    async fn set_promo_allowed(&self, code: &str, allowed: bool) -> Result<PromoCode, CatalogError> {
        let code = code.to_string();
        self.tx(move |conn| {
            Box::pin(async move {
                let promo = promos::set_promo_allowed(&code, allowed, conn).await?;
                promo.ok_or(CatalogError::PromoNotFound(code))
            })
        })
        .await
    }

    async fn delete_promo(&self, code: &str) -> Result<bool, CatalogError> {
        let code = code.to_string();
        self.tx(move |conn| Box::pin(async move { Ok(promos::delete_promo(&code, conn).await?) })).await
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promos::list_promos(&mut conn).await?)
    }

    async fn fetch_carrier(&self, id: i64) -> Result<Option<ShipmentCarrier>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carriers::fetch_carrier(id, &mut conn).await?)
    }

    async fn list_carriers(&self) -> Result<Vec<ShipmentCarrier>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carriers::list_carriers(&mut conn).await?)
    }

    async fn insert_carrier(&self, carrier: NewShipmentCarrier) -> Result<ShipmentCarrier, CatalogError> {
        let carrier =
            self.tx(move |conn| Box::pin(async move { carriers::insert_carrier(carrier, conn).await })).await?;
        debug!("🗃️ Shipment carrier {} [{}] created", carrier.id, carrier.carrier);
        Ok(carrier)
    }

    async fn fetch_carrier_prices(&self, id: i64) -> Result<Vec<CarrierPrice>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carriers::fetch_prices(id, &mut conn).await?)
    }

    async fn set_carrier_allowed(&self, id: i64, allowed: bool) -> Result<ShipmentCarrier, CatalogError> {
        self.tx(move |conn| Box::pin(async move { carriers::set_allowed(id, allowed, conn).await }))
            .await?
            .ok_or(CatalogError::CarrierNotFound(id))
    }

    async fn set_carrier_base_price(&self, id: i64, price: Money) -> Result<ShipmentCarrier, CatalogError> {
        self.tx(move |conn| Box::pin(async move { carriers::set_base_price(id, price, conn).await }))
            .await?
            .ok_or(CatalogError::CarrierNotFound(id))
    }

    async fn set_carrier_price(&self, id: i64, currency: &str, price: Money) -> Result<(), CatalogError> {
        let currency = currency.to_string();
        self.tx(move |conn| {
            Box::pin(async move {
                carriers::fetch_carrier(id, conn).await?.ok_or(CatalogError::CarrierNotFound(id))?;
                carriers::upsert_price(id, &currency, price, conn).await?;
                Ok(())
            })
        })
        .await
    }

    async fn insert_archive(&self, archive: NewArchive) -> Result<Archive, CatalogError> {
        self.tx(move |conn| Box::pin(async move { Ok(archives::insert_archive(archive, conn).await?) })).await
    }

    async fn fetch_archives_paged(
        &self,
        limit: i64,
        offset: i64,
        newest_first: bool,
    ) -> Result<Vec<Archive>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        Ok(archives::fetch_archives_paged(limit, offset, newest_first, &mut conn).await?)
    }
}

impl SettingsManagement for SqliteDatabase {
    async fn fetch_settings(&self) -> Result<ShopSettings, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        settings::fetch_settings(&mut conn).await
    }

    async fn set_site_available(&self, available: bool) -> Result<(), CatalogError> {
        self.tx(move |conn| Box::pin(async move { Ok(settings::set_site_available(available, conn).await?) })).await
    }

    async fn set_max_order_items(&self, max: i64) -> Result<(), CatalogError> {
        self.tx(move |conn| Box::pin(async move { Ok(settings::set_max_order_items(max, conn).await?) })).await
    }

    async fn set_payment_method_allowed(&self, method: PaymentMethod, allowed: bool) -> Result<(), CatalogError> {
        self.tx(move |conn| {
            Box::pin(async move { Ok(settings::set_payment_method_allowed(method, allowed, conn).await?) })
        })
        .await
    }

    async fn fetch_hero(&self) -> Result<Option<Value>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        settings::fetch_hero(&mut conn).await
    }

    async fn set_hero(&self, hero: Value) -> Result<(), CatalogError> {
        self.tx(move |conn| Box::pin(async move { Ok(settings::set_hero(&hero, conn).await?) })).await
    }
}

impl OrderManagement for SqliteDatabase {
    /// Takes a priced order and, in a single atomic transaction,
    /// * inserts the order row in `awaiting_payment`,
    /// * inserts both addresses, the buyer, the shipment and the payment,
    /// * decrements stock for every line and freezes a copy of the line,
    /// * subscribes the buyer to promo emails if they asked for it.
    ///
    /// If any line would drive stock negative, nothing is written.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        let row = self.tx(move |conn| Box::pin(async move { insert_order_rows(order, conn).await })).await?;
        debug!("🗃️ Order {} [{}] saved", row.id, row.uuid);
        Ok(row)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(id, &mut conn).await?)
    }

    async fn fetch_order_by_uuid(&self, uuid: &str) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_uuid(uuid, &mut conn).await?)
    }

    async fn fetch_order_details(&self, id: i64) -> Result<Option<OrderDetails>, OrderStoreError> {
        self.tx(move |conn| Box::pin(async move { fetch_order_details(id, conn).await })).await
    }

    async fn fetch_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_payment_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Payment>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_by_transaction_id(transaction_id, &mut conn).await?)
    }

    async fn set_card_intent(
        &self,
        order_id: i64,
        intent_id: &str,
        client_secret: &str,
    ) -> Result<Payment, OrderStoreError> {
        let (intent_id, client_secret) = (intent_id.to_string(), client_secret.to_string());
        self.tx(move |conn| {
            Box::pin(async move { payments::set_card_intent(order_id, &intent_id, &client_secret, conn).await })
        })
        .await
    }

    async fn assign_crypto_invoice(
        &self,
        order_id: i64,
        invoice: InvoiceAssignment,
    ) -> Result<Payment, OrderStoreError> {
        self.tx(move |conn| Box::pin(async move { payments::assign_crypto_invoice(order_id, invoice, conn).await }))
            .await
    }

    async fn transition_order(
        &self,
        order_id: i64,
        trigger: OrderTrigger,
        change: TransitionChange,
    ) -> Result<TransitionOutcome, OrderStoreError> {
        let outcome = self
            .tx(move |conn| Box::pin(async move { apply_transition(order_id, trigger, change, conn).await }))
            .await?;
        let (order, previous) = (&outcome.order, outcome.previous);
        info!("🗃️ Order {} [{}] moved from {previous} to {} ({trigger})", order.id, order.uuid, order.status);
        Ok(outcome)
    }

    async fn fetch_awaiting_payments(&self, method: Option<PaymentMethod>) -> Result<Vec<Payment>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_awaiting_payments(method, &mut conn).await?)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }
}

impl CustomerManagement for SqliteDatabase {
    async fn upsert_subscriber(&self, email: &str, receive_promo_emails: bool) -> Result<Subscriber, CustomerError> {
        let email = email.to_string();
        self.tx(move |conn| {
            Box::pin(async move { Ok(customers::upsert_subscriber(&email, receive_promo_emails, conn).await?) })
        })
        .await
    }

    async fn remove_subscriber(&self, email: &str) -> Result<bool, CustomerError> {
        let email = email.to_string();
        self.tx(move |conn| Box::pin(async move { Ok(customers::remove_subscriber(&email, conn).await?) })).await
    }

    async fn fetch_subscriber(&self, email: &str) -> Result<Option<Subscriber>, CustomerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(customers::fetch_subscriber(email, &mut conn).await?)
    }

    async fn insert_support_ticket(&self, ticket: NewSupportTicket) -> Result<SupportTicket, CustomerError> {
        self.tx(move |conn| Box::pin(async move { Ok(customers::insert_ticket(ticket, conn).await?) })).await
    }

    async fn update_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
        internal_notes: Option<String>,
    ) -> Result<SupportTicket, CustomerError> {
        self.tx(move |conn| {
            Box::pin(async move { customers::update_ticket_status(id, status, internal_notes, conn).await })
        })
        .await
    }

    async fn search_tickets(
        &self,
        status: Option<TicketStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SupportTicket>, CustomerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(customers::search_tickets(status, limit, offset, &mut conn).await?)
    }
}

/// Writes the order and every child row, and takes the ordered units out of stock.
///
/// * the order row is inserted in `awaiting_payment`,
/// * both addresses, the buyer, the shipment and the payment follow,
/// * every line decrements its stock row and is frozen into `order_items`,
/// * the buyer is subscribed to promo emails if they asked for it.
///
/// Run inside [`SqliteDatabase::tx`]: if any line would drive stock negative the caller's transaction is rolled back.
async fn insert_order_rows(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderStoreError> {
    let row = orders::insert_order(
        &order.uuid,
        order.placed,
        order.total_price,
        order.promo_id,
        OrderStatusType::AwaitingPayment,
        conn,
    )
    .await?;
    let billing = orders::insert_address(row.id, order.billing, conn).await?;
    let shipping = orders::insert_address(row.id, order.shipping, conn).await?;
    let wants_promos = order.buyer.receive_promo_emails;
    let buyer = orders::insert_buyer(row.id, order.buyer, billing.id, shipping.id, conn).await?;
    orders::insert_shipment(row.id, order.carrier_id, order.shipping_cost, conn).await?;
    payments::insert_payment(row.id, order.payment, conn).await?;
    for item in &order.items {
        products::decrement_stock(item.product_id, item.size_id, item.quantity, conn).await?;
        orders::insert_item(row.id, item, conn).await?;
    }
    if wants_promos {
        customers::upsert_subscriber(&buyer.email, true, conn).await?;
    }
    trace!("🗃️ {} lines written for order {}", order.items.len(), row.id);
    Ok(row)
}

async fn fetch_order_details(id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderDetails>, OrderStoreError> {
    let Some(order) = orders::fetch_order(id, conn).await? else {
        return Ok(None);
    };
    let missing = || OrderStoreError::OrderNotFound(id);
    let items = orders::fetch_items(id, conn).await?;
    let buyer = orders::fetch_buyer(id, conn).await?.ok_or_else(missing)?;
    let billing = orders::fetch_address(buyer.billing_address_id, conn).await?.ok_or_else(missing)?;
    let shipping = orders::fetch_address(buyer.shipping_address_id, conn).await?.ok_or_else(missing)?;
    let shipment = orders::fetch_shipment(id, conn).await?.ok_or_else(missing)?;
    let payment = payments::fetch_payment_for_order(id, conn).await?.ok_or(OrderStoreError::PaymentNotFound(id))?;
    let promo = match order.promo_id {
        Some(promo_id) => promos::fetch_promo(promo_id, conn).await?,
        None => None,
    };
    Ok(Some(OrderDetails { order, items, buyer, billing, shipping, shipment, payment, promo }))
}

/// Moves the order along the state machine and applies the row changes that go with the move. Run inside
/// [`SqliteDatabase::tx`].
async fn apply_transition(
    order_id: i64,
    trigger: OrderTrigger,
    change: TransitionChange,
    conn: &mut SqliteConnection,
) -> Result<TransitionOutcome, OrderStoreError> {
    let missing = || OrderStoreError::OrderNotFound(order_id);
    let order = orders::fetch_order(order_id, conn).await?.ok_or_else(missing)?;
    let previous = order.status;
    let next = next_status(previous, trigger)?;
    let mut payment =
        payments::fetch_payment_for_order(order_id, conn).await?.ok_or(OrderStoreError::PaymentNotFound(order_id))?;
    if let Some(settlement) = change.settlement {
        payment = payments::settle_payment(order_id, settlement, conn).await?;
    }
    let shipment = match change.tracking_code {
        Some(code) => orders::set_tracking_code(order_id, &code, conn).await?,
        None => orders::fetch_shipment(order_id, conn).await?.ok_or_else(missing)?,
    };
    let mut restocked = Vec::new();
    if restocks_on_entry(next) {
        for item in orders::fetch_items(order_id, conn).await? {
            products::increment_stock(item.product_id, item.size_id, item.quantity, conn).await?;
            restocked.push((item.product_id, item.size_id, item.quantity));
        }
    }
    if next == OrderStatusType::Cancelled && !payment.is_transaction_done {
        let now = Utc::now();
        payments::expire_payment(order_id, now, conn).await?;
        payment.expired_at = Some(now);
        payment.modified_at = now;
    }
    let order = orders::update_order_status(order_id, next, conn).await?;
    let buyer = orders::fetch_buyer(order_id, conn).await?.ok_or_else(missing)?;
    Ok(TransitionOutcome { previous, order, buyer, shipment, payment, restocked })
}
