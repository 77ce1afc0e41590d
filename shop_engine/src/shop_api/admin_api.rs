use std::fmt::Debug;

use log::*;
use serde_json::Value;

use crate::{
    crypto_watcher::PaymentWatchers,
    currency::is_supported,
    db_types::{
        Archive,
        CarrierPrice,
        Money,
        NewArchive,
        NewProduct,
        NewPromoCode,
        NewShipmentCarrier,
        Order,
        PaymentMethod,
        Product,
        ProductSize,
        PromoCode,
        ShipmentCarrier,
        SupportTicket,
        TicketStatus,
    },
    helpers::{is_blank, is_valid_color_hex, is_valid_sku},
    order_state::OrderTrigger,
    shop_api::{
        errors::ShopError,
        order_flow_api::OrderFlowApi,
        order_objects::OrderQueryFilter,
        storefront_api::check_page,
        transitions::OrderTransitions,
    },
    traits::{
        CatalogManagement,
        CustomerManagement,
        OrderManagement,
        ProductDetails,
        SettingsManagement,
        TransitionChange,
    },
};

/// `AdminApi` holds the operations behind the admin bearer token: catalog and promo upkeep, site settings, and the
/// order transitions that follow fulfilment (shipping, delivery, cancellation and refunds).
///
/// Authentication happens in the transport layer. Every method here assumes the caller is an admin.
#[derive(Clone)]
pub struct AdminApi<B> {
    db: B,
    transitions: OrderTransitions<B>,
    watchers: PaymentWatchers<B>,
}

impl<B> Debug for AdminApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AdminApi")
    }
}

impl<B> AdminApi<B>
where B: OrderManagement + CatalogManagement + SettingsManagement + CustomerManagement
{
    pub fn new(orders: &OrderFlowApi<B>) -> Self {
        Self {
            db: orders.db().clone(),
            transitions: orders.transitions().clone(),
            watchers: orders.watchers().clone(),
        }
    }

    //------------------------------------------   Catalog    ------------------------------------------------------
    pub async fn add_product(&self, product: NewProduct) -> Result<ProductDetails, ShopError> {
        if is_blank(&product.name) {
            return Err(ShopError::invalid("A product needs a name"));
        }
        if !is_valid_sku(&product.sku) {
            return Err(ShopError::invalid(format!("SKU {} must be alphanumeric", product.sku)));
        }
        if !is_valid_color_hex(&product.color_hex) {
            return Err(ShopError::invalid(format!("{} is not a #RRGGBB colour", product.color_hex)));
        }
        if product.price.is_negative() {
            return Err(ShopError::invalid("Prices cannot be negative"));
        }
        if product.stock.iter().any(|(_, qty)| *qty < 0) {
            return Err(ShopError::invalid("Stock quantities cannot be negative"));
        }
        let details = self.db.insert_product(product).await?;
        info!("🛍️ Product {} ({}) added", details.product.id, details.product.sku);
        Ok(details)
    }

    pub async fn set_stock(&self, product_id: i64, size_id: i64, quantity: i64) -> Result<ProductSize, ShopError> {
        if quantity < 0 {
            return Err(ShopError::invalid("Stock quantities cannot be negative"));
        }
        Ok(self.db.set_stock(product_id, size_id, quantity).await?)
    }

    pub async fn hide_product(&self, product_id: i64, hidden: bool) -> Result<Product, ShopError> {
        Ok(self.db.set_product_hidden(product_id, hidden).await?)
    }

    //------------------------------------------    Promos    ------------------------------------------------------
    pub async fn add_promo(&self, promo: NewPromoCode) -> Result<PromoCode, ShopError> {
        if !is_valid_sku(&promo.code) {
            return Err(ShopError::invalid(format!("Promo code {} must be alphanumeric", promo.code)));
        }
        if promo.expiration <= promo.start {
            return Err(ShopError::invalid("A promo code must expire after it starts"));
        }
        let promo = self.db.insert_promo(promo).await?;
        info!("🛍️ Promo code {} added", promo.code);
        Ok(promo)
    }

    pub async fn disable_promo(&self, code: &str) -> Result<PromoCode, ShopError> {
        Ok(self.db.set_promo_allowed(code, false).await?)
    }

    pub async fn delete_promo(&self, code: &str) -> Result<(), ShopError> {
        if self.db.delete_promo(code).await? {
            Ok(())
        } else {
            Err(ShopError::PromoNotFound(code.to_string()))
        }
    }

    pub async fn list_promos(&self) -> Result<Vec<PromoCode>, ShopError> {
        Ok(self.db.list_promos().await?)
    }

    //------------------------------------------   Settings   ------------------------------------------------------
    pub async fn set_site_available(&self, available: bool) -> Result<(), ShopError> {
        self.db.set_site_available(available).await?;
        info!("🛍️ Site availability set to {available}");
        Ok(())
    }

    pub async fn set_max_order_items(&self, max: i64) -> Result<(), ShopError> {
        if max <= 0 {
            return Err(ShopError::invalid("The order size cap must be positive"));
        }
        Ok(self.db.set_max_order_items(max).await?)
    }

    pub async fn set_payment_method_allowed(&self, method: PaymentMethod, allowed: bool) -> Result<(), ShopError> {
        self.db.set_payment_method_allowed(method, allowed).await?;
        info!("🛍️ Payment method {method} allowed: {allowed}");
        Ok(())
    }

    pub async fn add_carrier(&self, carrier: NewShipmentCarrier) -> Result<ShipmentCarrier, ShopError> {
        if is_blank(&carrier.carrier) {
            return Err(ShopError::invalid("A carrier needs a name"));
        }
        if carrier.price.is_negative() {
            return Err(ShopError::invalid("Prices cannot be negative"));
        }
        Ok(self.db.insert_carrier(carrier).await?)
    }

    pub async fn set_carrier_allowed(&self, id: i64, allowed: bool) -> Result<ShipmentCarrier, ShopError> {
        Ok(self.db.set_carrier_allowed(id, allowed).await?)
    }

    pub async fn set_carrier_base_price(&self, id: i64, price: Money) -> Result<ShipmentCarrier, ShopError> {
        if price.is_negative() {
            return Err(ShopError::invalid("Prices cannot be negative"));
        }
        Ok(self.db.set_carrier_base_price(id, price).await?)
    }

    pub async fn set_carrier_price(&self, id: i64, currency: &str, price: Money) -> Result<(), ShopError> {
        let currency = currency.to_uppercase();
        if !is_supported(&currency) {
            return Err(ShopError::UnsupportedCurrency(currency));
        }
        if price.is_negative() {
            return Err(ShopError::invalid("Prices cannot be negative"));
        }
        Ok(self.db.set_carrier_price(id, &currency, price).await?)
    }

    pub async fn list_carriers(&self) -> Result<Vec<(ShipmentCarrier, Vec<CarrierPrice>)>, ShopError> {
        let carriers = self.db.list_carriers().await?;
        let mut result = Vec::with_capacity(carriers.len());
        for carrier in carriers {
            let prices = self.db.fetch_carrier_prices(carrier.id).await?;
            result.push((carrier, prices));
        }
        Ok(result)
    }

    pub async fn set_hero(&self, hero: Value) -> Result<(), ShopError> {
        if !hero.is_object() {
            return Err(ShopError::invalid("The hero must be a JSON object"));
        }
        Ok(self.db.set_hero(hero).await?)
    }

    pub async fn add_archive(&self, archive: NewArchive) -> Result<Archive, ShopError> {
        if is_blank(&archive.title) {
            return Err(ShopError::invalid("An archive needs a title"));
        }
        Ok(self.db.insert_archive(archive).await?)
    }

    //------------------------------------------    Orders    ------------------------------------------------------
    pub async fn list_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, ShopError> {
        check_page(query.limit, query.offset)?;
        debug!("🛍️ Order search: {query}");
        Ok(self.db.search_orders(query).await?)
    }

    /// Ships a confirmed order. The buyer is sent the tracking link.
    pub async fn set_tracking_number(&self, uuid: &str, code: &str) -> Result<Order, ShopError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ShopError::invalid("The tracking code cannot be empty"));
        }
        let change = TransitionChange::tracking(code.to_string());
        self.apply(uuid, OrderTrigger::TrackingSet, change).await
    }

    pub async fn delivered_order(&self, uuid: &str) -> Result<Order, ShopError> {
        self.apply(uuid, OrderTrigger::Delivered, TransitionChange::default()).await
    }

    /// Cancels an unpaid or confirmed order and returns its stock. A crypto order's monitor is stopped and its
    /// address freed.
    pub async fn cancel_order(&self, uuid: &str) -> Result<Order, ShopError> {
        let order = self.apply(uuid, OrderTrigger::AdminCancel, TransitionChange::default()).await?;
        self.watchers.cancel_monitor(order.id);
        Ok(order)
    }

    /// Refunds a paid order and returns its stock. Moving the money back is up to the operator.
    pub async fn refund_order(&self, uuid: &str) -> Result<Order, ShopError> {
        self.apply(uuid, OrderTrigger::Refund, TransitionChange::default()).await
    }

    async fn apply(&self, uuid: &str, trigger: OrderTrigger, change: TransitionChange) -> Result<Order, ShopError> {
        let order = self.db.fetch_order_by_uuid(uuid).await?.ok_or_else(|| ShopError::OrderNotFound(uuid.into()))?;
        let outcome = self.transitions.apply(order.id, trigger, change).await?;
        info!("🛍️ Order {uuid} moved from {} to {} ({trigger:?})", outcome.previous, outcome.order.status);
        Ok(outcome.order)
    }

    //------------------------------------------   Support    ------------------------------------------------------
    pub async fn update_support_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
        internal_notes: Option<String>,
    ) -> Result<SupportTicket, ShopError> {
        Ok(self.db.update_ticket_status(id, status, internal_notes).await?)
    }

    pub async fn list_support_tickets(
        &self,
        status: Option<TicketStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SupportTicket>, ShopError> {
        check_page(limit, offset)?;
        Ok(self.db.search_tickets(status, limit, offset).await?)
    }
}
