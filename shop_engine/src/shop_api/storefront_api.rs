//! The public, unauthenticated operations of the shop.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Archive, NewSupportTicket, Order, PaymentMethod, Subscriber, SupportTicket},
    events::{NewSubscriberEvent, TicketSubmittedEvent},
    helpers::{is_blank, is_valid_email},
    reservations::Reservation,
    shop_api::{
        catalog_objects::{Dictionary, HeroSnapshot, OrderFactor, ProductQuery},
        errors::ShopError,
        order_flow_api::OrderFlowApi,
        order_objects::{
            ClientContext,
            NewOrderRequest,
            PaymentSnapshot,
            SubmittedOrder,
            ValidateCartRequest,
            ValidatedCart,
        },
    },
    traits::{
        CatalogManagement,
        CustomerManagement,
        OrderDetails,
        OrderManagement,
        ProductDetails,
        ProductPage,
        SettingsManagement,
    },
};

const MAX_PAGE_SIZE: i64 = 100;

/// `StorefrontApi` serves the storefront: catalog reads, carts, checkout, invoices, the newsletter and support.
#[derive(Clone)]
pub struct StorefrontApi<B> {
    db: B,
    orders: OrderFlowApi<B>,
}

impl<B> Debug for StorefrontApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorefrontApi")
    }
}

impl<B> StorefrontApi<B>
where B: OrderManagement + CatalogManagement + SettingsManagement + CustomerManagement
{
    pub fn new(orders: OrderFlowApi<B>) -> Self {
        Self { db: orders.db().clone(), orders }
    }

    pub fn order_flow(&self) -> &OrderFlowApi<B> {
        &self.orders
    }

    /// The hero document together with a snapshot of every dictionary and site-wide switch.
    pub async fn get_hero(&self) -> Result<HeroSnapshot, ShopError> {
        let hero = self.db.fetch_hero().await?;
        let settings = self.db.fetch_settings().await?;
        let dictionary = Dictionary::new(settings, self.orders.currency().base_currency());
        Ok(HeroSnapshot { hero, dictionary })
    }

    /// Hidden products are reported as not found.
    pub async fn get_product(&self, id: i64) -> Result<ProductDetails, ShopError> {
        self.db
            .fetch_product_details(id)
            .await?
            .filter(|d| !d.product.hidden)
            .ok_or(ShopError::ProductNotFound(id))
    }

    pub async fn get_products_paged(&self, mut query: ProductQuery) -> Result<ProductPage, ShopError> {
        check_page(query.limit, query.offset)?;
        query.include_hidden = false;
        trace!("🛍️ Product listing: {query}");
        Ok(self.db.fetch_products_paged(&query).await?)
    }

    pub async fn get_archives_paged(
        &self,
        limit: i64,
        offset: i64,
        order: OrderFactor,
    ) -> Result<Vec<Archive>, ShopError> {
        check_page(limit, offset)?;
        Ok(self.db.fetch_archives_paged(limit, offset, order == OrderFactor::Desc).await?)
    }

    /// Holds stock for the caller's cart until the cart TTL runs out.
    pub async fn reserve_cart_item(
        &self,
        ctx: &ClientContext,
        product_id: i64,
        size_id: i64,
        quantity: i64,
    ) -> Result<Reservation, ShopError> {
        if is_blank(&ctx.session_id) {
            return Err(ShopError::invalid("A session id is required to reserve stock"));
        }
        let product = self.get_product(product_id).await?;
        if !product.sizes.iter().any(|s| s.size_id == size_id) {
            return Err(ShopError::ProductSizeNotFound { product_id, size_id });
        }
        let reservation = self.orders.reservations().reserve(&ctx.session_id, product_id, size_id, quantity).await?;
        Ok(reservation)
    }

    /// Drops every uncommitted reservation of the caller's session.
    pub async fn release_cart(&self, ctx: &ClientContext) -> usize {
        self.orders.reservations().release_session(&ctx.session_id).await
    }

    pub async fn validate_order_items(
        &self,
        ctx: &ClientContext,
        request: &ValidateCartRequest,
    ) -> Result<ValidatedCart, ShopError> {
        self.orders.validate_items(ctx, request).await
    }

    pub async fn submit_order(
        &self,
        ctx: &ClientContext,
        request: NewOrderRequest,
    ) -> Result<SubmittedOrder, ShopError> {
        self.orders.submit_order(ctx, request).await
    }

    /// Returns the order. An order still awaiting a card payment is first checked against the card processor.
    pub async fn get_order_by_uuid(&self, uuid: &str) -> Result<Order, ShopError> {
        let order = self.orders.order_by_uuid(uuid).await?;
        self.orders.reconcile(order).await
    }

    /// The order with every row written when it was placed.
    pub async fn validate_order_by_uuid(&self, uuid: &str) -> Result<OrderDetails, ShopError> {
        let order = self.orders.order_by_uuid(uuid).await?;
        let details = self.db.fetch_order_details(order.id).await?;
        details.ok_or_else(|| ShopError::OrderNotFound(uuid.to_string()))
    }

    pub async fn get_order_invoice(&self, uuid: &str, method: PaymentMethod) -> Result<PaymentSnapshot, ShopError> {
        self.orders.order_invoice(uuid, method).await
    }

    pub async fn cancel_order_invoice(&self, uuid: &str) -> Result<Order, ShopError> {
        self.orders.cancel_order_invoice(uuid).await
    }

    /// Card processor webhook: the intent has succeeded.
    pub async fn card_payment_settled(&self, intent_id: &str) -> Result<Order, ShopError> {
        self.orders.card_payment_settled(intent_id).await
    }

    pub async fn subscribe_newsletter(&self, email: &str) -> Result<Subscriber, ShopError> {
        let email = normalize_email(email)?;
        let existing = self.db.fetch_subscriber(&email).await?;
        let subscriber = self.db.upsert_subscriber(&email, true).await?;
        if existing.is_none() {
            info!("🛍️ New newsletter subscriber");
            self.orders.producers().new_subscriber(NewSubscriberEvent { email }).await;
        }
        Ok(subscriber)
    }

    /// Returns false if the address was not subscribed.
    pub async fn unsubscribe_newsletter(&self, email: &str) -> Result<bool, ShopError> {
        let email = normalize_email(email)?;
        Ok(self.db.remove_subscriber(&email).await?)
    }

    pub async fn submit_support_ticket(
        &self,
        ctx: &ClientContext,
        ticket: NewSupportTicket,
    ) -> Result<SupportTicket, ShopError> {
        if !is_valid_email(&ticket.email) {
            return Err(ShopError::invalid(format!("{} is not a valid email address", ticket.email)));
        }
        if is_blank(&ticket.subject) || is_blank(&ticket.notes) {
            return Err(ShopError::invalid("A support ticket needs a subject and a message"));
        }
        self.orders.rate_limiter().check_support_ticket(&ctx.ip, &ticket.email).await?;
        let ticket = self.db.insert_support_ticket(ticket).await?;
        info!("🛍️ Support ticket {} submitted", ticket.case_number);
        self.orders.producers().ticket_submitted(TicketSubmittedEvent { ticket: ticket.clone() }).await;
        Ok(ticket)
    }
}

fn normalize_email(email: &str) -> Result<String, ShopError> {
    let email = email.trim().to_lowercase();
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(ShopError::invalid(format!("{email} is not a valid email address")))
    }
}

pub(crate) fn check_page(limit: i64, offset: i64) -> Result<(), ShopError> {
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ShopError::invalid(format!("Page size must be between 1 and {MAX_PAGE_SIZE}")));
    }
    if offset < 0 {
        return Err(ShopError::invalid("Offset cannot be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("not an email").is_err());
    }

    #[test]
    fn paging_bounds() {
        assert!(check_page(1, 0).is_ok());
        assert!(check_page(100, 500).is_ok());
        assert!(check_page(0, 0).is_err());
        assert!(check_page(101, 0).is_err());
        assert!(check_page(10, -1).is_err());
    }
}
