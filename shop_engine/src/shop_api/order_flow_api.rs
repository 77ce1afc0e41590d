use std::{fmt::Debug, sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use uuid::Uuid;

use crate::{
    crypto_watcher::{CryptoWatcher, InvoiceHold, PaymentWatchers},
    currency::{precision, CurrencyService},
    db_types::{Money, NewOrder, NewPayment, Order, OrderItemSnapshot, OrderStatusType, Payment, PaymentMethod},
    events::{EventProducers, NewSubscriberEvent},
    helpers::{is_blank, is_valid_email},
    order_state::OrderTrigger,
    rate_limiter::RateLimiter,
    reservations::ReservationManager,
    shop_api::{
        errors::ShopError,
        order_objects::{
            CartItem,
            ClientContext,
            DisplayAmount,
            NewOrderRequest,
            PaymentSnapshot,
            SubmittedOrder,
            ValidateCartRequest,
            ValidatedCart,
        },
        transitions::OrderTransitions,
    },
    traits::{
        CardIntentRequest,
        CardIntentStatus,
        CardProcessor,
        CatalogManagement,
        OrderManagement,
        OrderStoreError,
        SettingsManagement,
        Settlement,
        TransitionChange,
    },
};

const DEFAULT_CARD_PAYMENT_TTL: Duration = Duration::from_secs(15 * 60);

/// `OrderFlowApi` prices carts, turns them into orders and takes those orders through payment.
///
/// * [`Self::validate_items`] projects a cart against live stock and current prices without side effects.
/// * [`Self::submit_order`] writes the order, decrements stock and sets up the payment, all or nothing.
/// * Card payments settle through [`Self::card_payment_settled`] or [`Self::reconcile`]. Crypto payments settle
///   through the [`CryptoWatcher`] of their method.
/// * [`Self::expire_overdue_payments`] cancels card orders that were never paid, and crypto orders whose invoice no
///   monitor is watching.
#[derive(Clone)]
pub struct OrderFlowApi<B> {
    db: B,
    currency: CurrencyService,
    reservations: ReservationManager,
    rate_limiter: RateLimiter,
    card: Arc<dyn CardProcessor>,
    watchers: PaymentWatchers<B>,
    transitions: OrderTransitions<B>,
    producers: EventProducers,
    card_payment_ttl: Duration,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement + CatalogManagement + SettingsManagement
{
    pub fn new(
        db: B,
        currency: CurrencyService,
        reservations: ReservationManager,
        rate_limiter: RateLimiter,
        card: Arc<dyn CardProcessor>,
        watchers: PaymentWatchers<B>,
        producers: EventProducers,
    ) -> Self {
        let transitions = OrderTransitions::new(db.clone(), reservations.clone(), producers.clone());
        Self {
            db,
            currency,
            reservations,
            rate_limiter,
            card,
            watchers,
            transitions,
            producers,
            card_payment_ttl: DEFAULT_CARD_PAYMENT_TTL,
        }
    }

    /// How long a card payment may stay unpaid before the order is cancelled.
    pub fn with_card_payment_ttl(mut self, ttl: Duration) -> Self {
        self.card_payment_ttl = ttl;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn currency(&self) -> &CurrencyService {
        &self.currency
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn watchers(&self) -> &PaymentWatchers<B> {
        &self.watchers
    }

    pub fn transitions(&self) -> &OrderTransitions<B> {
        &self.transitions
    }

    pub fn producers(&self) -> &EventProducers {
        &self.producers
    }

    /// Prices the cart against live stock, excluding what other sessions have reserved.
    ///
    /// Lines for hidden products or unknown sizes are dropped, lines for the same product and size are merged, and
    /// quantities are clamped to what is available. Any of these sets `has_changed`. An unknown or inactive promo
    /// code is ignored here. Nothing is reserved or written.
    pub async fn validate_items(
        &self,
        ctx: &ClientContext,
        request: &ValidateCartRequest,
    ) -> Result<ValidatedCart, ShopError> {
        self.rate_limiter.check_validation(&ctx.ip).await?;
        let cart = self.price_cart(&ctx.session_id, request).await?;
        trace!("🛍️ Cart for session {} priced at {}. Changed: {}", ctx.session_id, cart.total, cart.has_changed);
        Ok(cart)
    }

    /// Submits an order.
    ///
    /// The cart is priced again against live stock. If the result differs from what the client sent,
    /// [`ShopError::CartChanged`] is returned with the fresh projection and nothing is written. Otherwise the order,
    /// its child rows and the stock decrements are committed in one transaction, the session's cart reservations are
    /// attached to the order and the payment is set up.
    ///
    /// A crypto order gets its receiving address and on-chain amount before anything is written, so a missing rate or
    /// an exhausted address pool fails the submission cleanly. If the invoice then cannot be saved, the order is
    /// cancelled again and its stock returned.
    ///
    /// A failure to create a card intent does not undo the order. The client fetches the invoice again later, and an
    /// order that stays unpaid is cancelled by [`Self::expire_overdue_payments`].
    pub async fn submit_order(
        &self,
        ctx: &ClientContext,
        request: NewOrderRequest,
    ) -> Result<SubmittedOrder, ShopError> {
        validate_order_request(&request)?;
        let method = request.payment_method;
        self.rate_limiter.check_order_creation(&ctx.ip, &request.buyer.email).await?;
        let settings = self.db.fetch_settings().await?;
        if !settings.site_available {
            return Err(ShopError::SiteUnavailable);
        }
        let requested = request.items.iter().map(|i| i.quantity).sum::<i64>();
        if requested > settings.max_order_items {
            return Err(ShopError::TooManyItems { requested, max: settings.max_order_items });
        }
        if !settings.is_method_allowed(method) {
            return Err(ShopError::PaymentMethodDisabled(method));
        }
        let payment_window = if method.is_crypto() {
            self.watcher(method)?.config().invoice_expiration
        } else {
            self.card_payment_ttl
        };
        let promo_id = match &request.promo_code {
            Some(code) => {
                let promo = self.db.fetch_promo_by_code(code).await?.ok_or(ShopError::PromoNotFound(code.clone()))?;
                if !promo.is_active(Utc::now()) {
                    return Err(ShopError::PromoInactive(code.clone()));
                }
                Some(promo.id)
            },
            None => None,
        };
        let check = ValidateCartRequest {
            items: request.items.clone(),
            promo_code: request.promo_code.clone(),
            carrier_id: Some(request.carrier_id),
            display_currency: None,
        };
        let cart = self.price_cart(&ctx.session_id, &check).await?;
        if cart.has_changed {
            debug!("🛍️ Cart for session {} changed since it was validated", ctx.session_id);
            return Err(ShopError::CartChanged(Box::new(cart)));
        }
        if cart.valid_items.is_empty() {
            return Err(ShopError::invalid("An order needs at least one item"));
        }
        if method.is_card() {
            self.currency.check_minimum(self.currency.base_currency(), cart.total)?;
        }
        let hold = if method.is_crypto() { Some(self.watcher(method)?.hold_invoice(cart.total).await?) } else { None };
        let now = Utc::now();
        let expires_in = chrono::Duration::from_std(payment_window).unwrap_or_else(|_| chrono::Duration::hours(1));
        let card_amount = if method.is_card() { cart.total } else { Money::zero() };
        let email = request.buyer.email.clone();
        let wants_promos = request.buyer.receive_promo_emails;
        let order = NewOrder {
            uuid: Uuid::new_v4().to_string(),
            placed: now,
            total_price: cart.total,
            promo_id,
            items: cart.valid_items,
            buyer: request.buyer,
            billing: request.billing,
            shipping: request.shipping,
            carrier_id: request.carrier_id,
            shipping_cost: cart.shipping_cost,
            payment: NewPayment {
                method,
                transaction_amount: cart.total,
                transaction_amount_payment_currency: card_amount,
                expired_at: now + expires_in,
            },
        };
        let order = self.db.insert_order(order).await?;
        let held = self.reservations.commit(&ctx.session_id, &order.uuid).await;
        info!("🛍️ Order {} placed for {} ({method}). {held} reservations attached", order.uuid, order.total_price);
        if wants_promos {
            self.producers.new_subscriber(NewSubscriberEvent { email: email.clone() }).await;
        }
        let payment = match hold {
            Some(hold) => self.bind_crypto_invoice(method, hold, &order).await?,
            None => match self.issue_card_intent(&order, self.payment_for(&order).await?, Some(email)).await {
                Ok(payment) => payment,
                Err(e) => {
                    warn!("🛍️ Order {} is saved but its card payment could not be set up yet. {e}", order.uuid);
                    self.payment_for(&order).await?
                },
            },
        };
        Ok(SubmittedOrder { order_uuid: order.uuid, order_status: order.status, payment: payment.into() })
    }

    /// Re-issues the invoice for an order. Safe to call repeatedly.
    ///
    /// A card payment without a client secret gets a new intent. A crypto payment gets its existing address and amount,
    /// or a fresh one if it never had one.
    pub async fn order_invoice(&self, uuid: &str, method: PaymentMethod) -> Result<PaymentSnapshot, ShopError> {
        let order = self.order_by_uuid(uuid).await?;
        let payment = self.payment_for(&order).await?;
        if payment.payment_method != method {
            return Err(ShopError::PaymentMethodMismatch {
                order: order.uuid,
                expected: payment.payment_method,
                requested: method,
            });
        }
        if payment.is_transaction_done {
            return Ok(payment.into());
        }
        if order.status != OrderStatusType::AwaitingPayment {
            return Err(ShopError::OrderNotPayable { order: order.uuid, status: order.status });
        }
        let payment = if method.is_card() {
            match payment.client_secret {
                Some(_) => payment,
                None => self.issue_card_intent(&order, payment, None).await?,
            }
        } else {
            self.watcher(method)?.acquire_invoice(order.id).await?
        };
        Ok(payment.into())
    }

    /// The buyer abandons payment. The order is cancelled, its stock returned and any watcher or card intent stopped.
    pub async fn cancel_order_invoice(&self, uuid: &str) -> Result<Order, ShopError> {
        let order = self.order_by_uuid(uuid).await?;
        if order.status != OrderStatusType::AwaitingPayment {
            return Err(ShopError::OrderNotPayable { order: order.uuid, status: order.status });
        }
        let payment = self.payment_for(&order).await?;
        let change = TransitionChange::default();
        let outcome = self.transitions.apply(order.id, OrderTrigger::InvoiceExpired, change).await?;
        self.watchers.cancel_monitor(order.id);
        self.cancel_card_intent(&payment).await;
        info!("🛍️ Invoice for order {} cancelled by the buyer", outcome.order.uuid);
        Ok(outcome.order)
    }

    /// The card processor reports that `intent_id` succeeded. Confirms the order it pays for.
    ///
    /// Repeated notifications for an already settled payment return the order unchanged.
    pub async fn card_payment_settled(&self, intent_id: &str) -> Result<Order, ShopError> {
        let payment = self
            .db
            .fetch_payment_by_transaction_id(intent_id)
            .await?
            .filter(|p| p.payment_method.is_card())
            .ok_or_else(|| ShopError::OrderNotFound(format!("with card intent {intent_id}")))?;
        if payment.is_transaction_done {
            debug!("🛍️ Card intent {intent_id} was already settled");
            let order = self.db.fetch_order(payment.order_id).await?;
            return order.ok_or_else(|| ShopError::OrderNotFound(payment.order_id.to_string()));
        }
        let settlement = Settlement { transaction_id: intent_id.to_string(), payer: None, payee: None };
        let change = TransitionChange::settle(settlement);
        let outcome = self.transitions.apply(payment.order_id, OrderTrigger::PaymentSettled, change).await?;
        info!("🛍️ Card payment {intent_id} settled. Order {} is confirmed", outcome.order.uuid);
        Ok(outcome.order)
    }

    /// Asks the card processor whether an awaiting card payment has gone through and confirms the order if so.
    ///
    /// Processor failures are logged and the order is returned as stored.
    pub async fn reconcile(&self, order: Order) -> Result<Order, ShopError> {
        if order.status != OrderStatusType::AwaitingPayment {
            return Ok(order);
        }
        let payment = self.payment_for(&order).await?;
        let Some(intent_id) = payment.transaction_id.as_deref().filter(|_| payment.payment_method.is_card()) else {
            return Ok(order);
        };
        match self.card.fetch_intent_status(intent_id, payment.payment_method.is_test()).await {
            Ok(CardIntentStatus::Succeeded) => self.card_payment_settled(intent_id).await,
            Ok(status) => {
                trace!("🛍️ Card intent {intent_id} for order {} is {status:?}", order.uuid);
                Ok(order)
            },
            Err(e) => {
                warn!("🛍️ Could not reconcile order {} with the card processor. {e}", order.uuid);
                Ok(order)
            },
        }
    }

    /// Cancels orders whose payment window has passed.
    ///
    /// * Card intents that succeeded in the meantime are settled instead.
    /// * Crypto orders are normally expired by their monitor. Those without one (the invoice was never issued, or the
    ///   watcher lost track of it) get a last look at the chain from their watcher and are cancelled here.
    pub async fn expire_overdue_payments(&self) -> Result<Vec<Order>, ShopError> {
        let now = Utc::now();
        let overdue = self
            .db
            .fetch_awaiting_payments(None)
            .await?
            .into_iter()
            .filter(|p| p.is_expired(now))
            .collect::<Vec<_>>();
        let mut expired = Vec::with_capacity(overdue.len());
        for payment in overdue {
            if payment.payment_method.is_crypto() {
                if let Some(order) = self.expire_crypto_payment(&payment).await {
                    expired.push(order);
                }
                continue;
            }
            let Some(order) = self.db.fetch_order(payment.order_id).await? else {
                continue;
            };
            let order = self.reconcile(order).await?;
            if order.status != OrderStatusType::AwaitingPayment {
                continue;
            }
            self.cancel_card_intent(&payment).await;
            match self.transitions.apply(order.id, OrderTrigger::InvoiceExpired, TransitionChange::default()).await {
                Ok(outcome) => expired.push(outcome.order),
                Err(e) => warn!("🛍️ Could not expire order {}. {e}", order.uuid),
            }
        }
        Ok(expired)
    }

    pub(crate) async fn order_by_uuid(&self, uuid: &str) -> Result<Order, ShopError> {
        self.db.fetch_order_by_uuid(uuid).await?.ok_or_else(|| ShopError::OrderNotFound(uuid.to_string()))
    }

    pub(crate) async fn payment_for(&self, order: &Order) -> Result<Payment, ShopError> {
        let payment = self.db.fetch_payment_for_order(order.id).await?;
        Ok(payment.ok_or(OrderStoreError::PaymentNotFound(order.id))?)
    }

    fn watcher(&self, method: PaymentMethod) -> Result<&CryptoWatcher<B>, ShopError> {
        self.watchers.get(method).ok_or(ShopError::PaymentMethodDisabled(method))
    }

    /// Saves the held invoice on the written order. If that fails, the order is cancelled so that its stock and
    /// reservations come back, and the error is returned to the buyer.
    async fn bind_crypto_invoice(
        &self,
        method: PaymentMethod,
        hold: InvoiceHold,
        order: &Order,
    ) -> Result<Payment, ShopError> {
        let err = match self.watcher(method)?.bind_invoice(hold, order).await {
            Ok(payment) => return Ok(payment),
            Err(e) => e,
        };
        warn!("🛍️ Order {} is saved but its invoice could not be. Cancelling it. {err}", order.uuid);
        let change = TransitionChange::default();
        if let Err(e) = self.transitions.apply(order.id, OrderTrigger::InvoiceExpired, change).await {
            error!("🛍️ Could not cancel order {}. It is left to the expiry worker. {e}", order.uuid);
        }
        Err(err.into())
    }

    async fn expire_crypto_payment(&self, payment: &Payment) -> Option<Order> {
        let method = payment.payment_method;
        if let Some(watcher) = self.watchers.get(method) {
            return watcher.close_unwatched(payment).await;
        }
        warn!("🛍️ No {method} watcher is configured. Expiring order {} without a last look", payment.order_id);
        let change = TransitionChange::default();
        match self.transitions.apply(payment.order_id, OrderTrigger::InvoiceExpired, change).await {
            Ok(outcome) => Some(outcome.order),
            Err(e) => {
                warn!("🛍️ Could not expire order {}. {e}", payment.order_id);
                None
            },
        }
    }

    async fn issue_card_intent(
        &self,
        order: &Order,
        payment: Payment,
        receipt_email: Option<String>,
    ) -> Result<Payment, ShopError> {
        let request = CardIntentRequest {
            order_uuid: order.uuid.clone(),
            amount: payment.transaction_amount,
            currency: self.currency.base_currency().to_string(),
            receipt_email,
            test_mode: payment.payment_method.is_test(),
        };
        let intent = self.card.create_intent(request).await?;
        debug!("🛍️ Card intent {} created for order {}", intent.id, order.uuid);
        Ok(self.db.set_card_intent(order.id, &intent.id, &intent.client_secret).await?)
    }

    async fn cancel_card_intent(&self, payment: &Payment) {
        if !payment.payment_method.is_card() {
            return;
        }
        if let Some(intent_id) = &payment.transaction_id {
            if let Err(e) = self.card.cancel_intent(intent_id, payment.payment_method.is_test()).await {
                warn!("🛍️ Could not cancel card intent {intent_id}. {e}");
            }
        }
    }

    async fn price_cart(&self, session_id: &str, request: &ValidateCartRequest) -> Result<ValidatedCart, ShopError> {
        if let Some(item) = request.items.iter().find(|i| i.quantity <= 0) {
            return Err(ShopError::invalid(format!(
                "Quantity for product {} in size {} must be positive",
                item.product_id, item.size_id
            )));
        }
        let (lines, mut has_changed) = merge_lines(&request.items);
        let precision = precision(self.currency.base_currency());
        let mut valid_items = Vec::with_capacity(lines.len());
        for line in lines {
            match self.snapshot_line(session_id, line, precision).await? {
                Some(snapshot) => {
                    has_changed |= snapshot.quantity != line.quantity;
                    valid_items.push(snapshot);
                },
                None => has_changed = true,
            }
        }
        let subtotal = valid_items.iter().map(OrderItemSnapshot::line_total).sum::<Money>();
        let now = Utc::now();
        let promo = match &request.promo_code {
            Some(code) => self.db.fetch_promo_by_code(code).await?.filter(|p| p.is_active(now)),
            None => None,
        };
        let discounted = match &promo {
            Some(p) if !p.discount.is_zero() => subtotal.less_percent(p.discount).round_to(precision),
            _ => subtotal,
        };
        let shipping_cost = match request.carrier_id {
            Some(id) => {
                let carrier =
                    self.db.fetch_carrier(id).await?.filter(|c| c.allowed).ok_or(ShopError::CarrierNotFound(id))?;
                if promo.as_ref().is_some_and(|p| p.free_shipping) {
                    Money::zero()
                } else {
                    carrier.price
                }
            },
            None => Money::zero(),
        };
        let total = discounted + shipping_cost;
        let display_total = match &request.display_currency {
            Some(code) => {
                let amount = self.currency.convert_from_base(code, total).await?;
                Some(DisplayAmount { currency: code.to_uppercase(), amount })
            },
            None => None,
        };
        Ok(ValidatedCart { valid_items, subtotal, total, shipping_cost, promo, has_changed, display_total })
    }

    async fn snapshot_line(
        &self,
        session_id: &str,
        line: CartItem,
        precision: u32,
    ) -> Result<Option<OrderItemSnapshot>, ShopError> {
        let Some(product) = self.db.fetch_product(line.product_id).await?.filter(|p| !p.hidden) else {
            trace!("🛍️ Product {} is not for sale", line.product_id);
            return Ok(None);
        };
        let Some(size) = self.db.fetch_product_size(line.product_id, line.size_id).await? else {
            trace!("🛍️ Product {} has no size {}", line.product_id, line.size_id);
            return Ok(None);
        };
        let available =
            self.reservations.available_stock(size.quantity, line.product_id, line.size_id, session_id).await;
        let quantity = line.quantity.min(available);
        if quantity <= 0 {
            return Ok(None);
        }
        let sale = product.sale();
        let slug = product.slug();
        Ok(Some(OrderItemSnapshot {
            product_id: line.product_id,
            size_id: line.size_id,
            quantity,
            product_price: product.price,
            sale_percentage: sale,
            price_with_sale: product.price.less_percent(sale).round_to(precision),
            product_name: product.name,
            brand: product.brand,
            sku: product.sku,
            thumbnail: product.thumbnail_url,
            blur_hash: product.blur_hash,
            color: product.color,
            category_id: product.category_id,
            target_gender: product.target_gender,
            slug,
        }))
    }
}

/// Folds lines for the same product and size into one, keeping the order in which they first appear. Returns true
/// if anything was merged.
fn merge_lines(items: &[CartItem]) -> (Vec<CartItem>, bool) {
    let mut merged: Vec<CartItem> = Vec::with_capacity(items.len());
    let mut changed = false;
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id && m.size_id == item.size_id) {
            Some(existing) => {
                existing.quantity += item.quantity;
                changed = true;
            },
            None => merged.push(*item),
        }
    }
    (merged, changed)
}

fn validate_order_request(request: &NewOrderRequest) -> Result<(), ShopError> {
    if request.items.is_empty() {
        return Err(ShopError::invalid("An order needs at least one item"));
    }
    let buyer = &request.buyer;
    if !is_valid_email(&buyer.email) {
        return Err(ShopError::invalid(format!("{} is not a valid email address", buyer.email)));
    }
    if is_blank(&buyer.first_name) || is_blank(&buyer.last_name) {
        return Err(ShopError::invalid("The buyer's first and last name are required"));
    }
    for (label, address) in [("billing", &request.billing), ("shipping", &request.shipping)] {
        let incomplete = [&address.country, &address.city, &address.address_line_one, &address.postal_code]
            .iter()
            .any(|field| is_blank(field));
        if incomplete {
            return Err(ShopError::invalid(format!("The {label} address is incomplete")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{NewAddress, NewBuyer};

    fn request() -> NewOrderRequest {
        let address = NewAddress {
            country: "NL".into(),
            city: "Utrecht".into(),
            address_line_one: "Oudegracht 1".into(),
            address_line_two: None,
            postal_code: "3511".into(),
            state: None,
        };
        NewOrderRequest {
            items: vec![CartItem::new(1, 1, 2)],
            promo_code: None,
            carrier_id: 1,
            buyer: NewBuyer {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@example.com".into(),
                phone: "".into(),
                receive_promo_emails: false,
            },
            billing: address.clone(),
            shipping: address,
            payment_method: PaymentMethod::Card,
        }
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let items = [CartItem::new(1, 1, 2), CartItem::new(2, 1, 1), CartItem::new(1, 1, 3)];
        let (merged, changed) = merge_lines(&items);
        assert!(changed);
        assert_eq!(merged, vec![CartItem::new(1, 1, 5), CartItem::new(2, 1, 1)]);
        let (merged, changed) = merge_lines(&merged);
        assert!(!changed);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn order_requests_are_checked() {
        assert!(validate_order_request(&request()).is_ok());
        let mut r = request();
        r.items.clear();
        assert!(matches!(validate_order_request(&r), Err(ShopError::InvalidArgument(_))));
        let mut r = request();
        r.buyer.email = "ada".into();
        assert!(matches!(validate_order_request(&r), Err(ShopError::InvalidArgument(_))));
        let mut r = request();
        r.shipping.city = " ".into();
        let err = validate_order_request(&r).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: The shipping address is incomplete");
    }
}
