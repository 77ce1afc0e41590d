use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Money, NewAddress, NewBuyer, OrderItemSnapshot, OrderStatusType, Payment, PaymentMethod, PromoCode},
    shop_api::catalog_objects::OrderFactor,
};

/// Admin order listing criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub status: Option<OrderStatusType>,
    pub payment_method: Option<PaymentMethod>,
    pub email: Option<String>,
    pub order_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
    pub order: OrderFactor,
}

impl Default for OrderQueryFilter {
    fn default() -> Self {
        Self {
            status: None,
            payment_method: None,
            email: None,
            order_id: None,
            limit: 50,
            offset: 0,
            order: OrderFactor::Desc,
        }
    }
}

impl OrderQueryFilter {
    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_order_id(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn paged(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn ordered(mut self, order: OrderFactor) -> Self {
        self.order = order;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment_method.is_none() && self.email.is_none() && self.order_id.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters. ")?;
        }
        if let Some(status) = &self.status {
            write!(f, "status: {status}. ")?;
        }
        if let Some(method) = &self.payment_method {
            write!(f, "payment method: {method}. ")?;
        }
        if let Some(email) = &self.email {
            write!(f, "email: {email}. ")?;
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        write!(f, "limit {} offset {} {}", self.limit, self.offset, self.order.as_sql())
    }
}

/// The identity of the caller, as seen by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub ip: String,
    /// Scopes cart reservations. Empty if the client did not send one.
    pub session_id: String,
}

impl ClientContext {
    pub fn new<S1: Into<String>, S2: Into<String>>(ip: S1, session_id: S2) -> Self {
        Self { ip: ip.into(), session_id: session_id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub size_id: i64,
    pub quantity: i64,
}

impl CartItem {
    pub fn new(product_id: i64, size_id: i64, quantity: i64) -> Self {
        Self { product_id, size_id, quantity }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateCartRequest {
    pub items: Vec<CartItem>,
    pub promo_code: Option<String>,
    pub carrier_id: Option<i64>,
    /// If set, the total is also quoted in this currency
    pub display_currency: Option<String>,
}

impl ValidateCartRequest {
    pub fn new(items: Vec<CartItem>) -> Self {
        Self { items, ..Default::default() }
    }

    pub fn with_promo<S: Into<String>>(mut self, code: S) -> Self {
        self.promo_code = Some(code.into());
        self
    }

    pub fn with_carrier(mut self, carrier_id: i64) -> Self {
        self.carrier_id = Some(carrier_id);
        self
    }

    pub fn in_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.display_currency = Some(currency.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayAmount {
    pub currency: String,
    pub amount: Money,
}

/// The priced projection of a cart against live stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCart {
    pub valid_items: Vec<OrderItemSnapshot>,
    /// Sum of the line totals, before promo and shipping
    pub subtotal: Money,
    /// `subtotal` with the promo discount applied and shipping added (unless the promo waives it)
    pub total: Money,
    /// What is actually charged for shipping. Zero when no carrier was given or the promo waives shipping.
    pub shipping_cost: Money,
    pub promo: Option<PromoCode>,
    /// True if any line was dropped, clamped or merged
    pub has_changed: bool,
    pub display_total: Option<DisplayAmount>,
}

impl ValidatedCart {
    pub fn total_units(&self) -> i64 {
        self.valid_items.iter().map(|i| i.quantity).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub items: Vec<CartItem>,
    pub promo_code: Option<String>,
    pub carrier_id: i64,
    pub buyer: NewBuyer,
    pub billing: NewAddress,
    pub shipping: NewAddress,
    pub payment_method: PaymentMethod,
}

/// The client-facing view of an order's payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub method: PaymentMethod,
    pub client_secret: Option<String>,
    /// The receiving address, for crypto methods
    pub payee: Option<String>,
    pub transaction_amount: Money,
    pub transaction_amount_payment_currency: Money,
    pub is_transaction_done: bool,
    pub expired_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentSnapshot {
    fn from(p: Payment) -> Self {
        Self {
            method: p.payment_method,
            client_secret: p.client_secret,
            payee: p.payee,
            transaction_amount: p.transaction_amount,
            transaction_amount_payment_currency: p.transaction_amount_payment_currency,
            is_transaction_done: p.is_transaction_done,
            expired_at: p.expired_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedOrder {
    pub order_uuid: String,
    pub order_status: OrderStatusType,
    pub payment: PaymentSnapshot,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_filter_display() {
        let filter = OrderQueryFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.to_string(), "No filters. limit 50 offset 0 DESC");
        let filter = OrderQueryFilter::default()
            .with_status(OrderStatusType::Shipped)
            .with_email("a@b.co")
            .paged(10, 5)
            .ordered(OrderFactor::Asc);
        assert!(!filter.is_empty());
        assert_eq!(filter.to_string(), "status: shipped. email: a@b.co. limit 10 offset 5 ASC");
    }

    #[test]
    fn cart_request_builder() {
        let req = ValidateCartRequest::new(vec![CartItem::new(1, 1, 2)]).with_promo("FREESHIP").with_carrier(1);
        assert_eq!(req.promo_code.as_deref(), Some("FREESHIP"));
        assert_eq!(req.carrier_id, Some(1));
        assert!(req.display_currency.is_none());
    }
}
