use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Address,
    Buyer,
    Money,
    Order,
    OrderItem,
    OrderStatusType,
    Payment,
    Product,
    ProductMeasurement,
    ProductSize,
    ProductTag,
    PromoCode,
    Shipment,
};

/// An order together with every child row written by the submission transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub buyer: Buyer,
    pub billing: Address,
    pub shipping: Address,
    pub shipment: Shipment,
    pub payment: Payment,
    pub promo: Option<PromoCode>,
}

impl OrderDetails {
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|i| i.price_with_sale * i.quantity).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product: Product,
    pub sizes: Vec<ProductSize>,
    pub measurements: Vec<ProductMeasurement>,
    pub tags: Vec<ProductTag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Number of products matching the filters, ignoring `limit` and `offset`
    pub total: i64,
}

/// Details of a settled payment, written to the payment row when an order is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub transaction_id: String,
    pub payer: Option<String>,
    pub payee: Option<String>,
}

/// Row changes that accompany a status transition and must commit in the same transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionChange {
    pub settlement: Option<Settlement>,
    pub tracking_code: Option<String>,
}

impl TransitionChange {
    pub fn settle(settlement: Settlement) -> Self {
        Self { settlement: Some(settlement), ..Default::default() }
    }

    pub fn tracking(code: String) -> Self {
        Self { tracking_code: Some(code), ..Default::default() }
    }
}

/// The result of a committed status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub previous: OrderStatusType,
    pub order: Order,
    pub buyer: Buyer,
    pub shipment: Shipment,
    pub payment: Payment,
    /// `(product_id, size_id, quantity)` for every line returned to stock
    pub restocked: Vec<(i64, i64, i64)>,
}

/// A crypto invoice: the pool address the payer sends to and the exact amount expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAssignment {
    pub payee: String,
    pub transaction_amount: Money,
    pub transaction_amount_payment_currency: Money,
    pub expires_at: DateTime<Utc>,
}
