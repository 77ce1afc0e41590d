use std::future::Future;

use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, Payment, PaymentMethod},
    order_state::{InvalidStatusTransition, OrderTrigger},
    shop_api::order_objects::OrderQueryFilter,
    traits::{InvoiceAssignment, OrderDetails, TransitionChange, TransitionOutcome},
};

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} has no payment record")]
    PaymentNotFound(i64),
    #[error("Product {product_id} has no stock row for size {size_id}")]
    UnknownProductSize { product_id: i64, size_id: i64 },
    #[error("Insufficient stock for product {product_id}, size {size_id}")]
    InsufficientStock { product_id: i64, size_id: i64 },
    #[error("The payment for order {0} has already been settled")]
    PaymentAlreadySettled(i64),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidStatusTransition),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}

/// The order aggregate: orders, their child rows and their payments.
pub trait OrderManagement: Clone + Send + Sync + 'static {
    /// Writes the buyer, both addresses, the order, its shipment, its payment and its items, decrements stock for
    /// every item and, if requested, subscribes the buyer to promo emails. All in one transaction.
    ///
    /// If any stock row would go negative the whole transaction is rolled back and
    /// [`OrderStoreError::InsufficientStock`] is returned.
    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<Order, OrderStoreError>> + Send;

    fn fetch_order(&self, id: i64) -> impl Future<Output = Result<Option<Order>, OrderStoreError>> + Send;

    fn fetch_order_by_uuid(&self, uuid: &str) -> impl Future<Output = Result<Option<Order>, OrderStoreError>> + Send;

    fn fetch_order_details(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<OrderDetails>, OrderStoreError>> + Send;

    fn fetch_payment_for_order(
        &self,
        order_id: i64,
    ) -> impl Future<Output = Result<Option<Payment>, OrderStoreError>> + Send;

    fn fetch_payment_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<Option<Payment>, OrderStoreError>> + Send;

    /// Stores the card processor's intent id and client secret on the order's payment row.
    fn set_card_intent(
        &self,
        order_id: i64,
        intent_id: &str,
        client_secret: &str,
    ) -> impl Future<Output = Result<Payment, OrderStoreError>> + Send;

    /// Binds a crypto invoice (pool address and exact amounts) to the order's payment row.
    fn assign_crypto_invoice(
        &self,
        order_id: i64,
        invoice: InvoiceAssignment,
    ) -> impl Future<Output = Result<Payment, OrderStoreError>> + Send;

    /// Applies `trigger` to the order using [`crate::order_state::next_status`]. In the same transaction:
    /// * the settlement, if any, is written to the payment row,
    /// * the tracking code, if any, is written to the shipment row,
    /// * stock is returned when the order enters `cancelled` or `refunded`,
    /// * an unpaid payment is marked expired when the order is cancelled.
    fn transition_order(
        &self,
        order_id: i64,
        trigger: OrderTrigger,
        change: TransitionChange,
    ) -> impl Future<Output = Result<TransitionOutcome, OrderStoreError>> + Send;

    /// Payments for orders in `awaiting_payment`, optionally restricted to one method.
    fn fetch_awaiting_payments(
        &self,
        method: Option<PaymentMethod>,
    ) -> impl Future<Output = Result<Vec<Payment>, OrderStoreError>> + Send;

    fn search_orders(
        &self,
        query: OrderQueryFilter,
    ) -> impl Future<Output = Result<Vec<Order>, OrderStoreError>> + Send;
}
