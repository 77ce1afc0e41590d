use serde::{Deserialize, Serialize};

use crate::db_types::{Buyer, Order, OrderStatusType, Payment, Shipment, SupportTicket};

/// Payment has settled and the order is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmedEvent {
    pub order: Order,
    pub buyer: Buyer,
    pub payment: Payment,
}

/// A tracking code was assigned. `tracking_url` is the carrier's tracking page for the parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShippedEvent {
    pub order: Order,
    pub buyer: Buyer,
    pub shipment: Shipment,
    pub tracking_url: String,
}

/// The order was cancelled or refunded and its stock returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub buyer: Buyer,
    pub status: OrderStatusType,
    /// `(product_id, size_id, quantity)` returned to stock
    pub restocked: Vec<(i64, i64, i64)>,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order, buyer: Buyer, restocked: Vec<(i64, i64, i64)>) -> Self {
        let status = order.status;
        Self { order, buyer, status, restocked }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscriberEvent {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSubmittedEvent {
    pub ticket: SupportTicket,
}
