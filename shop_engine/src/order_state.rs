//! The order state machine.
//!
//! Orders move through the following statuses. Every other combination of status and trigger is rejected with
//! [`InvalidStatusTransition`].
//!
//! | Trigger          | From                                      | To          | On entry                            |
//! |------------------|-------------------------------------------|-------------|-------------------------------------|
//! | `PaymentSettled` | `awaiting_payment`                        | `confirmed` | release reservations, send mail     |
//! | `TrackingSet`    | `confirmed`                               | `shipped`   | send mail with tracking URL         |
//! | `Delivered`      | `shipped`                                 | `delivered` |                                     |
//! | `Refund`         | `confirmed`, `shipped`, `delivered`       | `refunded`  | restock, send cancellation mail     |
//! | `InvoiceExpired` | `awaiting_payment`                        | `cancelled` | restock, free address, send mail    |
//! | `AdminCancel`    | `placed`, `awaiting_payment`, `confirmed` | `cancelled` | restock, free address, send mail    |
//!
//! `cancelled`, `refunded` and `delivered` (apart from refunds) are terminal, so a late settlement racing an expiry
//! is rejected rather than resurrecting the order.
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::OrderStatusType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTrigger {
    PaymentSettled,
    TrackingSet,
    Delivered,
    Refund,
    InvoiceExpired,
    AdminCancel,
}

impl Display for OrderTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PaymentSettled => "payment settled",
            Self::TrackingSet => "tracking number set",
            Self::Delivered => "delivered",
            Self::Refund => "refund",
            Self::InvoiceExpired => "invoice expired",
            Self::AdminCancel => "cancel",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot apply '{trigger}' to an order that is {from}")]
pub struct InvalidStatusTransition {
    pub from: OrderStatusType,
    pub trigger: OrderTrigger,
}

/// Returns the status an order in `from` moves to when `trigger` fires.
pub fn next_status(from: OrderStatusType, trigger: OrderTrigger) -> Result<OrderStatusType, InvalidStatusTransition> {
    use OrderStatusType::*;
    use OrderTrigger::*;
    match (from, trigger) {
        (AwaitingPayment, PaymentSettled) => Ok(Confirmed),
        (Confirmed, TrackingSet) => Ok(Shipped),
        (Shipped, OrderTrigger::Delivered) => Ok(OrderStatusType::Delivered),
        (Confirmed | Shipped | OrderStatusType::Delivered, Refund) => Ok(Refunded),
        (AwaitingPayment, InvoiceExpired) => Ok(Cancelled),
        (Placed | AwaitingPayment | Confirmed, AdminCancel) => Ok(Cancelled),
        (from, trigger) => Err(InvalidStatusTransition { from, trigger }),
    }
}

/// True when entering `status` returns the order's items to stock.
pub fn restocks_on_entry(status: OrderStatusType) -> bool {
    matches!(status, OrderStatusType::Cancelled | OrderStatusType::Refunded)
}
