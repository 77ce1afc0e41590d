use std::fmt::Debug;

use log::*;

use crate::{
    db_types::OrderStatusType,
    events::{EventProducers, OrderAnnulledEvent, OrderConfirmedEvent, OrderShippedEvent},
    order_state::OrderTrigger,
    reservations::ReservationManager,
    traits::{CatalogManagement, OrderManagement, OrderStoreError, TransitionChange, TransitionOutcome},
};

/// Drives an order through the state machine and runs the side effects that follow a committed transition.
///
/// The row changes (status, payment settlement, tracking code, restock) are committed by the backend in one
/// transaction. Only after that commit does `OrderTransitions`
/// * release the order's reservations when it is confirmed, cancelled or refunded, and
/// * publish the matching event so that mail hooks can notify the buyer.
///
/// Side effects never fail the transition. Freeing a crypto receiving address is the caller's job, since only the
/// payment watchers know about the address pool.
#[derive(Clone)]
pub struct OrderTransitions<B> {
    db: B,
    reservations: ReservationManager,
    producers: EventProducers,
}

impl<B> Debug for OrderTransitions<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderTransitions")
    }
}

impl<B> OrderTransitions<B>
where B: OrderManagement + CatalogManagement
{
    pub fn new(db: B, reservations: ReservationManager, producers: EventProducers) -> Self {
        Self { db, reservations, producers }
    }

    pub async fn apply(
        &self,
        order_id: i64,
        trigger: OrderTrigger,
        change: TransitionChange,
    ) -> Result<TransitionOutcome, OrderStoreError> {
        let outcome = self.db.transition_order(order_id, trigger, change).await?;
        self.after_commit(&outcome).await;
        Ok(outcome)
    }

    async fn after_commit(&self, outcome: &TransitionOutcome) {
        let order = &outcome.order;
        match order.status {
            OrderStatusType::Confirmed => {
                self.reservations.release(&order.uuid).await;
                let event = OrderConfirmedEvent {
                    order: order.clone(),
                    buyer: outcome.buyer.clone(),
                    payment: outcome.payment.clone(),
                };
                self.producers.order_confirmed(event).await;
            },
            OrderStatusType::Shipped => {
                let code = outcome.shipment.tracking_code.clone().unwrap_or_default();
                let tracking_url = match self.db.fetch_carrier(outcome.shipment.carrier_id).await {
                    Ok(Some(carrier)) => carrier.tracking_url_for(&code),
                    Ok(None) => {
                        let carrier_id = outcome.shipment.carrier_id;
                        warn!("📦️ Carrier {carrier_id} for order {} no longer exists", order.uuid);
                        code
                    },
                    Err(e) => {
                        warn!("📦️ Could not build the tracking link for order {}. {e}", order.uuid);
                        code
                    },
                };
                let event = OrderShippedEvent {
                    order: order.clone(),
                    buyer: outcome.buyer.clone(),
                    shipment: outcome.shipment.clone(),
                    tracking_url,
                };
                self.producers.order_shipped(event).await;
            },
            OrderStatusType::Cancelled | OrderStatusType::Refunded => {
                self.reservations.release(&order.uuid).await;
                let event = OrderAnnulledEvent::new(order.clone(), outcome.buyer.clone(), outcome.restocked.clone());
                self.producers.order_annulled(event).await;
            },
            _ => {},
        }
        debug!("📦️ Post-commit effects for order {} ({}) complete", order.uuid, order.status);
    }
}
