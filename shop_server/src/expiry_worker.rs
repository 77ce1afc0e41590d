use std::time::Duration;

use log::*;
use shop_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Starts the payment expiry worker. Every `interval` it cancels orders whose payment window has passed, until
/// `shutdown` is cancelled. Crypto orders that a watcher still monitors are left to that watcher.
pub fn start_expiry_worker(
    api: OrderFlowApi<SqliteDatabase>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Payment expiry worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("🕰️ Payment expiry worker shutting down");
                    break;
                }
                _ = timer.tick() => {
                    trace!("🕰️ Running payment expiry job");
                    match api.expire_overdue_payments().await {
                        Ok(expired) if expired.is_empty() => {},
                        Ok(expired) => {
                            info!("🕰️ {} unpaid orders cancelled", expired.len());
                            debug!("🕰️ Cancelled orders: {}", order_list(&expired));
                        },
                        Err(e) => error!("🕰️ Error running payment expiry job: {e}"),
                    }
                }
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders.iter().map(|o| format!("[{}] {} {}", o.id, o.uuid, o.total_price)).collect::<Vec<String>>().join(", ")
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use shop_engine::{
        db_types::{OrderStatusType, PaymentMethod},
        order_objects::{CartItem, ClientContext},
        test_utils::{
            fixtures::{coat_line, new_order, order_request, COAT_ID, PICKUP_ID, SIZE_XXS},
            test_shop::{TestShop, TestShopConfig},
        },
        traits::OrderManagement,
    };

    use super::*;

    #[tokio::test]
    async fn cancels_unpaid_card_orders() {
        let config = TestShopConfig { card_payment_ttl: Duration::from_millis(100), ..Default::default() };
        let shop = TestShop::with_config(config).await;
        let ctx = ClientContext::new("10.9.0.1", "expiry");
        let request = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::Card);
        let submitted = shop.storefront.submit_order(&ctx, request).await.expect("Error submitting order");

        let shutdown = CancellationToken::new();
        let worker = start_expiry_worker(shop.orders.clone(), Duration::from_millis(50), shutdown.clone());
        let cancelled =
            shop.wait_for_status(&submitted.order_uuid, OrderStatusType::Cancelled, Duration::from_secs(5)).await;
        shutdown.cancel();
        worker.await.expect("Worker panicked");
        assert!(cancelled);
        shop.orders.watchers().stop_all();
    }

    #[tokio::test]
    async fn cancels_crypto_orders_nobody_watches() {
        let shop = TestShop::new().await;
        let overdue = Utc::now() - chrono::Duration::seconds(1);
        let order = new_order(vec![coat_line(SIZE_XXS, 1)], PaymentMethod::UsdtTron, overdue);
        let order = shop.db.insert_order(order).await.expect("Error inserting order");
        assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 4);

        let shutdown = CancellationToken::new();
        let worker = start_expiry_worker(shop.orders.clone(), Duration::from_millis(50), shutdown.clone());
        let cancelled = shop.wait_for_status(&order.uuid, OrderStatusType::Cancelled, Duration::from_secs(5)).await;
        shutdown.cancel();
        worker.await.expect("Worker panicked");
        assert!(cancelled);
        assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
        shop.orders.watchers().stop_all();
    }
}
