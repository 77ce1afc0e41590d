use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use futures_util::future::join_all;
use log::*;
use shop_engine::{
    crypto_watcher::{CryptoWatcher, WatcherConfig},
    db_types::{OrderStatusType, PaymentMethod},
    order_objects::{CartItem, ClientContext, SubmittedOrder, ValidateCartRequest},
    test_utils::{
        fixtures::{coat_line, new_order, order_request, COAT_ID, COURIER_ID, PICKUP_ID, SIZE_M, SIZE_XXS},
        test_shop::{default_rates, wait_until, TestShop, TestShopConfig, USDT_CONTRACT},
    },
    traits::{CardIntentStatus, OrderManagement, OrderStoreError},
    ErrorKind,
    ShopError,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

const WAIT: Duration = Duration::from_secs(5);

async fn tear_down(shop: TestShop) {
    shop.orders.watchers().stop_all();
    shop.db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(shop.db.url()).await {
        warn!("🚀️ Could not remove {}: {e}", shop.db.url());
    }
}

async fn place(shop: &TestShop, session: &str, qty: i64, method: PaymentMethod) -> SubmittedOrder {
    let ctx = ClientContext::new("10.1.1.1", session);
    let request = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, qty)], PICKUP_ID, method);
    shop.storefront.submit_order(&ctx, request).await.expect("Error submitting order")
}

async fn order_id(shop: &TestShop, uuid: &str) -> i64 {
    shop.db.fetch_order_by_uuid(uuid).await.expect("db error").expect("Order does not exist").id
}

async fn row_count(shop: &TestShop, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar(&sql).fetch_one(shop.db.pool()).await.expect("Error counting rows")
}

const ORDER_TABLES: [&str; 6] = ["orders", "order_items", "buyers", "addresses", "shipments", "payments"];

#[tokio::test]
async fn refund_returns_stock_and_mails_the_buyer() {
    let shop = TestShop::new().await;
    let order = place(&shop, "refund", 2, PaymentMethod::Card).await;
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 3);
    let intent = shop.card.intent_for(&order.order_uuid).expect("No card intent");
    let confirmed = shop.storefront.card_payment_settled(&intent).await.expect("Error settling");
    assert_eq!(confirmed.status, OrderStatusType::Confirmed);

    let refunded = shop.admin.refund_order(&order.order_uuid).await.expect("Error refunding");
    assert_eq!(refunded.status, OrderStatusType::Refunded);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    assert!(shop.wait_for_mail("ada@example.com", "refunded", WAIT).await);

    let err = shop.admin.refund_order(&order.order_uuid).await.expect_err("Refunded twice");
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    tear_down(shop).await;
}

#[tokio::test]
async fn shipping_sends_the_tracking_link() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.1.1.2", "ship");
    let request = order_request(vec![CartItem::new(COAT_ID, SIZE_M, 1)], COURIER_ID, PaymentMethod::Card);
    let order = shop.storefront.submit_order(&ctx, request).await.expect("Error submitting order");
    let uuid = order.order_uuid;

    let err = shop.admin.set_tracking_number(&uuid, "TRK123").await.expect_err("Shipped an unpaid order");
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    let intent = shop.card.intent_for(&uuid).expect("No card intent");
    shop.storefront.card_payment_settled(&intent).await.expect("Error settling");
    let shipped = shop.admin.set_tracking_number(&uuid, "TRK123").await.expect("Error shipping");
    assert_eq!(shipped.status, OrderStatusType::Shipped);
    assert!(shop.wait_for_mail("ada@example.com", "on its way", WAIT).await);
    let mail = shop.mailer.sent_to("ada@example.com").into_iter().find(|m| m.subject.contains("on its way"));
    assert!(mail.expect("No shipping mail").body.contains("https://track.example/TRK123"));

    let delivered = shop.admin.delivered_order(&uuid).await.expect("Error marking delivery");
    assert_eq!(delivered.status, OrderStatusType::Delivered);
    tear_down(shop).await;
}

#[tokio::test]
async fn settlement_webhook_is_idempotent() {
    let shop = TestShop::new().await;
    let order = place(&shop, "twice", 1, PaymentMethod::Card).await;
    let intent = shop.card.intent_for(&order.order_uuid).expect("No card intent");
    let first = shop.storefront.card_payment_settled(&intent).await.expect("Error settling");
    let second = shop.storefront.card_payment_settled(&intent).await.expect("Error settling again");
    assert_eq!(first.status, OrderStatusType::Confirmed);
    assert_eq!(second.status, OrderStatusType::Confirmed);
    assert_eq!(second.id, first.id);

    let err = shop.storefront.card_payment_settled("pi_unknown").await.expect_err("Unknown intent settled");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    tear_down(shop).await;
}

#[tokio::test]
async fn fetching_an_order_reconciles_card_payments() {
    let shop = TestShop::new().await;
    let order = place(&shop, "reconcile", 1, PaymentMethod::Card).await;
    let intent = shop.card.intent_for(&order.order_uuid).expect("No card intent");
    let fetched = shop.storefront.get_order_by_uuid(&order.order_uuid).await.expect("Error fetching order");
    assert_eq!(fetched.status, OrderStatusType::AwaitingPayment);

    shop.card.set_status(&intent, CardIntentStatus::Succeeded);
    let fetched = shop.storefront.get_order_by_uuid(&order.order_uuid).await.expect("Error fetching order");
    assert_eq!(fetched.status, OrderStatusType::Confirmed);
    tear_down(shop).await;
}

#[tokio::test]
async fn overdue_card_payments_are_cancelled() {
    let config = TestShopConfig { card_payment_ttl: Duration::from_millis(100), ..Default::default() };
    let shop = TestShop::with_config(config).await;
    let unpaid = place(&shop, "late", 2, PaymentMethod::Card).await;
    let paid = place(&shop, "paid", 1, PaymentMethod::Card).await;
    let paid_intent = shop.card.intent_for(&paid.order_uuid).expect("No card intent");
    shop.card.set_status(&paid_intent, CardIntentStatus::Succeeded);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 2);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let expired = shop.orders.expire_overdue_payments().await.expect("Error expiring payments");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].uuid, unpaid.order_uuid);
    assert_eq!(shop.status_of(&unpaid.order_uuid).await, OrderStatusType::Cancelled);
    assert_eq!(shop.status_of(&paid.order_uuid).await, OrderStatusType::Confirmed);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 4);
    let intent = shop.card.intent_for(&unpaid.order_uuid).expect("No card intent");
    assert_eq!(shop.card.status_of(&intent), Some(CardIntentStatus::Canceled));

    let again = shop.orders.expire_overdue_payments().await.expect("Error expiring payments");
    assert!(again.is_empty());
    tear_down(shop).await;
}

#[tokio::test]
async fn card_processor_outage_leaves_the_order_payable() {
    let shop = TestShop::new().await;
    shop.card.fail_requests(true);
    let order = place(&shop, "outage", 1, PaymentMethod::Card).await;
    assert_eq!(order.order_status, OrderStatusType::AwaitingPayment);
    assert!(order.payment.client_secret.is_none());

    let err = shop.storefront.get_order_invoice(&order.order_uuid, PaymentMethod::Card).await.expect_err("No outage");
    assert_eq!(err.kind(), ErrorKind::Internal);

    shop.card.fail_requests(false);
    let uuid = order.order_uuid.as_str();
    let invoice = shop.storefront.get_order_invoice(uuid, PaymentMethod::Card).await.expect("Error fetching invoice");
    assert!(invoice.client_secret.is_some());
    let again = shop.storefront.get_order_invoice(uuid, PaymentMethod::Card).await.expect("Error fetching invoice");
    assert_eq!(again.client_secret, invoice.client_secret);
    assert_eq!(shop.card.requests().len(), 1);
    tear_down(shop).await;
}

#[tokio::test]
async fn crypto_invoices_are_stable_and_method_checked() {
    let shop = TestShop::new().await;
    let order = place(&shop, "stable", 1, PaymentMethod::UsdtTron).await;
    let first = shop.storefront.get_order_invoice(&order.order_uuid, PaymentMethod::UsdtTron).await.expect("invoice");
    let second = shop.storefront.get_order_invoice(&order.order_uuid, PaymentMethod::UsdtTron).await.expect("invoice");
    assert_eq!(first.payee, order.payment.payee);
    assert_eq!(second.payee, first.payee);
    assert_eq!(second.transaction_amount_payment_currency, first.transaction_amount_payment_currency);

    let err = shop.storefront.get_order_invoice(&order.order_uuid, PaymentMethod::Card).await.expect_err("mismatch");
    assert!(matches!(err, ShopError::PaymentMethodMismatch { .. }));
    tear_down(shop).await;
}

#[tokio::test]
async fn buyer_can_abandon_a_crypto_invoice() {
    let shop = TestShop::new().await;
    let order = place(&shop, "abandon", 2, PaymentMethod::UsdtTron).await;
    let id = order_id(&shop, &order.order_uuid).await;
    assert_eq!(shop.usdt_watcher().free_addresses(), 1);

    let cancelled = shop.storefront.cancel_order_invoice(&order.order_uuid).await.expect("Error cancelling invoice");
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(shop.usdt_watcher().address_for(id), None);
    assert_eq!(shop.usdt_watcher().free_addresses(), 2);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);

    let err = shop.storefront.cancel_order_invoice(&order.order_uuid).await.expect_err("Cancelled twice");
    assert!(matches!(err, ShopError::OrderNotPayable { .. }));
    tear_down(shop).await;
}

#[tokio::test]
async fn admin_cancel_frees_the_crypto_address() {
    let shop = TestShop::new().await;
    let order = place(&shop, "admin", 1, PaymentMethod::UsdtTron).await;
    let payee = order.payment.payee.clone().expect("No address assigned");
    let cancelled = shop.admin.cancel_order(&order.order_uuid).await.expect("Error cancelling");
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(shop.usdt_watcher().free_addresses(), 2);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);

    // A late transfer to the freed address must not resurrect the cancelled order
    shop.explorer.pay(&payee, 11_000_000, Some(USDT_CONTRACT));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(shop.status_of(&order.order_uuid).await, OrderStatusType::Cancelled);
    tear_down(shop).await;
}

#[tokio::test]
async fn watcher_resumes_after_restart() {
    let shop = TestShop::new().await;
    let order = place(&shop, "restart", 1, PaymentMethod::UsdtTron).await;
    let payee = order.payment.payee.clone().expect("No address assigned");
    let id = order_id(&shop, &order.order_uuid).await;
    shop.orders.watchers().stop_all();

    let mut config = WatcherConfig::new(PaymentMethod::UsdtTron, vec!["TAddressOne".into(), "TAddressTwo".into()])
        .with_token_contract(USDT_CONTRACT);
    config.check_interval = Duration::from_millis(50);
    let watcher = CryptoWatcher::new(
        config,
        shop.db.clone(),
        shop.currency.clone(),
        shop.explorer.clone(),
        shop.orders.transitions().clone(),
    );
    let watched = watcher.start().await.expect("Error starting watcher");
    assert_eq!(watched, 1);
    assert_eq!(watcher.address_for(id), Some(payee.clone()));
    assert_eq!(watcher.free_addresses(), 1);

    shop.explorer.pay(&payee, 11_000_000, Some(USDT_CONTRACT));
    assert!(shop.wait_for_status(&order.order_uuid, OrderStatusType::Confirmed, WAIT).await);
    watcher.stop();
    tear_down(shop).await;
}

#[tokio::test]
async fn wrong_token_does_not_settle() {
    let shop = TestShop::new().await;
    let order = place(&shop, "token", 1, PaymentMethod::UsdtTron).await;
    let payee = order.payment.payee.clone().expect("No address assigned");
    shop.explorer.pay(&payee, 11_000_000, Some("TSomeOtherToken"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(shop.status_of(&order.order_uuid).await, OrderStatusType::AwaitingPayment);
    shop.explorer.pay(&payee, 11_000_000, Some(USDT_CONTRACT));
    assert!(shop.wait_for_status(&order.order_uuid, OrderStatusType::Confirmed, WAIT).await);
    tear_down(shop).await;
}

#[tokio::test]
async fn shop_settings_gate_submission() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.1.1.3", "gates");
    let request = || order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::Card);

    shop.admin.set_site_available(false).await.expect("Error changing settings");
    let err = shop.storefront.submit_order(&ctx, request()).await.expect_err("Site is closed");
    assert!(matches!(err, ShopError::SiteUnavailable));
    shop.admin.set_site_available(true).await.expect("Error changing settings");

    shop.admin.set_payment_method_allowed(PaymentMethod::Card, false).await.expect("Error changing settings");
    let err = shop.storefront.submit_order(&ctx, request()).await.expect_err("Card is disabled");
    assert!(matches!(err, ShopError::PaymentMethodDisabled(PaymentMethod::Card)));
    shop.admin.set_payment_method_allowed(PaymentMethod::Card, true).await.expect("Error changing settings");

    let too_many = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 21)], PICKUP_ID, PaymentMethod::Card);
    let err = shop.storefront.submit_order(&ctx, too_many).await.expect_err("Too many items");
    assert!(matches!(err, ShopError::TooManyItems { requested: 21, max: 20 }));

    let mut unknown_promo = request();
    unknown_promo.promo_code = Some("NOPE".into());
    let err = shop.storefront.submit_order(&ctx, unknown_promo).await.expect_err("Unknown promo");
    assert!(matches!(err, ShopError::PromoNotFound(_)));

    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    shop.storefront.submit_order(&ctx, request()).await.expect("Error submitting order");
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 4);
    tear_down(shop).await;
}

#[tokio::test]
async fn committed_reservations_are_released_with_the_order() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.1.1.4", "holder");
    shop.storefront.reserve_cart_item(&ctx, COAT_ID, SIZE_XXS, 2).await.expect("Error reserving");
    let request = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 2)], PICKUP_ID, PaymentMethod::Card);
    let order = shop.storefront.submit_order(&ctx, request).await.expect("Error submitting order");
    let stats = shop.orders.reservations().stats().await;
    assert_eq!(stats.order, 1);

    // The held units belong to the order now. The session's cart is empty.
    assert_eq!(shop.storefront.release_cart(&ctx).await, 0);
    let intent = shop.card.intent_for(&order.order_uuid).expect("No card intent");
    shop.storefront.card_payment_settled(&intent).await.expect("Error settling");
    let stats = shop.orders.reservations().stats().await;
    assert_eq!(stats.order, 0);
    tear_down(shop).await;
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() {
    let shop = TestShop::new().await;
    let expires = Utc::now() + chrono::Duration::hours(1);
    // The first line fits. The second asks for one more coat than there is.
    let order = new_order(vec![coat_line(SIZE_M, 1), coat_line(SIZE_XXS, 6)], PaymentMethod::Card, expires);
    let err = shop.db.insert_order(order).await.expect_err("Sold more coats than in stock");
    assert!(matches!(err, OrderStoreError::InsufficientStock { product_id: COAT_ID, size_id: SIZE_XXS }));
    assert_eq!(shop.stock(COAT_ID, SIZE_M).await, 3);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    for table in ORDER_TABLES {
        assert_eq!(row_count(&shop, table).await, 0, "{table} kept rows of a failed order");
    }

    let order = new_order(vec![coat_line(SIZE_XXS, 5)], PaymentMethod::Card, expires);
    let order = shop.db.insert_order(order).await.expect("Error inserting order");
    assert_eq!(order.status, OrderStatusType::AwaitingPayment);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 0);
    assert_eq!(row_count(&shop, "order_items").await, 1);
    tear_down(shop).await;
}

#[tokio::test]
async fn exceeding_stock_by_one_reports_a_clamped_cart() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.1.1.5", "greedy");
    let items = vec![CartItem::new(COAT_ID, SIZE_XXS, 6)];
    let request = ValidateCartRequest::new(items.clone());
    let cart = shop.storefront.validate_order_items(&ctx, &request).await.expect("Error validating cart");
    assert!(cart.has_changed);
    assert_eq!(cart.total_units(), 5);

    let request = order_request(items, PICKUP_ID, PaymentMethod::Card);
    let err = shop.storefront.submit_order(&ctx, request).await.expect_err("Oversold the coat");
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    match err {
        ShopError::CartChanged(cart) => {
            assert_eq!(cart.valid_items.len(), 1);
            assert_eq!(cart.valid_items[0].size_id, SIZE_XXS);
            assert_eq!(cart.valid_items[0].quantity, 5);
        },
        other => panic!("Expected a changed cart, got {other}"),
    }
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    assert_eq!(row_count(&shop, "orders").await, 0);
    assert!(shop.card.requests().is_empty());
    tear_down(shop).await;
}

#[tokio::test]
async fn crypto_submission_without_a_rate_writes_nothing() {
    let shop = TestShop::new().await;
    shop.currency.set_rates(HashMap::new()).await;
    let ctx = ClientContext::new("10.1.1.6", "no-rate");
    let request = || order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::UsdtTron);
    shop.storefront.submit_order(&ctx, request()).await.expect_err("Invoiced without a rate");
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    assert_eq!(shop.usdt_watcher().free_addresses(), 2);
    for table in ORDER_TABLES {
        assert_eq!(row_count(&shop, table).await, 0, "{table} kept rows of a failed submission");
    }

    shop.currency.set_rates(default_rates()).await;
    let order = shop.storefront.submit_order(&ctx, request()).await.expect("Error submitting order");
    assert!(order.payment.payee.is_some());
    assert_eq!(order.order_status, OrderStatusType::AwaitingPayment);
    assert_eq!(shop.usdt_watcher().free_addresses(), 1);
    tear_down(shop).await;
}

#[tokio::test]
async fn concurrent_crypto_submissions_share_a_single_address() {
    let config = TestShopConfig { usdt_addresses: vec!["TAddressOne".into()], ..Default::default() };
    let shop = TestShop::with_config(config).await;
    let shop_ref = &shop;
    let submissions = (0..4).map(move |i| {
        let shop = shop_ref;
        async move {
            let ctx = ClientContext::new(format!("10.2.0.{i}"), format!("rush-{i}"));
            let request = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::UsdtTron);
            shop.storefront.submit_order(&ctx, request).await
        }
    });
    let results = join_all(submissions).await;
    let (placed, refused): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    assert_eq!(placed.len(), 1);
    assert_eq!(refused.len(), 3);
    for err in refused.into_iter().filter_map(Result::err) {
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }
    let order = placed.into_iter().find_map(Result::ok).expect("One submission succeeds");
    assert_eq!(order.payment.payee.as_deref(), Some("TAddressOne"));
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 4);
    assert_eq!(row_count(&shop, "orders").await, 1);
    assert_eq!(row_count(&shop, "payments").await, 1);
    tear_down(shop).await;
}

#[tokio::test]
async fn unwatched_crypto_orders_are_expired_by_the_sweep() {
    let shop = TestShop::new().await;
    let overdue = Utc::now() - chrono::Duration::seconds(1);
    let order = new_order(vec![coat_line(SIZE_XXS, 2)], PaymentMethod::UsdtTron, overdue);
    let order = shop.db.insert_order(order).await.expect("Error inserting order");
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 3);
    assert_eq!(shop.usdt_watcher().address_for(order.id), None);

    let expired = shop.orders.expire_overdue_payments().await.expect("Error expiring payments");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].uuid, order.uuid);
    assert_eq!(expired[0].status, OrderStatusType::Cancelled);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);
    assert_eq!(shop.usdt_watcher().free_addresses(), 2);

    let again = shop.orders.expire_overdue_payments().await.expect("Error expiring payments");
    assert!(again.is_empty());
    tear_down(shop).await;
}

async fn freeze_orders(shop: &TestShop, frozen: bool) {
    let sql = if frozen {
        "CREATE TRIGGER freeze_orders BEFORE UPDATE ON orders BEGIN SELECT RAISE(ABORT, 'orders are frozen'); END;"
    } else {
        "DROP TRIGGER freeze_orders;"
    };
    sqlx::query(sql).execute(shop.db.pool()).await.expect("Error changing the orders trigger");
}

#[tokio::test]
async fn failed_invoice_cancellation_keeps_the_address() {
    let shop = TestShop::new().await;
    let order = place(&shop, "regret", 1, PaymentMethod::UsdtTron).await;
    let payee = order.payment.payee.clone().expect("No address assigned");
    let id = order_id(&shop, &order.order_uuid).await;

    freeze_orders(&shop, true).await;
    shop.storefront.cancel_order_invoice(&order.order_uuid).await.expect_err("Cancelled a frozen order");
    assert_eq!(shop.status_of(&order.order_uuid).await, OrderStatusType::AwaitingPayment);
    assert_eq!(shop.usdt_watcher().address_for(id), Some(payee.clone()));
    assert_eq!(shop.usdt_watcher().free_addresses(), 1);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 4);
    // Nobody else may be handed the address while the order can still be paid there
    let other = place(&shop, "other", 1, PaymentMethod::UsdtTron).await;
    assert_ne!(other.payment.payee, Some(payee));

    freeze_orders(&shop, false).await;
    let cancelled = shop.storefront.cancel_order_invoice(&order.order_uuid).await.expect("Error cancelling invoice");
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(shop.usdt_watcher().address_for(id), None);
    assert_eq!(shop.usdt_watcher().free_addresses(), 1);
    tear_down(shop).await;
}

#[tokio::test]
async fn invoice_expiry_is_retried_until_the_order_is_cancelled() {
    let config = TestShopConfig { invoice_expiration: Duration::from_millis(200), ..Default::default() };
    let shop = TestShop::with_config(config).await;
    let order = place(&shop, "slow", 1, PaymentMethod::UsdtTron).await;
    let payee = order.payment.payee.clone().expect("No address assigned");
    let id = order_id(&shop, &order.order_uuid).await;

    freeze_orders(&shop, true).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(shop.status_of(&order.order_uuid).await, OrderStatusType::AwaitingPayment);
    assert_eq!(shop.usdt_watcher().address_for(id), Some(payee.clone()));
    assert_eq!(shop.usdt_watcher().free_addresses(), 1);

    freeze_orders(&shop, false).await;
    assert!(shop.wait_for_status(&order.order_uuid, OrderStatusType::Cancelled, WAIT).await);
    let watcher = shop.usdt_watcher();
    let freed = wait_until(WAIT, move || async move { watcher.address_for(id).is_none() }).await;
    assert!(freed, "The expired order kept its address");
    assert_eq!(shop.usdt_watcher().free_addresses(), 2);
    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 5);

    // A late transfer to the freed address does not confirm the expired order
    shop.explorer.pay(&payee, 11_000_000, Some(USDT_CONTRACT));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(shop.status_of(&order.order_uuid).await, OrderStatusType::Cancelled);
    tear_down(shop).await;
}
