use log::*;
use serde_json::json;
use shop_engine::{
    db_types::{
        Money,
        NewArchive,
        NewProduct,
        NewSupportTicket,
        OrderStatusType,
        PaymentMethod,
        TicketPriority,
        TicketStatus,
    },
    order_objects::{CartItem, ClientContext, OrderQueryFilter, ValidateCartRequest},
    shop_api::catalog_objects::{OrderFactor, ProductQuery},
    test_utils::{
        fixtures::{coat, order_request, promo, COAT_ID, COURIER_ID, HIDDEN_SCARF_ID, PICKUP_ID, SIZE_M, SIZE_XXS},
        test_shop::TestShop,
    },
    traits::SettingsManagement,
    ErrorKind,
    ShopError,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

async fn tear_down(shop: TestShop) {
    shop.orders.watchers().stop_all();
    shop.db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(shop.db.url()).await {
        warn!("🚀️ Could not remove {}: {e}", shop.db.url());
    }
}

fn ticket(email: &str) -> NewSupportTicket {
    NewSupportTicket {
        priority: TicketPriority::High,
        category: "payment".to_string(),
        topic: "card".to_string(),
        subject: "Charged twice".to_string(),
        civility: "ms".to_string(),
        email: email.to_string(),
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
        order_reference: None,
        notes: "My card statement shows two charges.".to_string(),
    }
}

#[tokio::test]
async fn catalog_upkeep() {
    let shop = TestShop::new().await;
    let err = shop.admin.add_product(coat()).await.expect_err("Duplicate SKU accepted");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let bad_colour = NewProduct { sku: "COAT002".into(), color_hex: "grey".into(), ..coat() };
    let err = shop.admin.add_product(bad_colour).await.expect_err("Bad colour accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let parka = NewProduct { name: "Parka".into(), sku: "PARKA01".into(), ..coat() };
    let parka = shop.admin.add_product(parka).await.expect("Error adding product");
    assert_eq!(parka.sizes.len(), 2);
    let page = shop.storefront.get_products_paged(ProductQuery::new(10, 0)).await.expect("Error listing products");
    assert_eq!(page.total, 2);
    assert!(page.products.iter().all(|p| p.id != HIDDEN_SCARF_ID));

    let err = shop.storefront.get_product(HIDDEN_SCARF_ID).await.expect_err("Hidden product visible");
    assert!(matches!(err, ShopError::ProductNotFound(HIDDEN_SCARF_ID)));
    shop.admin.hide_product(HIDDEN_SCARF_ID, false).await.expect("Error showing product");
    shop.storefront.get_product(HIDDEN_SCARF_ID).await.expect("Product should be visible");

    let size = shop.admin.set_stock(COAT_ID, SIZE_M, 7).await.expect("Error setting stock");
    assert_eq!(size.quantity, 7);
    let err = shop.admin.set_stock(COAT_ID, SIZE_M, -1).await.expect_err("Negative stock accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = shop.storefront.get_products_paged(ProductQuery::new(0, 0)).await.expect_err("Empty page accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    tear_down(shop).await;
}

#[tokio::test]
async fn promo_upkeep() {
    let shop = TestShop::new().await;
    let err = shop.admin.add_promo(promo("TENOFF", false, 10)).await.expect_err("Duplicate promo accepted");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = shop.admin.add_promo(promo("NOT VALID", false, 10)).await.expect_err("Bad code accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    shop.admin.add_promo(promo("HALF", false, 50)).await.expect("Error adding promo");
    assert_eq!(shop.admin.list_promos().await.expect("Error listing promos").len(), 3);

    let ctx = ClientContext::new("10.3.0.1", "promo");
    let cart = ValidateCartRequest::new(vec![CartItem::new(COAT_ID, SIZE_XXS, 2)]).with_promo("HALF");
    let priced = shop.storefront.validate_order_items(&ctx, &cart).await.expect("Error pricing cart");
    assert_eq!(priced.total, Money::new(1000, 2));

    let disabled = shop.admin.disable_promo("HALF").await.expect("Error disabling promo");
    assert!(!disabled.allowed);
    let priced = shop.storefront.validate_order_items(&ctx, &cart).await.expect("Error pricing cart");
    assert!(priced.promo.is_none());
    assert_eq!(priced.total, priced.subtotal);

    let mut request = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::Card);
    request.promo_code = Some("HALF".into());
    let err = shop.storefront.submit_order(&ctx, request).await.expect_err("Inactive promo accepted");
    assert!(matches!(err, ShopError::PromoInactive(_)));

    shop.admin.delete_promo("HALF").await.expect("Error deleting promo");
    let err = shop.admin.delete_promo("HALF").await.expect_err("Deleted twice");
    assert!(matches!(err, ShopError::PromoNotFound(_)));
    tear_down(shop).await;
}

#[tokio::test]
async fn carriers_and_site_content() {
    let shop = TestShop::new().await;
    shop.admin.set_carrier_price(COURIER_ID, "usd", Money::new(1200, 2)).await.expect("Error pricing carrier");
    let err = shop.admin.set_carrier_price(COURIER_ID, "XYZ", Money::new(1, 0)).await.expect_err("Bad currency");
    assert!(matches!(err, ShopError::UnsupportedCurrency(_)));
    let carriers = shop.admin.list_carriers().await.expect("Error listing carriers");
    let (courier, prices) = carriers.iter().find(|(c, _)| c.id == COURIER_ID).expect("Courier missing");
    assert_eq!(courier.price, Money::new(1000, 2));
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].currency, "USD");

    shop.admin.set_carrier_allowed(PICKUP_ID, false).await.expect("Error disabling carrier");
    let ctx = ClientContext::new("10.3.0.2", "carrier");
    let cart = ValidateCartRequest::new(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)]).with_carrier(PICKUP_ID);
    let err = shop.storefront.validate_order_items(&ctx, &cart).await.expect_err("Disabled carrier accepted");
    assert!(matches!(err, ShopError::CarrierNotFound(PICKUP_ID)));

    let err = shop.admin.set_hero(json!(["not", "an", "object"])).await.expect_err("Array hero accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    shop.admin.set_hero(json!({ "title": "Winter drop" })).await.expect("Error setting hero");
    let hero = shop.storefront.get_hero().await.expect("Error fetching hero");
    assert_eq!(hero.hero, Some(json!({ "title": "Winter drop" })));
    assert_eq!(hero.dictionary.base_currency, "EUR");
    assert!(hero.dictionary.site_available);

    let archive = NewArchive { title: "Autumn".into(), description: "Lookbook".into(), tag: "autumn".into() };
    shop.admin.add_archive(archive).await.expect("Error adding archive");
    let archives = shop.storefront.get_archives_paged(10, 0, OrderFactor::Desc).await.expect("Error listing archives");
    assert_eq!(archives.len(), 1);
    tear_down(shop).await;
}

#[tokio::test]
async fn order_search() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.3.0.3", "search");
    let card = order_request(vec![CartItem::new(COAT_ID, SIZE_XXS, 1)], PICKUP_ID, PaymentMethod::Card);
    let card = shop.storefront.submit_order(&ctx, card).await.expect("Error submitting order");
    let crypto = order_request(vec![CartItem::new(COAT_ID, SIZE_M, 1)], COURIER_ID, PaymentMethod::UsdtTron);
    shop.storefront.submit_order(&ctx, crypto).await.expect("Error submitting order");

    let all = shop.admin.list_orders(OrderQueryFilter::default()).await.expect("Error searching");
    assert_eq!(all.len(), 2);
    let by_method = OrderQueryFilter::default().with_payment_method(PaymentMethod::Card);
    let found = shop.admin.list_orders(by_method).await.expect("Error searching");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uuid, card.order_uuid);
    let by_status = OrderQueryFilter::default().with_status(OrderStatusType::Confirmed);
    assert!(shop.admin.list_orders(by_status).await.expect("Error searching").is_empty());
    let by_email = OrderQueryFilter::default().with_email("ada@example.com");
    assert_eq!(shop.admin.list_orders(by_email).await.expect("Error searching").len(), 2);

    let details = shop.storefront.validate_order_by_uuid(&card.order_uuid).await.expect("Error fetching details");
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.shipment.cost, Money::zero());
    assert_eq!(details.payment.payment_method, PaymentMethod::Card);
    tear_down(shop).await;
}

#[tokio::test]
async fn support_and_newsletter() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.3.0.4", "support");
    let submitted = shop.storefront.submit_support_ticket(&ctx, ticket("grace@example.com")).await.expect("ticket");
    assert_eq!(submitted.status, TicketStatus::Submitted);
    assert!(shop.wait_for_mail("grace@example.com", &submitted.case_number, std::time::Duration::from_secs(5)).await);

    let updated = shop
        .admin
        .update_support_ticket_status(submitted.id, TicketStatus::Resolved, Some("Refunded the duplicate".into()))
        .await
        .expect("Error updating ticket");
    assert_eq!(updated.status, TicketStatus::Resolved);
    assert!(updated.resolved_at.is_some());
    let open = shop.admin.list_support_tickets(Some(TicketStatus::Submitted), 10, 0).await.expect("Error listing");
    assert!(open.is_empty());

    let err = shop.storefront.submit_support_ticket(&ctx, ticket("not-an-email")).await.expect_err("Bad email");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    shop.storefront.subscribe_newsletter("  Reader@Example.com ").await.expect("Error subscribing");
    shop.storefront.subscribe_newsletter("reader@example.com").await.expect("Error subscribing");
    let welcomes = shop.mailer.sent_to("reader@example.com");
    assert!(welcomes.len() <= 1);
    assert!(shop.storefront.unsubscribe_newsletter("reader@example.com").await.expect("Error unsubscribing"));
    assert!(!shop.storefront.unsubscribe_newsletter("reader@example.com").await.expect("Error unsubscribing"));
    tear_down(shop).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_write_is_visible_to_the_next_read() {
    let shop = TestShop::new().await;
    let ctx = ClientContext::new("10.3.0.9", "writers");
    let submitted = shop.storefront.submit_support_ticket(&ctx, ticket("grace@example.com")).await.expect("ticket");
    for quantity in 1..=10 {
        shop.admin.set_stock(COAT_ID, SIZE_M, quantity).await.expect("Error setting stock");
        assert_eq!(shop.stock(COAT_ID, SIZE_M).await, quantity);
    }

    // Writers that each read before they write queue up for the lock rather than fail
    let (stock, hidden, max, status) = tokio::join!(
        shop.admin.set_stock(COAT_ID, SIZE_XXS, 7),
        shop.admin.hide_product(HIDDEN_SCARF_ID, false),
        shop.admin.set_max_order_items(12),
        shop.admin.update_support_ticket_status(submitted.id, TicketStatus::InProgress, None),
    );
    stock.expect("Error setting stock");
    hidden.expect("Error showing product");
    max.expect("Error changing settings");
    status.expect("Error updating ticket");

    assert_eq!(shop.stock(COAT_ID, SIZE_XXS).await, 7);
    assert_eq!(shop.db.fetch_settings().await.expect("Error fetching settings").max_order_items, 12);
    let in_progress = shop.admin.list_support_tickets(Some(TicketStatus::InProgress), 10, 0).await.expect("listing");
    assert_eq!(in_progress.len(), 1);
    let submitted = shop.admin.list_support_tickets(Some(TicketStatus::Submitted), 10, 0).await.expect("listing");
    assert!(submitted.is_empty());
    tear_down(shop).await;
}
