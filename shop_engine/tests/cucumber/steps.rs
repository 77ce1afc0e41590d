use std::time::Duration;

use cucumber::{given, then, when};
use shop_engine::{
    db_types::{Money, NewSupportTicket, OrderStatusType, PaymentMethod, TicketPriority},
    order_objects::{CartItem, ClientContext, ValidateCartRequest},
    test_utils::{
        fixtures::order_request,
        test_shop::{wait_until, TestShop, TestShopConfig, USDT_CONTRACT},
    },
    traits::OrderManagement,
    ShopError,
};

use crate::cucumber::ShopWorld;

const WAIT: Duration = Duration::from_secs(5);

//------------------------------------------    Setup    ----------------------------------------------------------
#[given("a fresh shop")]
async fn fresh_shop(world: &mut ShopWorld) {
    world.shop = Some(TestShop::new().await);
}

#[given(expr = "a fresh shop whose crypto invoices expire after {int}ms")]
async fn fresh_shop_with_expiry(world: &mut ShopWorld, ms: u64) {
    let config = TestShopConfig { invoice_expiration: Duration::from_millis(ms), ..Default::default() };
    world.shop = Some(TestShop::with_config(config).await);
}

//------------------------------------------    Carts    ----------------------------------------------------------
#[when(expr = "session '{word}' reserves {int} of product {int} in size {int}")]
async fn reserve(world: &mut ShopWorld, session: String, qty: i64, product_id: i64, size_id: i64) {
    let ctx = ShopWorld::context(&session);
    world
        .shop()
        .storefront
        .reserve_cart_item(&ctx, product_id, size_id, qty)
        .await
        .expect("Error reserving stock");
}

#[when(expr = "session '{word}' validates {int} of product {int} in size {int}")]
async fn validate(world: &mut ShopWorld, session: String, qty: i64, product_id: i64, size_id: i64) {
    let request = ValidateCartRequest::new(vec![CartItem::new(product_id, size_id, qty)]);
    validate_request(world, &session, request).await;
}

#[when(expr = "session '{word}' validates {int} of product {int} in size {int} with promo {word} and carrier {int}")]
async fn validate_with_promo(
    world: &mut ShopWorld,
    session: String,
    qty: i64,
    product_id: i64,
    size_id: i64,
    promo: String,
    carrier_id: i64,
) {
    let request = ValidateCartRequest::new(vec![CartItem::new(product_id, size_id, qty)])
        .with_promo(promo)
        .with_carrier(carrier_id);
    validate_request(world, &session, request).await;
}

async fn validate_request(world: &mut ShopWorld, session: &str, request: ValidateCartRequest) {
    let ctx = ShopWorld::context(session);
    let cart = world.shop().storefront.validate_order_items(&ctx, &request).await.expect("Error validating cart");
    world.cart = Some(cart);
}

#[then(expr = "the cart subtotal is {int} times the sale price of product {int}")]
async fn check_subtotal(world: &mut ShopWorld, qty: i64, product_id: i64) {
    let cart = world.cart();
    let line = cart.valid_items.iter().find(|i| i.product_id == product_id).expect("Product is not in the cart");
    assert_eq!(cart.subtotal, line.price_with_sale * qty);
}

#[then(expr = "the cart total is {word}")]
async fn check_total(world: &mut ShopWorld, total: String) {
    let expected = total.parse::<Money>().expect("Not a valid amount");
    assert_eq!(world.cart().total, expected);
}

#[then("the cart total equals its subtotal")]
async fn check_total_is_subtotal(world: &mut ShopWorld) {
    let cart = world.cart();
    assert_eq!(cart.total, cart.subtotal);
    assert!(cart.shipping_cost.is_zero());
}

#[then("the cart has not changed")]
async fn check_unchanged(world: &mut ShopWorld) {
    assert!(!world.cart().has_changed);
}

#[then(expr = "the cart has changed and holds {int} of product {int} in size {int}")]
async fn check_changed(world: &mut ShopWorld, qty: i64, product_id: i64, size_id: i64) {
    let cart = world.cart();
    assert!(cart.has_changed);
    let line = cart
        .valid_items
        .iter()
        .find(|i| i.product_id == product_id && i.size_id == size_id)
        .expect("Line is not in the cart");
    assert_eq!(line.quantity, qty);
}

//------------------------------------------    Orders   ----------------------------------------------------------
#[when(expr = "session '{word}' orders {int} of product {int} in size {int} with carrier {int} paying by {word}")]
async fn submit(
    world: &mut ShopWorld,
    session: String,
    qty: i64,
    product_id: i64,
    size_id: i64,
    carrier: i64,
    method: String,
) {
    let method = method.parse::<PaymentMethod>().expect("Not a payment method");
    let ctx = ShopWorld::context(&session);
    let request = order_request(vec![CartItem::new(product_id, size_id, qty)], carrier, method);
    match world.shop().storefront.submit_order(&ctx, request).await {
        Ok(order) => {
            world.order = Some(order);
            world.error = None;
        },
        Err(e) => world.error = Some(e),
    }
}

#[then(expr = "the order is {word}")]
async fn check_status(world: &mut ShopWorld, status: String) {
    let status = status.parse::<OrderStatusType>().expect("Not an order status");
    let uuid = world.order_uuid();
    assert!(world.shop().wait_for_status(&uuid, status, WAIT).await, "Order {uuid} never became {status}");
}

#[then(expr = "the order is still {word} after {int}ms")]
async fn check_status_holds(world: &mut ShopWorld, status: String, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    let status = status.parse::<OrderStatusType>().expect("Not an order status");
    assert_eq!(world.shop().status_of(&world.order_uuid()).await, status);
}

#[then("the payment has a client secret")]
async fn check_client_secret(world: &mut ShopWorld) {
    assert!(world.order().payment.client_secret.is_some());
}

#[then(expr = "the order total is {word}")]
async fn check_order_total(world: &mut ShopWorld, total: String) {
    let expected = total.parse::<Money>().expect("Not a valid amount");
    assert_eq!(world.order().payment.transaction_amount, expected);
}

#[then(expr = "the payer must send exactly {int} token units to '{word}'")]
async fn check_invoice(world: &mut ShopWorld, units: i64, address: String) {
    let payment = &world.order().payment;
    assert_eq!(payment.transaction_amount_payment_currency, Money::from(units));
    assert_eq!(payment.payee.as_deref(), Some(address.as_str()));
    let order = world.shop().db.fetch_order_by_uuid(&world.order_uuid()).await.expect("db error").expect("no order");
    assert_eq!(world.shop().usdt_watcher().address_for(order.id), Some(address));
}

#[then(expr = "the stock of product {int} in size {int} is {int}")]
async fn check_stock(world: &mut ShopWorld, product_id: i64, size_id: i64, qty: i64) {
    assert_eq!(world.shop().stock(product_id, size_id).await, qty);
}

#[then(expr = "address '{word}' is free again")]
async fn check_address_free(world: &mut ShopWorld, address: String) {
    let watcher = world.shop().usdt_watcher();
    let order = world.shop().db.fetch_order_by_uuid(&world.order_uuid()).await.expect("db error").expect("no order");
    let order_id = order.id;
    // The monitor lets go of the address just after it moves the order on
    let released = wait_until(WAIT, move || async move { watcher.address_for(order_id).is_none() }).await;
    assert!(released, "{address} is still bound to the order");
    assert_eq!(watcher.free_addresses(), watcher.config().addresses.len());
}

#[then(expr = "submitting fails with a {string} error")]
async fn check_submit_failure(world: &mut ShopWorld, kind: String) {
    assert_failure_kind(world, &kind);
}

fn assert_failure_kind(world: &ShopWorld, kind: &str) {
    let err = world.error.as_ref().expect("The last request did not fail");
    assert_eq!(err.kind().to_string(), kind, "Unexpected error: {err}");
}

#[then("submitting fails because the cart changed")]
async fn check_cart_changed(world: &mut ShopWorld) {
    match world.error.as_ref() {
        Some(ShopError::CartChanged(cart)) => assert!(cart.has_changed),
        other => panic!("Expected CartChanged, got {other:?}"),
    }
}

//------------------------------------------   Payments  ----------------------------------------------------------
#[when("the card processor reports the payment as settled")]
async fn card_settled(world: &mut ShopWorld) {
    let uuid = world.order_uuid();
    let intent = world.shop().card.intent_for(&uuid).expect("No intent was created for the order");
    world.shop().storefront.card_payment_settled(&intent).await.expect("Error settling card payment");
}

#[when(expr = "the explorer reports a transfer of {int} token units to '{word}'")]
async fn crypto_transfer(world: &mut ShopWorld, units: u128, address: String) {
    world.shop().explorer.pay(&address, units, Some(USDT_CONTRACT));
}

#[then(expr = "a mail with subject containing '{word}' is sent to '{word}'")]
async fn check_mail(world: &mut ShopWorld, subject: String, to: String) {
    assert!(world.shop().wait_for_mail(&to, &subject, WAIT).await, "No mail about '{subject}' reached {to}");
}

//------------------------------------------   Support   ----------------------------------------------------------
#[when(expr = "a support ticket is submitted from IP '{word}' with email '{word}'")]
async fn submit_ticket(world: &mut ShopWorld, ip: String, email: String) {
    let ctx = ClientContext::new(ip, "support");
    let ticket = NewSupportTicket {
        priority: TicketPriority::Medium,
        category: "order".to_string(),
        topic: "delivery".to_string(),
        subject: "Where is my parcel?".to_string(),
        civility: "mx".to_string(),
        email,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        order_reference: None,
        notes: "It has been a week.".to_string(),
    };
    match world.shop().storefront.submit_support_ticket(&ctx, ticket).await {
        Ok(_) => world.error = None,
        Err(e) => world.error = Some(e),
    }
}

#[then("the request succeeds")]
async fn check_success(world: &mut ShopWorld) {
    assert!(world.error.is_none(), "Request failed: {:?}", world.error);
}

#[then(expr = "the request fails with a {string} error")]
async fn check_request_failure(world: &mut ShopWorld, kind: String) {
    assert_failure_kind(world, &kind);
}
