use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    db_types::{
        Category,
        Gender,
        Money,
        NewAddress,
        NewBuyer,
        NewOrder,
        NewPayment,
        NewProduct,
        NewPromoCode,
        NewShipmentCarrier,
        OrderItemSnapshot,
        PaymentMethod,
        Percentage,
        Size,
    },
    order_objects::{CartItem, NewOrderRequest},
    traits::CatalogManagement,
    SqliteDatabase,
};

/// Product 1, on sale in size `xxs` (id 1, 5 in stock) and `m` (id 4, 3 in stock) at 10.00.
pub const COAT_ID: i64 = 1;
/// Product 2, hidden from the storefront.
pub const HIDDEN_SCARF_ID: i64 = 2;
pub const SIZE_XXS: i64 = 1;
pub const SIZE_M: i64 = 4;
/// Carrier 1 costs 10.00. Its tracking page is `https://track.example/{code}`.
pub const COURIER_ID: i64 = 1;
/// Carrier 2 is free.
pub const PICKUP_ID: i64 = 2;

pub fn coat() -> NewProduct {
    NewProduct {
        name: "Wool Coat".to_string(),
        brand: "Northbound".to_string(),
        sku: "COAT001".to_string(),
        color: "Charcoal".to_string(),
        color_hex: "#36454F".to_string(),
        country_of_origin: "Portugal".to_string(),
        thumbnail_url: "https://cdn.example/coat.jpg".to_string(),
        blur_hash: Some("LEHV6nWB2yk8pyo0adR*.7kCMdnj".to_string()),
        price: Money::new(1000, 2),
        sale_percentage: None,
        category: Category::Coat,
        description: "A warm coat".to_string(),
        target_gender: Gender::Unisex,
        preorder: false,
        stock: vec![(Size::Xxs, 5), (Size::M, 3)],
        tags: vec!["winter".to_string()],
    }
}

pub fn scarf() -> NewProduct {
    NewProduct {
        name: "Old Scarf".to_string(),
        sku: "SCARF001".to_string(),
        category: Category::Scarf,
        price: Money::new(500, 2),
        stock: vec![(Size::Os, 10)],
        tags: vec![],
        ..coat()
    }
}

pub fn promo(code: &str, free_shipping: bool, discount: i64) -> NewPromoCode {
    let now = Utc::now();
    NewPromoCode {
        code: code.to_string(),
        free_shipping,
        discount: Percentage::try_from(discount).expect("valid percentage"),
        start: now - Duration::days(1),
        expiration: now + Duration::days(30),
        voucher: false,
    }
}

/// Seeds two products (one hidden), two carriers and the `FREESHIP` and `TENOFF` promo codes.
pub async fn seed_catalog(db: &SqliteDatabase) {
    let coat = db.insert_product(coat()).await.expect("Error inserting product");
    assert_eq!(coat.product.id, COAT_ID);
    let scarf = db.insert_product(scarf()).await.expect("Error inserting product");
    assert_eq!(scarf.product.id, HIDDEN_SCARF_ID);
    db.set_product_hidden(HIDDEN_SCARF_ID, true).await.expect("Error hiding product");
    let courier = NewShipmentCarrier {
        carrier: "Courier".to_string(),
        price: Money::new(1000, 2),
        tracking_url: "https://track.example/{code}".to_string(),
        description: "Door to door in 2 days".to_string(),
    };
    let pickup = NewShipmentCarrier {
        carrier: "Pickup".to_string(),
        price: Money::zero(),
        tracking_url: "{code}".to_string(),
        description: "Collect in store".to_string(),
    };
    assert_eq!(db.insert_carrier(courier).await.expect("Error inserting carrier").id, COURIER_ID);
    assert_eq!(db.insert_carrier(pickup).await.expect("Error inserting carrier").id, PICKUP_ID);
    db.insert_promo(promo("FREESHIP", true, 0)).await.expect("Error inserting promo");
    db.insert_promo(promo("TENOFF", false, 10)).await.expect("Error inserting promo");
}

pub fn address() -> NewAddress {
    NewAddress {
        country: "NL".to_string(),
        city: "Utrecht".to_string(),
        address_line_one: "Oudegracht 1".to_string(),
        address_line_two: None,
        postal_code: "3511 AA".to_string(),
        state: None,
    }
}

pub fn buyer(email: &str) -> NewBuyer {
    NewBuyer {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        phone: "+31 30 000 0000".to_string(),
        receive_promo_emails: false,
    }
}

pub fn order_request(items: Vec<CartItem>, carrier_id: i64, method: PaymentMethod) -> NewOrderRequest {
    NewOrderRequest {
        items,
        promo_code: None,
        carrier_id,
        buyer: buyer("ada@example.com"),
        billing: address(),
        shipping: address(),
        payment_method: method,
    }
}

/// A priced line of `quantity` coats in `size_id`, as the submission flow would freeze it.
pub fn coat_line(size_id: i64, quantity: i64) -> OrderItemSnapshot {
    let coat = coat();
    OrderItemSnapshot {
        product_id: COAT_ID,
        size_id,
        quantity,
        product_price: coat.price,
        sale_percentage: Percentage::zero(),
        price_with_sale: coat.price,
        product_name: coat.name,
        brand: coat.brand,
        sku: coat.sku,
        thumbnail: coat.thumbnail_url,
        blur_hash: coat.blur_hash,
        color: coat.color,
        category_id: Category::Coat.id(),
        target_gender: coat.target_gender,
        slug: "wool-coat".to_string(),
    }
}

/// An order ready for [`crate::traits::OrderManagement::insert_order`], bypassing the storefront's checks. Picked up
/// in store, so the total is the sum of the lines.
pub fn new_order(items: Vec<OrderItemSnapshot>, method: PaymentMethod, expired_at: DateTime<Utc>) -> NewOrder {
    let total = items.iter().map(OrderItemSnapshot::line_total).sum::<Money>();
    NewOrder {
        uuid: Uuid::new_v4().to_string(),
        placed: Utc::now(),
        total_price: total,
        promo_id: None,
        items,
        buyer: buyer("ada@example.com"),
        billing: address(),
        shipping: address(),
        carrier_id: PICKUP_ID,
        shipping_cost: Money::zero(),
        payment: NewPayment {
            method,
            transaction_amount: total,
            transaction_amount_payment_currency: Money::zero(),
            expired_at,
        },
    }
}
