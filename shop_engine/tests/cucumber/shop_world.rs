use std::fmt::Debug;

use cucumber::World;
use shop_engine::{
    order_objects::{ClientContext, SubmittedOrder, ValidatedCart},
    test_utils::test_shop::TestShop,
    ShopError,
};

#[derive(Default, World)]
pub struct ShopWorld {
    pub shop: Option<TestShop>,
    pub cart: Option<ValidatedCart>,
    pub order: Option<SubmittedOrder>,
    pub error: Option<ShopError>,
}

impl Debug for ShopWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopWorld")
            .field("shop", &self.shop.as_ref().map(|s| s.db.url().to_string()))
            .field("cart", &self.cart)
            .field("order", &self.order)
            .field("error", &self.error)
            .finish()
    }
}

impl ShopWorld {
    pub fn shop(&self) -> &TestShop {
        self.shop.as_ref().expect("The shop has not been started")
    }

    pub fn cart(&self) -> &ValidatedCart {
        self.cart.as_ref().expect("No cart has been validated")
    }

    pub fn order(&self) -> &SubmittedOrder {
        self.order.as_ref().expect("No order has been submitted")
    }

    pub fn order_uuid(&self) -> String {
        self.order().order_uuid.clone()
    }

    pub fn context(session: &str) -> ClientContext {
        ClientContext::new(format!("10.0.0.{}", session.len()), session)
    }
}
