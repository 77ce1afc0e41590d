//! Row types and closed enumerations persisted by the shop engine.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use shop_common::{Measure, Money, Percentage};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Generates `Display` and `FromStr` for a unit-only enum from a list of `Variant => "wire_name"` pairs.
macro_rules! wire_names {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ConversionError::new($kind, other)),
                }
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Created manually by an admin. The checkout flow never produces this status.
    Placed,
    /// The initial status for checkout orders. Stock has been decremented and a payment invoice issued.
    AwaitingPayment,
    /// Payment has settled.
    Confirmed,
    /// A tracking number has been assigned.
    Shipped,
    Delivered,
    /// The order was cancelled by an admin or its invoice expired. Stock has been returned.
    Cancelled,
    /// The order was refunded after payment. Stock has been returned.
    Refunded,
}

wire_names!(OrderStatusType, "order status", {
    Placed => "placed",
    AwaitingPayment => "awaiting_payment",
    Confirmed => "confirmed",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    CardTest,
    Eth,
    EthTest,
    UsdtTron,
    UsdtTronTest,
}

wire_names!(PaymentMethod, "payment method", {
    Card => "card",
    CardTest => "card_test",
    Eth => "eth",
    EthTest => "eth_test",
    UsdtTron => "usdt_tron",
    UsdtTronTest => "usdt_tron_test",
});

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Card,
        PaymentMethod::CardTest,
        PaymentMethod::Eth,
        PaymentMethod::EthTest,
        PaymentMethod::UsdtTron,
        PaymentMethod::UsdtTronTest,
    ];

    pub fn is_card(&self) -> bool {
        matches!(self, Self::Card | Self::CardTest)
    }

    pub fn is_crypto(&self) -> bool {
        !self.is_card()
    }

    /// Test methods settle against test networks and sandbox processors.
    pub fn is_test(&self) -> bool {
        matches!(self, Self::CardTest | Self::EthTest | Self::UsdtTronTest)
    }
}

//--------------------------------------        Gender         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Unisex,
}

wire_names!(Gender, "gender", { Male => "male", Female => "female", Unisex => "unisex" });

//--------------------------------------  Ticket status/priority  ------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Submitted,
    InProgress,
    WaitingCustomer,
    Resolved,
    Closed,
}

wire_names!(TicketStatus, "ticket status", {
    Submitted => "submitted",
    InProgress => "in_progress",
    WaitingCustomer => "waiting_customer",
    Resolved => "resolved",
    Closed => "closed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

wire_names!(TicketPriority, "ticket priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

//--------------------------------------  Dictionary enums     ---------------------------------------------------------
/// Generates a closed dictionary enum whose variants are stored by integer id (starting at 1).
macro_rules! dictionary {
    ($ty:ident, $kind:literal, { $($variant:ident = $id:literal => $name:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $ty {
            $($variant,)+
        }

        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant,)+];

            pub fn id(&self) -> i64 {
                match self {
                    $(Self::$variant => $id,)+
                }
            }

            pub fn from_id(id: i64) -> Result<Self, ConversionError> {
                match id {
                    $($id => Ok(Self::$variant),)+
                    other => Err(ConversionError::new($kind, &other.to_string())),
                }
            }
        }

        wire_names!($ty, $kind, { $($variant => $name),+ });
    };
}

dictionary!(Size, "size", {
    Xxs = 1 => "xxs",
    Xs = 2 => "xs",
    S = 3 => "s",
    M = 4 => "m",
    L = 5 => "l",
    Xl = 6 => "xl",
    Xxl = 7 => "xxl",
    Os = 8 => "os",
});

dictionary!(Category, "category", {
    TShirt = 1 => "t-shirt",
    Jeans = 2 => "jeans",
    Dress = 3 => "dress",
    Jacket = 4 => "jacket",
    Sweater = 5 => "sweater",
    Pant = 6 => "pant",
    Skirt = 7 => "skirt",
    Short = 8 => "short",
    Blazer = 9 => "blazer",
    Coat = 10 => "coat",
    Socks = 11 => "socks",
    Underwear = 12 => "underwear",
    Bra = 13 => "bra",
    Hat = 14 => "hat",
    Scarf = 15 => "scarf",
    Gloves = 16 => "gloves",
    Shoes = 17 => "shoes",
    Belt = 18 => "belt",
    Other = 19 => "other",
});

dictionary!(MeasurementName, "measurement name", {
    Waist = 1 => "waist",
    Inseam = 2 => "inseam",
    Length = 3 => "length",
    Rise = 4 => "rise",
    Hips = 5 => "hips",
    Shoulders = 6 => "shoulders",
    Bust = 7 => "bust",
    Sleeve = 8 => "sleeve",
    Width = 9 => "width",
    Height = 10 => "height",
});

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub brand: String,
    pub sku: String,
    pub color: String,
    pub color_hex: String,
    pub country_of_origin: String,
    pub thumbnail_url: String,
    pub blur_hash: Option<String>,
    /// Price in the shop's base currency
    pub price: Money,
    pub sale_percentage: Option<Percentage>,
    pub category_id: i64,
    pub description: String,
    pub hidden: bool,
    pub target_gender: Gender,
    pub preorder: bool,
}

impl Product {
    pub fn sale(&self) -> Percentage {
        self.sale_percentage.unwrap_or_else(Percentage::zero)
    }

    /// A URL-friendly identifier built from brand, name and id.
    pub fn slug(&self) -> String {
        let raw = format!("{} {} {}", self.brand, self.name, self.id);
        let mut slug = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') && !slug.is_empty() {
                slug.push('-');
            }
        }
        slug.trim_end_matches('-').to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub sku: String,
    pub color: String,
    pub color_hex: String,
    pub country_of_origin: String,
    pub thumbnail_url: String,
    pub blur_hash: Option<String>,
    pub price: Money,
    pub sale_percentage: Option<Percentage>,
    pub category: Category,
    pub description: String,
    pub target_gender: Gender,
    pub preorder: bool,
    /// `(size, quantity)` pairs
    pub stock: Vec<(Size, i64)>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProductSize {
    pub id: i64,
    pub product_id: i64,
    pub size_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductMeasurement {
    pub id: i64,
    pub product_id: i64,
    pub product_size_id: i64,
    pub measurement_name_id: i64,
    pub measurement_value: Measure,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductTag {
    pub id: i64,
    pub product_id: i64,
    pub tag: String,
}

//--------------------------------------       PromoCode       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: i64,
    pub code: String,
    pub free_shipping: bool,
    pub discount: Percentage,
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub voucher: bool,
    pub allowed: bool,
}

impl PromoCode {
    /// A promo is active when it is allowed and `now` falls in `[start, expiration)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.allowed && self.start <= now && now < self.expiration
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromoCode {
    pub code: String,
    pub free_shipping: bool,
    pub discount: Percentage,
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub voucher: bool,
}

//--------------------------------------   ShipmentCarrier     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShipmentCarrier {
    pub id: i64,
    pub carrier: String,
    /// Price in the shop's base currency
    pub price: Money,
    /// Template for the parcel tracking page. `{code}` is replaced with the tracking code.
    pub tracking_url: String,
    pub description: String,
    pub allowed: bool,
}

impl ShipmentCarrier {
    pub fn tracking_url_for(&self, code: &str) -> String {
        self.tracking_url.replace("{code}", code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipmentCarrier {
    pub carrier: String,
    pub price: Money,
    pub tracking_url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CarrierPrice {
    pub carrier_id: i64,
    pub currency: String,
    pub price: Money,
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub uuid: String,
    pub placed: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub total_price: Money,
    pub status: OrderStatusType,
    pub promo_id: Option<i64>,
}

/// A cart line frozen at order time. These fields are copied into `order_items` so that later catalog edits do not
/// change historical orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemSnapshot {
    pub product_id: i64,
    pub size_id: i64,
    pub quantity: i64,
    pub product_price: Money,
    pub sale_percentage: Percentage,
    pub price_with_sale: Money,
    pub product_name: String,
    pub brand: String,
    pub sku: String,
    pub thumbnail: String,
    pub blur_hash: Option<String>,
    pub color: String,
    pub category_id: i64,
    pub target_gender: Gender,
    pub slug: String,
}

impl OrderItemSnapshot {
    pub fn line_total(&self) -> Money {
        self.price_with_sale * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub size_id: i64,
    pub quantity: i64,
    pub product_price: Money,
    pub sale_percentage: Percentage,
    pub price_with_sale: Money,
    pub product_name: String,
    pub brand: String,
    pub sku: String,
    pub thumbnail: String,
    pub blur_hash: Option<String>,
    pub color: String,
    pub category_id: i64,
    pub target_gender: Gender,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Buyer {
    pub id: i64,
    pub order_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub receive_promo_emails: bool,
    pub billing_address_id: i64,
    pub shipping_address_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBuyer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub receive_promo_emails: bool,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub order_id: i64,
    pub country: String,
    pub city: String,
    pub address_line_one: String,
    pub address_line_two: Option<String>,
    pub postal_code: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub country: String,
    pub city: String,
    pub address_line_one: String,
    pub address_line_two: Option<String>,
    pub postal_code: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    pub order_id: i64,
    pub carrier_id: i64,
    pub cost: Money,
    pub tracking_code: Option<String>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub estimated_arrival_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub payment_method: PaymentMethod,
    /// Card: the processor's intent id. Crypto: the settling transaction hash.
    pub transaction_id: Option<String>,
    /// Amount due in the base currency
    pub transaction_amount: Money,
    /// Amount due in the payment currency. For crypto methods this is the exact on-chain integer amount.
    pub transaction_amount_payment_currency: Money,
    pub payer: Option<String>,
    pub payee: Option<String>,
    pub client_secret: Option<String>,
    pub is_transaction_done: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_transaction_done && self.expired_at.map(|t| t <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub method: PaymentMethod,
    pub transaction_amount: Money,
    pub transaction_amount_payment_currency: Money,
    pub expired_at: DateTime<Utc>,
}

/// Everything the submission transaction writes for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub uuid: String,
    pub placed: DateTime<Utc>,
    pub total_price: Money,
    pub promo_id: Option<i64>,
    pub items: Vec<OrderItemSnapshot>,
    pub buyer: NewBuyer,
    pub billing: NewAddress,
    pub shipping: NewAddress,
    pub carrier_id: i64,
    pub shipping_cost: Money,
    pub payment: NewPayment,
}

//--------------------------------------      Subscriber       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub receive_promo_emails: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     SupportTicket     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: i64,
    pub case_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category: String,
    pub topic: String,
    pub subject: String,
    pub civility: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub order_reference: Option<String>,
    pub notes: String,
    pub internal_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSupportTicket {
    pub priority: TicketPriority,
    pub category: String,
    pub topic: String,
    pub subject: String,
    pub civility: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub order_reference: Option<String>,
    pub notes: String,
}

//--------------------------------------        Archive        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Archive {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub tag: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArchive {
    pub title: String,
    pub description: String,
    pub tag: String,
}

//--------------------------------------       Settings        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PaymentMethodSetting {
    pub method: PaymentMethod,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopSettings {
    pub site_available: bool,
    pub max_order_items: i64,
    pub payment_methods: Vec<PaymentMethodSetting>,
}

impl ShopSettings {
    pub fn is_method_allowed(&self, method: PaymentMethod) -> bool {
        self.payment_methods.iter().any(|m| m.method == method && m.allowed)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for method in PaymentMethod::ALL {
            assert_eq!(method.to_string().parse::<PaymentMethod>().unwrap(), method);
        }
        assert_eq!("awaiting_payment".parse::<OrderStatusType>().unwrap(), OrderStatusType::AwaitingPayment);
        assert!("paid".parse::<OrderStatusType>().is_err());
        assert_eq!(Category::TShirt.to_string(), "t-shirt");
        assert_eq!(Size::from_id(8).unwrap(), Size::Os);
        assert!(Size::from_id(9).is_err());
        assert_eq!(MeasurementName::ALL.len(), 10);
        assert_eq!(Category::ALL.len(), 19);
    }

    #[test]
    fn payment_method_classes() {
        assert!(PaymentMethod::CardTest.is_card());
        assert!(PaymentMethod::UsdtTron.is_crypto());
        assert!(PaymentMethod::EthTest.is_test());
        assert!(!PaymentMethod::Eth.is_test());
    }

    #[test]
    fn promo_activity_window() {
        let now = Utc::now();
        let promo = PromoCode {
            id: 1,
            code: "FREESHIP".into(),
            free_shipping: true,
            discount: Percentage::zero(),
            start: now - Duration::days(1),
            expiration: now + Duration::days(1),
            voucher: false,
            allowed: true,
        };
        assert!(promo.is_active(now));
        assert!(promo.is_active(promo.start));
        assert!(!promo.is_active(promo.expiration));
        let disabled = PromoCode { allowed: false, ..promo };
        assert!(!disabled.is_active(now));
    }

    #[test]
    fn product_slug() {
        let now = Utc::now();
        let p = Product {
            id: 42,
            created_at: now,
            updated_at: now,
            name: "Heavy Wool  Coat".into(),
            brand: "Nord & Co".into(),
            sku: "NC42".into(),
            color: "black".into(),
            color_hex: "#000000".into(),
            country_of_origin: "IT".into(),
            thumbnail_url: String::new(),
            blur_hash: None,
            price: Money::from(100),
            sale_percentage: None,
            category_id: Category::Coat.id(),
            description: String::new(),
            hidden: false,
            target_gender: Gender::Unisex,
            preorder: false,
        };
        assert_eq!(p.slug(), "nord-co-heavy-wool-coat-42");
        assert!(p.sale().is_zero());
    }
}
