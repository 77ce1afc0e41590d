use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    crypto_watcher::WatcherError,
    currency::CurrencyError,
    db_types::{OrderStatusType, PaymentMethod},
    order_state::InvalidStatusTransition,
    rate_limiter::RateLimitError,
    reservations::ReservationError,
    shop_api::order_objects::ValidatedCart,
    traits::{CardProcessorError, CatalogError, CustomerError, OrderStoreError},
};

/// The coarse classification every engine error falls into. Transports map these onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PreconditionFailed,
    ResourceExhausted,
    Conflict,
    Unauthenticated,
    PermissionDenied,
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::PreconditionFailed => "precondition failed",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ShopError {
    #[error("Invalid request: {0}")]
    InvalidArgument(String),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Product {product_id} is not available in size {size_id}")]
    ProductSizeNotFound { product_id: i64, size_id: i64 },
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
    #[error("Promo code {0} does not exist")]
    PromoNotFound(String),
    #[error("Shipment carrier {0} does not exist or is not allowed")]
    CarrierNotFound(i64),
    #[error("Support ticket {0} does not exist")]
    TicketNotFound(i64),
    #[error("Payment method {0} is not available")]
    PaymentMethodDisabled(PaymentMethod),
    #[error("The shop is not accepting orders right now")]
    SiteUnavailable,
    #[error("The cart has changed since it was validated")]
    CartChanged(Box<ValidatedCart>),
    #[error("Promo code {0} is not active")]
    PromoInactive(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidStatusTransition),
    #[error("Order has {requested} items. At most {max} are allowed per order")]
    TooManyItems { requested: i64, max: i64 },
    #[error("Currency {0} is not supported")]
    UnsupportedCurrency(String),
    #[error("{0}")]
    BelowCurrencyMinimum(String),
    #[error("Order {order} is paid with {expected}, not {requested}")]
    PaymentMethodMismatch { order: String, expected: PaymentMethod, requested: PaymentMethod },
    #[error("Order {order} is {status} and has no payment outstanding")]
    OrderNotPayable { order: String, status: OrderStatusType },
    #[error("The payment for order {0} has already been settled")]
    PaymentAlreadySettled(String),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error(transparent)]
    ReservationRejected(#[from] ReservationError),
    #[error("No receiving address is free for {0}. Try again later")]
    NoFreeAddress(PaymentMethod),
    #[error("A product with SKU {0} already exists")]
    SkuAlreadyExists(String),
    #[error("Promo code {0} already exists")]
    PromoAlreadyExists(String),
    #[error("Insufficient stock for product {product_id}, size {size_id}")]
    InsufficientStock { product_id: i64, size_id: i64 },
    #[error("Authentication required: {0}")]
    Unauthenticated(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("External service error: {0}")]
    CollaboratorError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    pub fn kind(&self) -> ErrorKind {
        use ShopError::*;
        match self {
            InvalidArgument(_) => ErrorKind::InvalidArgument,
            ProductNotFound(_) |
            ProductSizeNotFound { .. } |
            OrderNotFound(_) |
            PromoNotFound(_) |
            CarrierNotFound(_) |
            TicketNotFound(_) |
            PaymentMethodDisabled(_) => ErrorKind::NotFound,
            SiteUnavailable |
            CartChanged(_) |
            PromoInactive(_) |
            InvalidTransition(_) |
            TooManyItems { .. } |
            UnsupportedCurrency(_) |
            BelowCurrencyMinimum(_) |
            PaymentMethodMismatch { .. } |
            OrderNotPayable { .. } |
            PaymentAlreadySettled(_) => ErrorKind::PreconditionFailed,
            RateLimited(_) | NoFreeAddress(_) => ErrorKind::ResourceExhausted,
            ReservationRejected(e) => match e {
                ReservationError::QuantityNonPositive => ErrorKind::InvalidArgument,
                ReservationError::AlreadyCommitted(_) => ErrorKind::PreconditionFailed,
                _ => ErrorKind::ResourceExhausted,
            },
            SkuAlreadyExists(_) | PromoAlreadyExists(_) | InsufficientStock { .. } => ErrorKind::Conflict,
            Unauthenticated(_) => ErrorKind::Unauthenticated,
            PermissionDenied(_) => ErrorKind::PermissionDenied,
            DatabaseError(_) | CollaboratorError(_) | Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        ShopError::InvalidArgument(msg.into())
    }
}

impl From<CatalogError> for ShopError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::DatabaseError(s) => ShopError::DatabaseError(s),
            CatalogError::ProductNotFound(id) => ShopError::ProductNotFound(id),
            CatalogError::SkuAlreadyExists(sku) => ShopError::SkuAlreadyExists(sku),
            CatalogError::PromoNotFound(code) => ShopError::PromoNotFound(code),
            CatalogError::PromoAlreadyExists(code) => ShopError::PromoAlreadyExists(code),
            CatalogError::CarrierNotFound(id) => ShopError::CarrierNotFound(id),
            CatalogError::NegativeStock => ShopError::invalid("Stock quantities cannot be negative"),
            CatalogError::CorruptSetting(s) => ShopError::Internal(format!("Corrupt setting: {s}")),
        }
    }
}

impl From<OrderStoreError> for ShopError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::DatabaseError(s) => ShopError::DatabaseError(s),
            OrderStoreError::OrderNotFound(id) => ShopError::OrderNotFound(id.to_string()),
            OrderStoreError::PaymentNotFound(id) => ShopError::Internal(format!("Order {id} has no payment record")),
            OrderStoreError::UnknownProductSize { product_id, size_id } => {
                ShopError::ProductSizeNotFound { product_id, size_id }
            },
            OrderStoreError::InsufficientStock { product_id, size_id } => {
                ShopError::InsufficientStock { product_id, size_id }
            },
            OrderStoreError::PaymentAlreadySettled(id) => ShopError::PaymentAlreadySettled(id.to_string()),
            OrderStoreError::InvalidTransition(t) => ShopError::InvalidTransition(t),
        }
    }
}

impl From<CustomerError> for ShopError {
    fn from(e: CustomerError) -> Self {
        match e {
            CustomerError::DatabaseError(s) => ShopError::DatabaseError(s),
            CustomerError::TicketNotFound(id) => ShopError::TicketNotFound(id),
        }
    }
}

impl From<CurrencyError> for ShopError {
    fn from(e: CurrencyError) -> Self {
        match e {
            CurrencyError::UnknownCurrency(code) => ShopError::UnsupportedCurrency(code),
            e @ CurrencyError::BelowCurrencyMinimum { .. } => ShopError::BelowCurrencyMinimum(e.to_string()),
            CurrencyError::AmountOverflow(s) => ShopError::invalid(format!("Amount out of range: {s}")),
            CurrencyError::RefreshFailed(s) => ShopError::CollaboratorError(s),
        }
    }
}

impl From<CardProcessorError> for ShopError {
    fn from(e: CardProcessorError) -> Self {
        ShopError::CollaboratorError(e.to_string())
    }
}

impl From<WatcherError> for ShopError {
    fn from(e: WatcherError) -> Self {
        match e {
            WatcherError::NoFreeAddress(method) => ShopError::NoFreeAddress(method),
            WatcherError::OrderNotFound(id) => ShopError::OrderNotFound(id.to_string()),
            WatcherError::WrongPaymentMethod { order_id, order_method, watcher_method } => {
                ShopError::PaymentMethodMismatch {
                    order: order_id.to_string(),
                    expected: order_method,
                    requested: watcher_method,
                }
            },
            WatcherError::NotAwaitingPayment { order_id, status } => {
                ShopError::OrderNotPayable { order: order_id.to_string(), status }
            },
            WatcherError::Currency(e) => e.into(),
            WatcherError::Store(e) => e.into(),
        }
    }
}
