use std::future::Future;

use thiserror::Error;

use crate::{
    db_types::{
        Archive,
        CarrierPrice,
        Money,
        NewArchive,
        NewProduct,
        NewPromoCode,
        NewShipmentCarrier,
        Product,
        ProductSize,
        PromoCode,
        ShipmentCarrier,
    },
    shop_api::catalog_objects::ProductQuery,
    traits::{ProductDetails, ProductPage},
};

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("A product with SKU {0} already exists")]
    SkuAlreadyExists(String),
    #[error("Promo code {0} does not exist")]
    PromoNotFound(String),
    #[error("Promo code {0} already exists")]
    PromoAlreadyExists(String),
    #[error("Shipment carrier {0} does not exist")]
    CarrierNotFound(i64),
    #[error("Stock quantities cannot be negative")]
    NegativeStock,
    #[error("Stored setting {0} is corrupt")]
    CorruptSetting(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::DatabaseError(e.to_string())
    }
}

/// Products, stock rows, promo codes, shipment carriers and archives.
pub trait CatalogManagement: Clone + Send + Sync + 'static {
    /// Fetches a product by id, including hidden products.
    fn fetch_product(&self, id: i64) -> impl Future<Output = Result<Option<Product>, CatalogError>> + Send;

    /// Fetches a product with its sizes, measurements and tags.
    fn fetch_product_details(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<ProductDetails>, CatalogError>> + Send;

    /// Returns the page of products matching `query`, together with the total number of matches.
    fn fetch_products_paged(
        &self,
        query: &ProductQuery,
    ) -> impl Future<Output = Result<ProductPage, CatalogError>> + Send;

    /// Fetches the stock row for `(product_id, size_id)`.
    fn fetch_product_size(
        &self,
        product_id: i64,
        size_id: i64,
    ) -> impl Future<Output = Result<Option<ProductSize>, CatalogError>> + Send;

    /// Inserts a product with its stock rows and tags in one transaction. Fails with
    /// [`CatalogError::SkuAlreadyExists`] if the SKU is taken.
    fn insert_product(&self, product: NewProduct) -> impl Future<Output = Result<ProductDetails, CatalogError>> + Send;

    /// Sets the absolute stock level for `(product_id, size_id)`, creating the row if needed.
    fn set_stock(
        &self,
        product_id: i64,
        size_id: i64,
        quantity: i64,
    ) -> impl Future<Output = Result<ProductSize, CatalogError>> + Send;

    fn set_product_hidden(
        &self,
        product_id: i64,
        hidden: bool,
    ) -> impl Future<Output = Result<Product, CatalogError>> + Send;

    fn fetch_promo_by_code(&self, code: &str) -> impl Future<Output = Result<Option<PromoCode>, CatalogError>> + Send;

    /// Fails with [`CatalogError::PromoAlreadyExists`] if the code is taken.
    fn insert_promo(&self, promo: NewPromoCode) -> impl Future<Output = Result<PromoCode, CatalogError>> + Send;

    fn set_promo_allowed(
        &self,
        code: &str,
        allowed: bool,
    ) -> impl Future<Output = Result<PromoCode, CatalogError>> + Send;

    /// Deletes the promo code. Returns false if it did not exist.
    fn delete_promo(&self, code: &str) -> impl Future<Output = Result<bool, CatalogError>> + Send;

    fn list_promos(&self) -> impl Future<Output = Result<Vec<PromoCode>, CatalogError>> + Send;

    fn fetch_carrier(&self, id: i64) -> impl Future<Output = Result<Option<ShipmentCarrier>, CatalogError>> + Send;

    fn list_carriers(&self) -> impl Future<Output = Result<Vec<ShipmentCarrier>, CatalogError>> + Send;

    fn insert_carrier(
        &self,
        carrier: NewShipmentCarrier,
    ) -> impl Future<Output = Result<ShipmentCarrier, CatalogError>> + Send;

    /// Display prices in currencies other than the base currency.
    fn fetch_carrier_prices(&self, id: i64) -> impl Future<Output = Result<Vec<CarrierPrice>, CatalogError>> + Send;

    fn set_carrier_allowed(
        &self,
        id: i64,
        allowed: bool,
    ) -> impl Future<Output = Result<ShipmentCarrier, CatalogError>> + Send;

    /// Sets the carrier's price in the base currency.
    fn set_carrier_base_price(
        &self,
        id: i64,
        price: Money,
    ) -> impl Future<Output = Result<ShipmentCarrier, CatalogError>> + Send;

    /// Sets the carrier's display price in another currency.
    fn set_carrier_price(
        &self,
        id: i64,
        currency: &str,
        price: Money,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;

    fn insert_archive(&self, archive: NewArchive) -> impl Future<Output = Result<Archive, CatalogError>> + Send;

    fn fetch_archives_paged(
        &self,
        limit: i64,
        offset: i64,
        newest_first: bool,
    ) -> impl Future<Output = Result<Vec<Archive>, CatalogError>> + Send;
}
