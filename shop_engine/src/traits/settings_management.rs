use std::future::Future;

use serde_json::Value;

use crate::{
    db_types::{PaymentMethod, ShopSettings},
    traits::CatalogError,
};

/// Site-wide settings. These share [`CatalogError`] since they live alongside the catalog.
pub trait SettingsManagement: Clone + Send + Sync + 'static {
    fn fetch_settings(&self) -> impl Future<Output = Result<ShopSettings, CatalogError>> + Send;

    fn set_site_available(&self, available: bool) -> impl Future<Output = Result<(), CatalogError>> + Send;

    fn set_max_order_items(&self, max: i64) -> impl Future<Output = Result<(), CatalogError>> + Send;

    fn set_payment_method_allowed(
        &self,
        method: PaymentMethod,
        allowed: bool,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// The storefront hero document. Its shape belongs to the storefront, so it is stored as opaque JSON.
    fn fetch_hero(&self) -> impl Future<Output = Result<Option<Value>, CatalogError>> + Send;

    fn set_hero(&self, hero: Value) -> impl Future<Output = Result<(), CatalogError>> + Send;
}
