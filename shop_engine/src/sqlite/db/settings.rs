use log::debug;
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::{
    db_types::{PaymentMethod, PaymentMethodSetting, ShopSettings},
    traits::CatalogError,
};

const SITE_AVAILABLE: &str = "site_available";
const MAX_ORDER_ITEMS: &str = "max_order_items";
const HERO: &str = "hero";

pub async fn fetch_setting(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1").bind(key).fetch_optional(conn).await?;
    Ok(value)
}

pub async fn put_setting(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    debug!("🗃️ Setting {key} updated");
    Ok(())
}

pub async fn fetch_payment_methods(conn: &mut SqliteConnection) -> Result<Vec<PaymentMethodSetting>, sqlx::Error> {
    let methods = sqlx::query_as("SELECT method, allowed FROM payment_methods ORDER BY method").fetch_all(conn).await?;
    Ok(methods)
}

/// Reads every site-wide switch. A missing row falls back to the shipped default.
pub async fn fetch_settings(conn: &mut SqliteConnection) -> Result<ShopSettings, CatalogError> {
    let site_available = match fetch_setting(SITE_AVAILABLE, conn).await? {
        Some(v) => v.parse::<bool>().map_err(|_| CatalogError::CorruptSetting(SITE_AVAILABLE.into()))?,
        None => true,
    };
    let max_order_items = match fetch_setting(MAX_ORDER_ITEMS, conn).await? {
        Some(v) => v.parse::<i64>().map_err(|_| CatalogError::CorruptSetting(MAX_ORDER_ITEMS.into()))?,
        None => 20,
    };
    let payment_methods = fetch_payment_methods(conn).await?;
    Ok(ShopSettings { site_available, max_order_items, payment_methods })
}

pub async fn set_site_available(available: bool, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    put_setting(SITE_AVAILABLE, &available.to_string(), conn).await
}

pub async fn set_max_order_items(max: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    put_setting(MAX_ORDER_ITEMS, &max.to_string(), conn).await
}

pub async fn set_payment_method_allowed(
    method: PaymentMethod,
    allowed: bool,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO payment_methods (method, allowed) VALUES ($1, $2)
            ON CONFLICT (method) DO UPDATE SET allowed = excluded.allowed
        "#,
    )
    .bind(method)
    .bind(allowed)
    .execute(conn)
    .await?;
    debug!("🗃️ Payment method {method} allowed: {allowed}");
    Ok(())
}

pub async fn fetch_hero(conn: &mut SqliteConnection) -> Result<Option<Value>, CatalogError> {
    match fetch_setting(HERO, conn).await? {
        Some(s) => serde_json::from_str(&s).map(Some).map_err(|_| CatalogError::CorruptSetting(HERO.into())),
        None => Ok(None),
    }
}

pub async fn set_hero(hero: &Value, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    put_setting(HERO, &hero.to_string(), conn).await
}
