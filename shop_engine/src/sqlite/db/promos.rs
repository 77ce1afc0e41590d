use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPromoCode, PromoCode},
    traits::CatalogError,
};

pub async fn fetch_promo_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<PromoCode>, sqlx::Error> {
    let promo = sqlx::query_as("SELECT * FROM promo_codes WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(promo)
}

pub async fn fetch_promo(id: i64, conn: &mut SqliteConnection) -> Result<Option<PromoCode>, sqlx::Error> {
    let promo = sqlx::query_as("SELECT * FROM promo_codes WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(promo)
}

pub async fn insert_promo(promo: NewPromoCode, conn: &mut SqliteConnection) -> Result<PromoCode, CatalogError> {
    if fetch_promo_by_code(&promo.code, conn).await?.is_some() {
        return Err(CatalogError::PromoAlreadyExists(promo.code));
    }
    let row: PromoCode = sqlx::query_as(
        r#"
            INSERT INTO promo_codes (code, free_shipping, discount, start, expiration, voucher)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(promo.code)
    .bind(promo.free_shipping)
    .bind(promo.discount)
    .bind(promo.start)
    .bind(promo.expiration)
    .bind(promo.voucher)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Promo code {} created", row.code);
    Ok(row)
}

pub async fn set_promo_allowed(
    code: &str,
    allowed: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<PromoCode>, sqlx::Error> {
    let promo = sqlx::query_as("UPDATE promo_codes SET allowed = $1 WHERE code = $2 RETURNING *")
        .bind(allowed)
        .bind(code)
        .fetch_optional(conn)
        .await?;
    Ok(promo)
}

/// Orders that used the promo keep their history; their `promo_id` is cleared by the foreign key.
pub async fn delete_promo(code: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM promo_codes WHERE code = $1").bind(code).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_promos(conn: &mut SqliteConnection) -> Result<Vec<PromoCode>, sqlx::Error> {
    let promos = sqlx::query_as("SELECT * FROM promo_codes ORDER BY id").fetch_all(conn).await?;
    Ok(promos)
}
