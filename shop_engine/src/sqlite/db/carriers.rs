use sqlx::SqliteConnection;

use crate::db_types::{CarrierPrice, Money, NewShipmentCarrier, ShipmentCarrier};

pub async fn fetch_carrier(id: i64, conn: &mut SqliteConnection) -> Result<Option<ShipmentCarrier>, sqlx::Error> {
    let carrier =
        sqlx::query_as("SELECT * FROM shipment_carriers WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(carrier)
}

pub async fn list_carriers(conn: &mut SqliteConnection) -> Result<Vec<ShipmentCarrier>, sqlx::Error> {
    let carriers = sqlx::query_as("SELECT * FROM shipment_carriers ORDER BY id").fetch_all(conn).await?;
    Ok(carriers)
}

pub async fn insert_carrier(
    carrier: NewShipmentCarrier,
    conn: &mut SqliteConnection,
) -> Result<ShipmentCarrier, sqlx::Error> {
    let carrier = sqlx::query_as(
        r#"
            INSERT INTO shipment_carriers (carrier, price, tracking_url, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(carrier.carrier)
    .bind(carrier.price)
    .bind(carrier.tracking_url)
    .bind(carrier.description)
    .fetch_one(conn)
    .await?;
    Ok(carrier)
}

pub async fn set_allowed(
    id: i64,
    allowed: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<ShipmentCarrier>, sqlx::Error> {
    let carrier = sqlx::query_as("UPDATE shipment_carriers SET allowed = $1 WHERE id = $2 RETURNING *")
        .bind(allowed)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(carrier)
}

pub async fn set_base_price(
    id: i64,
    price: Money,
    conn: &mut SqliteConnection,
) -> Result<Option<ShipmentCarrier>, sqlx::Error> {
    let carrier = sqlx::query_as("UPDATE shipment_carriers SET price = $1 WHERE id = $2 RETURNING *")
        .bind(price)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(carrier)
}

pub async fn upsert_price(
    carrier_id: i64,
    currency: &str,
    price: Money,
    conn: &mut SqliteConnection,
) -> Result<CarrierPrice, sqlx::Error> {
    let price = sqlx::query_as(
        r#"
            INSERT INTO carrier_prices (carrier_id, currency, price) VALUES ($1, $2, $3)
            ON CONFLICT (carrier_id, currency) DO UPDATE SET price = excluded.price
            RETURNING *;
        "#,
    )
    .bind(carrier_id)
    .bind(currency.to_uppercase())
    .bind(price)
    .fetch_one(conn)
    .await?;
    Ok(price)
}

pub async fn fetch_prices(carrier_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CarrierPrice>, sqlx::Error> {
    let prices = sqlx::query_as("SELECT * FROM carrier_prices WHERE carrier_id = $1 ORDER BY currency")
        .bind(carrier_id)
        .fetch_all(conn)
        .await?;
    Ok(prices)
}
