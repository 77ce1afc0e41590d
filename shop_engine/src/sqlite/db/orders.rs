use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        Address,
        Buyer,
        Money,
        NewAddress,
        NewBuyer,
        Order,
        OrderItem,
        OrderItemSnapshot,
        OrderStatusType,
        Shipment,
    },
    shop_api::order_objects::OrderQueryFilter,
    traits::OrderStoreError,
};

/// Inserts the bare order row. The child rows are written separately; embed all of these calls in one transaction.
pub async fn insert_order(
    uuid: &str,
    placed: DateTime<Utc>,
    total_price: Money,
    promo_id: Option<i64>,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (uuid, placed, modified, total_price, status, promo_id)
            VALUES ($1, $2, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(uuid)
    .bind(placed)
    .bind(total_price)
    .bind(status)
    .bind(promo_id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted with id {}", order.uuid, order.id);
    Ok(order)
}

pub async fn insert_address(
    order_id: i64,
    address: NewAddress,
    conn: &mut SqliteConnection,
) -> Result<Address, sqlx::Error> {
    let address = sqlx::query_as(
        r#"
            INSERT INTO addresses (order_id, country, city, address_line_one, address_line_two, postal_code, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(address.country)
    .bind(address.city)
    .bind(address.address_line_one)
    .bind(address.address_line_two)
    .bind(address.postal_code)
    .bind(address.state)
    .fetch_one(conn)
    .await?;
    Ok(address)
}

pub async fn insert_buyer(
    order_id: i64,
    buyer: NewBuyer,
    billing_address_id: i64,
    shipping_address_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Buyer, sqlx::Error> {
    let buyer = sqlx::query_as(
        r#"
            INSERT INTO buyers (
                order_id,
                first_name,
                last_name,
                email,
                phone,
                receive_promo_emails,
                billing_address_id,
                shipping_address_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(buyer.first_name)
    .bind(buyer.last_name)
    .bind(buyer.email)
    .bind(buyer.phone)
    .bind(buyer.receive_promo_emails)
    .bind(billing_address_id)
    .bind(shipping_address_id)
    .fetch_one(conn)
    .await?;
    Ok(buyer)
}

pub async fn insert_shipment(
    order_id: i64,
    carrier_id: i64,
    cost: Money,
    conn: &mut SqliteConnection,
) -> Result<Shipment, sqlx::Error> {
    let shipment =
        sqlx::query_as("INSERT INTO shipments (order_id, carrier_id, cost) VALUES ($1, $2, $3) RETURNING *")
            .bind(order_id)
            .bind(carrier_id)
            .bind(cost)
            .fetch_one(conn)
            .await?;
    Ok(shipment)
}

/// Writes a frozen copy of the cart line. Later catalog edits do not touch it.
pub async fn insert_item(
    order_id: i64,
    item: &OrderItemSnapshot,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id,
                product_id,
                size_id,
                quantity,
                product_price,
                sale_percentage,
                price_with_sale,
                product_name,
                brand,
                sku,
                thumbnail,
                blur_hash,
                color,
                category_id,
                target_gender,
                slug
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.size_id)
    .bind(item.quantity)
    .bind(item.product_price)
    .bind(item.sale_percentage)
    .bind(item.price_with_sale)
    .bind(&item.product_name)
    .bind(&item.brand)
    .bind(&item.sku)
    .bind(&item.thumbnail)
    .bind(&item.blur_hash)
    .bind(&item.color)
    .bind(item.category_id)
    .bind(item.target_gender)
    .bind(&item.slug)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_uuid(uuid: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE uuid = $1").bind(uuid).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn fetch_buyer(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Buyer>, sqlx::Error> {
    let buyer = sqlx::query_as("SELECT * FROM buyers WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(buyer)
}

pub async fn fetch_address(id: i64, conn: &mut SqliteConnection) -> Result<Option<Address>, sqlx::Error> {
    let address = sqlx::query_as("SELECT * FROM addresses WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(address)
}

pub async fn fetch_shipment(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Shipment>, sqlx::Error> {
    let shipment =
        sqlx::query_as("SELECT * FROM shipments WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(shipment)
}

pub(crate) async fn update_order_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderStoreError> {
    let result: Option<Order> = sqlx::query_as("UPDATE orders SET status = $1, modified = $2 WHERE id = $3 RETURNING *")
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(conn)
        .await?;
    result.ok_or(OrderStoreError::OrderNotFound(id))
}

/// Records the tracking code and stamps the shipping date.
pub(crate) async fn set_tracking_code(
    order_id: i64,
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<Shipment, OrderStoreError> {
    let result: Option<Shipment> =
        sqlx::query_as("UPDATE shipments SET tracking_code = $1, shipping_date = $2 WHERE order_id = $3 RETURNING *")
            .bind(code)
            .bind(Utc::now())
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(OrderStoreError::OrderNotFound(order_id))
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by id, in the direction the filter asks for.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT orders.* FROM orders
    LEFT JOIN buyers ON buyers.order_id = orders.id
    LEFT JOIN payments ON payments.order_id = orders.id
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(status) = query.status {
        where_clause.push("orders.status = ");
        where_clause.push_bind_unseparated(status);
    }
    if let Some(method) = query.payment_method {
        where_clause.push("payments.payment_method = ");
        where_clause.push_bind_unseparated(method);
    }
    if let Some(email) = query.email {
        where_clause.push("buyers.email = ");
        where_clause.push_bind_unseparated(email);
    }
    if let Some(order_id) = query.order_id {
        where_clause.push("orders.id = ");
        where_clause.push_bind_unseparated(order_id);
    }
    builder.push(format!(" ORDER BY orders.id {} LIMIT ", query.order.as_sql()));
    builder.push_bind(query.limit);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset);

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}
