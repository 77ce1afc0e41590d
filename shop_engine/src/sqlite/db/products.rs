use chrono::Utc;
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewProduct, Product, ProductSize, ProductTag},
    shop_api::catalog_objects::ProductQuery,
    traits::{CatalogError, OrderStoreError, ProductDetails, ProductPage},
};

pub async fn fetch_product(id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn fetch_product_by_sku(sku: &str, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE sku = $1").bind(sku).fetch_optional(conn).await?;
    Ok(product)
}

/// Fetches the product together with its stock rows, measurements and tags.
pub async fn fetch_product_details(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductDetails>, sqlx::Error> {
    let Some(product) = fetch_product(id, conn).await? else {
        return Ok(None);
    };
    let sizes = fetch_product_sizes(id, conn).await?;
    let measurements = sqlx::query_as("SELECT * FROM product_measurements WHERE product_id = $1 ORDER BY id")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    let tags =
        sqlx::query_as("SELECT * FROM product_tags WHERE product_id = $1 ORDER BY id").bind(id).fetch_all(conn).await?;
    Ok(Some(ProductDetails { product, sizes, measurements, tags }))
}

pub async fn fetch_product_sizes(
    product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProductSize>, sqlx::Error> {
    let sizes = sqlx::query_as("SELECT * FROM product_sizes WHERE product_id = $1 ORDER BY size_id")
        .bind(product_id)
        .fetch_all(conn)
        .await?;
    Ok(sizes)
}

pub async fn fetch_product_size(
    product_id: i64,
    size_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductSize>, sqlx::Error> {
    let size = sqlx::query_as("SELECT * FROM product_sizes WHERE product_id = $1 AND size_id = $2")
        .bind(product_id)
        .bind(size_id)
        .fetch_optional(conn)
        .await?;
    Ok(size)
}

fn push_product_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &ProductQuery) {
    let filters = query.filters.clone();
    builder.push(" WHERE 1 = 1");
    if !query.include_hidden {
        builder.push(" AND hidden = 0");
    }
    if let Some(category) = filters.category {
        builder.push(" AND category_id = ");
        builder.push_bind(category.id());
    }
    if let Some(gender) = filters.gender {
        builder.push(" AND target_gender = ");
        builder.push_bind(gender.to_string());
    }
    if let Some(from) = filters.price_from {
        builder.push(" AND CAST(price AS REAL) >= CAST(");
        builder.push_bind(from);
        builder.push(" AS REAL)");
    }
    if let Some(to) = filters.price_to {
        builder.push(" AND CAST(price AS REAL) <= CAST(");
        builder.push_bind(to);
        builder.push(" AS REAL)");
    }
    match filters.on_sale {
        Some(true) => {
            builder.push(" AND sale_percentage IS NOT NULL AND CAST(sale_percentage AS REAL) > 0");
        },
        Some(false) => {
            builder.push(" AND (sale_percentage IS NULL OR CAST(sale_percentage AS REAL) = 0)");
        },
        None => {},
    }
    if let Some(tag) = filters.tag {
        builder.push(" AND id IN (SELECT product_id FROM product_tags WHERE tag = ");
        builder.push_bind(tag);
        builder.push(")");
    }
    if let Some(preorder) = filters.preorder {
        builder.push(" AND preorder = ");
        builder.push_bind(preorder);
    }
}

/// Returns one page of products matching `query`, and the number of matches across all pages.
pub async fn fetch_products_paged(
    query: &ProductQuery,
    conn: &mut SqliteConnection,
) -> Result<ProductPage, sqlx::Error> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
    push_product_filters(&mut count, query);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::new("SELECT * FROM products");
    push_product_filters(&mut builder, query);
    let direction = query.order.as_sql();
    let sort = query.sort.iter().map(|s| format!("{} {direction}", s.column())).collect::<Vec<_>>().join(", ");
    // id breaks ties so that pages never overlap
    builder.push(format!(" ORDER BY {sort}, id {direction}"));
    builder.push(" LIMIT ");
    builder.push_bind(query.limit);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset);
    trace!("🗃️ Executing query: {}", builder.sql());
    let products = builder.build_query_as::<Product>().fetch_all(conn).await?;
    trace!("🗃️ {query}: {} of {total} products", products.len());
    Ok(ProductPage { products, total })
}

/// Inserts the product, its stock rows and tags. Not atomic on its own; run it inside a transaction.
pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<ProductDetails, CatalogError> {
    if fetch_product_by_sku(&product.sku, conn).await?.is_some() {
        return Err(CatalogError::SkuAlreadyExists(product.sku));
    }
    if product.stock.iter().any(|(_, qty)| *qty < 0) {
        return Err(CatalogError::NegativeStock);
    }
    let now = Utc::now();
    let row: Product = sqlx::query_as(
        r#"
            INSERT INTO products (
                created_at,
                updated_at,
                name,
                brand,
                sku,
                color,
                color_hex,
                country_of_origin,
                thumbnail_url,
                blur_hash,
                price,
                sale_percentage,
                category_id,
                description,
                target_gender,
                preorder
            ) VALUES ($1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(product.name)
    .bind(product.brand)
    .bind(product.sku)
    .bind(product.color)
    .bind(product.color_hex)
    .bind(product.country_of_origin)
    .bind(product.thumbnail_url)
    .bind(product.blur_hash)
    .bind(product.price)
    .bind(product.sale_percentage)
    .bind(product.category.id())
    .bind(product.description)
    .bind(product.target_gender)
    .bind(product.preorder)
    .fetch_one(&mut *conn)
    .await?;
    let mut sizes = Vec::with_capacity(product.stock.len());
    for (size, quantity) in product.stock {
        sizes.push(upsert_stock(row.id, size.id(), quantity, conn).await?);
    }
    let mut tags = Vec::with_capacity(product.tags.len());
    for tag in product.tags {
        let tag: ProductTag = sqlx::query_as("INSERT INTO product_tags (product_id, tag) VALUES ($1, $2) RETURNING *")
            .bind(row.id)
            .bind(tag)
            .fetch_one(&mut *conn)
            .await?;
        tags.push(tag);
    }
    debug!("🗃️ Product {} [{}] inserted with {} sizes", row.id, row.sku, sizes.len());
    Ok(ProductDetails { product: row, sizes, measurements: Vec::new(), tags })
}

/// Sets the absolute stock level, creating the row if it does not exist.
pub async fn upsert_stock(
    product_id: i64,
    size_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<ProductSize, sqlx::Error> {
    let size = sqlx::query_as(
        r#"
            INSERT INTO product_sizes (product_id, size_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (product_id, size_id) DO UPDATE SET quantity = excluded.quantity
            RETURNING *;
        "#,
    )
    .bind(product_id)
    .bind(size_id)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    Ok(size)
}

pub async fn set_hidden(id: i64, hidden: bool, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("UPDATE products SET hidden = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(hidden)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

/// Takes `quantity` units out of stock. The update only applies if enough units remain, so stock can never go
/// negative even when two submissions race.
pub async fn decrement_stock(
    product_id: i64,
    size_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), OrderStoreError> {
    let result = sqlx::query(
        r#"
            UPDATE product_sizes SET quantity = quantity - $1
            WHERE product_id = $2 AND size_id = $3 AND quantity >= $1
        "#,
    )
    .bind(quantity)
    .bind(product_id)
    .bind(size_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return match fetch_product_size(product_id, size_id, conn).await? {
            Some(_) => Err(OrderStoreError::InsufficientStock { product_id, size_id }),
            None => Err(OrderStoreError::UnknownProductSize { product_id, size_id }),
        };
    }
    trace!("🗃️ Stock of {product_id}/{size_id} reduced by {quantity}");
    Ok(())
}

/// Returns `quantity` units to stock. A missing stock row is recreated.
pub async fn increment_stock(
    product_id: i64,
    size_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO product_sizes (product_id, size_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (product_id, size_id) DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(product_id)
    .bind(size_id)
    .bind(quantity)
    .execute(conn)
    .await?;
    trace!("🗃️ Stock of {product_id}/{size_id} increased by {quantity}");
    Ok(())
}
