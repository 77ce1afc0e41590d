use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, OrderStatusType, Payment, PaymentMethod},
    traits::{InvoiceAssignment, OrderStoreError, Settlement},
};

pub async fn insert_payment(
    order_id: i64,
    payment: NewPayment,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let now = Utc::now();
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payments (
                order_id,
                payment_method,
                transaction_amount,
                transaction_amount_payment_currency,
                created_at,
                modified_at,
                expired_at
            ) VALUES ($1, $2, $3, $4, $5, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(payment.method)
    .bind(payment.transaction_amount)
    .bind(payment.transaction_amount_payment_currency)
    .bind(now)
    .bind(payment.expired_at)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_payment_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_by_transaction_id(
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE transaction_id = $1 ORDER BY id LIMIT 1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// The card intent id doubles as the payment's transaction id.
pub async fn set_card_intent(
    order_id: i64,
    intent_id: &str,
    client_secret: &str,
    conn: &mut SqliteConnection,
) -> Result<Payment, OrderStoreError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments SET transaction_id = $1, client_secret = $2, modified_at = $3
            WHERE order_id = $4
            RETURNING *;
        "#,
    )
    .bind(intent_id)
    .bind(client_secret)
    .bind(Utc::now())
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    payment.ok_or(OrderStoreError::PaymentNotFound(order_id))
}

pub async fn assign_crypto_invoice(
    order_id: i64,
    invoice: InvoiceAssignment,
    conn: &mut SqliteConnection,
) -> Result<Payment, OrderStoreError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments SET
                payee = $1,
                transaction_amount = $2,
                transaction_amount_payment_currency = $3,
                expired_at = $4,
                modified_at = $5
            WHERE order_id = $6
            RETURNING *;
        "#,
    )
    .bind(invoice.payee)
    .bind(invoice.transaction_amount)
    .bind(invoice.transaction_amount_payment_currency)
    .bind(invoice.expires_at)
    .bind(Utc::now())
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    payment.ok_or(OrderStoreError::PaymentNotFound(order_id))
}

/// Marks the payment as done. A payment can only be settled once.
pub(crate) async fn settle_payment(
    order_id: i64,
    settlement: Settlement,
    conn: &mut SqliteConnection,
) -> Result<Payment, OrderStoreError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments SET
                transaction_id = $1,
                payer = COALESCE($2, payer),
                payee = COALESCE($3, payee),
                is_transaction_done = 1,
                modified_at = $4
            WHERE order_id = $5 AND is_transaction_done = 0
            RETURNING *;
        "#,
    )
    .bind(&settlement.transaction_id)
    .bind(settlement.payer)
    .bind(settlement.payee)
    .bind(Utc::now())
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    match payment {
        Some(p) => {
            debug!("🗃️ Payment for order {order_id} settled by {}", settlement.transaction_id);
            Ok(p)
        },
        None => match fetch_payment_for_order(order_id, conn).await? {
            Some(_) => Err(OrderStoreError::PaymentAlreadySettled(order_id)),
            None => Err(OrderStoreError::PaymentNotFound(order_id)),
        },
    }
}

/// Stamps `expired_at` on an unsettled payment. Settled payments are left alone.
pub(crate) async fn expire_payment(
    order_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE payments SET expired_at = $1, modified_at = $1 WHERE order_id = $2 AND is_transaction_done = 0",
    )
    .bind(at)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Payments whose orders are still waiting to be paid, oldest first.
pub async fn fetch_awaiting_payments(
    method: Option<PaymentMethod>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as(
        r#"
            SELECT payments.* FROM payments
            JOIN orders ON orders.id = payments.order_id
            WHERE orders.status = $1 AND ($2 IS NULL OR payments.payment_method = $2)
            ORDER BY payments.id;
        "#,
    )
    .bind(OrderStatusType::AwaitingPayment)
    .bind(method)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}
