//! Orders and order items

use std::collections::HashMap;

use shared::models::{CancelReason, DeliveryDetails, Order, OrderItem, OrderStatus, PaymentStatus};
use sqlx::PgConnection;

use super::BoxError;
use crate::store::OrderFilter;

const ORDER_COLUMNS: &str = "id, order_number, user_id, subtotal, delivery_fee, total, \
     delivery_name, delivery_phone, delivery_email, delivery_address, delivery_city, \
     delivery_pincode, status, payment_status, cancel_reason, gateway_order_id, gateway_payment_id, \
     idempotency_key, payment_failure_token, invoice_url, created_at, updated_at, paid_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    user_id: String,
    subtotal: i64,
    delivery_fee: i64,
    total: i64,
    delivery_name: String,
    delivery_phone: String,
    delivery_email: Option<String>,
    delivery_address: String,
    delivery_city: String,
    delivery_pincode: String,
    status: String,
    payment_status: String,
    cancel_reason: Option<String>,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    idempotency_key: Option<String>,
    payment_failure_token: Option<String>,
    invoice_url: Option<String>,
    created_at: i64,
    updated_at: i64,
    paid_at: Option<i64>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, BoxError> {
        let status = OrderStatus::from_db(&self.status)
            .ok_or_else(|| format!("Unknown order status: {}", self.status))?;
        let payment_status = PaymentStatus::from_db(&self.payment_status)
            .ok_or_else(|| format!("Unknown payment status: {}", self.payment_status))?;
        let cancel_reason = match self.cancel_reason.as_deref() {
            Some(value) => Some(
                CancelReason::from_db(value)
                    .ok_or_else(|| format!("Unknown cancel reason: {value}"))?,
            ),
            None => None,
        };
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            items,
            subtotal: self.subtotal,
            delivery_fee: self.delivery_fee,
            total: self.total,
            delivery: DeliveryDetails {
                name: self.delivery_name,
                phone: self.delivery_phone,
                email: self.delivery_email,
                address: self.delivery_address,
                city: self.delivery_city,
                pincode: self.delivery_pincode,
            },
            status,
            payment_status,
            cancel_reason,
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            idempotency_key: self.idempotency_key,
            payment_failure_token: self.payment_failure_token,
            invoice_url: self.invoice_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
        })
    }
}

async fn load_items(
    conn: &mut PgConnection,
    order_ids: &[String],
) -> Result<HashMap<String, Vec<OrderItem>>, sqlx::Error> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, product_id, product_name, quantity, price_at_time
         FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, product_id",
    )
    .bind(order_ids)
    .fetch_all(conn)
    .await?;

    let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id.clone()).or_default().push(item);
    }
    Ok(by_order)
}

async fn hydrate(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>, BoxError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut items = load_items(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let lines = items.remove(&row.id).unwrap_or_default();
            row.into_order(lines)
        })
        .collect()
}

/// `predicate` binds `value` as `$1`
async fn fetch_one_where(
    conn: &mut PgConnection,
    predicate: &str,
    value: &str,
    lock: bool,
) -> Result<Option<Order>, BoxError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE {predicate}{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

pub async fn find(conn: &mut PgConnection, id: &str) -> Result<Option<Order>, BoxError> {
    fetch_one_where(conn, "id = $1", id, false).await
}

/// Load and row-lock an order for the rest of the transaction
pub async fn find_for_update(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<Order>, BoxError> {
    fetch_one_where(conn, "id = $1", id, true).await
}

/// Current or superseded gateway order
pub async fn find_by_gateway_id(
    conn: &mut PgConnection,
    gateway_order_id: &str,
    lock: bool,
) -> Result<Option<Order>, BoxError> {
    fetch_one_where(
        conn,
        "id = (SELECT order_id FROM gateway_orders WHERE gateway_order_id = $1)",
        gateway_order_id,
        lock,
    )
    .await
}

/// Newest first
pub async fn list(conn: &mut PgConnection, filter: &OrderFilter) -> Result<Vec<Order>, BoxError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE ($1::text IS NULL OR status = $1)
         ORDER BY created_at DESC, id DESC
         LIMIT $2 OFFSET $3"
    ))
    .bind(filter.status.map(|s| s.as_db()))
    .bind(filter.limit())
    .bind(filter.offset())
    .fetch_all(&mut *conn)
    .await?;
    hydrate(conn, rows).await
}

/// Ids of PENDING, unpaid orders created before `cutoff`
pub async fn list_abandoned(
    conn: &mut PgConnection,
    cutoff: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM orders
         WHERE status = 'PENDING' AND payment_status <> 'PAID' AND created_at < $1
         ORDER BY created_at",
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Insert the order and its items
pub async fn insert(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, user_id, subtotal, delivery_fee, total,
            delivery_name, delivery_phone, delivery_email, delivery_address,
            delivery_city, delivery_pincode, status, payment_status,
            idempotency_key, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(order.subtotal)
    .bind(order.delivery_fee)
    .bind(order.total)
    .bind(&order.delivery.name)
    .bind(&order.delivery.phone)
    .bind(&order.delivery.email)
    .bind(&order.delivery.address)
    .bind(&order.delivery.city)
    .bind(&order.delivery.pincode)
    .bind(order.status.as_db())
    .bind(order.payment_status.as_db())
    .bind(&order.idempotency_key)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    let ids: Vec<String> = order.items.iter().map(|i| i.id.clone()).collect();
    let order_ids: Vec<String> = order.items.iter().map(|i| i.order_id.clone()).collect();
    let product_ids: Vec<String> = order.items.iter().map(|i| i.product_id.clone()).collect();
    let names: Vec<String> = order.items.iter().map(|i| i.product_name.clone()).collect();
    let quantities: Vec<i32> = order.items.iter().map(|i| i.quantity).collect();
    let prices: Vec<i64> = order.items.iter().map(|i| i.price_at_time).collect();
    sqlx::query(
        r#"
        INSERT INTO order_items (id, order_id, product_id, product_name, quantity, price_at_time)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::integer[], $6::bigint[])
        "#,
    )
    .bind(&ids)
    .bind(&order_ids)
    .bind(&product_ids)
    .bind(&names)
    .bind(&quantities)
    .bind(&prices)
    .execute(conn)
    .await?;
    Ok(())
}

/// Persist the mutable state of an order (status, payment, gateway refs)
pub async fn save_state(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE orders SET
            status = $2, payment_status = $3, gateway_order_id = $4,
            gateway_payment_id = $5, payment_failure_token = $6,
            invoice_url = $7, updated_at = $8, paid_at = $9, cancel_reason = $10
        WHERE id = $1
        "#,
    )
    .bind(&order.id)
    .bind(order.status.as_db())
    .bind(order.payment_status.as_db())
    .bind(&order.gateway_order_id)
    .bind(&order.gateway_payment_id)
    .bind(&order.payment_failure_token)
    .bind(&order.invoice_url)
    .bind(order.updated_at)
    .bind(order.paid_at)
    .bind(order.cancel_reason.map(|r| r.as_db()))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_invoice_url(
    conn: &mut PgConnection,
    id: &str,
    url: &str,
    now: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET invoice_url = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(url)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
