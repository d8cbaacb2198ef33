//! Gateway orders attached to an order, current and superseded
//!
//! Reads and writes happen while the owning order row is locked.

use sqlx::PgConnection;

use crate::store::GatewayOrderRef;

#[derive(sqlx::FromRow)]
struct GatewayOrderRow {
    gateway_order_id: String,
    order_id: String,
    captured_payment_id: Option<String>,
}

impl From<GatewayOrderRow> for GatewayOrderRef {
    fn from(row: GatewayOrderRow) -> Self {
        Self {
            gateway_order_id: row.gateway_order_id,
            order_id: row.order_id,
            captured_payment_id: row.captured_payment_id,
        }
    }
}

pub async fn insert(
    conn: &mut PgConnection,
    gateway_order_id: &str,
    order_id: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO gateway_orders (gateway_order_id, order_id, created_at)
         VALUES ($1, $2, $3)",
    )
    .bind(gateway_order_id)
    .bind(order_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: &mut PgConnection,
    gateway_order_id: &str,
) -> Result<Option<GatewayOrderRef>, sqlx::Error> {
    let row = sqlx::query_as::<_, GatewayOrderRow>(
        "SELECT gateway_order_id, order_id, captured_payment_id
         FROM gateway_orders WHERE gateway_order_id = $1",
    )
    .bind(gateway_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Into::into))
}

/// Remember the payment processed against a gateway order
pub async fn set_captured(
    conn: &mut PgConnection,
    gateway_order_id: &str,
    gateway_payment_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE gateway_orders SET captured_payment_id = $2 WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .bind(gateway_payment_id)
        .execute(conn)
        .await?;
    Ok(())
}
