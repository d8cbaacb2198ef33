//! Product rows and stock counters

use shared::models::Product;
use sqlx::PgConnection;

const PRODUCT_COLUMNS: &str =
    "id, name, unit, price, stock, default_stock, in_stock, is_active, updated_at";

pub async fn find(conn: &mut PgConnection, id: &str) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Lock the given product rows for the rest of the transaction.
///
/// Rows are locked in ascending id order so concurrent carts never deadlock.
/// Missing ids are simply absent from the result.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    ids: &[String],
) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
    ))
    .bind(ids)
    .fetch_all(conn)
    .await
}

/// Write stock counters computed by the inventory ledger
pub async fn save_stock(
    conn: &mut PgConnection,
    products: &[Product],
    now: i64,
) -> Result<(), sqlx::Error> {
    if products.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
    let stocks: Vec<i32> = products.iter().map(|p| p.stock).collect();
    let defaults: Vec<i32> = products.iter().map(|p| p.default_stock).collect();
    let flags: Vec<bool> = products.iter().map(|p| p.in_stock).collect();
    sqlx::query(
        r#"
        UPDATE products AS p SET
            stock = u.stock, default_stock = u.default_stock,
            in_stock = u.in_stock, updated_at = $5
        FROM UNNEST($1::text[], $2::integer[], $3::integer[], $4::boolean[])
            AS u(id, stock, default_stock, in_stock)
        WHERE p.id = u.id
        "#,
    )
    .bind(&ids)
    .bind(&stocks)
    .bind(&defaults)
    .bind(&flags)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Lock every product row (daily reset)
pub async fn lock_all(conn: &mut PgConnection) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id FOR UPDATE"
    ))
    .fetch_all(conn)
    .await
}
