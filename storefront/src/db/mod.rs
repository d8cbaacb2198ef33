//! Database access layer
//!
//! Free functions over `&mut PgConnection` so the same query runs inside a
//! transaction (`&mut *tx`) or on a pooled connection.

pub mod gateway_orders;
pub mod orders;
pub mod outbox;
pub mod products;
pub mod throttle;
pub mod users;
pub mod webhook_events;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Postgres unique-constraint violation (SQLSTATE 23505)
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
