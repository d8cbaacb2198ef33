//! Transactional outbox rows

use sqlx::PgConnection;

use super::BoxError;
use crate::notify::Notification;
use crate::store::{OutboxEvent, OutboxStatus, OUTBOX_LEASE_MS, OUTBOX_MAX_ATTEMPTS};

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    available_at: i64,
    created_at: i64,
}

impl OutboxRow {
    fn into_event(self) -> Result<OutboxEvent, BoxError> {
        let status = match self.status.as_str() {
            "pending" => OutboxStatus::Pending,
            "done" => OutboxStatus::Done,
            "failed" => OutboxStatus::Failed,
            other => return Err(format!("Unknown outbox status: {other}").into()),
        };
        Ok(OutboxEvent {
            id: self.id,
            notification: serde_json::from_value(self.payload)?,
            status,
            attempts: self.attempts,
            last_error: self.last_error,
            available_at: self.available_at,
            created_at: self.created_at,
        })
    }
}

/// Enqueue inside the caller's transaction
pub async fn insert(
    conn: &mut PgConnection,
    notification: &Notification,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO outbox_events (kind, payload, status, attempts, available_at, created_at)
         VALUES ($1, $2, 'pending', 0, $3, $3)",
    )
    .bind(notification.kind())
    .bind(serde_json::to_value(notification)?)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Lease due events. `SKIP LOCKED` lets several instances drain concurrently.
pub async fn claim(
    conn: &mut PgConnection,
    limit: i64,
    now: i64,
) -> Result<Vec<OutboxEvent>, BoxError> {
    let rows = sqlx::query_as::<_, OutboxRow>(
        r#"
        UPDATE outbox_events SET available_at = $3
        WHERE id IN (
            SELECT id FROM outbox_events
            WHERE status = 'pending' AND available_at <= $1
            ORDER BY id
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, payload, status, attempts, last_error, available_at, created_at
        "#,
    )
    .bind(now)
    .bind(limit)
    .bind(now + OUTBOX_LEASE_MS)
    .fetch_all(conn)
    .await?;

    let mut events = rows
        .into_iter()
        .map(OutboxRow::into_event)
        .collect::<Result<Vec<_>, _>>()?;
    events.sort_by_key(|e| e.id);
    Ok(events)
}

pub async fn complete(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outbox_events SET status = 'done' WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Count a failed attempt and schedule the next one, or give up
pub async fn retry(
    conn: &mut PgConnection,
    id: i64,
    error: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    let attempts: Option<(i32,)> = sqlx::query_as(
        "UPDATE outbox_events SET attempts = attempts + 1, last_error = $2
         WHERE id = $1 RETURNING attempts",
    )
    .bind(id)
    .bind(error)
    .fetch_optional(&mut *conn)
    .await?;
    let Some((attempts,)) = attempts else {
        return Ok(());
    };

    if attempts >= OUTBOX_MAX_ATTEMPTS {
        sqlx::query("UPDATE outbox_events SET status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        tracing::error!(event_id = id, attempts, error, "Outbox event gave up");
    } else {
        sqlx::query("UPDATE outbox_events SET available_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now + crate::store::outbox_backoff_ms(attempts))
            .execute(conn)
            .await?;
    }
    Ok(())
}
