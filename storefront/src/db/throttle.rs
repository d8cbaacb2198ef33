//! Fixed-window rate-limit counters shared across instances

use sqlx::PgConnection;

/// Count one hit and return the count in the current window
pub async fn hit(
    conn: &mut PgConnection,
    bucket: &str,
    key: &str,
    window_ms: i64,
    now: i64,
) -> Result<i32, sqlx::Error> {
    let (count,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO rate_limits (bucket, key, window_start, count)
        VALUES ($1, $2, $3, 1)
        ON CONFLICT (bucket, key) DO UPDATE SET
            count = CASE WHEN $3 - rate_limits.window_start >= $4 THEN 1
                         ELSE rate_limits.count + 1 END,
            window_start = CASE WHEN $3 - rate_limits.window_start >= $4 THEN $3
                                ELSE rate_limits.window_start END
        RETURNING count
        "#,
    )
    .bind(bucket)
    .bind(key)
    .bind(now)
    .bind(window_ms)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Drop windows that started before `cutoff`
pub async fn cleanup(conn: &mut PgConnection, cutoff: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < $1")
        .bind(cutoff)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
