use shared::models::User;
use sqlx::PgConnection;

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Find the customer by phone or create it. Existing name/email are kept;
/// only missing ones are filled.
pub async fn find_or_create(
    conn: &mut PgConnection,
    phone: &str,
    name: Option<&str>,
    email: Option<&str>,
    now: i64,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, phone, name, email, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (phone) DO UPDATE SET
            name = COALESCE(users.name, EXCLUDED.name),
            email = COALESCE(users.email, EXCLUDED.email)
        RETURNING id, phone, name, email, created_at
        "#,
    )
    .bind(shared::util::new_id())
    .bind(phone)
    .bind(non_blank(name))
    .bind(non_blank(email))
    .bind(now)
    .fetch_one(conn)
    .await
}
