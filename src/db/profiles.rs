use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Profile;

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    email: &str,
    full_name: &str,
    role: &str,
    username: Option<&str>,
) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(
        "INSERT INTO profiles (id, email, full_name, role, username)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(id)
    .bind(email)
    .bind(full_name)
    .bind(role)
    .bind(username)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn count_all<'e, E: sqlx::PgExecutor<'e>>(executor: E) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

/// Self-service edit. `None` keeps the stored value.
pub async fn update_details(
    pool: &PgPool,
    id: Uuid,
    full_name: Option<&str>,
    username: Option<&str>,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(
        "UPDATE profiles
         SET full_name = COALESCE($2, full_name), username = COALESCE($3, username)
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(full_name)
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn update_role(pool: &PgPool, id: Uuid, role: &str) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>("UPDATE profiles SET role = $2 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(role)
        .fetch_optional(pool)
        .await
}
