use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SubUser;

pub async fn create(
    pool: &PgPool,
    parent_user_id: Uuid,
    username: &str,
    password_hash: &str,
    full_name: &str,
    role: &str,
) -> Result<SubUser, sqlx::Error> {
    sqlx::query_as::<_, SubUser>(
        "INSERT INTO sub_users (parent_user_id, username, password_hash, full_name, role, is_active)
         VALUES ($1, $2, $3, $4, $5, true) RETURNING *",
    )
    .bind(parent_user_id)
    .bind(username)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<SubUser>, sqlx::Error> {
    sqlx::query_as::<_, SubUser>("SELECT * FROM sub_users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Any row with this username under the parent, optionally ignoring one id.
pub async fn username_taken(
    pool: &PgPool,
    parent_user_id: Uuid,
    username: &str,
    exclude_id: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (
             SELECT 1 FROM sub_users
             WHERE parent_user_id = $1 AND username = $2 AND ($3::uuid IS NULL OR id <> $3)
         )",
    )
    .bind(parent_user_id)
    .bind(username)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn find_active_by_username(
    pool: &PgPool,
    parent_user_id: Uuid,
    username: &str,
) -> Result<Option<SubUser>, sqlx::Error> {
    sqlx::query_as::<_, SubUser>(
        "SELECT * FROM sub_users
         WHERE parent_user_id = $1 AND username = $2 AND is_active = true",
    )
    .bind(parent_user_id)
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_parent(pool: &PgPool, parent_user_id: Uuid) -> Result<Vec<SubUser>, sqlx::Error> {
    sqlx::query_as::<_, SubUser>(
        "SELECT * FROM sub_users WHERE parent_user_id = $1 ORDER BY created_at DESC",
    )
    .bind(parent_user_id)
    .fetch_all(pool)
    .await
}

/// Merges the provided fields into the row and bumps `updated_at`.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    username: Option<&str>,
    password_hash: Option<&str>,
    full_name: Option<&str>,
    role: Option<&str>,
) -> Result<SubUser, sqlx::Error> {
    sqlx::query_as::<_, SubUser>(
        "UPDATE sub_users SET
             username = COALESCE($2, username),
             password_hash = COALESCE($3, password_hash),
             full_name = COALESCE($4, full_name),
             role = COALESCE($5, role),
             updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(username)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(pool)
    .await
}

pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sub_users SET last_login = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_password_hash(
    pool: &PgPool,
    id: Uuid,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sub_users SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}
