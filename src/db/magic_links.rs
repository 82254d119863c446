use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::MagicLinkToken;

pub async fn create(
    pool: &PgPool,
    account_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<MagicLinkToken, sqlx::Error> {
    sqlx::query_as::<_, MagicLinkToken>(
        "INSERT INTO magic_link_tokens (account_id, token_hash, expires_at)
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(account_id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

/// Marks a valid token as used and returns it, in one statement so a token
/// can only ever be exchanged once.
pub async fn consume(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<MagicLinkToken>, sqlx::Error> {
    sqlx::query_as::<_, MagicLinkToken>(
        "UPDATE magic_link_tokens SET used = true
         WHERE token_hash = $1 AND used = false AND expires_at > now()
         RETURNING *",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn delete_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM magic_link_tokens WHERE used = true OR expires_at < now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
