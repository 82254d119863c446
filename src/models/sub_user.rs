use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Secondary credential scoped to one admin account (`parent_user_id`).
///
/// The password hash never leaves the service: it is skipped when the row is
/// serialized into a response.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SubUser {
    pub id: Uuid,
    pub parent_user_id: Uuid,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
