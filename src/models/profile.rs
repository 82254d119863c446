use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EMPLOYEE: &str = "employee";

/// Application profile attached 1:1 to a primary account.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub fn is_valid_role(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_EMPLOYEE
}

/// Username used when the account owner does not choose one: the full name
/// lower-cased with all whitespace removed.
pub fn default_username(full_name: &str) -> String {
    full_name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
