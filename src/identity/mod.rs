//! Primary identity provider seam.
//!
//! The service never owns primary-account passwords itself: it asks an
//! [`IdentityProvider`] to resolve accounts, check passwords and mint
//! sessions. Two implementations exist, a Postgres-backed one
//! ([`local::PgIdentityProvider`]) and an adapter for a hosted GoTrue
//! ([`gotrue::GoTrueProvider`]).

pub mod gotrue;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A primary account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Session tokens for a primary account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: i64,
    pub refresh_token: String,
    pub user: ProviderUser,
}

/// One-time login token generated for an account. Only the hashed form is
/// ever handled here; it is exchanged server-side and never sent to clients.
#[derive(Debug, Clone)]
pub struct MagicLink {
    pub hashed_token: String,
}

#[derive(Debug)]
pub enum ProviderError {
    InvalidCredentials,
    InvalidToken(String),
    EmailTaken,
    MissingSecret(&'static str),
    Upstream(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::InvalidCredentials => write!(f, "Invalid credentials"),
            ProviderError::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            ProviderError::EmailTaken => write!(f, "Email already registered"),
            ProviderError::MissingSecret(name) => write!(f, "Missing {name} secret"),
            ProviderError::Upstream(msg) => write!(f, "Identity provider error: {msg}"),
            ProviderError::Database(err) => write!(f, "Database error: {err}"),
        }
    }
}

impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        ProviderError::Database(err)
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exact, case-sensitive email match.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<ProviderUser>, ProviderError>;

    /// Resolve the account behind an access token.
    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    async fn generate_magic_link(&self, email: &str) -> Result<MagicLink, ProviderError>;

    /// Exchange a hashed one-time token for a session. A token works once.
    async fn verify_magic_link(&self, hashed_token: &str) -> Result<Session, ProviderError>;

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<ProviderUser, ProviderError>;

    /// Remove an account, used to undo a sign-up whose profile could not be
    /// written.
    async fn delete_user(&self, user_id: Uuid) -> Result<(), ProviderError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError>;

    /// Revoke every refresh token of the account behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    /// Remove expired provider-side state. Providers without any keep the default.
    async fn purge_expired(&self) -> Result<u64, ProviderError> {
        Ok(0)
    }
}
