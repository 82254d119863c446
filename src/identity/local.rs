use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::jwt::{decode_token, encode_token, Claims};
use crate::auth::password;
use crate::db;
use crate::models::Account;

use super::{IdentityProvider, MagicLink, ProviderError, ProviderUser, Session};

const REFRESH_TOKEN_DAYS: i64 = 7;
const MAGIC_LINK_MINUTES: i64 = 60;

/// Identity provider backed by the `accounts`, `refresh_tokens` and
/// `magic_link_tokens` tables.
pub struct PgIdentityProvider {
    pool: PgPool,
    jwt_secret: String,
    access_token_ttl: i64,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool, jwt_secret: String, access_token_ttl: i64) -> Self {
        Self {
            pool,
            jwt_secret,
            access_token_ttl,
        }
    }

    async fn issue_session(&self, account: &Account) -> Result<Session, ProviderError> {
        let claims = Claims::new(account.id, account.email.clone(), self.access_token_ttl);
        let expires_at = claims.exp;
        let access_token =
            encode_token(&claims, &self.jwt_secret).map_err(ProviderError::Upstream)?;

        let refresh = password::generate_token();
        db::refresh_tokens::create(
            &self.pool,
            account.id,
            &password::hash_token(&refresh),
            Utc::now() + Duration::days(REFRESH_TOKEN_DAYS),
        )
        .await?;

        Ok(Session {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_token_ttl,
            expires_at,
            refresh_token: refresh,
            user: account.into(),
        })
    }

    async fn account_for_token(&self, access_token: &str) -> Result<Account, ProviderError> {
        let claims =
            decode_token(access_token, &self.jwt_secret).map_err(ProviderError::InvalidToken)?;
        db::accounts::find_by_id(&self.pool, claims.sub)
            .await?
            .ok_or_else(|| ProviderError::InvalidToken("Account no longer exists".to_string()))
    }
}

impl From<&Account> for ProviderUser {
    fn from(account: &Account) -> Self {
        ProviderUser {
            id: account.id,
            email: account.email.clone(),
            created_at: Some(account.created_at),
        }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<ProviderUser>, ProviderError> {
        let account = db::accounts::find_by_email(&self.pool, email).await?;
        Ok(account.as_ref().map(ProviderUser::from))
    }

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        let account = self.account_for_token(access_token).await?;
        Ok((&account).into())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let account = db::accounts::find_by_email(&self.pool, email)
            .await?
            .ok_or(ProviderError::InvalidCredentials)?;

        let valid =
            password::verify(password, &account.password_hash).map_err(ProviderError::Upstream)?;
        if !valid {
            return Err(ProviderError::InvalidCredentials);
        }

        self.issue_session(&account).await
    }

    async fn generate_magic_link(&self, email: &str) -> Result<MagicLink, ProviderError> {
        let account = db::accounts::find_by_email(&self.pool, email)
            .await?
            .ok_or_else(|| ProviderError::Upstream(format!("No account for {email}")))?;

        // The caller holds the hashed token; the table holds a digest of it.
        let hashed_token = password::hash_token(&password::generate_token());
        db::magic_links::create(
            &self.pool,
            account.id,
            &password::hash_token(&hashed_token),
            Utc::now() + Duration::minutes(MAGIC_LINK_MINUTES),
        )
        .await?;

        Ok(MagicLink { hashed_token })
    }

    async fn verify_magic_link(&self, hashed_token: &str) -> Result<Session, ProviderError> {
        let token = db::magic_links::consume(&self.pool, &password::hash_token(hashed_token))
            .await?
            .ok_or_else(|| ProviderError::InvalidToken("Token expired or already used".to_string()))?;

        let account = db::accounts::find_by_id(&self.pool, token.account_id)
            .await?
            .ok_or_else(|| ProviderError::InvalidToken("Account no longer exists".to_string()))?;

        self.issue_session(&account).await
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<ProviderUser, ProviderError> {
        let pw_hash = password::hash(password).map_err(ProviderError::Upstream)?;

        let account = db::accounts::create(&self.pool, email, &pw_hash, full_name)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    ProviderError::EmailTaken
                }
                _ => ProviderError::Database(e),
            })?;

        Ok((&account).into())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), ProviderError> {
        db::accounts::delete(&self.pool, user_id).await?;
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let stored = db::refresh_tokens::find_by_hash(&self.pool, &password::hash_token(refresh_token))
            .await?
            .ok_or_else(|| ProviderError::InvalidToken("Invalid refresh token".to_string()))?;

        if stored.used || !db::refresh_tokens::mark_used(&self.pool, stored.id).await? {
            tracing::warn!(
                "Refresh token reuse detected for account {}. Revoking all sessions.",
                stored.account_id
            );
            db::refresh_tokens::delete_all_for_account(&self.pool, stored.account_id).await?;
            return Err(ProviderError::InvalidToken(
                "Refresh token reuse detected".to_string(),
            ));
        }

        if stored.expires_at < Utc::now() {
            return Err(ProviderError::InvalidToken("Refresh token expired".to_string()));
        }

        let account = db::accounts::find_by_id(&self.pool, stored.account_id)
            .await?
            .ok_or_else(|| ProviderError::InvalidToken("Account no longer exists".to_string()))?;

        self.issue_session(&account).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let account = self.account_for_token(access_token).await?;
        db::refresh_tokens::delete_all_for_account(&self.pool, account.id).await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, ProviderError> {
        let refresh = db::refresh_tokens::delete_expired(&self.pool).await?;
        let links = db::magic_links::delete_stale(&self.pool).await?;
        Ok(refresh + links)
    }
}
