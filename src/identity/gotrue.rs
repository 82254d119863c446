use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{IdentityProvider, MagicLink, ProviderError, ProviderUser, Session};

const PAGE_SIZE: usize = 1000;

/// Adapter for a hosted Supabase Auth (GoTrue) instance, driven with the
/// service-role key.
pub struct GoTrueProvider {
    client: reqwest::Client,
    base_url: String,
    service_role_key: Option<String>,
}

#[derive(Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

#[derive(Deserialize)]
struct GenerateLinkResponse {
    hashed_token: Option<String>,
    properties: Option<LinkProperties>,
}

#[derive(Deserialize)]
struct LinkProperties {
    hashed_token: Option<String>,
}

impl GoTrueProvider {
    pub fn new(base_url: &str, service_role_key: Option<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: format!("{}/auth/v1", base_url.trim_end_matches('/')),
            service_role_key,
        })
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.service_role_key
            .as_deref()
            .ok_or(ProviderError::MissingSecret("SERVICE_ROLE_KEY"))
    }

    /// Request authenticated as the service role.
    fn admin(&self, builder: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let key = self.key()?;
        Ok(builder.header("apikey", key).bearer_auth(key))
    }

    /// Request carrying the service-role apikey but a user's bearer token.
    fn as_user(&self, builder: RequestBuilder, access_token: &str) -> Result<RequestBuilder, ProviderError> {
        Ok(builder.header("apikey", self.key()?).bearer_auth(access_token))
    }

    async fn send<T: DeserializeOwned>(
        builder: RequestBuilder,
        client_error: fn(StatusCode, String) -> ProviderError,
    ) -> Result<T, ProviderError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Request failed: {e}")))?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(client_error(status, body));
        }
        if !status.is_success() {
            return Err(ProviderError::Upstream(format!("Unexpected status {status}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Invalid response body: {e}")))
    }
}

fn upstream(status: StatusCode, body: String) -> ProviderError {
    ProviderError::Upstream(format!("{status}: {body}"))
}

fn invalid_credentials(_: StatusCode, _: String) -> ProviderError {
    ProviderError::InvalidCredentials
}

fn invalid_token(status: StatusCode, body: String) -> ProviderError {
    ProviderError::InvalidToken(format!("{status}: {body}"))
}

fn create_conflict(status: StatusCode, body: String) -> ProviderError {
    if body.contains("already") {
        ProviderError::EmailTaken
    } else {
        upstream(status, body)
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<ProviderUser>, ProviderError> {
        let mut page = 1;
        loop {
            let url = format!("{}/admin/users?page={page}&per_page={PAGE_SIZE}", self.base_url);
            let batch: UserPage = Self::send(self.admin(self.client.get(url))?, upstream).await?;

            if let Some(user) = batch.users.iter().find(|u| u.email == email) {
                return Ok(Some(user.clone()));
            }
            if batch.users.len() < PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        let builder = self.as_user(self.client.get(format!("{}/user", self.base_url)), access_token)?;
        Self::send(builder, invalid_token).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let url = format!("{}/token?grant_type=password", self.base_url);
        let builder = self
            .client
            .post(url)
            .header("apikey", self.key()?)
            .json(&json!({ "email": email, "password": password }));
        Self::send(builder, invalid_credentials).await
    }

    async fn generate_magic_link(&self, email: &str) -> Result<MagicLink, ProviderError> {
        let url = format!("{}/admin/generate_link", self.base_url);
        let builder = self
            .admin(self.client.post(url))?
            .json(&json!({ "type": "magiclink", "email": email }));
        let link: GenerateLinkResponse = Self::send(builder, upstream).await?;

        link.hashed_token
            .or_else(|| link.properties.and_then(|p| p.hashed_token))
            .map(|hashed_token| MagicLink { hashed_token })
            .ok_or_else(|| ProviderError::Upstream("Token manquant".to_string()))
    }

    async fn verify_magic_link(&self, hashed_token: &str) -> Result<Session, ProviderError> {
        let url = format!("{}/verify", self.base_url);
        let builder = self
            .client
            .post(url)
            .header("apikey", self.key()?)
            .json(&json!({ "type": "magiclink", "token_hash": hashed_token }));
        Self::send(builder, invalid_token).await
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<ProviderUser, ProviderError> {
        let url = format!("{}/admin/users", self.base_url);
        let builder = self.admin(self.client.post(url))?.json(&json!({
            "email": email,
            "password": password,
            "email_confirm": true,
            "user_metadata": { "full_name": full_name },
        }));
        Self::send(builder, create_conflict).await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), ProviderError> {
        let url = format!("{}/admin/users/{user_id}", self.base_url);
        let resp = self
            .admin(self.client.delete(url))?
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Request failed: {e}")))?;

        match resp.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(ProviderError::Upstream(format!("Unexpected status {s}"))),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let url = format!("{}/token?grant_type=refresh_token", self.base_url);
        let builder = self
            .client
            .post(url)
            .header("apikey", self.key()?)
            .json(&json!({ "refresh_token": refresh_token }));
        Self::send(builder, invalid_token).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let url = format!("{}/logout", self.base_url);
        let resp = self
            .as_user(self.client.post(url), access_token)?
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Request failed: {e}")))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            s if s.is_client_error() => Err(ProviderError::InvalidToken(s.to_string())),
            s => Err(ProviderError::Upstream(format!("Unexpected status {s}"))),
        }
    }
}
