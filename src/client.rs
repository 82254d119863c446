//! HTTP client for the sub-user service, for native front-ends.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dto::{
    AuthenticateData, AuthenticateRequest, CreateSubUserRequest, CreateUserRequest,
    CreateUserResponse, DataResponse, UpdateSubUserRequest,
};
use crate::models::SubUser;
use crate::session::{AuthStore, SessionPersistence, StoreError};

#[derive(Debug)]
pub enum ClientError {
    Http(reqwest::Error),
    Api { status: StatusCode, message: String },
    Store(StoreError),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Http(err) => write!(f, "Request failed: {err}"),
            ClientError::Api { status, message } => write!(f, "{message} ({status})"),
            ClientError::Store(err) => write!(f, "Session store error: {err}"),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err)
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        ClientError::Store(err)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

pub struct SubUserAuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl SubUserAuthClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "Erreur de connexion".to_string());
            return Err(ClientError::Api { status, message });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn post_data<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: Option<&str>,
        body: &B,
    ) -> Result<T, ClientError> {
        let mut builder = self.http.post(self.url(path)).json(body);
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        let wrapped: DataResponse<T> = Self::send(builder).await?;
        Ok(wrapped.data)
    }

    pub async fn authenticate(
        &self,
        admin_email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthenticateData, ClientError> {
        let body = AuthenticateRequest {
            admin_email: admin_email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };
        self.post_data("/sub-user-auth/authenticate", None, &body).await
    }

    pub async fn create_sub_user(
        &self,
        access_token: &str,
        req: &CreateSubUserRequest,
    ) -> Result<SubUser, ClientError> {
        self.post_data("/sub-user-auth/create", Some(access_token), req).await
    }

    pub async fn update_sub_user(
        &self,
        access_token: &str,
        req: &UpdateSubUserRequest,
    ) -> Result<SubUser, ClientError> {
        self.post_data("/sub-user-auth/update", Some(access_token), req).await
    }

    pub async fn create_user(
        &self,
        access_token: &str,
        req: &CreateUserRequest,
    ) -> Result<CreateUserResponse, ClientError> {
        let builder = self
            .http
            .post(self.url("/create-user"))
            .bearer_auth(access_token)
            .json(req);
        Self::send(builder).await
    }

    /// Authenticate and install the result into `store`.
    pub async fn sign_in_sub_user<P: SessionPersistence>(
        &self,
        store: &mut AuthStore<P>,
        admin_email: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        let data = self.authenticate(admin_email, username, password).await?;
        store.apply_authentication(data)?;
        Ok(())
    }

    /// Revoke the primary session server-side (best-effort) and clear the
    /// store unconditionally.
    pub async fn sign_out<P: SessionPersistence>(
        &self,
        store: &mut AuthStore<P>,
    ) -> Result<(), ClientError> {
        if let Some(session) = store.state().session.as_ref() {
            let result = self
                .http
                .post(self.url("/auth/logout"))
                .bearer_auth(&session.access_token)
                .send()
                .await;
            if let Err(e) = result {
                tracing::warn!("Server-side sign-out failed: {e}");
            }
        }
        store.sign_out()?;
        Ok(())
    }
}
