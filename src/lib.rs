pub mod config;
pub mod error;
pub mod state;
pub mod auth;
pub mod client;
pub mod db;
pub mod dto;
pub mod identity;
pub mod models;
pub mod middleware;
pub mod routes;
pub mod rate_limit;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::{Config, IdentityBackend};
use crate::identity::gotrue::GoTrueProvider;
use crate::identity::local::PgIdentityProvider;
use crate::identity::IdentityProvider;
use crate::rate_limit::LoginRateLimiter;
use crate::state::{AppState, SharedState};

pub fn build_identity(pool: &PgPool, config: &Config) -> Result<Arc<dyn IdentityProvider>, String> {
    match &config.identity {
        IdentityBackend::Local {
            jwt_secret,
            access_token_ttl,
        } => Ok(Arc::new(PgIdentityProvider::new(
            pool.clone(),
            jwt_secret.clone(),
            *access_token_ttl,
        ))),
        IdentityBackend::GoTrue {
            url,
            service_role_key,
        } => {
            if service_role_key.is_none() {
                tracing::warn!("SERVICE_ROLE_KEY not set; identity requests will fail");
            }
            Ok(Arc::new(GoTrueProvider::new(url, service_role_key.clone())?))
        }
    }
}

pub fn build_state(pool: PgPool, config: Config) -> Result<SharedState, String> {
    let identity = build_identity(&pool, &config)?;
    Ok(Arc::new(AppState {
        pool,
        config,
        identity,
        login_limiter: LoginRateLimiter::new(),
    }))
}

pub fn build_app(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    let mut router = Router::new()
        .merge(routes::sub_user_routes())
        .merge(routes::account_routes());

    if matches!(state.config.identity, IdentityBackend::Local { .. }) {
        router = router.merge(routes::local_auth_routes());
    }

    router
        .route("/health", axum::routing::get(health))
        .fallback(routes::sub_users::route_not_found)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop stale limiter entries and expired tokens.
pub fn spawn_housekeeping(state: SharedState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            state.login_limiter.cleanup(Duration::from_secs(15 * 60));
            match state.identity.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {n} expired tokens"),
                Err(e) => tracing::warn!("Token purge failed: {e}"),
            }
        }
    })
}

async fn health() -> &'static str {
    "ok"
}
