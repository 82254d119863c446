//! Primary sign-up and session endpoints for the built-in identity provider.

use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::dto::{
    MessageResponse, PasswordGrantRequest, RefreshRequest, SignupRequest, SignupResponse,
};
use crate::error::{ApiJson, AppError};
use crate::identity::{ProviderError, ProviderUser, Session};
use crate::middleware::audit;
use crate::models::profile::{default_username, ROLE_ADMIN, ROLE_EMPLOYEE};
use crate::models::Profile;
use crate::rate_limit::LoginRateLimiter;
use crate::state::SharedState;

const MIN_PASSWORD_LEN: usize = 6;

pub async fn signup(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<Json<SignupResponse>, AppError> {
    if req.email.is_empty() || req.password.is_empty() || req.full_name.is_empty() {
        return Err(AppError::BadRequest(
            "Email, mot de passe et nom complet requis".to_string(),
        ));
    }

    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Le mot de passe doit contenir au moins {MIN_PASSWORD_LEN} caractères"
        )));
    }

    let user = state
        .identity
        .create_user(&req.email, &req.password, &req.full_name)
        .await?;

    let username = req
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_username(&req.full_name));

    let profile = match create_profile(&state, &user, &req, &username).await {
        Ok(profile) => profile,
        Err(e) => {
            discard_account(&state, user.id).await;
            return Err(e.into());
        }
    };

    let session = state
        .identity
        .sign_in_with_password(&req.email, &req.password)
        .await?;

    audit::log_event(
        &state.pool,
        profile.id,
        Some(profile.id),
        "user.registered",
        "profile",
        Some(profile.id),
        None,
    )
    .await;

    Ok(Json(SignupResponse { session, profile }))
}

/// Inserts the profile; the very first one becomes admin. The advisory lock
/// serializes the bootstrap check.
async fn create_profile(
    state: &SharedState,
    user: &ProviderUser,
    req: &SignupRequest,
    username: &str,
) -> Result<Profile, sqlx::Error> {
    let mut tx = state.pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock(1)")
        .execute(&mut *tx)
        .await?;

    let role = if db::profiles::count_all(&mut *tx).await? == 0 {
        ROLE_ADMIN
    } else {
        ROLE_EMPLOYEE
    };

    let profile = db::profiles::create(
        &mut *tx,
        user.id,
        &req.email,
        &req.full_name,
        role,
        Some(username),
    )
    .await?;

    tx.commit().await?;
    Ok(profile)
}

/// Removes a provider account left without a profile, so the email can sign
/// up again.
pub(crate) async fn discard_account(state: &SharedState, user_id: Uuid) {
    if let Err(e) = state.identity.delete_user(user_id).await {
        tracing::error!("Failed to remove account {user_id} after profile failure: {e}");
    }
}

pub async fn token(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<PasswordGrantRequest>,
) -> Result<Json<Session>, AppError> {
    let limiter_key = LoginRateLimiter::key(&req.email, "");
    if state.login_limiter.check(&limiter_key).is_err() {
        return Err(AppError::RateLimited(
            "Trop de tentatives de connexion. Réessayez plus tard.".to_string(),
        ));
    }

    match state.identity.sign_in_with_password(&req.email, &req.password).await {
        Ok(session) => {
            state.login_limiter.reset(&limiter_key);
            Ok(Json(session))
        }
        Err(ProviderError::InvalidCredentials) => {
            state.login_limiter.record_failure(&limiter_key);
            Err(AppError::InvalidCredentials(
                "Identifiants invalides".to_string(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn refresh(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<Session>, AppError> {
    if req.refresh_token.is_empty() {
        return Err(AppError::BadRequest("Refresh token requis".to_string()));
    }

    let session = state
        .identity
        .refresh_session(&req.refresh_token)
        .await
        .map_err(|e| match e {
            ProviderError::InvalidToken(msg) => AppError::Unauthorized(msg),
            other => other.into(),
        })?;
    Ok(Json(session))
}

pub async fn logout(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<MessageResponse>, AppError> {
    state.identity.sign_out(&auth.access_token).await?;

    Ok(Json(MessageResponse {
        message: "Déconnexion réussie".to_string(),
    }))
}
