//! Sub-user credential service: create, update, authenticate.
//!
//! Sub-users never get an account of their own with the identity provider.
//! A delegated login is checked against the `sub_users` table and then
//! rides on a session minted for the owning admin account.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::auth::password;
use crate::db;
use crate::dto::{
    AuthenticateData, AuthenticateRequest, CreateSubUserRequest, DataResponse, SubUserIdentity,
    UpdateSubUserRequest,
};
use crate::error::{ApiJson, AppError};
use crate::identity::{ProviderError, ProviderUser};
use crate::middleware::audit;
use crate::models::profile::ROLE_EMPLOYEE;
use crate::models::SubUser;
use crate::rate_limit::LoginRateLimiter;
use crate::state::SharedState;

fn duplicate_username() -> AppError {
    AppError::BadRequest("Ce nom d'utilisateur existe déjà".to_string())
}

fn not_found_or_forbidden() -> AppError {
    AppError::NotFound("Sous-utilisateur non trouvé ou non autorisé".to_string())
}

fn wrong_password() -> AppError {
    AppError::InvalidCredentials("Mot de passe incorrect".to_string())
}

/// Maps a failed insert/update; a unique violation means a concurrent
/// request claimed the same username first.
fn write_error(err: sqlx::Error, message: &str) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => duplicate_username(),
        other => AppError::Storage {
            message: message.to_string(),
            details: Some(other.to_string()),
        },
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateSubUserRequest>,
) -> Result<Json<DataResponse<SubUser>>, AppError> {
    if req.username.is_empty() || req.password.is_empty() || req.full_name.is_empty() {
        return Err(AppError::BadRequest(
            "Username, password et nom complet requis".to_string(),
        ));
    }

    if db::sub_users::username_taken(&state.pool, auth.user_id, &req.username, None).await? {
        return Err(duplicate_username());
    }

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;
    let role = non_empty(&req.role).unwrap_or(ROLE_EMPLOYEE);

    let sub_user = db::sub_users::create(
        &state.pool,
        auth.user_id,
        &req.username,
        &pw_hash,
        &req.full_name,
        role,
    )
    .await
    .map_err(|e| write_error(e, "Erreur lors de la création de l'utilisateur"))?;

    tracing::info!(parent = %auth.user_id, sub_user = %sub_user.id, "Sub-user created");

    audit::log_event(
        &state.pool,
        auth.user_id,
        Some(auth.user_id),
        "sub_user.created",
        "sub_user",
        Some(sub_user.id),
        Some(json!({ "username": sub_user.username })),
    )
    .await;

    Ok(Json(DataResponse { data: sub_user }))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<UpdateSubUserRequest>,
) -> Result<Json<DataResponse<SubUser>>, AppError> {
    let raw_id = non_empty(&req.sub_user_id)
        .ok_or_else(|| AppError::BadRequest("ID du sous-utilisateur requis".to_string()))?;

    // A malformed id cannot match any row: same answer as a missing one.
    let sub_user_id = Uuid::parse_str(raw_id).map_err(|_| not_found_or_forbidden())?;

    let existing = db::sub_users::find_by_id(&state.pool, sub_user_id)
        .await?
        .filter(|s| s.parent_user_id == auth.user_id)
        .ok_or_else(not_found_or_forbidden)?;

    let username = non_empty(&req.username);
    if let Some(username) = username {
        if db::sub_users::username_taken(&state.pool, auth.user_id, username, Some(existing.id))
            .await?
        {
            return Err(duplicate_username());
        }
    }

    let pw_hash = match non_empty(&req.password) {
        Some(pw) => Some(password::hash(pw).map_err(AppError::Internal)?),
        None => None,
    };

    let updated = db::sub_users::update(
        &state.pool,
        existing.id,
        username,
        pw_hash.as_deref(),
        non_empty(&req.full_name),
        non_empty(&req.role),
    )
    .await
    .map_err(|e| write_error(e, "Erreur lors de la mise à jour"))?;

    audit::log_event(
        &state.pool,
        auth.user_id,
        Some(auth.user_id),
        "sub_user.updated",
        "sub_user",
        Some(updated.id),
        Some(json!({ "password_changed": pw_hash.is_some() })),
    )
    .await;

    Ok(Json(DataResponse { data: updated }))
}

pub async fn authenticate(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<AuthenticateRequest>,
) -> Result<Json<DataResponse<AuthenticateData>>, AppError> {
    if req.admin_email.is_empty() || req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email, username et mot de passe requis".to_string(),
        ));
    }

    let limiter_key = LoginRateLimiter::key(&req.admin_email, &req.username);
    if state.login_limiter.check(&limiter_key).is_err() {
        return Err(AppError::RateLimited(
            "Trop de tentatives de connexion. Réessayez plus tard.".to_string(),
        ));
    }

    let admin = resolve_admin(&state, &req.admin_email).await?;

    let admin_username = db::profiles::find_by_id(&state.pool, admin.id)
        .await?
        .and_then(|p| p.username);

    // The admin's own username wins over a sub-user with the same name.
    let result = if admin_username.as_deref() == Some(req.username.as_str()) {
        authenticate_admin(&state, &admin, &req).await
    } else {
        authenticate_sub_user(&state, &admin, &req).await
    };

    match &result {
        Ok(_) => state.login_limiter.reset(&limiter_key),
        Err(AppError::InvalidCredentials(_)) => state.login_limiter.record_failure(&limiter_key),
        Err(_) => {}
    }

    result.map(|data| Json(DataResponse { data }))
}

async fn resolve_admin(state: &SharedState, admin_email: &str) -> Result<ProviderUser, AppError> {
    let admin = state
        .identity
        .find_user_by_email(admin_email)
        .await
        .map_err(|e| match e {
            ProviderError::MissingSecret(_) | ProviderError::Database(_) => AppError::from(e),
            other => {
                tracing::error!("Admin lookup failed: {other}");
                AppError::Internal("Erreur lors de la recherche de l'admin".to_string())
            }
        })?;

    admin.ok_or_else(|| AppError::NotFound("Email admin introuvable".to_string()))
}

/// Direct login: the password is checked by the identity provider itself.
async fn authenticate_admin(
    state: &SharedState,
    admin: &ProviderUser,
    req: &AuthenticateRequest,
) -> Result<AuthenticateData, AppError> {
    let session = state
        .identity
        .sign_in_with_password(&admin.email, &req.password)
        .await
        .map_err(|e| match e {
            ProviderError::InvalidCredentials => wrong_password(),
            other => AppError::from(other),
        })?;

    audit::log_event(
        &state.pool,
        admin.id,
        Some(admin.id),
        "admin.login",
        "profile",
        Some(admin.id),
        None,
    )
    .await;

    Ok(AuthenticateData {
        user: session.user.clone(),
        session,
        is_admin: true,
        sub_user: None,
        admin_email: None,
        admin_id: None,
        authenticated: None,
    })
}

/// Delegated login: the password is checked against the sub-user row, then a
/// one-time token for the admin is exchanged for a session server-side.
async fn authenticate_sub_user(
    state: &SharedState,
    admin: &ProviderUser,
    req: &AuthenticateRequest,
) -> Result<AuthenticateData, AppError> {
    let sub_user = db::sub_users::find_active_by_username(&state.pool, admin.id, &req.username)
        .await?
        .ok_or_else(|| AppError::NotFound("Utilisateur introuvable".to_string()))?;

    let valid = password::verify(&req.password, &sub_user.password_hash)
        .map_err(AppError::Internal)?;
    if !valid {
        return Err(wrong_password());
    }

    if let Err(e) = db::sub_users::touch_last_login(&state.pool, sub_user.id).await {
        tracing::warn!("Failed to record last login for sub-user {}: {e}", sub_user.id);
    }

    if password::needs_rehash(&sub_user.password_hash) {
        upgrade_legacy_hash(state, &sub_user, &req.password).await;
    }

    let link = state
        .identity
        .generate_magic_link(&admin.email)
        .await
        .map_err(|e| match e {
            ProviderError::MissingSecret(_) => AppError::from(e),
            other => {
                tracing::error!("Generate link error: {other}");
                AppError::Internal("Erreur lors de la création de la session".to_string())
            }
        })?;

    let session = state
        .identity
        .verify_magic_link(&link.hashed_token)
        .await
        .map_err(|e| {
            tracing::error!("Verify one-time token error: {e}");
            AppError::Internal("Erreur lors de la vérification du token".to_string())
        })?;

    tracing::info!(admin = %admin.id, sub_user = %sub_user.id, "Delegated login");

    audit::log_event(
        &state.pool,
        admin.id,
        Some(admin.id),
        "sub_user.login",
        "sub_user",
        Some(sub_user.id),
        None,
    )
    .await;

    Ok(AuthenticateData {
        user: session.user.clone(),
        session,
        is_admin: false,
        sub_user: Some(SubUserIdentity {
            id: sub_user.id,
            username: sub_user.username,
            full_name: sub_user.full_name,
            role: sub_user.role,
        }),
        admin_email: Some(req.admin_email.clone()),
        admin_id: Some(admin.id),
        authenticated: Some(true),
    })
}

async fn upgrade_legacy_hash(state: &SharedState, sub_user: &SubUser, password: &str) {
    let result = match password::hash(password) {
        Ok(new_hash) => db::sub_users::update_password_hash(&state.pool, sub_user.id, &new_hash)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => tracing::info!("Upgraded legacy password hash for sub-user {}", sub_user.id),
        Err(e) => tracing::warn!("Failed to upgrade password hash for sub-user {}: {e}", sub_user.id),
    }
}

pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn route_not_found() -> AppError {
    AppError::NotFound("Route non trouvée".to_string())
}
