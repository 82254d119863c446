use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::dto::{UpdateProfileRequest, UpdateRoleRequest};
use crate::error::{ApiJson, AppError};
use crate::middleware::audit;
use crate::models::profile::is_valid_role;
use crate::models::{AuditEvent, Profile, SubUser};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_own(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(auth.profile(&state).await?))
}

pub async fn update_own(
    auth: AuthUser,
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let full_name = req.full_name.as_deref().filter(|v| !v.is_empty());
    let username = req.username.as_deref().filter(|v| !v.is_empty());

    let profile = db::profiles::update_details(&state.pool, auth.user_id, full_name, username)
        .await?
        .ok_or_else(|| AppError::NotFound("Profil introuvable".to_string()))?;

    Ok(Json(profile))
}

pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Profile>>, AppError> {
    auth.require_admin(&state).await?;
    Ok(Json(db::profiles::list_all(&state.pool).await?))
}

pub async fn update_role(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<Json<Profile>, AppError> {
    auth.require_admin(&state).await?;

    if !is_valid_role(&req.role) {
        return Err(AppError::BadRequest("Rôle invalide".to_string()));
    }

    let profile = db::profiles::update_role(&state.pool, id, &req.role)
        .await?
        .ok_or_else(|| AppError::NotFound("Profil introuvable".to_string()))?;

    audit::log_event(
        &state.pool,
        auth.user_id,
        Some(auth.user_id),
        "profile.role_changed",
        "profile",
        Some(profile.id),
        Some(serde_json::json!({ "role": profile.role })),
    )
    .await;

    Ok(Json(profile))
}

pub async fn list_sub_users(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<SubUser>>, AppError> {
    Ok(Json(
        db::sub_users::list_by_parent(&state.pool, auth.user_id).await?,
    ))
}

pub async fn list_audit_events(
    auth: AuthUser,
    State(state): State<SharedState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let offset = page.offset.unwrap_or(0).max(0);
    Ok(Json(
        db::audit::list(&state.pool, auth.user_id, limit, offset).await?,
    ))
}
