use axum::extract::State;
use axum::Json;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::dto::{CreateUserRequest, CreateUserResponse};
use crate::error::{ApiJson, AppError};
use crate::middleware::audit;
use crate::routes::auth::discard_account;
use crate::models::profile::is_valid_role;
use crate::state::SharedState;

/// Admin-only provisioning of a new primary account and its profile.
pub async fn create_user(
    auth: AuthUser,
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, AppError> {
    auth.require_admin(&state).await?;

    if req.email.is_empty() || req.password.is_empty() || req.full_name.is_empty() {
        return Err(AppError::BadRequest(
            "Email, mot de passe et nom complet requis".to_string(),
        ));
    }
    if !is_valid_role(&req.role) {
        return Err(AppError::BadRequest("Rôle invalide".to_string()));
    }

    let user = state
        .identity
        .create_user(&req.email, &req.password, &req.full_name)
        .await?;

    if let Err(e) =
        db::profiles::create(&state.pool, user.id, &req.email, &req.full_name, &req.role, None).await
    {
        discard_account(&state, user.id).await;
        return Err(AppError::Storage {
            message: "Erreur lors de la création du profil".to_string(),
            details: Some(e.to_string()),
        });
    }

    tracing::info!(admin = %auth.user_id, user = %user.id, "Primary account provisioned");

    audit::log_event(
        &state.pool,
        auth.user_id,
        Some(auth.user_id),
        "user.created",
        "profile",
        Some(user.id),
        None,
    )
    .await;

    Ok(Json(CreateUserResponse {
        success: true,
        message: "Utilisateur créé avec succès".to_string(),
        user,
    }))
}
