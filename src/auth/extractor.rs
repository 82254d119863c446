use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::identity::ProviderError;
use crate::models::Profile;
use crate::state::SharedState;

/// The primary account behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub access_token: String,
}

impl AuthUser {
    pub async fn profile(&self, state: &SharedState) -> Result<Profile, AppError> {
        db::profiles::find_by_id(&state.pool, self.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profil introuvable".to_string()))
    }

    pub async fn require_admin(&self, state: &SharedState) -> Result<Profile, AppError> {
        let profile = self.profile(state).await?;
        if profile.is_admin() {
            Ok(profile)
        } else {
            Err(AppError::Forbidden(
                "Accès réservé aux administrateurs".to_string(),
            ))
        }
    }
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("Non autorisé".to_string()))?;

        let user = state
            .identity
            .get_user(bearer.token())
            .await
            .map_err(|e| match e {
                ProviderError::InvalidToken(_) | ProviderError::InvalidCredentials => {
                    AppError::Unauthorized("Non autorisé".to_string())
                }
                other => AppError::from(other),
            })?;

        Ok(AuthUser {
            user_id: user.id,
            access_token: bearer.token().to_string(),
        })
    }
}
