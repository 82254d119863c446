use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::identity::ProviderError;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    InvalidCredentials(String),
    Forbidden(String),
    BadRequest(String),
    RateLimited(String),
    /// Logged in full; the client sees `message` and optional `details`.
    Storage {
        message: String,
        details: Option<String>,
    },
    Internal(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::InvalidCredentials(msg) => write!(f, "Invalid Credentials: {msg}"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppError::RateLimited(msg) => write!(f, "Rate Limited: {msg}"),
            AppError::Storage { message, details } => {
                write!(f, "Storage Error: {message}")?;
                if let Some(details) = details {
                    write!(f, " ({details})")?;
                }
                Ok(())
            }
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::InvalidCredentials(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg, None),
            AppError::Storage { message, details } => {
                tracing::error!("Storage error: {message}: {details:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, message, details)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erreur interne du serveur".to_string(),
                    None,
                )
            }
        };

        let body = match details {
            Some(details) => json!({ "error": message, "details": details }),
            None => json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => {
                AppError::InvalidCredentials("Mot de passe incorrect".to_string())
            }
            ProviderError::InvalidToken(_) => AppError::Unauthorized("Non autorisé".to_string()),
            ProviderError::EmailTaken => {
                AppError::BadRequest("Un compte existe déjà avec cet email".to_string())
            }
            ProviderError::MissingSecret(name) => {
                AppError::Internal(format!("Missing {name} secret"))
            }
            ProviderError::Upstream(msg) => {
                tracing::error!("Identity provider failure: {msg}");
                AppError::Internal("Erreur du fournisseur d'identité".to_string())
            }
            ProviderError::Database(err) => AppError::Database(err),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Corps de requête invalide: {}", rejection.body_text()))
    }
}

/// `axum::Json` whose rejection is an [`AppError`], so malformed bodies still
/// produce a JSON error payload.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
