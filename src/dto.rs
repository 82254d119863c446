//! Request and response bodies shared by the HTTP handlers and the client
//! library.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{ProviderUser, Session};
use crate::models::Profile;

/// Successful responses of the sub-user service are wrapped in `data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateSubUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateSubUserRequest {
    #[serde(default)]
    pub sub_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Public part of a sub-user, as handed to the client after a delegated login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubUserIdentity {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub role: String,
}

/// Result of `authenticate`. Direct admin logins carry `is_admin: true` and
/// no sub-user; delegated logins also carry the admin's email and id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateData {
    pub session: Session,
    pub user: ProviderUser,
    pub is_admin: bool,
    pub sub_user: Option<SubUserIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub success: bool,
    pub message: String,
    pub user: ProviderUser,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub session: Session,
    pub profile: Profile,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PasswordGrantRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
