//! Client-side half of delegated logins.
//!
//! A sub-user signs in on top of the admin's primary session. The backend
//! only ever sees the admin, so the client keeps an [`EffectiveIdentity`]
//! next to the session: authorization uses the session owner, display and
//! per-person counters use the sub-user.

pub mod persistence;
pub mod realtime;
pub mod state;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::SubUserIdentity;
use crate::models::Profile;

pub use persistence::{FileSessionStore, MemorySessionStore, PersistenceError, SessionPersistence};
pub use state::{AuthState, AuthStore, RestoreOutcome, StoreError};

/// Key under which the delegated-session record is persisted.
pub const STORAGE_KEY: &str = "subUserAuth";

/// What survives a reload after a delegated login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedSessionRecord {
    pub admin_email: String,
    pub admin_id: Uuid,
    pub sub_user: SubUserIdentity,
}

impl DelegatedSessionRecord {
    /// The "current user" profile shown while delegated: the admin's id and
    /// email, the sub-user's name and role.
    pub fn effective_profile(&self) -> Profile {
        Profile {
            id: self.admin_id,
            email: self.admin_email.clone(),
            full_name: self.sub_user.full_name.clone(),
            role: self.sub_user.role.clone(),
            username: Some(self.sub_user.username.clone()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayIdentity {
    Admin,
    SubUser(SubUserIdentity),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveIdentity {
    /// The primary account the backend trusts. Use for authorization and
    /// for ownership of rows written through the session.
    pub session_owner_id: Uuid,
    pub display: DisplayIdentity,
}

impl EffectiveIdentity {
    pub fn is_delegated(&self) -> bool {
        matches!(self.display, DisplayIdentity::SubUser(_))
    }

    /// Id of the person at the keyboard: the sub-user when delegated.
    pub fn display_id(&self) -> Uuid {
        match &self.display {
            DisplayIdentity::Admin => self.session_owner_id,
            DisplayIdentity::SubUser(sub_user) => sub_user.id,
        }
    }
}
