use uuid::Uuid;

use crate::dto::{AuthenticateData, SubUserIdentity};
use crate::identity::Session;
use crate::models::Profile;

use super::persistence::{PersistenceError, SessionPersistence};
use super::{DelegatedSessionRecord, DisplayIdentity, EffectiveIdentity};

#[derive(Debug)]
pub enum StoreError {
    /// A delegated login response without the admin or sub-user fields.
    IncompleteResponse,
    Persistence(PersistenceError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IncompleteResponse => write!(f, "Incomplete authentication response"),
            StoreError::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        StoreError::Persistence(err)
    }
}

/// In-memory authentication state. Every mutation goes through one of the
/// transition methods below.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub sub_user: Option<SubUserIdentity>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            profile: None,
            sub_user: None,
            loading: true,
        }
    }
}

impl AuthState {
    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
    }

    pub fn set_profile(&mut self, profile: Option<Profile>) {
        self.profile = profile;
    }

    pub fn set_delegated_identity(&mut self, record: &DelegatedSessionRecord) {
        self.profile = Some(record.effective_profile());
        self.sub_user = Some(record.sub_user.clone());
    }

    pub fn clear_delegation(&mut self) {
        if self.sub_user.take().is_some() {
            self.profile = None;
        }
    }

    pub fn clear(&mut self) {
        self.session = None;
        self.profile = None;
        self.sub_user = None;
        self.loading = false;
    }

    pub fn is_sub_user(&self) -> bool {
        self.sub_user.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() || self.profile.is_some()
    }

    pub fn effective_identity(&self) -> Option<EffectiveIdentity> {
        let session_owner_id = self
            .session
            .as_ref()
            .map(|s| s.user.id)
            .or_else(|| self.profile.as_ref().map(|p| p.id))?;

        let display = match &self.sub_user {
            Some(sub_user) => DisplayIdentity::SubUser(sub_user.clone()),
            None => DisplayIdentity::Admin,
        };

        Some(EffectiveIdentity {
            session_owner_id,
            display,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// No primary session.
    Unauthenticated,
    /// Delegated identity rebuilt from storage without contacting the server.
    Delegated(EffectiveIdentity),
    /// Plain primary session; the caller must fetch this account's profile.
    NeedsProfile { user_id: Uuid },
    /// The stored record was unreadable and has been removed. The session is
    /// not trusted until the user signs in again.
    DiscardedCorruptRecord,
}

/// Auth state plus the persistence port it writes delegated records to.
pub struct AuthStore<P: SessionPersistence> {
    state: AuthState,
    persistence: P,
}

impl<P: SessionPersistence> AuthStore<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            state: AuthState::default(),
            persistence,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn effective_identity(&self) -> Option<EffectiveIdentity> {
        self.state.effective_identity()
    }

    pub fn set_profile(&mut self, profile: Option<Profile>) {
        self.state.set_profile(profile);
    }

    /// Install the result of `authenticate`.
    pub fn apply_authentication(&mut self, data: AuthenticateData) -> Result<(), StoreError> {
        if data.is_admin {
            // A stale delegated record must not resurface on the next reload.
            self.persistence.clear()?;
            self.state.set_session(Some(data.session));
            self.state.sub_user = None;
            self.state.set_profile(None);
            self.state.loading = false;
            return Ok(());
        }

        let (Some(true), Some(admin_email), Some(admin_id), Some(sub_user)) = (
            data.authenticated,
            data.admin_email,
            data.admin_id,
            data.sub_user,
        ) else {
            return Err(StoreError::IncompleteResponse);
        };

        let record = DelegatedSessionRecord {
            admin_email,
            admin_id,
            sub_user,
        };

        self.persistence.save(&record)?;
        self.state.set_session(Some(data.session));
        self.state.set_delegated_identity(&record);
        self.state.loading = false;
        Ok(())
    }

    /// Rebuild state on startup from whatever session the transport kept.
    pub fn restore(&mut self, session: Option<Session>) -> RestoreOutcome {
        self.state.loading = false;

        let Some(session) = session else {
            self.state.set_session(None);
            // A delegated record without a session is kept: the transport may
            // still hand the session back on its next state change.
            if !matches!(self.persistence.load(), Ok(Some(_))) {
                self.state.set_profile(None);
                self.state.sub_user = None;
            }
            return RestoreOutcome::Unauthenticated;
        };

        let user_id = session.user.id;
        match self.persistence.load() {
            Ok(Some(record)) if record.admin_id != user_id => {
                // Left behind by another account: never layer it over this one.
                tracing::warn!(
                    "Discarding delegated session record of account {} for session of {user_id}",
                    record.admin_id
                );
                if let Err(e) = self.persistence.clear() {
                    tracing::warn!("Failed to clear delegated session record: {e}");
                }
                self.state.set_session(Some(session));
                self.state.sub_user = None;
                self.state.set_profile(None);
                RestoreOutcome::NeedsProfile { user_id }
            }
            Ok(Some(record)) => {
                self.state.set_session(Some(session));
                self.state.set_delegated_identity(&record);
                match self.state.effective_identity() {
                    Some(identity) => RestoreOutcome::Delegated(identity),
                    None => RestoreOutcome::NeedsProfile { user_id },
                }
            }
            Ok(None) => {
                self.state.set_session(Some(session));
                self.state.clear_delegation();
                RestoreOutcome::NeedsProfile { user_id }
            }
            Err(e) => {
                tracing::warn!("Discarding delegated session record: {e}");
                if let Err(e) = self.persistence.clear() {
                    tracing::warn!("Failed to clear delegated session record: {e}");
                }
                self.state.clear();
                RestoreOutcome::DiscardedCorruptRecord
            }
        }
    }

    /// Drop the session and any delegation. The in-memory state is always
    /// cleared, even when the persisted record cannot be removed.
    pub fn sign_out(&mut self) -> Result<(), StoreError> {
        self.state.clear();
        self.persistence.clear()?;
        Ok(())
    }
}
