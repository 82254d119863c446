use uuid::Uuid;

use superfrais::dto::{AuthenticateData, SubUserIdentity};
use superfrais::identity::{ProviderUser, Session};
use superfrais::session::realtime::{counter_subscriptions, needs_resubscribe};
use superfrais::session::{
    AuthStore, DelegatedSessionRecord, DisplayIdentity, FileSessionStore, MemorySessionStore,
    RestoreOutcome, SessionPersistence, StoreError,
};

fn admin_user() -> ProviderUser {
    ProviderUser {
        id: Uuid::new_v4(),
        email: "a@x.com".to_string(),
        created_at: None,
    }
}

fn session_for(user: &ProviderUser) -> Session {
    Session {
        access_token: "access".to_string(),
        token_type: "bearer".to_string(),
        expires_in: 900,
        expires_at: 0,
        refresh_token: "refresh".to_string(),
        user: user.clone(),
    }
}

fn bob() -> SubUserIdentity {
    SubUserIdentity {
        id: Uuid::new_v4(),
        username: "bob".to_string(),
        full_name: "Bob B".to_string(),
        role: "employee".to_string(),
    }
}

fn admin_login(user: &ProviderUser) -> AuthenticateData {
    AuthenticateData {
        session: session_for(user),
        user: user.clone(),
        is_admin: true,
        sub_user: None,
        admin_email: None,
        admin_id: None,
        authenticated: None,
    }
}

fn delegated_login(user: &ProviderUser, sub_user: &SubUserIdentity) -> AuthenticateData {
    AuthenticateData {
        session: session_for(user),
        user: user.clone(),
        is_admin: false,
        sub_user: Some(sub_user.clone()),
        admin_email: Some(user.email.clone()),
        admin_id: Some(user.id),
        authenticated: Some(true),
    }
}

#[test]
fn delegated_login_persists_record_and_shows_sub_user() {
    let admin = admin_user();
    let sub_user = bob();
    let mut store = AuthStore::new(MemorySessionStore::new());

    store
        .apply_authentication(delegated_login(&admin, &sub_user))
        .unwrap();

    let state = store.state();
    assert!(state.is_sub_user());
    assert!(!state.loading);
    let profile = state.profile.as_ref().unwrap();
    assert_eq!(profile.id, admin.id);
    assert_eq!(profile.email, "a@x.com");
    assert_eq!(profile.full_name, "Bob B");
    assert_eq!(profile.role, "employee");

    let saved = store.persistence().load().unwrap().unwrap();
    assert_eq!(saved.admin_id, admin.id);
    assert_eq!(saved.sub_user, sub_user);

    let raw = store.persistence().raw().unwrap();
    assert!(raw.contains("\"adminEmail\""));
    assert!(raw.contains("\"subUser\""));
}

#[test]
fn admin_login_clears_stale_delegation() {
    let admin = admin_user();
    let mut store = AuthStore::new(MemorySessionStore::new());

    store
        .apply_authentication(delegated_login(&admin, &bob()))
        .unwrap();
    store.apply_authentication(admin_login(&admin)).unwrap();

    assert!(!store.state().is_sub_user());
    assert!(store.state().profile.is_none());
    assert!(store.state().session.is_some());
    assert!(store.persistence().raw().is_none());

    let identity = store.effective_identity().unwrap();
    assert_eq!(identity.display, DisplayIdentity::Admin);
    assert_eq!(identity.display_id(), admin.id);
}

#[test]
fn incomplete_delegated_response_is_rejected() {
    let admin = admin_user();
    let mut data = delegated_login(&admin, &bob());
    data.admin_id = None;

    let mut store = AuthStore::new(MemorySessionStore::new());
    let result = store.apply_authentication(data);

    assert!(matches!(result, Err(StoreError::IncompleteResponse)));
    assert!(store.state().session.is_none());
    assert!(store.persistence().raw().is_none());
}

#[test]
fn restore_rebuilds_delegated_identity_without_server() {
    let admin = admin_user();
    let sub_user = bob();
    let record = DelegatedSessionRecord {
        admin_email: admin.email.clone(),
        admin_id: admin.id,
        sub_user: sub_user.clone(),
    };
    let persistence = MemorySessionStore::new();
    persistence.save(&record).unwrap();

    let mut store = AuthStore::new(persistence);
    let outcome = store.restore(Some(session_for(&admin)));

    let RestoreOutcome::Delegated(identity) = outcome else {
        panic!("expected delegated restore, got {outcome:?}");
    };
    assert_eq!(identity.session_owner_id, admin.id);
    assert_eq!(identity.display_id(), sub_user.id);
    assert!(identity.is_delegated());
    assert_eq!(store.state().profile.as_ref().unwrap().full_name, "Bob B");
    assert!(!store.state().loading);
}

#[test]
fn restore_plain_session_needs_profile() {
    let admin = admin_user();
    let mut store = AuthStore::new(MemorySessionStore::new());

    let outcome = store.restore(Some(session_for(&admin)));

    assert_eq!(outcome, RestoreOutcome::NeedsProfile { user_id: admin.id });
    assert!(store.state().session.is_some());
    assert!(!store.state().is_sub_user());
}

#[test]
fn restore_discards_corrupt_record() {
    let admin = admin_user();
    let mut store = AuthStore::new(MemorySessionStore::with_raw("{not json"));

    let outcome = store.restore(Some(session_for(&admin)));

    assert_eq!(outcome, RestoreOutcome::DiscardedCorruptRecord);
    assert!(store.persistence().raw().is_none());
    assert!(store.state().session.is_none());
    assert!(store.state().profile.is_none());
    assert!(!store.state().is_authenticated());
}

#[test]
fn restore_without_session_keeps_record() {
    let admin = admin_user();
    let mut store = AuthStore::new(MemorySessionStore::new());
    store
        .apply_authentication(delegated_login(&admin, &bob()))
        .unwrap();

    let outcome = store.restore(None);

    assert_eq!(outcome, RestoreOutcome::Unauthenticated);
    assert!(store.state().session.is_none());
    assert!(store.persistence().raw().is_some());
}

#[test]
fn sign_out_clears_state_and_record() {
    let admin = admin_user();
    let mut store = AuthStore::new(MemorySessionStore::new());
    store
        .apply_authentication(delegated_login(&admin, &bob()))
        .unwrap();

    store.sign_out().unwrap();

    assert!(!store.state().is_authenticated());
    assert!(!store.state().is_sub_user());
    assert!(store.effective_identity().is_none());
    assert!(store.persistence().raw().is_none());
}

#[test]
fn file_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let admin = admin_user();
    let sub_user = bob();

    {
        let mut store = AuthStore::new(FileSessionStore::in_dir(dir.path()));
        store
            .apply_authentication(delegated_login(&admin, &sub_user))
            .unwrap();
        assert!(store.persistence().path().ends_with("subUserAuth.json"));
    }

    let mut store = AuthStore::new(FileSessionStore::in_dir(dir.path()));
    let outcome = store.restore(Some(session_for(&admin)));
    assert!(matches!(outcome, RestoreOutcome::Delegated(ref id) if id.display_id() == sub_user.id));

    store.sign_out().unwrap();
    assert!(!dir.path().join("subUserAuth.json").exists());

    // Clearing an absent file is fine.
    store.sign_out().unwrap();
}

#[test]
fn file_store_reports_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::in_dir(dir.path());
    std::fs::write(store.path(), "garbage").unwrap();

    assert!(store.load().is_err());
}

#[test]
fn counters_follow_the_person_at_the_keyboard() {
    let admin = admin_user();
    let sub_user = bob();
    let mut store = AuthStore::new(MemorySessionStore::new());

    store.apply_authentication(admin_login(&admin)).unwrap();
    let as_admin = store.effective_identity().unwrap();
    let subs = counter_subscriptions(&as_admin);
    assert_eq!(subs[0].table, "notifications");
    assert_eq!(subs[0].filter, format!("user_id=eq.{}", admin.id));
    assert_eq!(subs[1].table, "messages");
    assert_eq!(subs[1].filter, format!("sent_to=eq.{}", admin.id));

    store
        .apply_authentication(delegated_login(&admin, &sub_user))
        .unwrap();
    let as_sub_user = store.effective_identity().unwrap();
    assert_eq!(as_sub_user.session_owner_id, admin.id);
    let subs = counter_subscriptions(&as_sub_user);
    assert_eq!(subs[0].filter, format!("user_id=eq.{}", sub_user.id));
    assert_eq!(subs[1].filter, format!("sent_to=eq.{}", sub_user.id));

    assert!(needs_resubscribe(Some(&as_admin), Some(&as_sub_user)));
    assert!(!needs_resubscribe(Some(&as_sub_user), Some(&as_sub_user)));
    assert!(needs_resubscribe(Some(&as_sub_user), None));
}

#[test]
fn restore_ignores_record_of_another_account() {
    let admin_a = admin_user();
    let admin_b = ProviderUser {
        id: Uuid::new_v4(),
        email: "b@x.com".to_string(),
        created_at: None,
    };
    let mut boss = bob();
    boss.role = "admin".to_string();

    let persistence = MemorySessionStore::new();
    persistence
        .save(&DelegatedSessionRecord {
            admin_email: admin_a.email.clone(),
            admin_id: admin_a.id,
            sub_user: boss,
        })
        .unwrap();

    let mut store = AuthStore::new(persistence);
    let outcome = store.restore(Some(session_for(&admin_b)));

    assert_eq!(outcome, RestoreOutcome::NeedsProfile { user_id: admin_b.id });
    assert!(store.persistence().raw().is_none());
    assert!(!store.state().is_sub_user());
    assert!(store.state().profile.is_none());

    let identity = store.effective_identity().unwrap();
    assert_eq!(identity.session_owner_id, admin_b.id);
    assert_eq!(identity.display, DisplayIdentity::Admin);
}

#[tokio::test]
async fn sign_out_clears_store_when_server_is_unreachable() {
    let admin = admin_user();
    let mut store = AuthStore::new(MemorySessionStore::new());
    store
        .apply_authentication(delegated_login(&admin, &bob()))
        .unwrap();

    let client = superfrais::client::SubUserAuthClient::new("http://127.0.0.1:1").unwrap();
    client.sign_out(&mut store).await.unwrap();

    assert!(!store.state().is_authenticated());
    assert!(store.persistence().raw().is_none());
}
