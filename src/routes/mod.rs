pub mod accounts;
pub mod auth;
pub mod profiles;
pub mod sub_users;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::SharedState;

/// The sub-user credential service. Anything but POST on its three paths
/// (and OPTIONS preflight) answers 404.
pub fn sub_user_routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/sub-user-auth/create",
            post(sub_users::create)
                .options(sub_users::preflight)
                .fallback(sub_users::route_not_found),
        )
        .route(
            "/sub-user-auth/update",
            post(sub_users::update)
                .options(sub_users::preflight)
                .fallback(sub_users::route_not_found),
        )
        .route(
            "/sub-user-auth/authenticate",
            post(sub_users::authenticate)
                .options(sub_users::preflight)
                .fallback(sub_users::route_not_found),
        )
}

pub fn account_routes() -> Router<SharedState> {
    Router::new()
        .route("/create-user", post(accounts::create_user))
        // Profiles
        .route(
            "/profile",
            get(profiles::get_own).patch(profiles::update_own),
        )
        .route("/profiles", get(profiles::list))
        .route("/profiles/{id}/role", put(profiles::update_role))
        .route("/sub-users", get(profiles::list_sub_users))
        .route("/audit-events", get(profiles::list_audit_events))
}

/// Sign-up and session endpoints, only served when this service is its own
/// identity provider.
pub fn local_auth_routes() -> Router<SharedState> {
    Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/token", post(auth::token))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
}
