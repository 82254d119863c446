use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;

use superfrais::config::{Config, IdentityBackend};
use superfrais::identity::gotrue::GoTrueProvider;
use superfrais::identity::{IdentityProvider, ProviderError};

const KEY: &str = "service-role-key";
const USER_ID: &str = "6f1c2b7e-0d3a-4f5e-9a8b-1c2d3e4f5a6b";
const PAGE: usize = 1000;

fn is_service_role(headers: &HeaderMap) -> bool {
    let bearer = format!("Bearer {KEY}");
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(KEY)
        && headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(bearer.as_str())
}

fn user_json(email: &str) -> Value {
    json!({ "id": USER_ID, "aud": "authenticated", "email": email, "role": "authenticated" })
}

fn session_json(email: &str) -> Value {
    json!({
        "access_token": "user-access",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": 1_900_000_000,
        "refresh_token": "user-refresh",
        "user": user_json(email),
    })
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Two pages of users: a full first page of fillers, then the admin.
async fn list_users(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !is_service_role(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({ "msg": "forbidden" }));
    }
    let users: Vec<Value> = match q.get("page").map(String::as_str) {
        Some("1") => (0..PAGE)
            .map(|i| json!({ "id": uuid::Uuid::new_v4(), "email": format!("filler{i}@x.com") }))
            .collect(),
        Some("2") => vec![user_json("admin@x.com")],
        _ => vec![],
    };
    Json(json!({ "users": users, "aud": "authenticated" })).into_response()
}

async fn generate_link(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !is_service_role(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({ "msg": "forbidden" }));
    }
    match body["email"].as_str() {
        Some("top@x.com") => Json(json!({ "hashed_token": "top-level" })).into_response(),
        Some("nested@x.com") => {
            Json(json!({ "properties": { "hashed_token": "nested" } })).into_response()
        }
        _ => Json(json!({ "action_link": "https://example.invalid" })).into_response(),
    }
}

async fn verify(Json(body): Json<Value>) -> Response {
    match body["token_hash"].as_str() {
        Some("top-level") | Some("nested") => Json(session_json("admin@x.com")).into_response(),
        _ => error(StatusCode::FORBIDDEN, json!({ "msg": "Token has expired or is invalid" })),
    }
}

async fn token(Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>) -> Response {
    match q.get("grant_type").map(String::as_str) {
        Some("password") if body["password"] == "right" => {
            Json(session_json(body["email"].as_str().unwrap_or_default())).into_response()
        }
        Some("refresh_token") if body["refresh_token"] == "user-refresh" => {
            Json(session_json("admin@x.com")).into_response()
        }
        _ => error(StatusCode::BAD_REQUEST, json!({ "error": "invalid_grant" })),
    }
}

async fn current_user(headers: HeaderMap) -> Response {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer user-access") => Json(user_json("admin@x.com")).into_response(),
        _ => error(StatusCode::UNAUTHORIZED, json!({ "msg": "invalid JWT" })),
    }
}

async fn create_user(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !is_service_role(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({ "msg": "forbidden" }));
    }
    match body["email"].as_str() {
        Some("taken@x.com") => error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "msg": "A user with this email address has already been registered" }),
        ),
        Some(email) => Json(user_json(email)).into_response(),
        None => error(StatusCode::BAD_REQUEST, json!({ "msg": "email required" })),
    }
}

async fn delete_user(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !is_service_role(&headers) {
        return error(StatusCode::UNAUTHORIZED, json!({ "msg": "forbidden" }));
    }
    if id == USER_ID {
        Json(json!({})).into_response()
    } else {
        error(StatusCode::NOT_FOUND, json!({ "msg": "User not found" }))
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn spawn_gotrue() -> SocketAddr {
    let app = Router::new()
        .route("/auth/v1/admin/users", get(list_users).post(create_user))
        .route("/auth/v1/admin/users/{id}", delete(delete_user))
        .route("/auth/v1/admin/generate_link", post(generate_link))
        .route("/auth/v1/verify", post(verify))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/user", get(current_user))
        .route("/auth/v1/logout", post(logout));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("GoTrue stand-in failed");
    });
    addr
}

async fn provider(key: Option<&str>) -> GoTrueProvider {
    let addr = spawn_gotrue().await;
    GoTrueProvider::new(&format!("http://{addr}/"), key.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn finds_user_on_a_later_page() {
    let gotrue = provider(Some(KEY)).await;

    let user = gotrue.find_user_by_email("admin@x.com").await.unwrap().unwrap();
    assert_eq!(user.id.to_string(), USER_ID);

    let filler = gotrue.find_user_by_email("filler999@x.com").await.unwrap();
    assert!(filler.is_some());

    assert!(gotrue.find_user_by_email("ghost@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn reads_hashed_token_from_either_location() {
    let gotrue = provider(Some(KEY)).await;

    let top = gotrue.generate_magic_link("top@x.com").await.unwrap();
    assert_eq!(top.hashed_token, "top-level");

    let nested = gotrue.generate_magic_link("nested@x.com").await.unwrap();
    assert_eq!(nested.hashed_token, "nested");

    let missing = gotrue.generate_magic_link("plain@x.com").await;
    assert!(matches!(missing, Err(ProviderError::Upstream(_))));

    let session = gotrue.verify_magic_link(&nested.hashed_token).await.unwrap();
    assert_eq!(session.user.email, "admin@x.com");
    assert_eq!(session.refresh_token, "user-refresh");

    let reused = gotrue.verify_magic_link("stale").await;
    assert!(matches!(reused, Err(ProviderError::InvalidToken(_))));
}

#[tokio::test]
async fn client_errors_map_to_provider_errors() {
    let gotrue = provider(Some(KEY)).await;

    let wrong = gotrue.sign_in_with_password("admin@x.com", "wrong").await;
    assert!(matches!(wrong, Err(ProviderError::InvalidCredentials)));

    let session = gotrue
        .sign_in_with_password("admin@x.com", "right")
        .await
        .unwrap();
    assert_eq!(session.token_type, "bearer");

    let bad_token = gotrue.get_user("forged").await;
    assert!(matches!(bad_token, Err(ProviderError::InvalidToken(_))));
    let user = gotrue.get_user(&session.access_token).await.unwrap();
    assert_eq!(user.email, "admin@x.com");

    let taken = gotrue.create_user("taken@x.com", "password123", "Taken").await;
    assert!(matches!(taken, Err(ProviderError::EmailTaken)));
    let created = gotrue
        .create_user("new@x.com", "password123", "New")
        .await
        .unwrap();
    assert_eq!(created.email, "new@x.com");

    let stale = gotrue.refresh_session("stale").await;
    assert!(matches!(stale, Err(ProviderError::InvalidToken(_))));
    gotrue.refresh_session(&session.refresh_token).await.unwrap();

    gotrue.sign_out(&session.access_token).await.unwrap();

    gotrue.delete_user(created.id).await.unwrap();
    // Already gone counts as removed.
    gotrue.delete_user(uuid::Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn missing_key_fails_before_any_request() {
    let gotrue = GoTrueProvider::new("http://127.0.0.1:1", None).unwrap();

    let lookup = gotrue.find_user_by_email("admin@x.com").await;
    assert!(matches!(lookup, Err(ProviderError::MissingSecret("SERVICE_ROLE_KEY"))));

    let link = gotrue.generate_magic_link("admin@x.com").await;
    assert!(matches!(link, Err(ProviderError::MissingSecret(_))));
}

#[tokio::test]
async fn missing_key_is_reported_as_server_error() {
    let addr = spawn_gotrue().await;

    // Never connected: the request fails before touching the database.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://superfrais@127.0.0.1:1/unused")
        .unwrap();
    let config = Config {
        database_url: "postgres://superfrais@127.0.0.1:1/unused".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        log_level: "warn".to_string(),
        identity: IdentityBackend::GoTrue {
            url: format!("http://{addr}"),
            service_role_key: None,
        },
    };
    let app = superfrais::build_app(superfrais::build_state(pool, config).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let resp = reqwest::Client::new()
        .post(format!("http://{server}/sub-user-auth/authenticate"))
        .json(&json!({ "admin_email": "admin@x.com", "username": "bob", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing SERVICE_ROLE_KEY secret");

    // Local sign-up routes are not served with a hosted provider.
    let resp = reqwest::Client::new()
        .post(format!("http://{server}/auth/signup"))
        .json(&json!({ "email": "a@x.com", "password": "password123", "full_name": "A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
