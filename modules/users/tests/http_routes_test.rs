//! HTTP route tests for the users service
//!
//! Drive the full router with `tower::ServiceExt::oneshot` over an in-memory
//! store and bus; no server or broker is needed.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use event_bus::{decode_event, Decoded};
use platform_contracts::{UserEvent, USER_EVENTS_QUEUE};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use users_rs::config::AdminSeed;
use users_rs::models::{UserCreate, UserRole, UserUpdate};
use users_rs::{routes, AppContainer};

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn register(app: &Router, username: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "pw-123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["access_token"].as_str().unwrap().to_string()
}

async fn make_admin(container: &Arc<AppContainer>, id: &str) {
    container
        .manager
        .update_user(
            id,
            UserUpdate {
                role: Some(UserRole::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_register_login_and_me() {
    let (container, bus) = common::container();
    let app = routes::router(container);

    let user = register(&app, "alice").await;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["role"], "user");
    assert!(user.get("password_hash").is_none());

    let token = login(&app, "alice", "pw-123").await;
    let (status, me) = call(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user["id"]);

    let payloads = bus.ready_payloads(USER_EVENTS_QUEUE);
    assert_eq!(payloads.len(), 1);
    match decode_event::<UserEvent>(&payloads[0]).unwrap() {
        Decoded::Known(envelope) => assert_eq!(envelope.event.user_id(), user["id"].as_str().unwrap()),
        Decoded::Unknown { event_type } => panic!("unexpected {}", event_type),
    }
}

#[tokio::test]
async fn test_register_conflict_and_validation() {
    let (container, _bus) = common::container();
    let app = routes::router(container);
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "email": "a2@example.com", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already registered");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "bob", "email": "bob@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "bob", "email": "bob.example.com", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let (container, _bus) = common::container();
    let app = routes::router(container);
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "incorrect username or password");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (container, _bus) = common::container();
    let app = routes::router(container);

    let (status, _) = call(&app, Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/api/users/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_users_only_reach_themselves() {
    let (container, _bus) = common::container();
    let app = routes::router(container);
    register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alice_token = login(&app, "alice", "pw-123").await;
    let bob_path = format!("/api/users/{}", bob["id"].as_str().unwrap());

    let (status, _) = call(&app, Method::GET, &bob_path, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &bob_path, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::GET, "/api/users", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_only_admins_change_roles() {
    let (container, _bus) = common::container();
    let app = routes::router(container.clone());
    let alice = register(&app, "alice").await;
    let alice_id = alice["id"].as_str().unwrap();
    let alice_path = format!("/api/users/{}", alice_id);
    let token = login(&app, "alice", "pw-123").await;

    let (status, _) = call(&app, Method::PUT, &alice_path, Some(&token), Some(json!({ "role": "admin" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::PUT,
        &alice_path,
        Some(&token),
        Some(json!({ "email": "alice@new.example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@new.example.com");

    make_admin(&container, alice_id).await;
    let (status, users) = call(&app, Method::GET, "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_user_publishes_and_revokes_access() {
    let (container, bus) = common::container();
    let app = routes::router(container);
    let alice = register(&app, "alice").await;
    let token = login(&app, "alice", "pw-123").await;
    let path = format!("/api/users/{}", alice["id"].as_str().unwrap());

    let (status, _) = call(&app, Method::DELETE, &path, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let payloads = bus.ready_payloads(USER_EVENTS_QUEUE);
    assert_eq!(payloads.len(), 2);
    match decode_event::<UserEvent>(&payloads[1]).unwrap() {
        Decoded::Known(envelope) => assert!(matches!(envelope.event, UserEvent::UserDeleted { .. })),
        Decoded::Unknown { event_type } => panic!("unexpected {}", event_type),
    }
}

#[tokio::test]
async fn test_password_change_and_admin_reset() {
    let (container, _bus) = common::container();
    let app = routes::router(container.clone());
    let admin = register(&app, "root").await;
    make_admin(&container, admin["id"].as_str().unwrap()).await;
    let alice = register(&app, "alice").await;

    let token = login(&app, "alice", "pw-123").await;
    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/users/me/password",
        Some(&token),
        Some(json!({ "current_password": "wrong", "new_password": "pw-456" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/users/me/password",
        Some(&token),
        Some(json!({ "current_password": "pw-123", "new_password": "pw-456" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    login(&app, "alice", "pw-456").await;

    let admin_token = login(&app, "root", "pw-123").await;
    let reset_path = format!("/api/users/{}/reset-password", alice["id"].as_str().unwrap());
    let (status, _) = call(
        &app,
        Method::PUT,
        &reset_path,
        Some(&admin_token),
        Some(json!({ "new_password": "pw-789" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    login(&app, "alice", "pw-789").await;
}

#[tokio::test]
async fn test_seeded_admin_gives_replayed_user_credentials() {
    let (container, _bus) = common::container();
    let app = routes::router(container.clone());
    let seed = AdminSeed {
        username: "root".to_string(),
        email: "root@example.com".to_string(),
        password: "seed-pw".to_string(),
    };
    container.manager.ensure_admin(&seed).await.unwrap();
    container
        .manager
        .register_user(UserCreate::replayed(
            "remote-1".to_string(),
            "carol".to_string(),
            "carol@example.com".to_string(),
        ))
        .await
        .unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "carol", "password": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin_token = login(&app, "root", "seed-pw").await;
    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/users/remote-1/reset-password",
        Some(&admin_token),
        Some(json!({ "new_password": "carol-pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    login(&app, "carol", "carol-pw").await;
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (container, bus) = common::container();
    let app = routes::router(container);

    let (status, _) = call(&app, Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);

    // Never connected yet
    let (status, _) = call(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    event_bus::EventBus::connect(&bus).await.unwrap();
    let (status, body) = call(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, body) = call(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("users_http_requests_total"));
    assert!(text.contains("path=\"/health/ready\""));
}
