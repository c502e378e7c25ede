//! HTTP surface tests, driven through the router without a socket.

mod support;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use colabri_folder::build_app;
use serde_json::{json, Value};
use support::*;
use tower::ServiceExt;

async fn get(app: Router, uri: &str, token: Option<String>) -> (StatusCode, Value) {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_and_ready_are_public() {
    let app = build_app(test_state());

    let (status, body) = get(app.clone(), "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let (status, body) = get(app, "/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn test_diagnostics_requires_admin() {
    let app = build_app(test_state());

    let (status, _) = get(app.clone(), "/api/v1/diagnostics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(app.clone(), "/api/v1/diagnostics", Some(token_for("u1", "User", &[]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, body) = get(app, "/api/v1/diagnostics", Some(token_for("root", "Root", &["admin"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_conn"], 0);
}

#[tokio::test]
async fn test_presence_reflects_live_connections() {
    let state = test_state();
    let addr = start_test_server(state.clone()).await;
    let app = build_app(state);

    let mut alice = connect(addr, "alice", "Alice").await;
    send_json(&mut alice, json!({"type": "join", "folderId": "f1"})).await;
    expect_message(&mut alice).await;

    let (status, body) = get(app.clone(), "/api/v1/folders/f1/presence", Some(token_for("bob", "Bob", &[]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folderId"], "f1");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["users"][0]["userId"], "alice");
    assert_eq!(body["users"][0]["userName"], "Alice");

    let (status, body) = get(app, "/api/v1/folders/empty/presence", Some(token_for("bob", "Bob", &[]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"], json!([]));
}
