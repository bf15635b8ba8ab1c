//! Integration tests for the fan-out HTTP surface.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use taskpulse_fanout::session::SessionHandle;
use taskpulse_fanout::state::AppState;
use taskpulse_fanout::{SessionRegistry, build_router};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body was not JSON")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

#[tokio::test]
async fn index_serves_html() {
    let router = build_router(Arc::new(AppState::new()));
    let response = router.oneshot(get("/")).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn healthz_reports_ok_with_gauges() {
    let router = build_router(Arc::new(AppState::new()));
    let response = router.oneshot(get("/healthz")).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["fanout"]["open_sessions"], 0);
}

#[tokio::test]
async fn sessions_endpoint_lists_live_sessions() {
    let registry = Arc::new(SessionRegistry::new());
    let state = Arc::new(AppState::with_registry(Arc::clone(&registry), 64));

    let session = SessionHandle::new(64);
    registry.register(Arc::clone(&session)).await;
    registry
        .subscribe(session.id(), &["task-1".to_owned(), "task-2".to_owned()])
        .await;

    let router = build_router(state);
    let response = router
        .oneshot(get("/api/sessions"))
        .await
        .expect("request failed");
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["sessions"][0]["state"], "open");
    assert_eq!(json["sessions"][0]["topics"][0], "task-1");
    assert_eq!(json["totals"]["subscribed_topics"], 2);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let router = build_router(Arc::new(AppState::new()));
    let response = router
        .oneshot(get("/api/nothing"))
        .await
        .expect("request failed");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
