//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use storyloom_rounds::coordinator::{Coordinator, CoordinatorConfig};
use storyloom_test_support::{FixedClock, MemoryLobbyRepository};

use storyloom_api::connections::{ConnectionRegistry, WsNotifier};
use storyloom_api::routes;
use storyloom_api::state::AppState;

/// Build the full app router over the in-memory repository with a
/// deterministic clock. Uses the same route structure as `main.rs`.
pub fn build_test_app() -> Router {
    let clock = FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    );
    let registry = Arc::new(ConnectionRegistry::new());
    let notifier = Arc::new(WsNotifier::new(Arc::clone(&registry)));
    let coordinator = Coordinator::new(
        Arc::new(MemoryLobbyRepository::new()),
        Arc::new(clock),
        notifier,
        CoordinatorConfig::default(),
    );
    let app_state = AppState::new(coordinator, registry);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::ws::router())
        .with_state(app_state)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
