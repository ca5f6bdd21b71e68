#![expect(clippy::expect_used, reason = "test assertions")]

//! Access records written by the gateway.

use axum::http::StatusCode;
use serde_json::json;
use test_util::{
    RecordedEvent,
    Scripted,
    ScriptedEngine,
    TestApp,
    capture_events,
    get,
    post_json,
    post_raw,
    test_settings,
};
use tla_web::{
    GatewaySettings,
    api::{PING_ROUTE, VERIFY_ROUTE},
    engine::Command,
    gateway::ACCESS_LOG_TARGET,
};
use tracing::Level;

fn only(events: &[RecordedEvent]) -> &RecordedEvent {
    assert_eq!(events.len(), 1, "expected one access record: {events:?}");
    events.first().expect("one event")
}

#[tokio::test]
async fn successful_request_is_logged_at_info() {
    let capture = capture_events();
    let app = TestApp::new(test_settings(), ScriptedEngine::new());

    let response = app
        .send(get(PING_ROUTE, "192.0.2.10").expect("request"))
        .await
        .expect("send");
    assert_eq!(response.status, StatusCode::OK);

    let records = capture.with_target(ACCESS_LOG_TARGET);
    let record = only(&records);
    assert_eq!(record.level(), Level::INFO);
    assert_eq!(record.message(), Some("request completed"));
    assert_eq!(record.field("method"), Some("GET"));
    assert_eq!(record.field("path"), Some(PING_ROUTE));
    assert_eq!(record.field("status"), Some("200"));
    assert_eq!(record.field("caller"), Some("192.0.2.10"));
    assert!(record.field("duration_ms").is_some());
    let request_id = response.header("x-request-id").expect("request id header");
    assert_eq!(record.field("request_id"), Some(request_id));
}

#[tokio::test]
async fn client_errors_are_logged_with_their_status() {
    let capture = capture_events();
    let app = TestApp::new(test_settings(), ScriptedEngine::new());

    let response = app
        .send(post_raw(VERIFY_ROUTE, "text/plain", "spec", "192.0.2.11").expect("request"))
        .await
        .expect("send");
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let records = capture.with_target(ACCESS_LOG_TARGET);
    let record = only(&records);
    assert_eq!(record.level(), Level::INFO);
    assert_eq!(record.field("status"), Some("415"));
    assert_eq!(record.field("method"), Some("POST"));
    assert_eq!(record.field("request_id"), response.request_id());
}

#[tokio::test]
async fn server_errors_are_logged_at_error() {
    let capture = capture_events();
    let engine = ScriptedEngine::new().with(Command::Check, Scripted::Panic);
    let app = TestApp::new(test_settings(), engine);

    let body = json!({"tla": "---- MODULE m ----\n====", "inv": "Inv"});
    let response = app
        .send(post_json(VERIFY_ROUTE, &body, "192.0.2.12").expect("request"))
        .await
        .expect("send");
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    let records = capture.with_target(ACCESS_LOG_TARGET);
    let record = only(&records);
    assert_eq!(record.level(), Level::ERROR);
    assert_eq!(record.message(), Some("request failed"));
    assert_eq!(record.field("status"), Some("500"));
}

#[tokio::test]
async fn rate_limited_requests_are_logged() {
    let capture = capture_events();
    let settings = GatewaySettings {
        rate_limit_max_requests: 1,
        ..test_settings()
    };
    let app = TestApp::new(settings, ScriptedEngine::new());

    for _ in 0..2 {
        app.send(get(PING_ROUTE, "192.0.2.13").expect("request"))
            .await
            .expect("send");
    }
    let statuses: Vec<String> = capture
        .with_target(ACCESS_LOG_TARGET)
        .iter()
        .filter_map(|record| record.field("status").map(ToOwned::to_owned))
        .collect();
    assert_eq!(statuses, ["200", "429"]);
}

#[tokio::test]
async fn non_api_paths_are_not_access_logged() {
    let capture = capture_events();
    let app = TestApp::new(test_settings(), ScriptedEngine::new());

    let response = app
        .send(get("/index.html", "192.0.2.14").expect("request"))
        .await
        .expect("send");
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(capture.with_target(ACCESS_LOG_TARGET).is_empty());
}
