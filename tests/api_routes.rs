#![expect(clippy::expect_used, reason = "test assertions")]

//! Route behaviour against a scripted engine.

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use test_util::{
    FakeConnector,
    Scripted,
    ScriptedEngine,
    TestApp,
    get,
    post_json,
    post_raw,
    test_settings,
};
use tla_web::{
    GatewaySettings,
    api::{INVARIANTS_ROUTE, PING_ROUTE, SIMULATE_ROUTE, VERIFY_ROUTE},
    engine::{Command, RunResponse},
    gateway::REQUEST_ID_HEADER,
};

const SPEC: &str = "---- MODULE counter ----\nVARIABLE x\nInit == x = 0\nNext == x' = x + \
                    1\nTypeOk == x \\in Nat\n====";
const CALLER: &str = "10.0.0.1";

fn typecheck_payload() -> String {
    json!({"modules": [{"declarations": [
        {"name": "Init", "type": "Bool"},
        {"name": "Next", "type": "(() => Bool)"},
        {"name": "Zeta", "type": "Bool"},
        {"name": "InvB", "type": "Bool"},
        {"name": "InvA", "type": "(() => Bool)"},
        {"name": "InvA", "type": "Bool"},
        {"name": "x", "type": "Int"},
    ]}]})
    .to_string()
}

fn counterexample_failure() -> RunResponse {
    let data = json!({
        "pass_name": "BoundedChecker",
        "error_data": {"counterexamples": [
            {"states": [
                {"#meta": {"index": 0}, "x": 0},
                {"#meta": {"index": 1}, "x": 1},
            ]},
            {"states": [{"#meta": {"index": 0}, "x": 7}]},
        ]},
    });
    RunResponse::failure("PASS_FAILURE", data.to_string())
}

fn spec_body() -> Value { json!({"tla": SPEC}) }

fn verify_body(inv: &str) -> Value { json!({"tla": SPEC, "inv": inv}) }

#[fixture]
fn app() -> TestApp {
    let engine = ScriptedEngine::new()
        .with(
            Command::Typecheck,
            Scripted::Reply(RunResponse::success(typecheck_payload())),
        )
        .with(Command::Check, Scripted::Reply(RunResponse::success("{}")));
    TestApp::new(test_settings(), engine)
}

#[rstest]
#[tokio::test]
async fn ping_reports_ok(app: TestApp) {
    let response = app.send(get(PING_ROUTE, CALLER).expect("request")).await.expect("send");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"status": "ok"}));
    assert_eq!(app.engine.ping_count(), 1);
}

#[rstest]
#[case::retry_recovers(1, StatusCode::OK, 2)]
#[case::retry_fails(2, StatusCode::SERVICE_UNAVAILABLE, 2)]
#[tokio::test]
async fn ping_refreshes_channel_once(
    app: TestApp,
    #[case] failing: usize,
    #[case] expected: StatusCode,
    #[case] pings: usize,
) {
    app.engine.fail_pings(failing);
    let response = app.send(get(PING_ROUTE, CALLER).expect("request")).await.expect("send");
    assert_eq!(response.status, expected);
    assert_eq!(app.engine.ping_count(), pings);
    assert_eq!(app.connector.attempts(), 2, "refresh reconnects");
    if expected != StatusCode::OK {
        assert_eq!(response.body.get("status"), Some(&json!("error")));
        let message = response.body.get("message").and_then(Value::as_str);
        assert!(message.is_some_and(|text| !text.is_empty()));
    }
}

#[rstest]
#[case::reconnect_succeeds(1, StatusCode::OK)]
#[case::reconnect_fails(2, StatusCode::SERVICE_UNAVAILABLE)]
#[tokio::test]
async fn ping_without_channel_reconnects(#[case] failing: usize, #[case] expected: StatusCode) {
    let connector = FakeConnector::new(ScriptedEngine::new().into());
    connector.fail_next(failing);
    let app = TestApp::with_connector(test_settings(), connector);
    let response = app.send(get(PING_ROUTE, CALLER).expect("request")).await.expect("send");
    assert_eq!(response.status, expected);
    assert_eq!(app.connector.attempts(), 2);
}

#[rstest]
#[tokio::test]
async fn invariants_are_filtered_and_ranked(app: TestApp) {
    let request = post_json(INVARIANTS_ROUTE, &spec_body(), CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!(["InvA", "InvB", "Zeta"]));

    let runs = app.engine.runs();
    let run = runs.first().expect("one run");
    assert_eq!(run.command, Command::Typecheck);
    let config: Value = serde_json::from_str(&run.config).expect("config json");
    assert_eq!(
        config.pointer("/input/source/content").and_then(Value::as_str),
        Some(SPEC)
    );
}

#[rstest]
#[tokio::test]
async fn invariants_are_served_from_cache(app: TestApp) {
    for _ in 0..3 {
        let request = post_json(INVARIANTS_ROUTE, &spec_body(), CALLER).expect("request");
        let response = app.send(request).await.expect("send");
        assert_eq!(response.body, json!(["InvA", "InvB", "Zeta"]));
    }
    assert_eq!(app.engine.run_count(), 1);
}

#[rstest]
#[tokio::test]
async fn typecheck_failure_yields_no_candidates_and_is_not_cached(app: TestApp) {
    app.engine.script(
        Command::Typecheck,
        Scripted::Reply(RunResponse::failure(
            "PASS_FAILURE",
            r#"{"msg":"Parsing error"}"#,
        )),
    );
    for _ in 0..2 {
        let request = post_json(INVARIANTS_ROUTE, &spec_body(), CALLER).expect("request");
        let response = app.send(request).await.expect("send");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!([]));
    }
    assert_eq!(app.engine.run_count(), 2);
}

#[rstest]
#[tokio::test]
async fn malformed_typecheck_payload_is_bad_gateway(app: TestApp) {
    app.engine.script(
        Command::Typecheck,
        Scripted::Reply(RunResponse::success("not json")),
    );
    let request = post_json(INVARIANTS_ROUTE, &spec_body(), CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(
        response
            .error()
            .is_some_and(|message| message.starts_with("Upstream engine error"))
    );
}

#[rstest]
#[tokio::test]
async fn verify_reports_verified_with_provenance(app: TestApp) {
    let request = post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.get("result"), Some(&json!("Verified")));
    assert_eq!(response.body.get("length"), Some(&json!(10)));
    let description = response
        .body
        .get("description")
        .and_then(Value::as_str)
        .expect("description");
    assert!(description.starts_with("Created by Apalache on "));
    assert!(description.ends_with(" GMT"));

    let runs = app.engine.runs();
    let run = runs.first().expect("one run");
    assert_eq!(run.command, Command::Check);
    let config: Value = serde_json::from_str(&run.config).expect("config json");
    assert_eq!(config.pointer("/checker/inv/0"), Some(&json!("TypeOk")));
    assert_eq!(config.pointer("/checker/length"), Some(&json!(9)));
}

#[rstest]
#[tokio::test]
async fn violation_returns_first_counterexample_without_meta(app: TestApp) {
    app.engine
        .script(Command::Check, Scripted::Reply(counterexample_failure()));
    let request = post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.get("result"), Some(&json!("Violated")));
    assert_eq!(
        response.body.get("counterexample"),
        Some(&json!([{"x": 0}, {"x": 1}]))
    );
    assert!(response.body.get("description").is_some());
}

#[rstest]
#[tokio::test]
async fn engine_message_becomes_result(app: TestApp) {
    app.engine.script(
        Command::Check,
        Scripted::Reply(RunResponse::failure(
            "UNEXPECTED",
            r#"{"msg":"Operator TypeOk not found"}"#,
        )),
    );
    let request = post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body.get("result"),
        Some(&json!("Operator TypeOk not found"))
    );
}

#[rstest]
#[tokio::test]
async fn repeated_verification_is_identical_and_cached(app: TestApp) {
    let first = app
        .send(post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request"))
        .await
        .expect("send");
    let second = app
        .send(post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(first.body, second.body);
    assert_eq!(app.engine.run_count(), 1);

    app.send(post_json(VERIFY_ROUTE, &verify_body("Other"), CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(app.engine.run_count(), 2, "cache key includes the invariant");
}

const VERIFY_TTL: Duration = Duration::from_secs(2);
const INVARIANTS_TTL: Duration = Duration::from_secs(8);

fn expiring_app() -> TestApp {
    let settings = GatewaySettings {
        verify_cache_ttl: VERIFY_TTL,
        invariants_cache_ttl: INVARIANTS_TTL,
        ..test_settings()
    };
    let engine = ScriptedEngine::new()
        .with(
            Command::Typecheck,
            Scripted::Reply(RunResponse::success(typecheck_payload())),
        )
        .with(Command::Check, Scripted::Reply(RunResponse::success("{}")));
    TestApp::new(settings, engine)
}

async fn send_ok(app: &TestApp, route: &str, body: &Value) {
    let response = app
        .send(post_json(route, body, CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn verification_runs_again_once_its_ttl_elapses() {
    let app = expiring_app();
    let body = verify_body("TypeOk");

    send_ok(&app, VERIFY_ROUTE, &body).await;
    send_ok(&app, VERIFY_ROUTE, &body).await;
    assert_eq!(app.engine.run_count(), 1);

    tokio::time::advance(VERIFY_TTL - Duration::from_millis(1)).await;
    send_ok(&app, VERIFY_ROUTE, &body).await;
    assert_eq!(app.engine.run_count(), 1, "still fresh just before expiry");

    tokio::time::advance(Duration::from_millis(1)).await;
    send_ok(&app, VERIFY_ROUTE, &body).await;
    assert_eq!(app.engine.run_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn invariant_listing_runs_again_once_its_ttl_elapses() {
    let app = expiring_app();

    send_ok(&app, INVARIANTS_ROUTE, &spec_body()).await;
    send_ok(&app, INVARIANTS_ROUTE, &spec_body()).await;
    assert_eq!(app.engine.run_count(), 1);

    tokio::time::advance(VERIFY_TTL).await;
    send_ok(&app, INVARIANTS_ROUTE, &spec_body()).await;
    assert_eq!(app.engine.run_count(), 1, "listings outlive verdicts");

    tokio::time::advance(INVARIANTS_TTL - VERIFY_TTL).await;
    send_ok(&app, INVARIANTS_ROUTE, &spec_body()).await;
    assert_eq!(app.engine.run_count(), 2);
}

#[rstest]
#[tokio::test]
async fn simulation_strips_meta_and_is_never_cached(app: TestApp) {
    let payload = json!({"traces": [{"states": [{"#meta": {"index": 0}, "x": 0}]}]});
    app.engine.script(
        Command::Simulate,
        Scripted::Reply(RunResponse::success(payload.to_string())),
    );
    for _ in 0..2 {
        let request = post_json(SIMULATE_ROUTE, &spec_body(), CALLER).expect("request");
        let response = app.send(request).await.expect("send");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.get("result"), Some(&json!("Simulated")));
        assert_eq!(
            response.body.get("output"),
            Some(&json!({"traces": [{"states": [{"x": 0}]}]}))
        );
    }
    assert_eq!(app.engine.run_count(), 2);
}

#[rstest]
#[case::invariants(INVARIANTS_ROUTE)]
#[case::verify(VERIFY_ROUTE)]
#[case::simulate(SIMULATE_ROUTE)]
#[tokio::test]
async fn non_json_bodies_never_reach_the_engine(app: TestApp, #[case] route: &str) {
    let request = post_raw(route, "text/plain", SPEC, CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.error(), Some("Content-Type must be application/json"));
    assert_eq!(app.engine.run_count(), 0);
}

#[rstest]
#[case::malformed("{\"tla\": ", StatusCode::BAD_REQUEST, "Malformed JSON body")]
#[case::not_object("[1, 2]", StatusCode::BAD_REQUEST, "Request body must be a JSON object")]
#[case::missing_inv(
    "{\"tla\": \"x\"}",
    StatusCode::BAD_REQUEST,
    "Field 'inv' must be a string"
)]
#[case::empty_inv(
    "{\"tla\": \"x\", \"inv\": \"\"}",
    StatusCode::BAD_REQUEST,
    "Field 'inv' must be at least 1 character(s)"
)]
#[tokio::test]
async fn invalid_bodies_are_rejected(
    app: TestApp,
    #[case] body: &'static str,
    #[case] status: StatusCode,
    #[case] message: &str,
) {
    let request = post_raw(VERIFY_ROUTE, "application/json", body, CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, status);
    assert_eq!(response.error(), Some(message));
    assert_eq!(app.engine.run_count(), 0);
}

#[rstest]
#[tokio::test]
async fn overlong_invariant_is_payload_too_large(app: TestApp) {
    let inv = "I".repeat(300);
    let request = post_json(VERIFY_ROUTE, &verify_body(&inv), CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.engine.run_count(), 0);
}

#[tokio::test]
async fn oversized_body_is_payload_too_large() {
    let settings = GatewaySettings {
        max_body_bytes: 64,
        ..test_settings()
    };
    let app = TestApp::new(settings, ScriptedEngine::new());
    let body = json!({"tla": "x".repeat(200)});
    let request = post_json(INVARIANTS_ROUTE, &body, CALLER).expect("request");
    let response = app.send(request).await.expect("send");
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.error(), Some("Payload too large"));
}

#[rstest]
#[tokio::test]
async fn unknown_api_path_returns_envelope(app: TestApp) {
    let response = app
        .send(get("/api/unknown", CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.error(), Some("Not found"));
    let header = response.header(REQUEST_ID_HEADER.as_str()).expect("request id header");
    assert_eq!(response.request_id(), Some(header));
}

#[rstest]
#[tokio::test]
async fn inbound_request_id_is_echoed(app: TestApp) {
    let mut request = post_raw(VERIFY_ROUTE, "text/plain", SPEC, CALLER).expect("request");
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), HeaderValue::from_static("trace-42"));
    let response = app.send(request).await.expect("send");
    assert_eq!(response.header(REQUEST_ID_HEADER.as_str()), Some("trace-42"));
    assert_eq!(response.request_id(), Some("trace-42"));
}

#[rstest]
#[tokio::test]
async fn generated_request_ids_are_unique(app: TestApp) {
    let first = app.send(get("/api/none", CALLER).expect("request")).await.expect("send");
    let second = app.send(get("/api/none", CALLER).expect("request")).await.expect("send");
    let first_id = first.request_id().expect("first id");
    let second_id = second.request_id().expect("second id");
    assert!(!first_id.is_empty());
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn unreachable_engine_is_service_unavailable_then_recovers() {
    let engine = ScriptedEngine::new().with(
        Command::Typecheck,
        Scripted::Reply(RunResponse::success(typecheck_payload())),
    );
    let connector = FakeConnector::new(engine.into());
    connector.fail_next(1);
    let app = TestApp::with_connector(test_settings(), connector);

    let first = app
        .send(post_json(INVARIANTS_ROUTE, &spec_body(), CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(first.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(first.error(), Some("Apalache server unavailable"));
    assert_eq!(app.engine.run_count(), 0);

    let second = app
        .send(post_json(INVARIANTS_ROUTE, &spec_body(), CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(app.connector.attempts(), 2);
}

#[rstest]
#[tokio::test]
async fn connectivity_failure_forces_reconnect(app: TestApp) {
    app.engine.script(Command::Check, Scripted::Unavailable);
    let failed = app
        .send(post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(failed.status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.connector.attempts(), 1);

    app.engine
        .script(Command::Check, Scripted::Reply(RunResponse::success("{}")));
    let recovered = app
        .send(post_json(VERIFY_ROUTE, &verify_body("TypeOk"), CALLER).expect("request"))
        .await
        .expect("send");
    assert_eq!(recovered.status, StatusCode::OK);
    assert_eq!(app.connector.attempts(), 2);
}
