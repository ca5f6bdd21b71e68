#![expect(clippy::expect_used, reason = "test assertions")]

//! Behavioural tests for the engine-backed routes.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd::assert_step_ok;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};
use test_util::{Scripted, ScriptedEngine, TestApp, TestResponse, post_json, post_raw, test_settings};
use tla_web::{
    api::{INVARIANTS_ROUTE, VERIFY_ROUTE},
    engine::{Command, RunResponse},
    normalize::META_KEY,
};
use tokio::runtime::Runtime;

const SPEC: &str = "---- MODULE lights ----\nVARIABLE on\nInit == on = FALSE\nNext == on' = \
                    ~on\nSafe == on \\in BOOLEAN\n====";
const CALLER: &str = "203.0.113.5";

struct VerificationWorld {
    rt: Runtime,
    app: RefCell<Option<TestApp>>,
    response: RefCell<Option<TestResponse>>,
}

impl VerificationWorld {
    fn new() -> Self {
        Self {
            rt: Runtime::new().expect("runtime"),
            app: RefCell::new(None),
            response: RefCell::new(None),
        }
    }

    fn install(&self, engine: ScriptedEngine) {
        self.app.replace(Some(TestApp::new(test_settings(), engine)));
    }

    fn with_app<T>(&self, f: impl FnOnce(&TestApp) -> T) -> T {
        let app_ref = self.app.borrow();
        let Some(app) = app_ref.as_ref() else {
            panic!("no engine configured");
        };
        f(app)
    }

    fn send(&self, request: axum::http::Request<axum::body::Body>) {
        let outcome = self.with_app(|app| self.rt.block_on(app.send(request)));
        let response = assert_step_ok!(outcome.map_err(|err| err.to_string()));
        self.response.replace(Some(response));
    }

    fn with_response<T>(&self, f: impl FnOnce(&TestResponse) -> T) -> T {
        let response_ref = self.response.borrow();
        let Some(response) = response_ref.as_ref() else {
            panic!("no response received");
        };
        f(response)
    }
}

#[fixture]
fn world() -> VerificationWorld { VerificationWorld::new() }

#[given("an engine that verifies every invariant")]
fn given_verifying_engine(world: &VerificationWorld) {
    world.install(
        ScriptedEngine::new().with(Command::Check, Scripted::Reply(RunResponse::success("{}"))),
    );
}

#[given("an engine that finds a counterexample")]
fn given_violating_engine(world: &VerificationWorld) {
    let data = json!({
        "pass_name": "BoundedChecker",
        "error_data": {"counterexamples": [{"states": [
            {"#meta": {"index": 0}, "on": false},
            {"#meta": {"index": 1}, "on": true},
        ]}]},
    });
    world.install(ScriptedEngine::new().with(
        Command::Check,
        Scripted::Reply(RunResponse::failure("PASS_FAILURE", data.to_string())),
    ));
}

#[given("an engine that lists declarations \"{first}\", \"{second}\" and \"{third}\"")]
fn given_listing_engine(world: &VerificationWorld, first: String, second: String, third: String) {
    let declarations: Vec<Value> = [first, second, third]
        .into_iter()
        .map(|name| json!({"name": name, "type": "Bool"}))
        .collect();
    let payload = json!({"modules": [{"declarations": declarations}]});
    world.install(ScriptedEngine::new().with(
        Command::Typecheck,
        Scripted::Reply(RunResponse::success(payload.to_string())),
    ));
}

#[when("I verify invariant \"{inv}\"")]
fn when_verify(world: &VerificationWorld, inv: String) {
    let body = json!({"tla": SPEC, "inv": inv});
    world.send(post_json(VERIFY_ROUTE, &body, CALLER).expect("request"));
}

#[when("I post the specification as plain text")]
fn when_post_plain_text(world: &VerificationWorld) {
    world.send(post_raw(VERIFY_ROUTE, "text/plain", SPEC, CALLER).expect("request"));
}

#[when("I list invariants")]
fn when_list_invariants(world: &VerificationWorld) {
    world.send(post_json(INVARIANTS_ROUTE, &json!({"tla": SPEC}), CALLER).expect("request"));
}

#[then("the response status is {status}")]
fn then_status(world: &VerificationWorld, status: u16) {
    world.with_response(|response| assert_eq!(response.status.as_u16(), status));
}

#[then("the verdict is \"{result}\"")]
fn then_verdict(world: &VerificationWorld, result: String) {
    world.with_response(|response| assert_eq!(response.body.get("result"), Some(&json!(result))));
}

#[then("the verdict carries a provenance line")]
fn then_provenance(world: &VerificationWorld) {
    world.with_response(|response| {
        let description = response
            .body
            .get("description")
            .and_then(Value::as_str)
            .expect("description");
        assert!(description.starts_with("Created by Apalache on "));
    });
}

#[then("no counterexample state carries engine metadata")]
fn then_no_meta(world: &VerificationWorld) {
    world.with_response(|response| {
        let states = response
            .body
            .get("counterexample")
            .and_then(Value::as_array)
            .expect("counterexample");
        assert!(!states.is_empty());
        assert!(states.iter().all(|state| state.get(META_KEY).is_none()));
    });
}

#[then("the engine received {count} run requests")]
fn then_run_count(world: &VerificationWorld, count: usize) {
    world.with_app(|app| assert_eq!(app.engine.run_count(), count));
}

#[then("the candidates are exactly \"{name}\"")]
fn then_candidates(world: &VerificationWorld, name: String) {
    world.with_response(|response| assert_eq!(response.body, json!([name])));
}

#[scenario(path = "tests/features/verification.feature", index = 0)]
fn verified_invariant(world: VerificationWorld) { let _ = world; }

#[scenario(path = "tests/features/verification.feature", index = 1)]
fn violated_invariant(world: VerificationWorld) { let _ = world; }

#[scenario(path = "tests/features/verification.feature", index = 2)]
fn plain_text_rejected(world: VerificationWorld) { let _ = world; }

#[scenario(path = "tests/features/verification.feature", index = 3)]
fn repeated_verification_cached(world: VerificationWorld) { let _ = world; }

#[scenario(path = "tests/features/verification.feature", index = 4)]
fn reserved_relations_skipped(world: VerificationWorld) { let _ = world; }
