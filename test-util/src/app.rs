//! Router fixtures and request builders.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tla_web::{
    AppContext,
    GatewaySettings,
    api::router,
    engine::Connector,
    gateway::caller::{CLIENT_SESSION_HEADER, FORWARDED_FOR_HEADER},
};
use tower::ServiceExt;

use crate::engine::{FakeConnector, ScriptedEngine};

/// Settings sized for tests: generous rate limit, four heavy slots.
#[must_use]
pub fn test_settings() -> GatewaySettings {
    GatewaySettings {
        rate_limit_max_requests: 1_000,
        max_heavy_requests: 4,
        ..GatewaySettings::default()
    }
}

/// A router wired to a [`ScriptedEngine`].
#[derive(Clone, Debug)]
pub struct TestApp {
    /// Shared application context.
    pub ctx: Arc<AppContext>,
    /// The engine behind the router.
    pub engine: Arc<ScriptedEngine>,
    /// Connector feeding the backend handle.
    pub connector: Arc<FakeConnector>,
    router: Router,
}

/// A buffered response.
#[derive(Clone, Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body parsed as JSON, or `Value::Null` when empty or not JSON.
    pub body: Value,
}

impl TestResponse {
    /// A header value as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The `error` field of an error envelope.
    #[must_use]
    pub fn error(&self) -> Option<&str> { self.body.get("error").and_then(Value::as_str) }

    /// The `requestId` field of an error envelope.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> { self.body.get("requestId").and_then(Value::as_str) }
}

impl TestApp {
    /// Build an app over `engine` with `settings`.
    #[must_use]
    pub fn new(settings: GatewaySettings, engine: ScriptedEngine) -> Self {
        Self::with_connector(settings, FakeConnector::new(Arc::new(engine)))
    }

    /// Build an app whose backend handle uses `connector`.
    #[must_use]
    pub fn with_connector(settings: GatewaySettings, fake: FakeConnector) -> Self {
        let connector = Arc::new(fake);
        let engine = Arc::clone(connector.engine());
        let shared: Arc<dyn Connector> = Arc::<FakeConnector>::clone(&connector);
        let ctx = Arc::new(AppContext::with_connector(settings, shared));
        let app_router = router(Arc::clone(&ctx));
        Self {
            ctx,
            engine,
            connector,
            router: app_router,
        }
    }

    /// A clone of the router, for driving requests concurrently.
    #[must_use]
    pub fn router(&self) -> Router { self.router.clone() }

    /// Send `request` and buffer the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        send(self.router(), request).await
    }
}

/// Send `request` through `router` and buffer the response.
///
/// # Errors
///
/// Returns an error if the body cannot be read.
pub async fn send(router: Router, request: Request<Body>) -> Result<TestResponse> {
    let response = router
        .oneshot(request)
        .await
        .context("router is infallible")?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .context("read response body")?
        .to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok(TestResponse {
        status,
        headers,
        body,
    })
}

/// `POST path` with a JSON body on behalf of `caller`.
///
/// # Errors
///
/// Returns an error if the request cannot be built.
pub fn post_json(path: &str, body: &Value, caller: &str) -> Result<Request<Body>> {
    post_raw(path, "application/json", body.to_string(), caller)
}

/// `POST path` with an arbitrary body and content type on behalf of
/// `caller`.
///
/// # Errors
///
/// Returns an error if the request cannot be built.
pub fn post_raw(
    path: &str,
    content_type: &str,
    body: impl Into<Body>,
    caller: &str,
) -> Result<Request<Body>> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, content_type)
        .header(FORWARDED_FOR_HEADER, caller)
        .body(body.into())
        .context("build POST request")
}

/// `GET path` on behalf of `caller`.
///
/// # Errors
///
/// Returns an error if the request cannot be built.
pub fn get(path: &str, caller: &str) -> Result<Request<Body>> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(FORWARDED_FOR_HEADER, caller)
        .body(Body::empty())
        .context("build GET request")
}

/// Tag `request` with the client session `session`.
///
/// # Errors
///
/// Returns an error if `session` is not a valid header value.
pub fn in_session(mut request: Request<Body>, session: &str) -> Result<Request<Body>> {
    let value = HeaderValue::from_str(session).context("session header value")?;
    request.headers_mut().insert(CLIENT_SESSION_HEADER, value);
    Ok(request)
}
