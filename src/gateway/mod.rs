//! Request gateway middleware.
//!
//! Every request passes through [`gateway`], which assigns a caller identity,
//! applies the per-caller rate limit, converts handler panics into a `500`
//! envelope and writes one access record per API request. Engine-bound routes
//! additionally pass [`admit_heavy`], and all API routes pass
//! [`attach_backend`], which records the engine channel (or its absence) for
//! the handler.
//!
//! Per request the stages are: received, rate checked, admission checked
//! (heavy routes only), backend attached, handled, logged.

pub mod admission;
pub mod caller;
pub mod rate_limit;
pub mod request_id;
pub mod supersede;

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub use admission::{HeavySlot, HeavySlots};
pub use caller::{CLIENT_SESSION_HEADER, UNKNOWN_CALLER, caller_identity, client_session};
pub use rate_limit::{RateBucket, RateDecision, RateLimiter};
pub use request_id::{REQUEST_ID_HEADER, TimeOrderedRequestId, request_id_from};
pub use supersede::{CallGuard, InFlightCalls};

use crate::{
    api::{ApiError, GatewayError},
    context::AppContext,
    engine::CommandChannel,
};

/// Target of access-log events.
pub const ACCESS_LOG_TARGET: &str = "tla_web::access";

/// Correlation identifier used when none could be assigned.
const UNASSIGNED_REQUEST_ID: &str = "unassigned";

/// Prefix of routes handled by the gateway.
pub const API_PREFIX: &str = "/api/";

/// Identity of the request being handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Correlation identifier echoed in responses and logs.
    pub request_id: String,
    /// Caller identity used for rate limiting.
    pub caller: String,
    /// Client session used to supersede repeated engine calls.
    pub session: Option<String>,
}

impl RequestContext {
    /// Bind `error` to this request.
    #[must_use]
    pub fn reject(&self, error: impl Into<GatewayError>) -> ApiError {
        ApiError::new(error.into(), self.request_id.clone())
    }

    fn of(request: &Request) -> Self {
        request.extensions().get::<Self>().cloned().unwrap_or_else(|| Self {
            request_id: request_id_from(request.headers())
                .unwrap_or_else(|| UNASSIGNED_REQUEST_ID.to_owned()),
            caller: caller_identity(request),
            session: client_session(request),
        })
    }
}

/// Engine channel state recorded for an API request.
#[derive(Clone)]
pub enum BackendSlot {
    /// A ready channel.
    Ready(Arc<dyn CommandChannel>),
    /// The channel could not be obtained.
    Unavailable(String),
}

impl BackendSlot {
    /// The ready channel, or [`GatewayError::BackendUnavailable`].
    ///
    /// # Errors
    ///
    /// Fails when the slot is [`BackendSlot::Unavailable`].
    pub fn channel(&self) -> Result<&Arc<dyn CommandChannel>, GatewayError> {
        match self {
            Self::Ready(channel) => Ok(channel),
            Self::Unavailable(_) => Err(GatewayError::BackendUnavailable),
        }
    }
}

/// Whether `path` is served by the gateway's API routes.
#[must_use]
pub fn is_api_path(path: &str) -> bool { path.starts_with(API_PREFIX) }

/// Outermost gateway stage: identity, rate limit, panic capture and access
/// logging.
pub async fn gateway(
    State(ctx): State<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if !is_api_path(&path) {
        return next.run(request).await;
    }
    let started = Instant::now();
    let method = request.method().clone();
    let context = RequestContext {
        request_id: request_id_from(request.headers())
            .unwrap_or_else(|| UNASSIGNED_REQUEST_ID.to_owned()),
        caller: caller_identity(&request),
        session: client_session(&request),
    };

    let response = match ctx.rate_limiter.check(&context.caller) {
        RateDecision::Limited { retry_after } => {
            context.reject(GatewayError::RateLimited { retry_after }).into_response()
        }
        RateDecision::Allowed { .. } => {
            request.extensions_mut().insert(context.clone());
            match AssertUnwindSafe(next.run(request)).catch_unwind().await {
                Ok(response) => response,
                Err(_) => {
                    error!(
                        request_id = %context.request_id,
                        %method,
                        path = %path,
                        "handler panicked"
                    );
                    context.reject(GatewayError::Internal).into_response()
                }
            }
        }
    };

    log_access(&context, &method, &path, response.status(), started.elapsed());
    response
}

fn log_access(
    context: &RequestContext,
    method: &Method,
    path: &str,
    status: StatusCode,
    elapsed: Duration,
) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let status = status.as_u16();
    if status >= 500 {
        error!(
            target: ACCESS_LOG_TARGET,
            request_id = %context.request_id,
            %method,
            path,
            status,
            duration_ms,
            caller = %context.caller,
            "request failed"
        );
    } else {
        info!(
            target: ACCESS_LOG_TARGET,
            request_id = %context.request_id,
            %method,
            path,
            status,
            duration_ms,
            caller = %context.caller,
            "request completed"
        );
    }
}

/// Admission stage for engine-bound routes.
///
/// The slot is held until the handler's response is produced.
pub async fn admit_heavy(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(slot) = ctx.heavy_slots.try_acquire() else {
        let context = RequestContext::of(&request);
        warn!(
            request_id = %context.request_id,
            caller = %context.caller,
            capacity = ctx.heavy_slots.capacity(),
            "heavy request rejected"
        );
        return context.reject(GatewayError::Busy).into_response();
    };
    let response = next.run(request).await;
    drop(slot);
    response
}

/// Backend stage: attach the engine channel or record why it is missing.
pub async fn attach_backend(
    State(ctx): State<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> Response {
    let slot = match ctx.backend.get_or_init().await {
        Ok(channel) => BackendSlot::Ready(channel),
        Err(err) => {
            warn!(error = %err, "engine unavailable");
            BackendSlot::Unavailable(err.to_string())
        }
    };
    request.extensions_mut().insert(slot);
    next.run(request).await
}
