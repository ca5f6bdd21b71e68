//! Route handlers.
//!
//! Handlers validate the body first, so malformed requests never reach the
//! engine, then consult the result cache and finally call the engine under a
//! supersession guard.

use std::{future::Future, sync::Arc};

use axum::{
    Extension,
    Json,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{
    ApiError,
    GatewayError,
    INVARIANTS_ROUTE,
    SIMULATE_ROUTE,
    VERIFY_ROUTE,
    body::{read_json_object, require_string_field},
};
use crate::{
    context::AppContext,
    engine::{CommandChannel, EngineError, RunResponse},
    gateway::{BackendSlot, RequestContext},
    normalize::{Verdict, check_verdict, invariant_candidates, simulation_verdict},
};

const TLA_FIELD: &str = "tla";
const INV_FIELD: &str = "inv";

/// `GET /api/ping`: probe the engine, refreshing the channel once on failure.
pub async fn ping(
    State(ctx): State<Arc<AppContext>>,
    Extension(slot): Extension<BackendSlot>,
) -> Response {
    let first = match &slot {
        BackendSlot::Ready(channel) => ctx
            .invoker
            .ping(channel.as_ref())
            .await
            .map_err(|err| err.to_string()),
        BackendSlot::Unavailable(reason) => Err(reason.clone()),
    };
    let outcome = match first {
        Ok(()) => Ok(()),
        Err(reason) => {
            warn!(%reason, "engine ping failed; refreshing channel");
            retry_ping(&ctx).await
        }
    };
    match outcome {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(message) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "message": message})),
        )
            .into_response(),
    }
}

async fn retry_ping(ctx: &AppContext) -> Result<(), String> {
    let channel = ctx.backend.refresh().await.map_err(|err| err.to_string())?;
    ctx.invoker
        .ping(channel.as_ref())
        .await
        .map_err(|err| err.to_string())
}

/// `POST /api/invariants`: list invariant candidates for a specification.
///
/// # Errors
///
/// Returns an [`ApiError`] for invalid input, a missing engine, or an engine
/// call that fails or replies with an unusable payload.
pub async fn invariants(
    State(ctx): State<Arc<AppContext>>,
    Extension(request_ctx): Extension<RequestContext>,
    Extension(slot): Extension<BackendSlot>,
    request: Request,
) -> Result<Json<Vec<String>>, ApiError> {
    let fields = read_fields(&ctx, &request_ctx, request).await?;
    let tla = require_string_field(&fields, TLA_FIELD, 1, ctx.settings.max_spec_chars)
        .map_err(|err| request_ctx.reject(err))?;
    let channel = slot.channel().map_err(|err| request_ctx.reject(err))?;

    if let Some(names) = ctx.invariants_cache.get(&tla) {
        debug!(request_id = %request_ctx.request_id, "invariants cache hit");
        return Ok(Json(names));
    }
    let reply = call_engine(&ctx, &request_ctx, INVARIANTS_ROUTE, channel, async {
        ctx.invoker.type_check(channel.as_ref(), &tla).await
    })
    .await?;
    let names = invariant_candidates(&reply).map_err(|err| upstream(&request_ctx, err))?;
    if reply.is_success() {
        ctx.invariants_cache.insert(tla, names.clone());
    }
    Ok(Json(names))
}

/// `POST /api/verify`: model-check a specification against one invariant.
///
/// # Errors
///
/// Returns an [`ApiError`] for invalid input, a missing engine, or an engine
/// call that fails or replies with an unusable payload.
pub async fn verify(
    State(ctx): State<Arc<AppContext>>,
    Extension(request_ctx): Extension<RequestContext>,
    Extension(slot): Extension<BackendSlot>,
    request: Request,
) -> Result<Json<Verdict>, ApiError> {
    let fields = read_fields(&ctx, &request_ctx, request).await?;
    let tla = require_string_field(&fields, TLA_FIELD, 1, ctx.settings.max_spec_chars)
        .map_err(|err| request_ctx.reject(err))?;
    let inv = require_string_field(&fields, INV_FIELD, 1, ctx.settings.max_invariant_chars)
        .map_err(|err| request_ctx.reject(err))?;
    let channel = slot.channel().map_err(|err| request_ctx.reject(err))?;

    let key = format!("{tla}::{inv}");
    if let Some(verdict) = ctx.verify_cache.get(&key) {
        debug!(request_id = %request_ctx.request_id, "verify cache hit");
        return Ok(Json(verdict));
    }
    let max_steps = ctx.settings.check_max_steps;
    let reply = call_engine(&ctx, &request_ctx, VERIFY_ROUTE, channel, async {
        ctx.invoker
            .model_check(channel.as_ref(), &tla, &inv, max_steps)
            .await
    })
    .await?;
    let verdict =
        check_verdict(&reply, max_steps, Utc::now()).map_err(|err| upstream(&request_ctx, err))?;
    ctx.verify_cache.insert(key, verdict.clone());
    Ok(Json(verdict))
}

/// `POST /api/simulate`: sample random execution traces of a specification.
///
/// Results are never cached.
///
/// # Errors
///
/// Returns an [`ApiError`] for invalid input, a missing engine, or an engine
/// call that fails or replies with an unusable payload.
pub async fn simulate(
    State(ctx): State<Arc<AppContext>>,
    Extension(request_ctx): Extension<RequestContext>,
    Extension(slot): Extension<BackendSlot>,
    request: Request,
) -> Result<Json<Verdict>, ApiError> {
    let fields = read_fields(&ctx, &request_ctx, request).await?;
    let tla = require_string_field(&fields, TLA_FIELD, 1, ctx.settings.max_spec_chars)
        .map_err(|err| request_ctx.reject(err))?;
    let channel = slot.channel().map_err(|err| request_ctx.reject(err))?;

    let reply = call_engine(&ctx, &request_ctx, SIMULATE_ROUTE, channel, async {
        ctx.invoker.simulate(channel.as_ref(), &tla).await
    })
    .await?;
    simulation_verdict(&reply, Utc::now())
        .map(Json)
        .map_err(|err| upstream(&request_ctx, err))
}

/// Fallback for unmatched paths.
pub async fn not_found(request_ctx: Option<Extension<RequestContext>>) -> Response {
    match request_ctx {
        Some(Extension(request_ctx)) => request_ctx.reject(GatewayError::NotFound).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn read_fields(
    ctx: &AppContext,
    request_ctx: &RequestContext,
    request: Request,
) -> Result<Map<String, Value>, ApiError> {
    let (parts, body) = request.into_parts();
    read_json_object(&parts.headers, body, ctx.settings.max_body_bytes)
        .await
        .map_err(|err| {
            debug!(request_id = %request_ctx.request_id, error = %err, "rejected request body");
            request_ctx.reject(err)
        })
}

fn upstream(request_ctx: &RequestContext, err: impl Into<GatewayError>) -> ApiError {
    let error = err.into();
    warn!(request_id = %request_ctx.request_id, %error, "unusable engine reply");
    request_ctx.reject(error)
}

/// Run an engine call that a newer request from the same client session may
/// supersede.
///
/// Requests without a session run to completion. Connectivity failures
/// invalidate the shared channel so the next request reconnects.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! macro usage"
)]
async fn call_engine<F>(
    ctx: &AppContext,
    request_ctx: &RequestContext,
    route: &'static str,
    channel: &Arc<dyn CommandChannel>,
    call: F,
) -> Result<RunResponse, ApiError>
where
    F: Future<Output = Result<RunResponse, EngineError>>,
{
    let guard = request_ctx
        .session
        .as_deref()
        .map(|session| ctx.in_flight.register(session, route));
    let superseded = async {
        match &guard {
            Some(registered) => registered.superseded().await,
            None => std::future::pending().await,
        }
    };
    let outcome = tokio::select! {
        biased;
        () = superseded => {
            debug!(request_id = %request_ctx.request_id, route, "engine call superseded");
            return Err(request_ctx.reject(GatewayError::Superseded));
        }
        outcome = call => outcome,
    };
    outcome.map_err(|err| {
        if err.is_connectivity() {
            ctx.backend.invalidate(channel);
        }
        warn!(request_id = %request_ctx.request_id, route, error = %err, "engine call failed");
        request_ctx.reject(GatewayError::from(&err))
    })
}
