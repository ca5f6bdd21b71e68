//! HTTP JSON API.
//!
//! [`router`] assembles the routes and the gateway layers around them:
//!
//! | route | method | engine-bound |
//! |---|---|---|
//! | `/api/ping` | `GET` | no |
//! | `/api/invariants` | `POST` | yes |
//! | `/api/verify` | `POST` | yes |
//! | `/api/simulate` | `POST` | yes |

pub mod body;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, GatewayError};

use crate::{
    context::AppContext,
    gateway::{TimeOrderedRequestId, admit_heavy, attach_backend, gateway},
};

/// Health probe route.
pub const PING_ROUTE: &str = "/api/ping";
/// Invariant listing route.
pub const INVARIANTS_ROUTE: &str = "/api/invariants";
/// Model-checking route.
pub const VERIFY_ROUTE: &str = "/api/verify";
/// Simulation route.
pub const SIMULATE_ROUTE: &str = "/api/simulate";

/// Build the application router over `ctx`.
#[must_use]
pub fn router(ctx: Arc<AppContext>) -> Router {
    let heavy = Router::new()
        .route(INVARIANTS_ROUTE, post(handlers::invariants))
        .route(VERIFY_ROUTE, post(handlers::verify))
        .route(SIMULATE_ROUTE, post(handlers::simulate))
        .route_layer(from_fn_with_state(Arc::clone(&ctx), attach_backend))
        .route_layer(from_fn_with_state(Arc::clone(&ctx), admit_heavy));
    let light = Router::new()
        .route(PING_ROUTE, get(handlers::ping))
        .route_layer(from_fn_with_state(Arc::clone(&ctx), attach_backend));

    Router::new()
        .merge(heavy)
        .merge(light)
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(Arc::clone(&ctx), gateway))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(TimeOrderedRequestId))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
