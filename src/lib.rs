//! Core library for the tla-web gateway.
//!
//! The crate exposes an HTTP gateway in front of a long-running model
//! checking engine. The engine's gRPC schema is discovered at runtime through
//! server reflection; replies are normalised into a stable JSON contract,
//! cached briefly, and guarded by per-caller rate limiting and bounded
//! concurrency.

pub mod api;
pub mod cache;
pub mod context;
pub mod engine;
pub mod gateway;
pub mod normalize;
pub mod server;

pub use context::{AppContext, GatewaySettings};
