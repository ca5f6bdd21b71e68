//! Utilities for integration tests.
//!
//! The `test-util` crate provides the engine command-service descriptor, a
//! scriptable in-process engine, a fake engine served over gRPC with
//! reflection, router fixtures and a tracing capture harness. It is used by
//! the unit and integration tests of the main crate.

pub mod app;
pub mod engine;
pub mod grpc;
pub mod schema;
pub mod tracing_capture;

pub use app::{TestApp, TestResponse, get, in_session, post_json, post_raw, send, test_settings};
pub use engine::{FakeConnector, Scripted, ScriptedEngine};
pub use grpc::{EngineReply, Exposure, FakeEngineServer};
pub use tracing_capture::{CapturedEvents, RecordedEvent, capture_events};
