//! Verification engine client.
//!
//! This module owns everything that talks to the external model checker:
//! endpoint parsing, runtime schema discovery over gRPC reflection, the
//! dynamic codec used to frame messages for the discovered schema, the shared
//! lifecycle-managed handle and the high-level command invoker.

pub mod channel;
pub mod codec;
pub mod discovery;
pub mod endpoint;
pub mod errors;
pub mod handle;
pub mod invoker;

use std::fmt;

pub use channel::{CommandChannel, GrpcCommandChannel};
pub use discovery::SchemaDescriptor;
pub use endpoint::Endpoint;
pub use errors::EngineError;
pub use handle::{BackendHandle, Connector, GrpcConnector};
pub use invoker::{Invoker, InvokerSettings};

/// Commands accepted by the engine's `run` method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Bounded model checking against named invariants.
    Check,
    /// Type checking, which also reports the declarations of the module.
    Typecheck,
    /// Random simulation producing execution traces.
    Simulate,
}

impl Command {
    /// Name of the command's value in the engine's command enum.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Check => "CHECK",
            Self::Typecheck => "TYPECHECK",
            Self::Simulate => "SIMULATE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.wire_name()) }
}

/// A single `run` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Command to execute.
    pub command: Command,
    /// JSON-encoded engine configuration.
    pub config: String,
}

/// The engine's reply to a `run` call.
///
/// Both payloads are JSON documents left encoded; the normaliser parses them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunResponse {
    /// The command completed.
    Success {
        /// JSON-encoded result document.
        payload: String,
    },
    /// The engine reported a logical failure.
    Failure {
        /// Name of the engine's error category, e.g. `PASS_FAILURE`.
        error_kind: String,
        /// JSON-encoded failure document.
        data: String,
    },
}

impl RunResponse {
    /// Build a success reply.
    #[must_use]
    pub fn success(payload: impl Into<String>) -> Self {
        Self::Success {
            payload: payload.into(),
        }
    }

    /// Build a failure reply.
    #[must_use]
    pub fn failure(error_kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Failure {
            error_kind: error_kind.into(),
            data: data.into(),
        }
    }

    /// Whether the engine reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool { matches!(self, Self::Success { .. }) }
}
