//! Error types for engine discovery and invocation.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while discovering, connecting to, or calling the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The endpoint URI was rejected by the transport.
    #[error("invalid engine endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Transport error describing the rejection.
        #[source]
        source: tonic::transport::Error,
    },
    /// The transport could not establish a channel.
    #[error("failed to connect to engine at {endpoint}: {source}")]
    Connect {
        /// Endpoint that refused the connection.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: tonic::transport::Error,
    },
    /// The connector panicked before producing a channel.
    #[error("engine connect attempt panicked")]
    ConnectPanicked,
    /// The reflection stream failed at the RPC layer.
    #[error("reflection request failed: {0}")]
    Reflection(#[source] Box<tonic::Status>),
    /// The engine answered the reflection query with an explicit error.
    #[error("engine rejected reflection query ({code}): {message}")]
    ReflectionRejected {
        /// gRPC status code reported by the engine.
        code: i32,
        /// Message reported by the engine.
        message: String,
    },
    /// The reflection stream ended before any reply arrived.
    #[error("reflection stream closed without a reply")]
    ReflectionClosed,
    /// Descriptors were missing, malformed, or did not match expectations.
    #[error("malformed engine schema: {0}")]
    Schema(String),
    /// A command RPC failed at the transport or status layer.
    #[error("engine call failed: {0}")]
    Rpc(#[source] Box<tonic::Status>),
    /// The gateway's outer deadline elapsed before the engine replied.
    #[error("engine call exceeded {0:?}")]
    Deadline(Duration),
}

impl EngineError {
    /// Wrap an RPC status raised by a command call.
    #[must_use]
    pub fn rpc(status: tonic::Status) -> Self { Self::Rpc(Box::new(status)) }

    /// Whether the failure indicates the engine connection itself is gone.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Rpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::Unknown
            ),
            Self::Connect { .. } | Self::ConnectPanicked | Self::ReflectionClosed => true,
            _ => false,
        }
    }
}

impl From<prost::DecodeError> for EngineError {
    fn from(value: prost::DecodeError) -> Self { Self::Schema(value.to_string()) }
}

impl From<prost_reflect::DescriptorError> for EngineError {
    fn from(value: prost_reflect::DescriptorError) -> Self { Self::Schema(value.to_string()) }
}
