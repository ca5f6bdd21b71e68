//! Command channel bound to a discovered schema.

use std::sync::Arc;

use async_trait::async_trait;
use prost_reflect::{DynamicMessage, Kind, MessageDescriptor, ReflectMessage, Value};
use tonic::{Status, codegen::http::uri::PathAndQuery, transport::Channel};

use super::{
    EngineError,
    RunRequest,
    RunResponse,
    SchemaDescriptor,
    codec::DynamicCodec,
    discovery::{CMD_FIELD, CONFIG_FIELD},
};

/// Oneof member carrying a successful result.
const SUCCESS_FIELD: &str = "success";
/// Oneof member carrying an engine failure.
const FAILURE_FIELD: &str = "failure";
/// Failure fields naming the error category, in lookup order.
const ERROR_KIND_FIELDS: [&str; 2] = ["errorType", "error_type"];
/// Failure field carrying the JSON failure document.
const DATA_FIELD: &str = "data";

/// Request/response channel to the verification engine.
///
/// Transport failures surface as [`EngineError`]; failures the engine itself
/// reports arrive as [`RunResponse::Failure`].
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Execute a command.
    async fn run(&self, request: RunRequest) -> Result<RunResponse, EngineError>;

    /// Zero-argument health probe.
    async fn ping(&self) -> Result<(), EngineError>;
}

/// [`CommandChannel`] speaking gRPC with messages built from a
/// [`SchemaDescriptor`].
#[derive(Clone, Debug)]
pub struct GrpcCommandChannel {
    schema: Arc<SchemaDescriptor>,
    channel: Channel,
}

impl GrpcCommandChannel {
    /// Bind `channel` to `schema`.
    #[must_use]
    pub fn new(schema: SchemaDescriptor, channel: Channel) -> Self {
        Self {
            schema: Arc::new(schema),
            channel,
        }
    }

    /// Schema this channel was built from.
    #[must_use]
    pub fn schema(&self) -> &SchemaDescriptor { &self.schema }

    fn build_run_message(&self, request: RunRequest) -> Result<DynamicMessage, EngineError> {
        let number = self.schema.command_number(request.command)?;
        let mut message = DynamicMessage::new(self.schema.run_input());
        message
            .try_set_field_by_name(CMD_FIELD, Value::EnumNumber(number))
            .map_err(|err| EngineError::Schema(err.to_string()))?;
        message
            .try_set_field_by_name(CONFIG_FIELD, Value::String(request.config))
            .map_err(|err| EngineError::Schema(err.to_string()))?;
        Ok(message)
    }

    async fn unary(
        &self,
        path: PathAndQuery,
        message: DynamicMessage,
        reply: MessageDescriptor,
    ) -> Result<DynamicMessage, EngineError> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(|err| {
            EngineError::rpc(Status::unavailable(format!("engine channel not ready: {err}")))
        })?;
        let response = grpc
            .unary(tonic::Request::new(message), path, DynamicCodec::new(reply))
            .await
            .map_err(EngineError::rpc)?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl CommandChannel for GrpcCommandChannel {
    async fn run(&self, request: RunRequest) -> Result<RunResponse, EngineError> {
        let message = self.build_run_message(request)?;
        let reply = self
            .unary(self.schema.run_path()?, message, self.schema.run_output())
            .await?;
        decode_run_response(&reply)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        let message = DynamicMessage::new(self.schema.ping_input());
        self.unary(self.schema.ping_path()?, message, self.schema.ping_output())
            .await
            .map(drop)
    }
}

/// Decode the engine's `run` reply into a [`RunResponse`].
///
/// # Errors
///
/// Returns [`EngineError::Schema`] when the reply sets neither oneof member
/// or a member has an unexpected type.
pub fn decode_run_response(reply: &DynamicMessage) -> Result<RunResponse, EngineError> {
    if reply.has_field_by_name(FAILURE_FIELD) {
        let field = reply
            .get_field_by_name(FAILURE_FIELD)
            .ok_or_else(|| missing(reply, FAILURE_FIELD))?;
        let failure = field
            .as_message()
            .ok_or_else(|| mistyped(reply, FAILURE_FIELD, "a message"))?;
        return Ok(RunResponse::Failure {
            error_kind: error_kind(failure),
            data: string_field(failure, DATA_FIELD)?,
        });
    }
    if reply.has_field_by_name(SUCCESS_FIELD) {
        return string_field(reply, SUCCESS_FIELD).map(|payload| RunResponse::Success { payload });
    }
    Err(EngineError::Schema(format!(
        "'{}' reply carried neither '{SUCCESS_FIELD}' nor '{FAILURE_FIELD}'",
        reply.descriptor().full_name()
    )))
}

fn error_kind(failure: &DynamicMessage) -> String {
    let descriptor = failure.descriptor();
    ERROR_KIND_FIELDS
        .iter()
        .find_map(|name| {
            let field = descriptor.get_field_by_name(name)?;
            let value = failure.get_field(&field);
            match (field.kind(), value.as_ref()) {
                (Kind::Enum(kind), Value::EnumNumber(number)) => Some(
                    kind.get_value(*number)
                        .map_or_else(|| number.to_string(), |value| value.name().to_owned()),
                ),
                (_, Value::String(name)) => Some(name.clone()),
                _ => None,
            }
        })
        .unwrap_or_default()
}

fn string_field(message: &DynamicMessage, name: &str) -> Result<String, EngineError> {
    let value = message
        .get_field_by_name(name)
        .ok_or_else(|| missing(message, name))?;
    value
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| mistyped(message, name, "a string"))
}

fn missing(message: &DynamicMessage, name: &str) -> EngineError {
    EngineError::Schema(format!(
        "'{}' has no '{name}' field",
        message.descriptor().full_name()
    ))
}

fn mistyped(message: &DynamicMessage, name: &str, expected: &str) -> EngineError {
    EngineError::Schema(format!(
        "'{}.{name}' must be {expected}",
        message.descriptor().full_name()
    ))
}
