//! Runtime schema discovery over gRPC server reflection.
//!
//! The engine's interface evolves independently of the gateway, so nothing
//! about it is compiled in. At connect time [`discover`] asks the engine's
//! reflection service for the file that defines the command service, decodes
//! the returned `FileDescriptorProto` set and assembles a
//! [`SchemaDescriptor`]. A short-lived channel carries the query and is
//! dropped once the schema is built.
//!
//! # Schema expectations
//!
//! The service must expose a unary `run` method whose input message carries an
//! enum field `cmd` and a string field `config`, and a unary `ping` method.
//! Method names are matched case-insensitively.

use std::{collections::HashSet, time::Duration};

use futures_util::stream;
use prost::Message;
use prost_reflect::{
    DescriptorPool,
    EnumDescriptor,
    Kind,
    MessageDescriptor,
    MethodDescriptor,
    ServiceDescriptor,
};
use prost_types::FileDescriptorProto;
use tonic::{codegen::http::uri::PathAndQuery, transport::Channel};
use tonic_reflection::pb::v1alpha::{
    ServerReflectionRequest,
    server_reflection_client::ServerReflectionClient,
    server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};
use tracing::debug;

use super::{Command, Endpoint, EngineError};

/// Name of the request field selecting the command.
pub(crate) const CMD_FIELD: &str = "cmd";
/// Name of the request field carrying the JSON configuration.
pub(crate) const CONFIG_FIELD: &str = "config";

/// The engine interface assembled from decoded reflection descriptors.
#[derive(Clone, Debug)]
pub struct SchemaDescriptor {
    service: ServiceDescriptor,
    run: MethodDescriptor,
    ping: MethodDescriptor,
    commands: EnumDescriptor,
}

impl SchemaDescriptor {
    /// Assemble a schema from encoded `FileDescriptorProto` messages.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if any descriptor fails to decode or
    /// the resulting pool does not describe the expected service.
    pub fn from_encoded<I, B>(service_name: &str, encoded: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let files = encoded
            .into_iter()
            .map(|bytes| FileDescriptorProto::decode(bytes.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_files(service_name, files)
    }

    /// Assemble a schema from decoded file descriptors.
    ///
    /// Files may arrive in any order; repeated file names are ignored after
    /// their first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if the files do not link or the service
    /// lacks the `run`/`ping` methods or the command enum.
    pub fn from_files(
        service_name: &str,
        files: impl IntoIterator<Item = FileDescriptorProto>,
    ) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        let unique: Vec<_> = files
            .into_iter()
            .filter(|file| seen.insert(file.name().to_owned()))
            .collect();
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_protos(unique)?;

        let service = pool
            .get_service_by_name(service_name)
            .ok_or_else(|| EngineError::Schema(format!("service '{service_name}' not found")))?;
        let run = find_method(&service, "run")?;
        let ping = find_method(&service, "ping")?;
        let commands = command_enum(&run.input())?;
        require_string_field(&run.input(), CONFIG_FIELD)?;
        Ok(Self {
            service,
            run,
            ping,
            commands,
        })
    }

    /// Fully qualified service name.
    #[must_use]
    pub fn service_name(&self) -> &str { self.service.full_name() }

    /// Descriptor of the `run` request message.
    #[must_use]
    pub fn run_input(&self) -> MessageDescriptor { self.run.input() }

    /// Descriptor of the `run` reply message.
    #[must_use]
    pub fn run_output(&self) -> MessageDescriptor { self.run.output() }

    /// Descriptor of the `ping` request message.
    #[must_use]
    pub fn ping_input(&self) -> MessageDescriptor { self.ping.input() }

    /// Descriptor of the `ping` reply message.
    #[must_use]
    pub fn ping_output(&self) -> MessageDescriptor { self.ping.output() }

    /// HTTP/2 path of the `run` method.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if the names form an invalid path.
    pub fn run_path(&self) -> Result<PathAndQuery, EngineError> { self.method_path(&self.run) }

    /// HTTP/2 path of the `ping` method.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if the names form an invalid path.
    pub fn ping_path(&self) -> Result<PathAndQuery, EngineError> { self.method_path(&self.ping) }

    /// Wire number of `command` in the engine's command enum.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if the enum lacks the command.
    pub fn command_number(&self, command: Command) -> Result<i32, EngineError> {
        self.commands
            .get_value_by_name(command.wire_name())
            .map(|value| value.number())
            .ok_or_else(|| {
                EngineError::Schema(format!(
                    "command enum '{}' has no value {}",
                    self.commands.full_name(),
                    command.wire_name()
                ))
            })
    }

    fn method_path(&self, method: &MethodDescriptor) -> Result<PathAndQuery, EngineError> {
        let path = format!("/{}/{}", self.service.full_name(), method.name());
        PathAndQuery::try_from(path).map_err(|err| EngineError::Schema(err.to_string()))
    }
}

fn find_method(service: &ServiceDescriptor, name: &str) -> Result<MethodDescriptor, EngineError> {
    let method = service
        .methods()
        .find(|method| method.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            EngineError::Schema(format!(
                "service '{}' has no '{name}' method",
                service.full_name()
            ))
        })?;
    if method.is_client_streaming() || method.is_server_streaming() {
        return Err(EngineError::Schema(format!(
            "method '{}' must be unary",
            method.full_name()
        )));
    }
    Ok(method)
}

fn command_enum(input: &MessageDescriptor) -> Result<EnumDescriptor, EngineError> {
    let field = input.get_field_by_name(CMD_FIELD).ok_or_else(|| {
        EngineError::Schema(format!("'{}' has no '{CMD_FIELD}' field", input.full_name()))
    })?;
    match field.kind() {
        Kind::Enum(descriptor) => Ok(descriptor),
        other => Err(EngineError::Schema(format!(
            "'{}.{CMD_FIELD}' must be an enum, found {other:?}",
            input.full_name()
        ))),
    }
}

fn require_string_field(input: &MessageDescriptor, name: &str) -> Result<(), EngineError> {
    match input.get_field_by_name(name).map(|field| field.kind()) {
        Some(Kind::String) => Ok(()),
        _ => Err(EngineError::Schema(format!(
            "'{}' must carry a string '{name}' field",
            input.full_name()
        ))),
    }
}

/// Open a reflection channel to `endpoint`.
///
/// # Errors
///
/// Returns [`EngineError::InvalidEndpoint`] or [`EngineError::Connect`].
pub async fn connect_channel(
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> Result<Channel, EngineError> {
    tonic::transport::Endpoint::from_shared(endpoint.uri())
        .map_err(|source| EngineError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?
        .connect_timeout(connect_timeout)
        .connect()
        .await
        .map_err(|source| EngineError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })
}

/// Query `channel`'s reflection service for the file defining `service_name`.
///
/// # Errors
///
/// Returns an [`EngineError`] on RPC failure, an explicit error reply, an
/// empty stream, or descriptors that do not assemble into a usable schema.
pub async fn query_schema(
    channel: Channel,
    service_name: &str,
) -> Result<SchemaDescriptor, EngineError> {
    let mut client = ServerReflectionClient::new(channel);
    let request = ServerReflectionRequest {
        host: String::new(),
        message_request: Some(MessageRequest::FileContainingSymbol(
            service_name.to_owned(),
        )),
    };
    let mut replies = client
        .server_reflection_info(stream::iter([request]))
        .await
        .map_err(|status| EngineError::Reflection(Box::new(status)))?
        .into_inner();
    let reply = replies
        .message()
        .await
        .map_err(|status| EngineError::Reflection(Box::new(status)))?
        .ok_or(EngineError::ReflectionClosed)?;

    match reply.message_response {
        Some(MessageResponse::FileDescriptorResponse(files)) => {
            debug!(
                service = service_name,
                files = files.file_descriptor_proto.len(),
                "received engine descriptors"
            );
            SchemaDescriptor::from_encoded(service_name, files.file_descriptor_proto)
        }
        Some(MessageResponse::ErrorResponse(error)) => Err(EngineError::ReflectionRejected {
            code: error.error_code,
            message: error.error_message,
        }),
        Some(_) | None => Err(EngineError::Schema(
            "reflection reply did not carry file descriptors".to_owned(),
        )),
    }
}

/// Discover the engine schema at `endpoint`.
///
/// The reflection channel is dropped before returning, whatever the outcome.
///
/// # Errors
///
/// Propagates connection and [`query_schema`] failures; no partial schema is
/// ever returned.
pub async fn discover(
    endpoint: &Endpoint,
    service_name: &str,
    connect_timeout: Duration,
) -> Result<SchemaDescriptor, EngineError> {
    let channel = connect_channel(endpoint, connect_timeout).await?;
    query_schema(channel, service_name).await
}
