//! Fake engine served over real gRPC.
//!
//! The command service is implemented against runtime descriptors with the
//! crate's own dynamic codec, and is served next to a `tonic-reflection`
//! service so discovery runs exactly as it does against the real engine.

use std::{
    collections::HashMap,
    convert::Infallible,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use anyhow::{Context as _, Result, anyhow};
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, Value};
use tla_web::engine::{Endpoint, codec::DynamicCodec};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{
    Status,
    body::BoxBody,
    codegen::{Body, BoxFuture, Service, StdError, http},
    server::{Grpc, NamedService, UnaryService},
    transport::Server,
};

use crate::schema::{ERROR_UNEXPECTED, PACKAGE, SERVICE_NAME, cmd_executor_file, cmd_executor_set};

/// Reply the fake engine gives to one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineReply {
    /// `result.success`.
    Success(String),
    /// `result.failure` with a `CmdErrorType` number and JSON data.
    Failure {
        /// `CmdErrorType` number.
        error_type: i32,
        /// Failure document.
        data: String,
    },
    /// An `UNAVAILABLE` status instead of a reply.
    Unavailable,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug)]
struct EngineState {
    request: MessageDescriptor,
    response: MessageDescriptor,
    failure: MessageDescriptor,
    ping_request: MessageDescriptor,
    pong: MessageDescriptor,
    replies: Mutex<HashMap<i32, EngineReply>>,
    received: Mutex<Vec<(i32, String)>>,
    pings: AtomicUsize,
    ping_down: AtomicBool,
}

impl EngineState {
    fn new() -> Result<Self> {
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_proto(cmd_executor_file())
            .context("command service descriptor")?;
        let lookup = |name: &str| {
            pool.get_message_by_name(&format!("{PACKAGE}.{name}"))
                .ok_or_else(|| anyhow!("message {name} missing from descriptor"))
        };
        Ok(Self {
            request: lookup("CmdRequest")?,
            response: lookup("CmdResponse")?,
            failure: lookup("CmdError")?,
            ping_request: lookup("PingRequest")?,
            pong: lookup("PongResponse")?,
            replies: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            ping_down: AtomicBool::new(false),
        })
    }

    fn answer(&self, request: &DynamicMessage) -> Result<DynamicMessage, Status> {
        let cmd = request
            .get_field_by_name("cmd")
            .and_then(|value| value.as_enum_number())
            .unwrap_or_default();
        let config = request
            .get_field_by_name("config")
            .and_then(|value| value.as_str().map(ToOwned::to_owned))
            .unwrap_or_default();
        lock(&self.received).push((cmd, config));
        let reply = lock(&self.replies).get(&cmd).cloned().unwrap_or_else(|| {
            EngineReply::Failure {
                error_type: ERROR_UNEXPECTED,
                data: format!("{{\"msg\":\"no reply scripted for command {cmd}\"}}"),
            }
        });
        self.encode(reply)
    }

    fn encode(&self, reply: EngineReply) -> Result<DynamicMessage, Status> {
        let mut message = DynamicMessage::new(self.response.clone());
        let set = match reply {
            EngineReply::Success(payload) => {
                message.try_set_field_by_name("success", Value::String(payload))
            }
            EngineReply::Failure { error_type, data } => {
                let mut failure = DynamicMessage::new(self.failure.clone());
                failure
                    .try_set_field_by_name("errorType", Value::EnumNumber(error_type))
                    .and_then(|()| failure.try_set_field_by_name("data", Value::String(data)))
                    .map_err(|err| Status::internal(err.to_string()))?;
                message.try_set_field_by_name("failure", Value::Message(failure))
            }
            EngineReply::Unavailable => return Err(Status::unavailable("engine overloaded")),
        };
        set.map_err(|err| Status::internal(err.to_string()))?;
        Ok(message)
    }

    fn pong(&self) -> Result<DynamicMessage, Status> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ping_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("engine not ready"));
        }
        Ok(DynamicMessage::new(self.pong.clone()))
    }
}

#[derive(Clone, Debug)]
struct RunMethod(Arc<EngineState>);

impl UnaryService<DynamicMessage> for RunMethod {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let state = Arc::clone(&self.0);
        Box::pin(async move {
            state
                .answer(request.get_ref())
                .map(tonic::Response::new)
        })
    }
}

#[derive(Clone, Debug)]
struct PingMethod(Arc<EngineState>);

impl UnaryService<DynamicMessage> for PingMethod {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<Self::Response>, Status>;

    fn call(&mut self, _request: tonic::Request<DynamicMessage>) -> Self::Future {
        let state = Arc::clone(&self.0);
        Box::pin(async move { state.pong().map(tonic::Response::new) })
    }
}

/// Command service routing `run` and `ping` by request path.
#[derive(Clone, Debug)]
struct CmdExecutorServer {
    state: Arc<EngineState>,
}

impl NamedService for CmdExecutorServer {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for CmdExecutorServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let state = Arc::clone(&self.state);
        let path = req.uri().path().to_owned();
        Box::pin(async move {
            let response = if path == format!("/{SERVICE_NAME}/run") {
                let mut grpc = Grpc::new(DynamicCodec::new(state.request.clone()));
                grpc.unary(RunMethod(state), req).await
            } else if path == format!("/{SERVICE_NAME}/ping") {
                let mut grpc = Grpc::new(DynamicCodec::new(state.ping_request.clone()));
                grpc.unary(PingMethod(state), req).await
            } else {
                Status::unimplemented(path).into_http()
            };
            Ok(response)
        })
    }
}

/// Which services the fake engine exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// Command service plus reflection.
    Full,
    /// Command service only; discovery fails.
    WithoutReflection,
}

/// A fake engine listening on an ephemeral local port.
#[derive(Debug)]
pub struct FakeEngineServer {
    addr: SocketAddr,
    state: Arc<EngineState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::result::Result<(), tonic::transport::Error>>>,
}

impl FakeEngineServer {
    /// Start a fully featured fake engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the reflection service
    /// rejects the descriptors.
    pub async fn start() -> Result<Self> { Self::start_with(Exposure::Full).await }

    /// Start a fake engine exposing `exposure`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the reflection service
    /// rejects the descriptors.
    pub async fn start_with(exposure: Exposure) -> Result<Self> {
        let state = Arc::new(EngineState::new()?);
        let reflection = match exposure {
            Exposure::Full => Some(
                tonic_reflection::server::Builder::configure()
                    .register_file_descriptor_set(cmd_executor_set())
                    .build_v1alpha()
                    .context("reflection service")?,
            ),
            Exposure::WithoutReflection => None,
        };
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind fake engine")?;
        let addr = listener.local_addr().context("fake engine address")?;
        let (shutdown, signal) = oneshot::channel::<()>();
        let router = Server::builder()
            .add_service(CmdExecutorServer {
                state: Arc::clone(&state),
            })
            .add_optional_service(reflection);
        let task = tokio::spawn(router.serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            async move { signal.await.unwrap_or_default() },
        ));
        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// Endpoint the gateway should dial.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint { Endpoint::new("127.0.0.1", self.addr.port()) }

    /// Script the reply to the command with enum number `cmd`.
    pub fn reply(&self, cmd: i32, reply: EngineReply) { lock(&self.state.replies).insert(cmd, reply); }

    /// Make pings fail (or succeed again).
    pub fn set_ping_down(&self, down: bool) { self.state.ping_down.store(down, Ordering::SeqCst); }

    /// `(cmd, config)` pairs received by `run`, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<(i32, String)> { lock(&self.state.received).clone() }

    /// Number of pings answered.
    #[must_use]
    pub fn ping_count(&self) -> usize { self.state.pings.load(Ordering::SeqCst) }

    /// Stop serving and wait for the server task.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task failed.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).unwrap_or_default();
        }
        match self.task.take() {
            Some(task) => task
                .await
                .context("fake engine task panicked")?
                .context("fake engine server failed"),
            None => Ok(()),
        }
    }
}

impl Drop for FakeEngineServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).unwrap_or_default();
        }
    }
}
