//! Scriptable in-process engine.
//!
//! [`ScriptedEngine`] stands in for a connected engine channel and
//! [`FakeConnector`] hands it to the backend handle, so router tests can run
//! without a gRPC server.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tla_web::engine::{
    Command,
    CommandChannel,
    Connector,
    EngineError,
    RunRequest,
    RunResponse,
};
use tokio::sync::Semaphore;
use tonic::Status;

/// Scripted behaviour for one command.
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Answer immediately.
    Reply(RunResponse),
    /// Answer once [`ScriptedEngine::release`] grants a permit.
    Gated(RunResponse),
    /// Answer after a delay.
    Delayed(Duration, RunResponse),
    /// Fail with an `UNAVAILABLE` status.
    Unavailable,
    /// Never answer.
    Hang,
    /// Panic inside the call.
    Panic,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-process [`CommandChannel`] with per-command scripted replies.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: Mutex<HashMap<Command, Scripted>>,
    runs: Mutex<Vec<RunRequest>>,
    pings: AtomicUsize,
    failing_pings: AtomicUsize,
    gate: Semaphore,
}

impl Default for ScriptedEngine {
    fn default() -> Self { Self::new() }
}

impl ScriptedEngine {
    /// Create an engine with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            failing_pings: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    /// Script `command` and return the engine for chaining.
    #[must_use]
    pub fn with(self, command: Command, behaviour: Scripted) -> Self {
        self.script(command, behaviour);
        self
    }

    /// Replace the behaviour of `command`.
    pub fn script(&self, command: Command, behaviour: Scripted) {
        lock(&self.script).insert(command, behaviour);
    }

    /// Fail the next `count` pings.
    pub fn fail_pings(&self, count: usize) { self.failing_pings.store(count, Ordering::SeqCst); }

    /// Let `count` gated calls answer.
    pub fn release(&self, count: usize) { self.gate.add_permits(count); }

    /// Number of `run` calls received.
    #[must_use]
    pub fn run_count(&self) -> usize { lock(&self.runs).len() }

    /// Every `run` request received, oldest first.
    #[must_use]
    pub fn runs(&self) -> Vec<RunRequest> { lock(&self.runs).clone() }

    /// Number of pings received.
    #[must_use]
    pub fn ping_count(&self) -> usize { self.pings.load(Ordering::SeqCst) }

    fn take_ping_failure(&self) -> bool {
        self.failing_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CommandChannel for ScriptedEngine {
    async fn run(&self, request: RunRequest) -> Result<RunResponse, EngineError> {
        let command = request.command;
        lock(&self.runs).push(request);
        let behaviour = lock(&self.script).get(&command).cloned();
        match behaviour {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Gated(reply)) => {
                let permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| EngineError::rpc(Status::cancelled("engine gate closed")))?;
                permit.forget();
                Ok(reply)
            }
            Some(Scripted::Delayed(delay, reply)) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
            Some(Scripted::Unavailable) => {
                Err(EngineError::rpc(Status::unavailable("engine went away")))
            }
            Some(Scripted::Hang) => std::future::pending().await,
            Some(Scripted::Panic) => panic!("scripted engine panic"),
            None => Err(EngineError::rpc(Status::unimplemented(format!(
                "no reply scripted for {command}"
            )))),
        }
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.take_ping_failure() {
            return Err(EngineError::rpc(Status::unavailable("engine not ready")));
        }
        Ok(())
    }
}

/// [`Connector`] handing out a shared [`ScriptedEngine`].
#[derive(Debug)]
pub struct FakeConnector {
    engine: Arc<ScriptedEngine>,
    attempts: AtomicUsize,
    failing_attempts: AtomicUsize,
    delay: Duration,
}

impl FakeConnector {
    /// Connector that always succeeds immediately.
    #[must_use]
    pub fn new(engine: Arc<ScriptedEngine>) -> Self {
        Self {
            engine,
            attempts: AtomicUsize::new(0),
            failing_attempts: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Delay every attempt by `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` attempts.
    pub fn fail_next(&self, count: usize) { self.failing_attempts.store(count, Ordering::SeqCst); }

    /// Connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> usize { self.attempts.load(Ordering::SeqCst) }

    /// The engine handed to callers.
    #[must_use]
    pub fn engine(&self) -> &Arc<ScriptedEngine> { &self.engine }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn CommandChannel>, EngineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let fail = self
            .failing_attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(EngineError::ReflectionClosed);
        }
        let channel: Arc<dyn CommandChannel> = Arc::<ScriptedEngine>::clone(&self.engine);
        Ok(channel)
    }
}
