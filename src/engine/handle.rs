//! Lazily initialised, shared handle to the engine's command channel.
//!
//! The handle is a small state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                       |
//!                       v
//!                    Failed -> (next caller) Initializing
//! ```
//!
//! Only one connect attempt is ever in flight. Callers that arrive while an
//! attempt is pending await the same memoised future, so concurrent first
//! requests observe exactly one discovery and connect. A failed attempt is
//! recorded and discarded: everyone awaiting it sees the error, and the next
//! caller starts afresh; a connector that panics counts as a failed attempt.
//! A ready channel is kept until it is invalidated,
//! refreshed or shut down.

use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{info, warn};

use super::{
    CommandChannel,
    Endpoint,
    EngineError,
    GrpcCommandChannel,
    discovery::{connect_channel, discover},
};

/// Result of one connect attempt, shared among everyone awaiting it.
pub type ConnectOutcome = Result<Arc<dyn CommandChannel>, Arc<EngineError>>;

type PendingConnect = Shared<BoxFuture<'static, ConnectOutcome>>;

/// Builds a ready [`CommandChannel`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform discovery and construct a channel.
    async fn connect(&self) -> Result<Arc<dyn CommandChannel>, EngineError>;
}

/// [`Connector`] that discovers the schema over reflection, then opens the
/// long-lived command channel.
#[derive(Clone, Debug)]
pub struct GrpcConnector {
    endpoint: Endpoint,
    service: String,
    connect_timeout: Duration,
}

impl GrpcConnector {
    /// Create a connector for `service` at `endpoint`.
    #[must_use]
    pub fn new(endpoint: Endpoint, service: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            service: service.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self) -> Result<Arc<dyn CommandChannel>, EngineError> {
        info!(endpoint = %self.endpoint, service = %self.service, "discovering engine schema");
        let schema = discover(&self.endpoint, &self.service, self.connect_timeout).await?;
        let channel = connect_channel(&self.endpoint, self.connect_timeout).await?;
        info!(endpoint = %self.endpoint, "engine channel ready");
        Ok(Arc::new(GrpcCommandChannel::new(schema, channel)))
    }
}

/// Observable lifecycle state of a [`BackendHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleStatus {
    /// No attempt has been made, or the last channel was released.
    Uninitialized,
    /// A connect attempt is pending.
    Initializing,
    /// A channel is available.
    Ready,
    /// The most recent attempt failed.
    Failed,
}

enum HandleState {
    Uninitialized,
    Initializing {
        attempt: u64,
        pending: PendingConnect,
    },
    Ready(Arc<dyn CommandChannel>),
    Failed(Arc<EngineError>),
}

impl HandleState {
    const fn status(&self) -> HandleStatus {
        match self {
            Self::Uninitialized => HandleStatus::Uninitialized,
            Self::Initializing { .. } => HandleStatus::Initializing,
            Self::Ready(_) => HandleStatus::Ready,
            Self::Failed(_) => HandleStatus::Failed,
        }
    }
}

struct Inner {
    state: HandleState,
    attempts: u64,
}

/// Process-wide handle to the engine's command channel.
pub struct BackendHandle {
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl BackendHandle {
    /// Create an uninitialised handle using `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            inner: Mutex::new(Inner {
                state: HandleState::Uninitialized,
                attempts: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> HandleStatus { self.lock().state.status() }

    /// Number of connect attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u64 { self.lock().attempts }

    /// Return the ready channel, starting or joining a connect attempt if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns the shared error of the attempt this caller awaited.
    pub async fn get_or_init(&self) -> ConnectOutcome {
        let (attempt, pending) = {
            let mut inner = self.lock();
            match &inner.state {
                HandleState::Ready(channel) => return Ok(Arc::clone(channel)),
                HandleState::Initializing { attempt, pending } => (*attempt, pending.clone()),
                HandleState::Uninitialized | HandleState::Failed(_) => self.begin(&mut inner),
            }
        };
        let outcome = pending.await;
        self.settle(attempt, &outcome);
        outcome
    }

    fn begin(&self, inner: &mut Inner) -> (u64, PendingConnect) {
        inner.attempts += 1;
        let attempt = inner.attempts;
        let connector = Arc::clone(&self.connector);
        let pending = async move {
            match AssertUnwindSafe(connector.connect()).catch_unwind().await {
                Ok(outcome) => outcome.map_err(Arc::new),
                Err(_) => Err(Arc::new(EngineError::ConnectPanicked)),
            }
        }
        .boxed()
        .shared();
        inner.state = HandleState::Initializing {
            attempt,
            pending: pending.clone(),
        };
        (attempt, pending)
    }

    fn settle(&self, attempt: u64, outcome: &ConnectOutcome) {
        let mut inner = self.lock();
        let current = matches!(
            inner.state,
            HandleState::Initializing { attempt: pending, .. } if pending == attempt
        );
        if !current {
            return;
        }
        inner.state = match outcome {
            Ok(channel) => HandleState::Ready(Arc::clone(channel)),
            Err(error) => {
                warn!(attempt, error = %error, "engine connect attempt failed");
                HandleState::Failed(Arc::clone(error))
            }
        };
    }

    /// Discard `stale` if it is still the ready channel.
    ///
    /// A channel installed by a later attempt is left untouched.
    pub fn invalidate(&self, stale: &Arc<dyn CommandChannel>) {
        let mut inner = self.lock();
        let is_current = matches!(&inner.state, HandleState::Ready(channel) if Arc::ptr_eq(channel, stale));
        if is_current {
            info!("engine channel invalidated");
            inner.state = HandleState::Uninitialized;
        }
    }

    /// Drop any ready or failed state and connect again.
    ///
    /// A pending attempt is joined rather than restarted.
    ///
    /// # Errors
    ///
    /// Returns the shared error of the fresh attempt.
    pub async fn refresh(&self) -> ConnectOutcome {
        {
            let mut inner = self.lock();
            if !matches!(inner.state, HandleState::Initializing { .. }) {
                inner.state = HandleState::Uninitialized;
            }
        }
        self.get_or_init().await
    }

    /// Release the channel at process teardown.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, HandleState::Ready(_)) {
            info!("releasing engine channel");
        }
        inner.state = HandleState::Uninitialized;
    }
}
