//! Supersession of in-flight engine calls.
//!
//! A client session repeating a request for the same purpose (for example
//! re-running verification after an edit) replaces its older call instead of
//! queuing behind it. Each call registers under `(session, route)`;
//! registering again cancels the previous token. Requests without a session
//! never register, so callers sharing an address cannot cancel each other.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

type CallKey = (String, &'static str);

/// Registry of in-flight calls keyed by client session and route.
#[derive(Debug, Default)]
pub struct InFlightCalls {
    calls: Mutex<HashMap<CallKey, (u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl InFlightCalls {
    fn lock(&self) -> MutexGuard<'_, HashMap<CallKey, (u64, CancellationToken)>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a call, cancelling any older call with the same key.
    #[must_use]
    pub fn register(self: &Arc<Self>, session: &str, route: &'static str) -> CallGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let key = (session.to_owned(), route);
        let previous = self.lock().insert(key.clone(), (id, token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            debug!(session, route, superseded = previous_id, "superseding in-flight call");
            previous_token.cancel();
        }
        CallGuard {
            registry: Arc::clone(self),
            key,
            id,
            token,
        }
    }

    /// Number of registered calls.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().len() }

    /// Whether no calls are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }
}

/// Registration of one call; deregisters on drop.
#[derive(Debug)]
pub struct CallGuard {
    registry: Arc<InFlightCalls>,
    key: CallKey,
    id: u64,
    token: CancellationToken,
}

impl CallGuard {
    /// Resolves once a newer call with the same key registers.
    #[must_use]
    pub fn superseded(&self) -> WaitForCancellationFuture<'_> { self.token.cancelled() }

    /// Whether a newer call has already replaced this one.
    #[must_use]
    pub fn is_superseded(&self) -> bool { self.token.is_cancelled() }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let mut calls = self.registry.lock();
        let owned = calls.get(&self.key).is_some_and(|(id, _)| *id == self.id);
        if owned {
            calls.remove(&self.key);
        }
    }
}
