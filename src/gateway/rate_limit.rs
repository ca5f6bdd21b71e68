//! Fixed-window rate limiting per caller.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::Instant;

/// Bucket count above which stale windows are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Requests counted in the caller's current window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBucket {
    /// Requests admitted in this window.
    pub count: u32,
    /// When the window opened.
    pub window_start: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed.
    Allowed {
        /// Requests still available in this window.
        remaining: u32,
    },
    /// The caller exhausted its window.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

/// Fixed-window counter keyed by caller identity.
///
/// An expired window resets the count; it does not slide. Stale buckets are
/// swept at most once per window, and only once the map is large.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<Buckets>,
}

#[derive(Debug)]
struct Buckets {
    by_caller: HashMap<String, RateBucket>,
    next_prune: Instant,
}

impl Buckets {
    fn prune(&mut self, now: Instant, window: Duration) {
        if self.by_caller.len() < PRUNE_THRESHOLD || now < self.next_prune {
            return;
        }
        self.by_caller
            .retain(|_, bucket| now.duration_since(bucket.window_start) < window);
        self.next_prune = now + window;
    }
}

impl RateLimiter {
    /// Allow `max_requests` (at least one) per `window`.
    #[must_use]
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
            state: Mutex::new(Buckets {
                by_caller: HashMap::new(),
                next_prune: Instant::now() + window,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count a request from `caller`.
    pub fn check(&self, caller: &str) -> RateDecision {
        let now = Instant::now();
        let window = self.window;
        let mut state = self.lock();
        state.prune(now, window);
        let bucket = state
            .by_caller
            .entry(caller.to_owned())
            .or_insert(RateBucket {
                count: 0,
                window_start: now,
            });
        let elapsed = now.duration_since(bucket.window_start);
        if elapsed >= window {
            *bucket = RateBucket {
                count: 0,
                window_start: now,
            };
        }
        if bucket.count >= self.max_requests {
            return RateDecision::Limited {
                retry_after: window.saturating_sub(now.duration_since(bucket.window_start)),
            };
        }
        bucket.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - bucket.count,
        }
    }

    /// Current bucket for `caller`, if one exists.
    #[must_use]
    pub fn bucket(&self, caller: &str) -> Option<RateBucket> {
        self.lock().by_caller.get(caller).copied()
    }
}
