//! Application context.
//!
//! [`AppContext`] owns the process-wide state shared by all request handlers:
//! the engine handle, the result caches, the rate limiter, the heavy-route
//! slots and the supersession registry. It is created once at startup,
//! shared behind an `Arc` and torn down with [`AppContext::shutdown`].

use std::{sync::Arc, time::Duration};

use cli_defs::{
    AppConfig,
    DEFAULT_CACHE_MAX_ENTRIES,
    DEFAULT_CHECK_MAX_STEPS,
    DEFAULT_ENGINE_CALL_TIMEOUT_SECS,
    DEFAULT_ENGINE_ENDPOINT,
    DEFAULT_ENGINE_SERVICE,
    DEFAULT_INVARIANTS_CACHE_TTL_MS,
    DEFAULT_MAX_BODY_BYTES,
    DEFAULT_MAX_HEAVY_REQUESTS,
    DEFAULT_MAX_INVARIANT_CHARS,
    DEFAULT_MAX_SPEC_CHARS,
    DEFAULT_RATE_LIMIT_MAX_REQUESTS,
    DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_SIMULATE_MAX_RUNS,
    DEFAULT_SOLVER_TIMEOUT_SECS,
    DEFAULT_VERIFY_CACHE_TTL_MS,
};
use tracing::info;

use crate::{
    cache::ResultCache,
    engine::{BackendHandle, Connector, Endpoint, GrpcConnector, Invoker, InvokerSettings},
    gateway::{HeavySlots, InFlightCalls, RateLimiter},
    normalize::Verdict,
};

/// Time allowed to establish a connection to the engine.
pub const ENGINE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Typed gateway settings derived from [`AppConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Engine location.
    pub engine_endpoint: Endpoint,
    /// Fully qualified engine service name.
    pub engine_service: String,
    /// Rate-limit window length.
    pub rate_limit_window: Duration,
    /// Requests allowed per caller per window.
    pub rate_limit_max_requests: u32,
    /// Concurrent engine-bound requests.
    pub max_heavy_requests: usize,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Maximum specification length in characters.
    pub max_spec_chars: usize,
    /// Maximum invariant name length in characters.
    pub max_invariant_chars: usize,
    /// Lifetime of cached invariant listings.
    pub invariants_cache_ttl: Duration,
    /// Lifetime of cached verdicts.
    pub verify_cache_ttl: Duration,
    /// Capacity of each result cache.
    pub cache_max_entries: usize,
    /// Step bound reported by verification.
    pub check_max_steps: u32,
    /// Engine invocation tuning.
    pub invoker: InvokerSettings,
}

impl GatewaySettings {
    /// Derive settings from loaded configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            engine_endpoint: Endpoint::parse_or_default(&config.engine_endpoint),
            engine_service: config.engine_service.clone(),
            rate_limit_window: Duration::from_secs(config.rate_limit_window_secs),
            rate_limit_max_requests: config.rate_limit_max_requests,
            max_heavy_requests: usize::try_from(config.max_heavy_requests).unwrap_or(usize::MAX),
            max_body_bytes: config.max_body_bytes,
            max_spec_chars: config.max_spec_chars,
            max_invariant_chars: config.max_invariant_chars,
            invariants_cache_ttl: Duration::from_millis(config.invariants_cache_ttl_ms),
            verify_cache_ttl: Duration::from_millis(config.verify_cache_ttl_ms),
            cache_max_entries: config.cache_max_entries,
            check_max_steps: config.check_max_steps,
            invoker: InvokerSettings {
                solver_timeout: Duration::from_secs(config.solver_timeout_secs),
                simulate_max_runs: config.simulate_max_runs,
                call_timeout: Duration::from_secs(config.engine_call_timeout_secs),
            },
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            engine_endpoint: Endpoint::parse_or_default(DEFAULT_ENGINE_ENDPOINT),
            engine_service: DEFAULT_ENGINE_SERVICE.to_owned(),
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            max_heavy_requests: usize::try_from(DEFAULT_MAX_HEAVY_REQUESTS).unwrap_or(1),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_spec_chars: DEFAULT_MAX_SPEC_CHARS,
            max_invariant_chars: DEFAULT_MAX_INVARIANT_CHARS,
            invariants_cache_ttl: Duration::from_millis(DEFAULT_INVARIANTS_CACHE_TTL_MS),
            verify_cache_ttl: Duration::from_millis(DEFAULT_VERIFY_CACHE_TTL_MS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            check_max_steps: DEFAULT_CHECK_MAX_STEPS,
            invoker: InvokerSettings {
                solver_timeout: Duration::from_secs(DEFAULT_SOLVER_TIMEOUT_SECS),
                simulate_max_runs: DEFAULT_SIMULATE_MAX_RUNS,
                call_timeout: Duration::from_secs(DEFAULT_ENGINE_CALL_TIMEOUT_SECS),
            },
        }
    }
}

/// Process-wide state shared by request handlers.
#[derive(Debug)]
pub struct AppContext {
    /// Active settings.
    pub settings: GatewaySettings,
    /// Shared engine handle.
    pub backend: BackendHandle,
    /// Command invoker.
    pub invoker: Invoker,
    /// Invariant listings keyed by specification text.
    pub invariants_cache: ResultCache<Vec<String>>,
    /// Verdicts keyed by specification and invariant.
    pub verify_cache: ResultCache<Verdict>,
    /// Per-caller rate limiter.
    pub rate_limiter: RateLimiter,
    /// Heavy-route admission slots.
    pub heavy_slots: HeavySlots,
    /// Supersession registry.
    pub in_flight: Arc<InFlightCalls>,
}

impl AppContext {
    /// Build a context that reaches the engine over gRPC.
    #[must_use]
    pub fn new(settings: GatewaySettings) -> Self {
        let connector = GrpcConnector::new(
            settings.engine_endpoint.clone(),
            settings.engine_service.clone(),
            ENGINE_CONNECT_TIMEOUT,
        );
        Self::with_connector(settings, Arc::new(connector))
    }

    /// Build a context using `connector` to obtain engine channels.
    #[must_use]
    pub fn with_connector(settings: GatewaySettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            backend: BackendHandle::new(connector),
            invoker: Invoker::new(settings.invoker),
            invariants_cache: ResultCache::new(
                settings.cache_max_entries,
                settings.invariants_cache_ttl,
            ),
            verify_cache: ResultCache::new(settings.cache_max_entries, settings.verify_cache_ttl),
            rate_limiter: RateLimiter::new(
                settings.rate_limit_window,
                settings.rate_limit_max_requests,
            ),
            heavy_slots: HeavySlots::new(settings.max_heavy_requests),
            in_flight: Arc::new(InFlightCalls::default()),
            settings,
        }
    }

    /// Release the engine channel.
    pub fn shutdown(&self) {
        info!("shutting down application context");
        self.backend.shutdown();
    }
}
