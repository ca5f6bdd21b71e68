//! Shared CLI type definitions for tla-web build and runtime.
//!
//! This crate provides the configuration surface used by both the `build.rs`
//! script (for man page generation) and the runtime binary. Keeping the types
//! here lets the build script render the man page without compiling the
//! gateway itself.

// FIXME: File-wide suppressions are unavoidable here. Clap and OrthoConfig derive macros
// inject generated code throughout the module, and there is no mechanism to narrow
// the scope without restructuring the crate.
#![expect(
    non_snake_case,
    reason = "Clap/OrthoConfig derive macros generate helper modules with uppercase names"
)]
#![expect(
    missing_docs,
    reason = "OrthoConfig and Clap derive macros generate items that cannot be documented"
)]

use clap::{Args, Parser};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

/// Default gateway listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
/// Default verification engine endpoint (`host:port`).
pub const DEFAULT_ENGINE_ENDPOINT: &str = "localhost:8822";
/// Fully qualified name of the engine's command service.
pub const DEFAULT_ENGINE_SERVICE: &str = "shai.cmdExecutor.CmdExecutor";

/// Length of the fixed rate-limit window, in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Requests a single caller may make per window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 60;
/// Concurrent engine-backed requests admitted at once.
pub const DEFAULT_MAX_HEAVY_REQUESTS: u32 = 4;
/// Largest accepted JSON body, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 262_144;
/// Largest accepted specification text, in characters.
pub const DEFAULT_MAX_SPEC_CHARS: usize = 200_000;
/// Largest accepted invariant name, in characters.
pub const DEFAULT_MAX_INVARIANT_CHARS: usize = 256;
/// Lifetime of cached invariant lists.
pub const DEFAULT_INVARIANTS_CACHE_TTL_MS: u64 = 10_000;
/// Lifetime of cached verification verdicts.
pub const DEFAULT_VERIFY_CACHE_TTL_MS: u64 = 5_000;
/// Entry bound shared by both result caches.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;
/// Bounded model checking length reported to callers.
pub const DEFAULT_CHECK_MAX_STEPS: u32 = 10;
/// SMT timeout handed to the engine with each check.
pub const DEFAULT_SOLVER_TIMEOUT_SECS: u64 = 60;
/// Random runs requested per simulation.
pub const DEFAULT_SIMULATE_MAX_RUNS: u32 = 5;
/// Outer deadline the gateway applies to every engine call.
pub const DEFAULT_ENGINE_CALL_TIMEOUT_SECS: u64 = 120;

/// Runtime configuration for the gateway.
///
/// The default bind address `0.0.0.0:8000` listens on all interfaces. This is
/// convenient for local development, but production deployments should bind
/// to a specific interface and sit behind a reverse proxy that sets
/// `x-forwarded-for`.
#[derive(Args, OrthoConfig, Serialize, Deserialize, Default, Debug, Clone)]
#[ortho_config(prefix = "TLAWEB_")]
pub struct AppConfig {
    /// Gateway listen address.
    #[ortho_config(default = DEFAULT_BIND.to_owned())]
    #[arg(long)]
    pub bind: String,
    /// Verification engine endpoint as `host:port`.
    #[ortho_config(default = DEFAULT_ENGINE_ENDPOINT.to_owned())]
    #[arg(long)]
    pub engine_endpoint: String,
    /// Fully qualified gRPC service name resolved through reflection.
    #[ortho_config(default = DEFAULT_ENGINE_SERVICE.to_owned())]
    #[arg(long)]
    pub engine_service: String,
    /// PEM certificate chain for serving HTTPS.
    #[arg(long)]
    pub tls_cert: Option<String>,
    /// PEM private key for serving HTTPS.
    #[arg(long)]
    pub tls_key: Option<String>,
    /// Fixed rate-limit window length in seconds.
    #[ortho_config(default = DEFAULT_RATE_LIMIT_WINDOW_SECS)]
    #[arg(long)]
    pub rate_limit_window_secs: u64,
    /// Maximum requests per caller per window.
    #[ortho_config(default = DEFAULT_RATE_LIMIT_MAX_REQUESTS)]
    #[arg(long)]
    pub rate_limit_max_requests: u32,
    /// Concurrency slots for engine-backed routes.
    #[ortho_config(default = DEFAULT_MAX_HEAVY_REQUESTS)]
    #[arg(long)]
    pub max_heavy_requests: u32,
    /// Maximum request body size in bytes.
    #[ortho_config(default = DEFAULT_MAX_BODY_BYTES)]
    #[arg(long)]
    pub max_body_bytes: usize,
    /// Maximum specification length in characters.
    #[ortho_config(default = DEFAULT_MAX_SPEC_CHARS)]
    #[arg(long)]
    pub max_spec_chars: usize,
    /// Maximum invariant name length in characters.
    #[ortho_config(default = DEFAULT_MAX_INVARIANT_CHARS)]
    #[arg(long)]
    pub max_invariant_chars: usize,
    /// TTL for cached invariant lists in milliseconds.
    #[ortho_config(default = DEFAULT_INVARIANTS_CACHE_TTL_MS)]
    #[arg(long)]
    pub invariants_cache_ttl_ms: u64,
    /// TTL for cached verdicts in milliseconds.
    #[ortho_config(default = DEFAULT_VERIFY_CACHE_TTL_MS)]
    #[arg(long)]
    pub verify_cache_ttl_ms: u64,
    /// Entry bound for each result cache.
    #[ortho_config(default = DEFAULT_CACHE_MAX_ENTRIES)]
    #[arg(long)]
    pub cache_max_entries: usize,
    /// Bounded model checking length.
    #[ortho_config(default = DEFAULT_CHECK_MAX_STEPS)]
    #[arg(long)]
    pub check_max_steps: u32,
    /// Per-call SMT solver timeout passed to the engine.
    #[ortho_config(default = DEFAULT_SOLVER_TIMEOUT_SECS)]
    #[arg(long)]
    pub solver_timeout_secs: u64,
    /// Random runs requested per simulation.
    #[ortho_config(default = DEFAULT_SIMULATE_MAX_RUNS)]
    #[arg(long)]
    pub simulate_max_runs: u32,
    /// Outer deadline for a single engine call in seconds.
    #[ortho_config(default = DEFAULT_ENGINE_CALL_TIMEOUT_SECS)]
    #[arg(long)]
    pub engine_call_timeout_secs: u64,
}

/// Top-level CLI entry point consumed by the binary and the build script.
///
/// Every flag is optional here; defaults are applied when the layers are
/// merged, so the environment and dotfile still take effect.
#[derive(Parser, Serialize)]
#[command(name = "tla-web", author, version, about = "HTTP gateway for a model checking engine")]
pub struct Cli {
    /// CLI configuration overrides (merged with files and defaults at runtime).
    #[command(flatten)]
    pub config: __AppConfigCli,
}
