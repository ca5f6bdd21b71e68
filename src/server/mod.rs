//! Gateway runtime.
//!
//! The binary stays a thin wrapper around [`run`], which loads layered
//! configuration, installs the tracing subscriber and serves the API until a
//! shutdown signal arrives.

mod bootstrap;
mod shutdown;

use anyhow::{Context, Result};
pub use cli_defs::AppConfig;
use ortho_config::OrthoConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub use bootstrap::parse_bind_addr;
use bootstrap::GatewayBootstrap;
pub use shutdown::shutdown_signal;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tla_web=info";

/// Load configuration from the process arguments and serve until shutdown.
///
/// # Errors
///
/// Returns any error raised while loading configuration, validating the TLS
/// pair, binding the listener or running the HTTP server.
pub async fn run() -> Result<()> {
    let config =
        AppConfig::load_from_iter(std::env::args_os()).context("failed to load configuration")?;
    run_with_config(config).await
}

/// Serve the gateway with already loaded configuration.
///
/// # Errors
///
/// Propagates failures from validating the configuration or from the server.
pub async fn run_with_config(config: AppConfig) -> Result<()> {
    init_tracing();
    GatewayBootstrap::prepare(&config)?.run().await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        debug!("tracing subscriber already installed");
    }
}
