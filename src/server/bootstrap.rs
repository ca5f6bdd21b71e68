//! Startup validation and listener wiring.

#![expect(
    clippy::print_stdout,
    reason = "intentional console output for server status"
)]

use std::{
    io::{self, Write},
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::Router;
use cli_defs::AppConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::shutdown_signal;
use crate::{AppContext, GatewaySettings, api::router};

#[cfg(not(feature = "tls"))]
const TLS_FEATURE_MISSING: &str = "tla-web was built without the `tls` feature";

/// Certificate and key for HTTPS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct TlsPaths {
    cert: PathBuf,
    key: PathBuf,
}

impl TlsPaths {
    fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        match (&config.tls_cert, &config.tls_key) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(anyhow!(
                "TLS requires both a certificate and a key; only one was provided"
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub(super) struct GatewayBootstrap {
    bind_addr: SocketAddr,
    tls: Option<TlsPaths>,
    settings: GatewaySettings,
}

impl GatewayBootstrap {
    pub(super) fn prepare(config: &AppConfig) -> Result<Self> {
        let tls = TlsPaths::from_config(config)?;
        #[cfg(not(feature = "tls"))]
        if let Some(paths) = &tls {
            return Err(anyhow!(
                "TLS configured with {} and {} but {TLS_FEATURE_MISSING}",
                paths.cert.display(),
                paths.key.display()
            ));
        }
        let bind_addr = parse_bind_addr(&config.bind)?;
        Ok(Self {
            bind_addr,
            tls,
            settings: GatewaySettings::from_config(config),
        })
    }

    pub(super) async fn run(self) -> Result<()> {
        let Self {
            bind_addr,
            tls,
            settings,
        } = self;
        info!(
            engine = %settings.engine_endpoint,
            service = %settings.engine_service,
            max_heavy_requests = settings.max_heavy_requests,
            rate_limit_max_requests = settings.rate_limit_max_requests,
            "gateway configuration loaded"
        );
        let ctx = Arc::new(AppContext::new(settings));
        let app = router(Arc::clone(&ctx));
        let outcome = match tls {
            #[cfg(feature = "tls")]
            Some(paths) => serve_tls(bind_addr, &paths, app).await,
            #[cfg(not(feature = "tls"))]
            Some(_) => Err(anyhow!(TLS_FEATURE_MISSING)),
            None => serve_plain(bind_addr, app).await,
        };
        ctx.shutdown();
        outcome
    }
}

async fn serve_plain(bind_addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    announce_listening("http", local);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("gateway runtime exited with error")
}

#[cfg(feature = "tls")]
async fn serve_tls(bind_addr: SocketAddr, paths: &TlsPaths, app: Router) -> Result<()> {
    use axum_server::{Handle, tls_rustls::RustlsConfig};

    let tls = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .with_context(|| {
            format!(
                "failed to load TLS material from {} and {}",
                paths.cert.display(),
                paths.key.display()
            )
        })?;
    let handle = Handle::new();
    let watcher = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        watcher.graceful_shutdown(None);
    });
    announce_listening("https", bind_addr);
    axum_server::bind_rustls(bind_addr, tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("gateway runtime exited with error")
}

fn announce_listening(scheme: &str, addr: SocketAddr) {
    println!("tla-web listening on {scheme}://{addr}");
    if let Err(error) = io::stdout().flush() {
        warn!(%error, "failed to flush stdout");
    }
}

/// Parse a bind target, resolving host names when it is not a literal
/// socket address.
///
/// # Errors
///
/// Returns an error when the target neither parses nor resolves.
pub fn parse_bind_addr(target: &str) -> Result<SocketAddr> {
    target
        .parse()
        .or_else(|_| resolve_hostname(target))
        .with_context(|| format!("invalid bind address '{target}'"))
}

fn resolve_hostname(target: &str) -> Result<SocketAddr> {
    let mut addrs = target
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve '{target}'"))?;
    addrs
        .next()
        .ok_or_else(|| anyhow!("failed to resolve '{target}'"))
}
