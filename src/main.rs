//! `tla-web` binary entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> { tla_web::server::run().await }
