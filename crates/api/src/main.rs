use std::sync::Arc;

use anyhow::Context;

use siteops_api::app::{self, services::AppServices};
use siteops_api::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    siteops_observability::init();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(AppServices::from_config(&config));
    services.scheduler.start();

    let router = app::build_app(services.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
