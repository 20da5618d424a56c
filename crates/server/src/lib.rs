//! HTTP transport for the backup agent: one route per operation and address
//! form, request metrics, and the per-shard listener.

pub mod metrics;
pub mod router;
pub mod shard;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use chbackup_core::{Config, Dispatcher, Engine};

pub use metrics::Metrics;
pub use router::{AppState, router};

/// Builds the router for `config` around `engine`.
pub fn app(config: Config, engine: Arc<dyn Engine>) -> Result<axum::Router> {
    let metrics = Arc::new(Metrics::new().context("failed to create metrics registry")?);
    let state = AppState::new(config, Dispatcher::new(engine), metrics);
    Ok(router(state))
}

/// Serves the API until ctrl-c.
pub async fn serve(config: Config, engine: Arc<dyn Engine>, port_override: Option<u16>) -> Result<()> {
    let addr = shard::listen_addr(&config.api, port_override)?;
    let scheme = config.api.addressing;
    let app = app(config, engine)?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, addressing = ?scheme, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    info!("API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
