mod alignment;
mod api;
mod cache;
mod config;
mod constants;
mod ephemeris;
mod error;
mod http_client;
mod image_proxy;
mod kp;
mod magnetometer;
mod magnetometer_text;
mod magnetometer_xml;
mod normalize;
mod radar;
mod radio_blackout;
mod solar_wind;
mod synthetic;
mod tabular;
#[cfg(test)]
mod test_support;
mod types;
mod utils;
mod warm;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::api::router;
use crate::cache::SystemClock;
use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::types::AppState;
use crate::utils::init_tracing;
use crate::warm::spawn_warmup;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Arc::new(Config::from_env()?);

    let http = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(cfg.request_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .context("Failed to build reqwest client")?;

    let state = AppState::new(cfg.clone(), http, Arc::new(SystemClock));
    spawn_warmup(state.clone());

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

    info!(
        "Space weather API listening on {} (static assets from {})",
        cfg.listen_addr,
        cfg.static_dir.display()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
