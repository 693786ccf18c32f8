//! # vio-api: Binary Entry Point
//!
//! Parses configuration from flags and the environment, connects the store
//! and serves the API.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use vio_api::config::AppConfig;
use vio_api::db::{self, PgStore};
use vio_api::state::AppState;
use vio_api::store::memory::MemoryStore;
use vio_api::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store: Arc<dyn Store> = match db::init_pool(&config)
        .await
        .context("database initialization failed")?
    {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    let mut state = AppState::new(config.clone(), store);
    match vio_api::middleware::metrics::install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!("Prometheus recorder not installed: {e}"),
    }

    let app = vio_api::app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        "vio-api listening on {addr} (max attachments {})",
        config.max_attachments()
    );

    axum::serve(listener, app).await?;
    Ok(())
}
