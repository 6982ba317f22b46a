mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use config::StoreBackend;
use store::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        store_backend = ?settings.store_backend,
        "Starting craftlink backend"
    );

    // Build storage-backed application state
    let state = match settings.store_backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store backend");
            app::AppState::with_memory_store(settings.clone(), Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = settings
                .database_url
                .clone()
                .context("DATABASE_URL must be set")?;
            let pool = db::create_pool(&database_url, settings.database_max_connections).await?;
            app::AppState::with_pg_store(settings.clone(), pool)
        }
    };

    // Liveness heartbeats for push subscribers; sessions that stop seeing
    // them fall back to polling.
    state
        .bus
        .spawn_heartbeat(Duration::from_secs(settings.heartbeat_interval_seconds));

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
