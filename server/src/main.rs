mod cache;
mod config;
mod db;
mod hub;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::services::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    let state = state::AppState::new(Arc::new(PgStore::new(pool)), config.hub, &config.cache);

    // Background tasks.
    let _heartbeat = hub::spawn_heartbeat_task(state.hub.clone());
    let _sweep = cache::spawn_sweep_task(state.caches.clone(), config.cache.sweep_interval);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!(port = config.port, "signage server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
