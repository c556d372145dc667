//! Offline cache server - local HTTP front end for the offline disk cache
//!
//! Lets crawlers and renderers running in other processes store responses
//! for offline use and replay them later.

mod error;
mod server;
mod types;

use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServerConfig;
use offline_disk_cache::{DiskCache, DiskCacheConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("offline_cache_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting offline cache server...");

    let config = load_config();
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache.root);
    info!("Max cache size: {} MB", config.cache.max_size / (1024 * 1024));

    let cache = DiskCache::open(config.cache).await?;
    let state: SharedState = Arc::new(ServerState::new(cache));

    start_server(state, config.port).await?;

    Ok(())
}

fn load_config() -> ServerConfig {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(ServerConfig::default().port);

    ServerConfig {
        port,
        cache: DiskCacheConfig::from_env(),
    }
}
