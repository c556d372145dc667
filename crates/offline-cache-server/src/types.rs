//! Core types for the offline cache server

use offline_disk_cache::{CacheStats, DiskCacheConfig};
use serde::{Deserialize, Serialize};

/// Configuration for the cache server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub cache: DiskCacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            cache: DiskCacheConfig::default(),
        }
    }
}

/// Query string naming the cached resource
#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    pub url: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
