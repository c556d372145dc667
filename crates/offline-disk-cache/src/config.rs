//! Cache configuration

use std::path::PathBuf;

const MB: u64 = 1024 * 1024;

/// Where the cache lives and how large it may grow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCacheConfig {
    pub root: PathBuf,
    pub max_size: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./cache/offline"),
            max_size: 100 * MB,
        }
    }
}

impl DiskCacheConfig {
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            root: root.into(),
            max_size,
        }
    }

    /// Read `CACHE_DIR` and `MAX_CACHE_SIZE` from the environment, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let root = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.root);

        let max_size = lookup("MAX_CACHE_SIZE")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.max_size);

        Self { root, max_size }
    }
}
