//! Error types for the offline cache server

use std::fmt;

#[derive(Debug)]
pub enum CacheServerError {
    Cache(offline_disk_cache::DiskCacheError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for CacheServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheServerError::Cache(err) => write!(f, "Cache error: {}", err),
            CacheServerError::Io(err) => write!(f, "IO error: {}", err),
            CacheServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheServerError::Cache(err) => Some(err),
            CacheServerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<offline_disk_cache::DiskCacheError> for CacheServerError {
    fn from(err: offline_disk_cache::DiskCacheError) -> Self {
        CacheServerError::Cache(err)
    }
}

impl From<std::io::Error> for CacheServerError {
    fn from(err: std::io::Error) -> Self {
        CacheServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for CacheServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CacheServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheServerError>;
