//! Error types for the offline disk cache

use std::fmt;

#[derive(Debug)]
pub enum DiskCacheError {
    Io(Box<std::io::Error>),
    /// The manifest file exists but could not be parsed or failed validation
    ManifestCorrupt(String),
    UnsupportedManifestVersion(u32),
    /// The payload can never fit, even in an empty cache
    PayloadTooLarge { size: u64, max: u64 },
    Codec(String),
    Config(String),
    /// The task running a store or clear panicked or was cancelled
    Task(String),
}

impl fmt::Display for DiskCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskCacheError::Io(err) => write!(f, "IO error: {}", err),
            DiskCacheError::ManifestCorrupt(msg) => write!(f, "Corrupt manifest: {}", msg),
            DiskCacheError::UnsupportedManifestVersion(version) => {
                write!(f, "Unsupported manifest version: {}", version)
            }
            DiskCacheError::PayloadTooLarge { size, max } => write!(
                f,
                "Payload too large: {} bytes exceeds cache budget of {} bytes",
                size, max
            ),
            DiskCacheError::Codec(msg) => write!(f, "Payload codec error: {}", msg),
            DiskCacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DiskCacheError::Task(msg) => write!(f, "Cache task failed: {}", msg),
        }
    }
}

impl std::error::Error for DiskCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiskCacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DiskCacheError {
    fn from(err: std::io::Error) -> Self {
        DiskCacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, DiskCacheError>;
