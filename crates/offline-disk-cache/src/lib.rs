//! Persistent, size-bounded on-disk response cache
//!
//! Entries are stored one file per key under a cache root, alongside a single
//! manifest recording their store order and sizes. The manifest is loaded on
//! open, so restarts never rescan the directory. When a new entry does not
//! fit, the oldest stored entries are evicted first.

mod cache;
mod config;
mod entry_store;
mod error;
mod key;
mod manifest;
mod payload;
mod request;
mod types;

pub use cache::DiskCache;
pub use config::DiskCacheConfig;
pub use error::{DiskCacheError, Result};
pub use key::{derive_key, CacheKey, KEY_LEN};
pub use manifest::{MANIFEST_FILENAME, MANIFEST_VERSION};
pub use payload::{CachePayload, CachedPayload};
pub use request::RequestIdentity;
pub use types::{AuditReport, CacheStats, SizeMismatch};
