//! Cache types

use crate::key::CacheKey;
use serde::{Deserialize, Serialize};

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// An entry whose file size disagrees with what the manifest recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub key: CacheKey,
    pub recorded: u64,
    pub on_disk: u64,
}

/// Differences between the manifest and the cache directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Payload files with no manifest entry
    pub orphans: Vec<CacheKey>,
    /// Manifest entries with no payload file
    pub missing: Vec<CacheKey>,
    pub size_mismatches: Vec<SizeMismatch>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.orphans.is_empty() && self.missing.is_empty() && self.size_mismatches.is_empty()
    }
}
