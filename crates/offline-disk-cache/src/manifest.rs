//! Manifest persistence
//!
//! The manifest is the single source of truth for which entries exist, in
//! what order they were stored, and how many bytes they occupy. It is read
//! once when the cache opens and rewritten whole after every successful
//! store, so the cache never has to scan its directory to rebuild state.

use crate::entry_store::write_atomic;
use crate::error::{DiskCacheError, Result};
use crate::key::CacheKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::fs;

/// Fixed filename of the manifest inside the cache root
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Current on-disk format version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    total_size: u64,
    /// Oldest first
    ordered_keys: Vec<CacheKey>,
    sizes: BTreeMap<CacheKey, u64>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            total_size: 0,
            ordered_keys: Vec::new(),
            sizes: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Load the manifest at `path`, or an empty one if the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Self::from_slice(&bytes)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self> {
        let header: VersionHeader = serde_json::from_slice(bytes)
            .map_err(|e| DiskCacheError::ManifestCorrupt(e.to_string()))?;
        if header.version != MANIFEST_VERSION {
            return Err(DiskCacheError::UnsupportedManifestVersion(header.version));
        }

        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| DiskCacheError::ManifestCorrupt(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.ordered_keys.len());
        for key in &self.ordered_keys {
            if !seen.insert(key) {
                return Err(DiskCacheError::ManifestCorrupt(format!(
                    "duplicate key {}",
                    key
                )));
            }
            if !self.sizes.contains_key(key) {
                return Err(DiskCacheError::ManifestCorrupt(format!(
                    "no recorded size for key {}",
                    key
                )));
            }
        }
        if self.sizes.len() != self.ordered_keys.len() {
            return Err(DiskCacheError::ManifestCorrupt(
                "sizes recorded for keys not in the key order".to_string(),
            ));
        }

        let sum = self
            .sizes
            .values()
            .try_fold(0u64, |acc, size| acc.checked_add(*size))
            .ok_or_else(|| DiskCacheError::ManifestCorrupt("size overflow".to_string()))?;
        if sum != self.total_size {
            return Err(DiskCacheError::ManifestCorrupt(format!(
                "total_size {} does not match sum of entry sizes {}",
                self.total_size, sum
            )));
        }
        Ok(())
    }

    /// Overwrite the manifest at `path` in one rename.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| DiskCacheError::Codec(e.to_string()))?;
        write_atomic(path, &bytes).await?;
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.ordered_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_keys.is_empty()
    }

    /// Keys oldest first
    pub fn ordered_keys(&self) -> &[CacheKey] {
        &self.ordered_keys
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.sizes.contains_key(key)
    }

    /// Recorded size of an entry
    pub fn size_of(&self, key: &CacheKey) -> Option<u64> {
        self.sizes.get(key).copied()
    }

    /// Append `key` as the most recently stored entry, replacing any earlier
    /// position it held.
    pub fn push_back(&mut self, key: CacheKey, size: u64) {
        self.remove(&key);
        self.total_size += size;
        self.sizes.insert(key.clone(), size);
        self.ordered_keys.push(key);
    }

    /// Remove `key`, returning its recorded size.
    pub fn remove(&mut self, key: &CacheKey) -> Option<u64> {
        let size = self.sizes.remove(key)?;
        self.ordered_keys.retain(|k| k != key);
        self.total_size = self.total_size.saturating_sub(size);
        Some(size)
    }

    /// Remove and return the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<(CacheKey, u64)> {
        if self.ordered_keys.is_empty() {
            return None;
        }
        let key = self.ordered_keys.remove(0);
        let size = self.sizes.remove(&key).unwrap_or(0);
        self.total_size = self.total_size.saturating_sub(size);
        Some((key, size))
    }

    /// Pop oldest entries until `incoming` more bytes fit within `max_size`
    /// or nothing is left. Returns what was popped, oldest first.
    pub fn evict_to_fit(&mut self, incoming: u64, max_size: u64) -> Vec<(CacheKey, u64)> {
        let mut evicted = Vec::new();
        while self.total_size.saturating_add(incoming) > max_size {
            match self.pop_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }
}
