//! Size-bounded disk cache with manifest-driven eviction

use crate::config::DiskCacheConfig;
use crate::entry_store::EntryStore;
use crate::error::{DiskCacheError, Result};
use crate::key::{derive_key, CacheKey};
use crate::manifest::{Manifest, MANIFEST_FILENAME};
use crate::payload::CachePayload;
use crate::request::RequestIdentity;
use crate::types::{AuditReport, CacheStats, SizeMismatch};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A persistent cache that keeps at most `max_size` bytes of payloads on
/// disk, evicting the oldest stored entries first.
///
/// Lookups never reorder entries: age is governed only by when an entry was
/// last stored.
pub struct DiskCache {
    /// Guards every manifest mutation; held for the whole store path
    manifest: Arc<Mutex<Manifest>>,
    storage: Arc<Storage>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Everything a store or clear touches once it holds the manifest lock
struct Storage {
    entries: EntryStore,
    manifest_path: PathBuf,
    max_size: u64,
}

impl DiskCache {
    /// Open the cache at `config.root`, creating the directory if needed and
    /// loading its manifest.
    ///
    /// A manifest that exists but cannot be understood is an error; the cache
    /// will not silently start over on top of it.
    pub async fn open(config: DiskCacheConfig) -> Result<Self> {
        if config.max_size == 0 {
            return Err(DiskCacheError::Config(
                "max_size must be greater than zero".to_string(),
            ));
        }
        fs::create_dir_all(&config.root).await?;

        let manifest_path = config.root.join(MANIFEST_FILENAME);
        let manifest = Manifest::load(&manifest_path).await?;

        info!(
            root = ?config.root,
            entries = manifest.len(),
            total_size = manifest.total_size(),
            max_size = config.max_size,
            "Disk cache opened"
        );

        Ok(Self {
            manifest: Arc::new(Mutex::new(manifest)),
            storage: Arc::new(Storage {
                entries: EntryStore::new(config.root),
                manifest_path,
                max_size: config.max_size,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Key under which `request` is stored
    pub fn key_for<R: RequestIdentity + ?Sized>(request: &R) -> CacheKey {
        derive_key(request.canonical_url())
    }

    /// Store `payload` for `request`. Returns `true` only if the payload was
    /// written and the manifest recording it was persisted.
    pub async fn store<R, P>(&self, request: &R, payload: &P) -> bool
    where
        R: RequestIdentity + ?Sized,
        P: CachePayload,
    {
        match self.try_store(request, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %request.canonical_url(), error = %e, "Failed to store cache entry");
                false
            }
        }
    }

    /// Like [`DiskCache::store`], but reports why a store failed.
    ///
    /// Once the manifest lock is taken the store runs on its own task, so
    /// dropping the returned future does not abandon it halfway.
    pub async fn try_store<R, P>(&self, request: &R, payload: &P) -> Result<()>
    where
        R: RequestIdentity + ?Sized,
        P: CachePayload,
    {
        let key = Self::key_for(request);
        let bytes = payload.encode()?;
        let incoming = bytes.len() as u64;

        if incoming > self.storage.max_size {
            return Err(DiskCacheError::PayloadTooLarge {
                size: incoming,
                max: self.storage.max_size,
            });
        }

        let mut manifest = Arc::clone(&self.manifest).lock_owned().await;
        let storage = Arc::clone(&self.storage);
        run_to_completion(async move { storage.store_locked(&mut manifest, key, bytes).await })
            .await
    }

    /// Look up the payload stored for `request`.
    ///
    /// Missing, unreadable and corrupt entries are all reported as `None`.
    pub async fn lookup<R, P>(&self, request: &R) -> Option<P>
    where
        R: RequestIdentity + ?Sized,
        P: CachePayload,
    {
        let key = Self::key_for(request);

        let bytes = match self.storage.entries.read(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Failed to read cached file");
                return None;
            }
        };

        match P::decode(&bytes) {
            Ok(payload) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                Some(payload)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Whether the manifest currently lists an entry for `request`
    pub async fn contains<R: RequestIdentity + ?Sized>(&self, request: &R) -> bool {
        self.manifest.lock().await.contains(&Self::key_for(request))
    }

    pub async fn current_size(&self) -> u64 {
        self.manifest.lock().await.total_size()
    }

    pub async fn entry_count(&self) -> usize {
        self.manifest.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.manifest.lock().await.is_empty()
    }

    /// Stored keys, oldest first
    pub async fn ordered_keys(&self) -> Vec<CacheKey> {
        self.manifest.lock().await.ordered_keys().to_vec()
    }

    pub fn max_size(&self) -> u64 {
        self.storage.max_size
    }

    pub fn root(&self) -> &Path {
        self.storage.entries.root()
    }

    pub fn manifest_path(&self) -> &Path {
        &self.storage.manifest_path
    }

    /// Path of the payload file that does or would hold `request`
    pub fn path_for<R: RequestIdentity + ?Sized>(&self, request: &R) -> PathBuf {
        self.storage.entries.path_for(&Self::key_for(request))
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let manifest = self.manifest.lock().await;
        CacheStats {
            entries: manifest.len(),
            total_size: manifest.total_size(),
            max_size: self.storage.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Remove every payload file, including orphans, and the manifest.
    ///
    /// If a file cannot be removed the manifest is rewritten to list only
    /// what is left and the error is returned.
    pub async fn clear(&self) -> Result<()> {
        let mut manifest = Arc::clone(&self.manifest).lock_owned().await;
        let storage = Arc::clone(&self.storage);
        run_to_completion(async move { storage.clear_locked(&mut manifest).await }).await
    }

    /// Compare the manifest with the files actually on disk.
    pub async fn audit(&self) -> Result<AuditReport> {
        let manifest = self.manifest.lock().await;
        let entries = &self.storage.entries;

        let files: HashSet<CacheKey> = entries.list_keys().await?.into_iter().collect();

        let mut orphans: Vec<CacheKey> = files
            .iter()
            .filter(|key| !manifest.contains(key))
            .cloned()
            .collect();
        orphans.sort();

        let mut report = AuditReport {
            orphans,
            ..AuditReport::default()
        };

        for key in manifest.ordered_keys() {
            let recorded = manifest.size_of(key).unwrap_or(0);
            match entries.size_of(key).await? {
                None => report.missing.push(key.clone()),
                Some(on_disk) if on_disk != recorded => report.size_mismatches.push(SizeMismatch {
                    key: key.clone(),
                    recorded,
                    on_disk,
                }),
                Some(_) => {}
            }
        }

        if !report.is_consistent() {
            warn!(
                orphans = report.orphans.len(),
                missing = report.missing.len(),
                size_mismatches = report.size_mismatches.len(),
                "Disk cache audit found inconsistencies"
            );
        }
        Ok(report)
    }
}

/// Drive `task` on its own tokio task. If the caller stops waiting, the
/// task still finishes and releases whatever lock it holds.
async fn run_to_completion<F>(task: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => Err(DiskCacheError::Task(e.to_string())),
    }
}

impl Storage {
    /// The store critical section. `manifest` is only replaced by a state
    /// that has been saved and matches what is on disk.
    async fn store_locked(
        &self,
        manifest: &mut Manifest,
        key: CacheKey,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let incoming = bytes.len() as u64;
        let mut committed = manifest.clone();

        // A re-store gives up its old position and its old bytes
        if committed.contains(&key) {
            if let Err(e) = self.entries.delete(&key).await {
                warn!(key = %key, error = %e, "Failed to remove previous cache entry");
                return Err(e.into());
            }
            committed.remove(&key);
        }

        let mut plan = committed.clone();
        for (evicted, size) in plan.evict_to_fit(incoming, self.max_size) {
            if let Err(e) = self.entries.delete(&evicted).await {
                warn!(key = %evicted, error = %e, "Failed to evict cache entry, keeping it");
                self.commit(manifest, committed).await;
                return Err(e.into());
            }
            committed.remove(&evicted);
            debug!(key = %evicted, size, "Evicted oldest cache entry");
        }

        if let Err(e) = self.entries.write(&key, &bytes).await {
            // Evicted files are already gone, so record that much
            self.commit(manifest, committed).await;
            return Err(e.into());
        }

        committed.push_back(key.clone(), incoming);
        committed.save(&self.manifest_path).await?;

        debug!(
            key = %key,
            size = incoming,
            total_size = committed.total_size(),
            entries = committed.len(),
            "Stored cache entry"
        );
        *manifest = committed;

        Ok(())
    }

    /// Persist and adopt `next` after a store failed part way through.
    async fn commit(&self, manifest: &mut Manifest, next: Manifest) {
        if next == *manifest {
            return;
        }
        match next.save(&self.manifest_path).await {
            Ok(()) => *manifest = next,
            Err(e) => warn!(error = %e, "Failed to persist manifest after partial store"),
        }
    }

    async fn clear_locked(&self, manifest: &mut Manifest) -> Result<()> {
        let mut remaining = manifest.clone();

        let listed: HashSet<CacheKey> = manifest.ordered_keys().iter().cloned().collect();
        let orphans: Vec<CacheKey> = self
            .entries
            .list_keys()
            .await?
            .into_iter()
            .filter(|key| !listed.contains(key))
            .collect();

        let keys: Vec<CacheKey> = orphans
            .iter()
            .chain(manifest.ordered_keys())
            .cloned()
            .collect();

        for key in &keys {
            if let Err(e) = self.entries.delete(key).await {
                warn!(key = %key, error = %e, "Failed to delete cache entry while clearing");
                self.commit(manifest, remaining).await;
                return Err(e.into());
            }
            remaining.remove(key);
        }

        match fs::remove_file(&self.manifest_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                // Entries are gone either way; an empty manifest is still the truth
                Manifest::default().save(&self.manifest_path).await?;
                debug!(error = %e, "Could not remove manifest, wrote an empty one instead");
            }
        }

        *manifest = Manifest::default();
        info!(root = ?self.entries.root(), orphans = orphans.len(), "Disk cache cleared");
        Ok(())
    }
}
