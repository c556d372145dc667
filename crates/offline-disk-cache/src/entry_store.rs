//! Payload file storage
//!
//! One file per entry, named by its key, directly under the cache root. The
//! store knows nothing about the manifest; it only moves bytes.

use crate::key::CacheKey;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct EntryStore {
    root: PathBuf,
}

impl EntryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the payload file for `key`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Write `bytes` for `key`, replacing any existing payload.
    pub async fn write(&self, key: &CacheKey, bytes: &[u8]) -> std::io::Result<()> {
        write_atomic(&self.path_for(key), bytes).await
    }

    /// Read the payload for `key`; `None` if nothing is stored.
    pub async fn read(&self, key: &CacheKey) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the payload for `key`. Removing a missing payload succeeds.
    pub async fn delete(&self, key: &CacheKey) -> std::io::Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Size in bytes of the stored payload for `key`.
    pub async fn size_of(&self, key: &CacheKey) -> std::io::Result<Option<u64>> {
        match fs::metadata(self.path_for(key)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Keys of every payload file present under the root, in no particular
    /// order. Temp files and the manifest are skipped.
    pub async fn list_keys(&self) -> std::io::Result<Vec<CacheKey>> {
        let mut keys = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e),
        };

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(CacheKey::parse) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Write-then-rename so readers only ever see a complete file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}
