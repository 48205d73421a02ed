// src/storage/local.rs

//! Local filesystem cache backend.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! ├── articles/
//! │   ├── {sha256}.bin
//! │   └── {sha256}.meta.json
//! ├── search/
//! └── derived/
//! ```
//!
//! Writes go to a temp file and are renamed into place, so a reader never
//! observes a partially written entry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{CacheMetadata, CacheNamespace, ContentCache};

/// Disk-backed content cache.
#[derive(Debug, Clone)]
pub struct FileCache {
    root_dir: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn entry_path(&self, namespace: CacheNamespace, key: &str) -> PathBuf {
        self.root_dir
            .join(namespace.as_str())
            .join(format!("{key}.bin"))
    }

    fn meta_path(&self, namespace: CacheNamespace, key: &str) -> PathBuf {
        self.root_dir
            .join(namespace.as_str())
            .join(format!("{key}.meta.json"))
    }

    /// Write bytes atomically (write to temp, then rename).
    ///
    /// Each write gets its own temp file so concurrent same-key writers
    /// never truncate each other; whichever rename lands last wins.
    async fn write_atomic(path: &PathBuf, bytes: &[u8]) -> Result<()> {
        static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{seq}", std::process::id()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ContentCache for FileCache {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(namespace, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn put(
        &self,
        namespace: CacheNamespace,
        key: &str,
        data: &[u8],
        metadata: Option<&CacheMetadata>,
    ) -> Result<()> {
        let path = self.entry_path(namespace, key);
        Self::write_atomic(&path, data).await?;

        if let Some(metadata) = metadata
            && !metadata.is_empty()
        {
            let meta_bytes = serde_json::to_vec_pretty(metadata)?;
            Self::write_atomic(&self.meta_path(namespace, key), &meta_bytes).await?;
        }
        Ok(())
    }
}
