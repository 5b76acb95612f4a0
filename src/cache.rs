//! File-content cache keyed by the MD5 of the input bytes.
//!
//! Converting an uploaded document to text (OCR, Office extraction) is far
//! slower than hashing it, so converted text is kept on disk and reused when
//! the same bytes come back.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!  ├─ files/<hash>.<ext>      raw backup (inputs below backup_max_bytes only)
//!  ├─ markdown/<hash>.md      converted text
//!  └─ metadata/<hash>.json    CacheMetadata
//! ```
//!
//! A hit needs a readable, unexpired metadata record *and* the text artifact.
//! Anything else is a miss, and a broken entry is deleted on the way.
//!
//! Every artifact is written to a temp file in its target directory and then
//! renamed into place. Two requests saving the same hash write identical bytes,
//! so whichever rename lands last is as good as the first.

use crate::config::CacheConfig;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Metadata record stored next to each cached text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub md5_hash: String,
    pub original_file_name: String,
    pub original_file_size: u64,
    pub cached_time: DateTime<Utc>,
    /// Free-form converter details (encoding, converter name, …).
    #[serde(default)]
    pub processing_metadata: Value,
}

/// Summary returned by [`ContentCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Bytes of cached text across all entries.
    pub total_bytes: u64,
}

/// Handle on one cache directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ContentCache {
    config: CacheConfig,
}

impl ContentCache {
    /// Open (and create if needed) the cache rooted at `config.dir`.
    pub async fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let cache = Self { config };
        cache.create_dirs().await?;
        debug!("Content cache at {}", cache.config.dir.display());
        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn files_dir(&self) -> PathBuf {
        self.config.dir.join("files")
    }

    fn markdown_dir(&self) -> PathBuf {
        self.config.dir.join("markdown")
    }

    fn metadata_dir(&self) -> PathBuf {
        self.config.dir.join("metadata")
    }

    fn markdown_path(&self, hash: &str) -> PathBuf {
        self.markdown_dir().join(format!("{hash}.md"))
    }

    fn metadata_path(&self, hash: &str) -> PathBuf {
        self.metadata_dir().join(format!("{hash}.json"))
    }

    async fn create_dirs(&self) -> Result<(), CacheError> {
        for dir in [self.files_dir(), self.markdown_dir(), self.metadata_dir()] {
            if let Err(source) = tokio::fs::create_dir_all(&dir).await {
                return Err(CacheError::Io { path: dir, source });
            }
        }
        Ok(())
    }

    /// Whether `path`'s current bytes have a valid entry, plus their hash.
    ///
    /// Only failing to read `path` itself is an error.
    pub async fn is_cached(&self, path: &Path) -> Result<(bool, String), CacheError> {
        let hash = file_hash(path).await?;
        if self.load_metadata(&hash).await.is_none() {
            return Ok((false, hash));
        }
        let content_present = tokio::fs::try_exists(self.markdown_path(&hash))
            .await
            .unwrap_or(false);
        if !content_present {
            self.discard_corrupt(&hash, "metadata without content".into()).await;
        }
        Ok((content_present, hash))
    }

    /// Cached text and metadata for `hash`; `(None, None)` on any miss.
    pub async fn get_cached_content(&self, hash: &str) -> (Option<String>, Option<CacheMetadata>) {
        let Some(metadata) = self.load_metadata(hash).await else {
            return (None, None);
        };
        match tokio::fs::read_to_string(self.markdown_path(hash)).await {
            Ok(text) => {
                debug!("Cache hit {} ({})", hash, metadata.original_file_name);
                (Some(text), Some(metadata))
            }
            Err(e) => {
                self.discard_corrupt(hash, format!("content unreadable: {e}")).await;
                (None, None)
            }
        }
    }

    /// Store `text` as the converted content of `path`; returns the hash.
    ///
    /// The metadata record is written last, so a reader never sees metadata
    /// without its content.
    pub async fn save_to_cache(
        &self,
        path: &Path,
        text: &str,
        processing_metadata: Value,
    ) -> Result<String, CacheError> {
        self.create_dirs().await?;
        let hash = file_hash(path).await?;
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|source| CacheError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        write_atomic(self.markdown_path(&hash), text.as_bytes().to_vec()).await?;

        if size < self.config.backup_max_bytes {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{e}"))
                .unwrap_or_default();
            let bytes = tokio::fs::read(path).await.map_err(|source| CacheError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            write_atomic(self.files_dir().join(format!("{hash}{ext}")), bytes).await?;
        }

        let metadata = CacheMetadata {
            md5_hash: hash.clone(),
            original_file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            original_file_size: size,
            cached_time: Utc::now(),
            processing_metadata,
        };
        let json = serde_json::to_vec_pretty(&metadata).map_err(|e| CacheError::Corrupt {
            hash: hash.clone(),
            detail: e.to_string(),
        })?;
        write_atomic(self.metadata_path(&hash), json).await?;

        info!("Cached {} ({} bytes) as {}", metadata.original_file_name, size, hash);
        Ok(hash)
    }

    /// Delete every expired or unreadable entry; returns how many went.
    pub async fn clear_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for hash in self.list_hashes().await? {
            if self.load_metadata(&hash).await.is_none() {
                self.invalidate(&hash).await;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Remove every entry.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        for dir in [self.files_dir(), self.markdown_dir(), self.metadata_dir()] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path: dir, source }),
            }
        }
        self.create_dirs().await
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for hash in self.list_hashes().await? {
            if let Ok(meta) = tokio::fs::metadata(self.markdown_path(&hash)).await {
                stats.entries += 1;
                stats.total_bytes += meta.len();
            }
        }
        Ok(stats)
    }

    // Valid, unexpired metadata or None. Broken records are deleted.
    /// Log a broken entry and remove it, so the next lookup is a clean miss.
    async fn discard_corrupt(&self, hash: &str, detail: String) {
        let err = CacheError::Corrupt {
            hash: hash.to_string(),
            detail,
        };
        warn!("{}; invalidating", err);
        self.invalidate(hash).await;
    }

    async fn load_metadata(&self, hash: &str) -> Option<CacheMetadata> {
        let path = self.metadata_path(hash);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache metadata {} unreadable: {}", path.display(), e);
                self.invalidate(hash).await;
                return None;
            }
        };
        let metadata: CacheMetadata = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(e) => {
                self.discard_corrupt(hash, e.to_string()).await;
                return None;
            }
        };
        if self.is_expired(&metadata) {
            debug!("Cache entry {} expired", hash);
            self.invalidate(hash).await;
            return None;
        }
        Some(metadata)
    }

    fn is_expired(&self, metadata: &CacheMetadata) -> bool {
        (Utc::now() - metadata.cached_time)
            .to_std()
            .map(|age| age > self.config.ttl)
            .unwrap_or(false)
    }

    async fn list_hashes(&self) -> Result<Vec<String>, CacheError> {
        let dir = self.metadata_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CacheError::Io { path: dir, source }),
        };
        let mut hashes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    hashes.push(stem.to_string());
                }
            }
        }
        Ok(hashes)
    }

    // Best effort: missing pieces are fine.
    async fn invalidate(&self, hash: &str) {
        let _ = tokio::fs::remove_file(self.metadata_path(hash)).await;
        let _ = tokio::fs::remove_file(self.markdown_path(hash)).await;
        if let Ok(mut entries) = tokio::fs::read_dir(self.files_dir()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name == hash || name.starts_with(&format!("{hash}.")) {
                    let _ = tokio::fs::remove_file(entry.path()).await;
                }
            }
        }
    }
}

/// Hex MD5 of the file at `path`, read in 64 KiB blocks.
pub async fn file_hash(path: &Path) -> Result<String, CacheError> {
    let io_err = |source: std::io::Error| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

async fn write_atomic(target: PathBuf, bytes: Vec<u8>) -> Result<(), CacheError> {
    let dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let dest = target.clone();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::new(ErrorKind::Other, e))
    .and_then(|r| r);
    result.map_err(|source| CacheError::Io {
        path: target,
        source,
    })
}
