//! Filesystem-backed content cache.
//!
//! Keys map to paths relative to the cache root. Writes go to a temporary
//! sibling file that is renamed over the target, so readers never observe a
//! partially written entry. The filesystem has no per-object metadata:
//! metadata passed to `put` is ignored and callers use `put_metadata`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    is_fresh, is_sidecar_key, validate_key, validate_prefix, ContentCache, Metadata, RetryPolicy,
    Timestamp,
};
use crate::error::CacheError;

/// Content cache rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalCache {
    /// Root directory of the cache
    root: PathBuf,

    /// Retry policy for transient I/O
    retry: RetryPolicy,
}

impl LocalCache {
    /// Open a cache rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>, retry: RetryPolicy) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(root.display().to_string(), e))?;

        Ok(Self { root, retry })
    }

    /// Root directory of the cache
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a key
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

async fn stat(path: &Path, key: &str) -> Result<Option<Timestamp>, CacheError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {
            let modified = meta.modified().map_err(|e| CacheError::io(key, e))?;
            Ok(Some(Timestamp::from(modified)))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(key, e)),
    }
}

async fn read(path: &Path, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        // Removed between stat and read
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(key, e)),
    }
}

async fn write_atomic(path: &Path, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = path
        .parent()
        .ok_or_else(|| CacheError::InvalidKey(key.to_string()))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| CacheError::io(key, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CacheError::InvalidKey(key.to_string()))?;
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = fs::write(&temp_path, bytes).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(CacheError::io(key, e));
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(CacheError::io(key, e));
    }

    Ok(())
}

async fn walk(root: &Path, start: &Path) -> Result<Vec<String>, CacheError> {
    let mut keys = Vec::new();
    let mut pending = vec![start.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(CacheError::io(dir.display().to_string(), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(dir.display().to_string(), e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            // Temp files from in-flight writes
            if name.starts_with('.') {
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CacheError::io(dir.display().to_string(), e))?;
            let path = entry.path();

            if file_type.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
        }
    }

    Ok(keys)
}

#[async_trait]
impl ContentCache for LocalCache {
    fn backend_name(&self) -> &str {
        "local"
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn get(
        &self,
        key: &str,
        newer_than: Option<Timestamp>,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key)?;

        let Some(modified) = self.retry.run("stat", || stat(&path, key)).await? else {
            debug!("cache miss");
            return Ok(None);
        };

        if !is_fresh(modified, newer_than) {
            debug!(%modified, "cache entry is stale");
            return Ok(None);
        }

        let bytes = self.retry.run("read", || read(&path, key)).await?;
        if let Some(ref data) = bytes {
            debug!(bytes = data.len(), "cache hit");
        }
        Ok(bytes)
    }

    #[instrument(skip(self, bytes, metadata), fields(backend = "local", size = bytes.len()))]
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        metadata: Option<&Metadata>,
    ) -> Result<String, CacheError> {
        let path = self.path_for(key)?;

        if metadata.is_some() {
            debug!("backend has no native metadata, ignoring");
        }

        self.retry
            .run("write", || write_atomic(&path, key, bytes))
            .await?;

        Ok(path.display().to_string())
    }

    async fn modified_at(&self, key: &str) -> Result<Option<Timestamp>, CacheError> {
        let path = self.path_for(key)?;
        self.retry.run("stat", || stat(&path, key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        validate_prefix(prefix)?;

        let trimmed = prefix.trim_end_matches('/');
        let start = if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.path_for(trimmed)?
        };

        let mut keys: Vec<String> = walk(&self.root, &start)
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix) && !is_sidecar_key(k))
            .collect();
        keys.sort();

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (LocalCache, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::open(temp.path().join("cache"), RetryPolicy::none())
            .await
            .unwrap();
        (cache, temp)
    }

    #[tokio::test]
    async fn test_put_creates_nested_namespaces() {
        let (cache, _temp) = open_temp().await;

        let location = cache
            .put("song-sheets/nested/deep/a.pdf", b"%PDF", None)
            .await
            .unwrap();

        assert!(location.ends_with("a.pdf"));
        assert!(cache.root().join("song-sheets/nested/deep/a.pdf").exists());
        assert_eq!(
            cache.get("song-sheets/nested/deep/a.pdf", None).await.unwrap(),
            Some(b"%PDF".to_vec())
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let (cache, _temp) = open_temp().await;

        assert_eq!(cache.get("nope/missing.pdf", None).await.unwrap(), None);
        assert_eq!(cache.modified_at("nope/missing.pdf").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_bytes() {
        let (cache, _temp) = open_temp().await;

        cache.put("k/v", b"one", None).await.unwrap();
        cache.put("k/v", b"two", None).await.unwrap();

        assert_eq!(cache.get("k/v", None).await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_list_skips_sidecars_and_other_namespaces() {
        let (cache, _temp) = open_temp().await;

        cache.put("song-sheets/b.pdf", b"b", None).await.unwrap();
        cache.put("song-sheets/a.pdf", b"a", None).await.unwrap();
        cache.put("merged-pdf/latest.pdf", b"m", None).await.unwrap();
        let mut meta = Metadata::new();
        meta.insert("gdrive-file-name".to_string(), "A Song".to_string());
        cache.put_metadata("song-sheets/a.pdf", &meta).await.unwrap();

        let keys = cache.list("song-sheets/").await.unwrap();
        assert_eq!(keys, vec!["song-sheets/a.pdf", "song-sheets/b.pdf"]);

        assert!(cache.list("absent/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sidecar_metadata_roundtrip() {
        let (cache, _temp) = open_temp().await;
        let mut meta = Metadata::new();
        meta.insert("gdrive-file-name".to_string(), "Wonderwall".to_string());

        cache.put("song-sheets/x.pdf", b"x", Some(&meta)).await.unwrap();
        assert_eq!(cache.metadata("song-sheets/x.pdf").await.unwrap(), None);

        cache.put_metadata("song-sheets/x.pdf", &meta).await.unwrap();
        assert!(cache.root().join("song-sheets/x.pdf.metadata.json").exists());
        assert_eq!(
            cache.metadata("song-sheets/x.pdf").await.unwrap(),
            Some(meta)
        );
    }

    #[tokio::test]
    async fn test_invalid_keys_are_rejected() {
        let (cache, _temp) = open_temp().await;

        let result = cache.put("../escape", b"x", None).await;
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
    }
}
