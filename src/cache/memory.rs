//! In-process content cache with native metadata.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::{is_fresh, is_sidecar_key, validate_key, validate_prefix, ContentCache, Metadata, Timestamp};
use crate::error::CacheError;

/// Source of modification timestamps
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    modified_at: Timestamp,
    metadata: Option<Metadata>,
}

/// Content cache held in memory
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    clock: Clock,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl MemoryCache {
    /// Create an empty cache stamped by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Create an empty cache stamped by `clock`
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn supports_native_metadata(&self) -> bool {
        true
    }

    async fn get(
        &self,
        key: &str,
        newer_than: Option<Timestamp>,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        validate_key(key)?;

        let entries = self.read_entries();
        Ok(entries
            .get(key)
            .filter(|entry| is_fresh(entry.modified_at, newer_than))
            .map(|entry| entry.bytes.clone()))
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        metadata: Option<&Metadata>,
    ) -> Result<String, CacheError> {
        validate_key(key)?;

        let entry = MemoryEntry {
            bytes: bytes.to_vec(),
            modified_at: (self.clock)(),
            metadata: metadata.cloned(),
        };
        self.write_entries().insert(key.to_string(), entry);

        Ok(format!("memory://{}", key))
    }

    async fn modified_at(&self, key: &str) -> Result<Option<Timestamp>, CacheError> {
        validate_key(key)?;
        Ok(self.read_entries().get(key).map(|entry| entry.modified_at))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        validate_prefix(prefix)?;

        let mut keys: Vec<String> = self
            .read_entries()
            .keys()
            .filter(|k| k.starts_with(prefix) && !is_sidecar_key(k))
            .cloned()
            .collect();
        keys.sort();

        Ok(keys)
    }

    async fn native_metadata(&self, key: &str) -> Result<Option<Metadata>, CacheError> {
        validate_key(key)?;
        Ok(self
            .read_entries()
            .get(key)
            .and_then(|entry| entry.metadata.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;

    fn manual_clock(start: Timestamp) -> (Clock, Arc<Mutex<Timestamp>>) {
        let now = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&now);
        let clock: Clock = Arc::new(move || *handle.lock().unwrap());
        (clock, now)
    }

    #[tokio::test]
    async fn test_freshness_against_clock() {
        let t0 = Utc::now();
        let (clock, now) = manual_clock(t0);
        let cache = MemoryCache::with_clock(clock);

        cache.put("k", b"data", None).await.unwrap();
        *now.lock().unwrap() = t0 + Duration::hours(1);

        assert_eq!(cache.get("k", Some(t0)).await.unwrap(), Some(b"data".to_vec()));
        assert_eq!(
            cache.get("k", Some(t0 - Duration::seconds(5))).await.unwrap(),
            Some(b"data".to_vec())
        );
        assert_eq!(cache.get("k", Some(t0 + Duration::seconds(5))).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_native_metadata_preferred() {
        let cache = MemoryCache::new();
        let mut native = Metadata::new();
        native.insert("gdrive-file-name".to_string(), "Native".to_string());
        let mut sidecar = Metadata::new();
        sidecar.insert("gdrive-file-name".to_string(), "Sidecar".to_string());

        cache.put("a.pdf", b"a", Some(&native)).await.unwrap();
        cache.put_metadata("a.pdf", &sidecar).await.unwrap();

        assert!(cache.supports_native_metadata());
        assert_eq!(cache.metadata("a.pdf").await.unwrap(), Some(native));
        assert_eq!(cache.list("").await.unwrap(), vec!["a.pdf"]);
    }
}
