//! Content cache with freshness semantics.
//!
//! A cache maps slash-delimited keys to byte blobs. Each entry carries a
//! storage-reported modification time and, optionally, a small string map of
//! metadata (e.g. the human-readable title of a song sheet).
//!
//! # Key layout
//!
//! ```text
//! <cache root>/
//! ├── song-sheets/
//! │   ├── <id>.pdf                  # per-item document
//! │   └── <id>.pdf.metadata.json    # side-car metadata (backends without native metadata)
//! └── merged-pdf/
//!     ├── latest.pdf                # master document, indexed by its outline
//!     └── latest-toc.pdf            # optional browsable table of contents
//! ```

pub mod local;
pub mod memory;
pub mod retry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CacheError;

pub use local::LocalCache;
pub use memory::MemoryCache;
pub use retry::RetryPolicy;

/// Timestamp representation at the cache boundary
pub type Timestamp = DateTime<Utc>;

/// Per-entry metadata
pub type Metadata = BTreeMap<String, String>;

/// Suffix of side-car metadata records
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Byte-addressable store keyed by string.
///
/// A missing key is a normal negative result (`Ok(None)`), never an error.
/// Errors are reserved for backend faults.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Human-readable backend name
    fn backend_name(&self) -> &str;

    /// Whether `put` stores metadata natively alongside the bytes
    fn supports_native_metadata(&self) -> bool {
        false
    }

    /// Return the bytes for `key` if present and, when `newer_than` is given,
    /// modified at or after it.
    async fn get(
        &self,
        key: &str,
        newer_than: Option<Timestamp>,
    ) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `bytes` under `key`, replacing any previous entry.
    ///
    /// Backends without native metadata ignore `metadata`.
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        metadata: Option<&Metadata>,
    ) -> Result<String, CacheError>;

    /// Storage-reported modification time of `key`
    async fn modified_at(&self, key: &str) -> Result<Option<Timestamp>, CacheError>;

    /// Keys under `prefix`, sorted, excluding side-car metadata records
    async fn list(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Metadata stored natively with the entry
    async fn native_metadata(&self, _key: &str) -> Result<Option<Metadata>, CacheError> {
        Ok(None)
    }

    /// Write a side-car metadata record for `key`
    async fn put_metadata(&self, key: &str, metadata: &Metadata) -> Result<String, CacheError> {
        validate_key(key)?;
        let json = serde_json::to_vec_pretty(metadata)?;
        self.put(&sidecar_key(key), &json, None).await
    }

    /// Metadata for `key`: native first, then the side-car record
    async fn metadata(&self, key: &str) -> Result<Option<Metadata>, CacheError> {
        if let Some(native) = self.native_metadata(key).await? {
            return Ok(Some(native));
        }

        match self.get(&sidecar_key(key), None).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Key of the side-car metadata record for `key`
pub fn sidecar_key(key: &str) -> String {
    format!("{}{}", key, METADATA_SUFFIX)
}

/// Whether `key` names a side-car metadata record
pub fn is_sidecar_key(key: &str) -> bool {
    key.ends_with(METADATA_SUFFIX)
}

/// Validate a slash-delimited cache key
pub fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(CacheError::InvalidKey(key.to_string()));
    }

    let bad_segment = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad_segment {
        return Err(CacheError::InvalidKey(key.to_string()));
    }

    Ok(())
}

/// Validate a listing prefix (empty, or a key optionally ending in `/`)
pub(crate) fn validate_prefix(prefix: &str) -> Result<(), CacheError> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(());
    }
    validate_key(trimmed)
}

/// Freshness check at millisecond resolution
pub fn is_fresh(modified_at: Timestamp, newer_than: Option<Timestamp>) -> bool {
    match newer_than {
        Some(threshold) => modified_at.timestamp_millis() >= threshold.timestamp_millis(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("song-sheets/abc.pdf").is_ok());
        assert!(validate_key("merged-pdf/latest.pdf").is_ok());
        assert!(validate_key("single").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a/./b").is_err());
        assert!(validate_key("trailing/").is_err());
    }

    #[test]
    fn test_prefix_validation() {
        assert!(validate_prefix("").is_ok());
        assert!(validate_prefix("song-sheets/").is_ok());
        assert!(validate_prefix("song-sheets").is_ok());
        assert!(validate_prefix("../etc").is_err());
    }

    #[test]
    fn test_sidecar_keys() {
        assert_eq!(sidecar_key("a/b.pdf"), "a/b.pdf.metadata.json");
        assert!(is_sidecar_key("a/b.pdf.metadata.json"));
        assert!(!is_sidecar_key("a/b.pdf"));
    }

    #[test]
    fn test_freshness_boundary_is_inclusive() {
        let t0 = Utc::now();

        assert!(is_fresh(t0, None));
        assert!(is_fresh(t0, Some(t0)));
        assert!(is_fresh(t0, Some(t0 - Duration::seconds(1))));
        assert!(!is_fresh(t0, Some(t0 + Duration::seconds(1))));
    }
}
