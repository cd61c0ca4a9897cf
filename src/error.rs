//! Error types for the assembly engine.
//!
//! Cache misses are not errors: `ContentCache::get` reports them as `None`.
//! The variants here are reserved for genuine faults and for extraction
//! preconditions that make a run impossible.

use std::io;

use thiserror::Error;

/// Errors raised by a content cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on cache key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid cache key: '{0}'")]
    InvalidKey(String),

    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Wrap an I/O error with the key it happened on
    pub fn io(key: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    /// Whether the fault is a known-transient transport failure worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Errors from reading or writing the document format
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Failed to serialize PDF: {0}")]
    Save(String),

    #[error("Malformed PDF structure: {0}")]
    Structure(String),
}

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors from a master document build
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Merge cancelled")]
    Cancelled,
}

/// Errors from an extraction run. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Cached master document not found at '{key}'")]
    CacheNotFound { key: String },

    #[error("Attached document not found at '{key}'")]
    AttachmentNotFound { key: String },

    #[error("Cached master document has no table of contents")]
    NoIndex,

    #[error("Titles not found in cached master document: {}", .titles.join(", "))]
    CacheMiss { titles: Vec<String> },

    #[error("Page range {start}..{end} for '{title}' lies outside the master document ({page_count} pages)")]
    PageRangeOutOfBounds {
        title: String,
        start: usize,
        end: usize,
        page_count: usize,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Whether rebuilding the master document could resolve this failure
    pub fn is_stale_master(&self) -> bool {
        matches!(
            self,
            ExtractError::CacheNotFound { .. }
                | ExtractError::NoIndex
                | ExtractError::CacheMiss { .. }
                | ExtractError::PageRangeOutOfBounds { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = CacheError::io("a/b", io::Error::new(io::ErrorKind::TimedOut, "slow"));
        let denied = CacheError::io(
            "a/b",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );

        assert!(timeout.is_transient());
        assert!(!denied.is_transient());
        assert!(!CacheError::InvalidKey("/x".to_string()).is_transient());
    }

    #[test]
    fn test_cache_miss_names_every_title() {
        let err = ExtractError::CacheMiss {
            titles: vec!["Jolene".to_string(), "Valerie".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("Jolene"));
        assert!(message.contains("Valerie"));
        assert!(err.is_stale_master());
        assert!(!ExtractError::Cancelled.is_stale_master());
    }
}
