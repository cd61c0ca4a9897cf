//! songbook - Cached document assembly engine
//!
//! Builds request-specific songbooks out of many per-song PDF documents
//! using a two-phase strategy:
//! - A background merge concatenates every cached song sheet into one
//!   master document, indexed by title through its outline
//! - A request-time extraction copies only the requested songs' page ranges
//!   out of the master, in the requested order, behind a freshly generated
//!   table of contents with working links
//!
//! # Modules
//!
//! - `cache`: Content cache with freshness semantics (local directory, memory)
//! - `toc`: Table-of-contents layout and rendering
//! - `pdf`: PDF object plumbing (page trees, outline, fonts, text search)
//! - `core`: Master builder, page extractor, progress reporting, enrichment
//! - `domain`: Data structures (Item, TocEntry, MasterIndex, Manifest)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Store song sheets in the cache
//! songbook ingest wonderwall.pdf --title "Wonderwall"
//!
//! # Rebuild the master document
//! songbook merge
//!
//! # Extract a songbook
//! songbook extract -t "Wonderwall" -t "Yellow" -o songbook.pdf
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod pdf;
pub mod toc;

// Re-export main types at crate root for convenience
pub use cache::{ContentCache, LocalCache, MemoryCache, RetryPolicy};
pub use config::{Settings, TocLayoutConfig};
pub use core::{
    ExtractRequest, Extraction, MasterBuilder, MergeOptions, MergeOutcome, MergeReport,
    PageExtractor, ProgressReporter, Services,
};
pub use domain::{Item, Manifest, MasterIndex, TocEntry};
pub use error::{CacheError, ConfigError, ExtractError, MergeError, PdfError};
pub use toc::TocGenerator;
