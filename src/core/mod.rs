//! Engine components.
//!
//! This module contains:
//! - Services: Caller-owned collaborators (settings, cache, enrichers)
//! - Progress: Weighted step-scoped progress reporting
//! - Enrich: Ordered item enrichment before layout
//! - Merger: Master document builder
//! - Extractor: Request-time page extraction from the master

pub mod enrich;
pub mod extractor;
pub mod merger;
pub mod progress;
pub mod services;

// Re-export commonly used types
pub use enrich::{DifficultyBins, Enricher};
pub use extractor::{ExtractRequest, Extraction, ExtractionPlan, PageExtractor, PlannedItem};
pub use merger::{MasterBuilder, MergeOptions, MergeOutcome, MergeReport};
pub use progress::{ProgressReporter, ProgressStep};
pub use services::Services;
