//! Domain types for the assembly engine.
//!
//! This module contains the core data structures:
//! - Item: One source document with its property bag
//! - MasterIndex: Title to page mapping of the master document
//! - Manifest: Summary record of an extracted songbook

pub mod index;
pub mod item;
pub mod manifest;

// Re-export commonly used types
pub use index::{MasterIndex, TocEntry, RESERVED_TOC_TITLE};
pub use item::Item;
pub use manifest::Manifest;
