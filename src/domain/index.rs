//! Title to page index of a document.
//!
//! A `MasterIndex` is the ordered list of level-1 outline entries of the
//! master document. Entry `i` owns the pages from its own target page up to
//! the target page of entry `i + 1` in stored order; the last entry owns the
//! rest of the document.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Title of the navigation entry pointing at generated TOC pages.
/// Never matched against content titles.
pub const RESERVED_TOC_TITLE: &str = "Table of Contents";

/// One outline entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Outline depth, 1 for content entries
    pub level: u32,

    /// Entry title
    pub title: String,

    /// First page of the entry (1-based)
    pub target_page: usize,
}

impl TocEntry {
    /// Create a level-1 entry
    pub fn new(title: impl Into<String>, target_page: usize) -> Self {
        Self {
            level: 1,
            title: title.into(),
            target_page,
        }
    }

    /// Whether this is the reserved TOC heading entry
    pub fn is_reserved(&self) -> bool {
        self.title == RESERVED_TOC_TITLE
    }

    /// Whether this entry names content
    pub fn is_content(&self) -> bool {
        self.level == 1 && !self.is_reserved()
    }
}

/// Ordered title index over a document of known length
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterIndex {
    entries: Vec<TocEntry>,
    page_count: usize,
}

impl MasterIndex {
    pub fn new(entries: Vec<TocEntry>, page_count: usize) -> Self {
        Self {
            entries,
            page_count,
        }
    }

    /// All entries in stored order, reserved entry included
    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    /// Pages in the indexed document
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content entries in stored order
    pub fn content_entries(&self) -> impl Iterator<Item = &TocEntry> {
        self.entries.iter().filter(|e| e.is_content())
    }

    /// Number of content entries
    pub fn content_len(&self) -> usize {
        self.content_entries().count()
    }

    /// Stored position of the first content entry titled `title`
    pub fn position(&self, title: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_content() && e.title == title)
    }

    /// Whether `title` names a content entry
    pub fn contains(&self, title: &str) -> bool {
        self.position(title).is_some()
    }

    /// 0-based, half-open page range owned by `title`.
    ///
    /// The range is not checked against the document bounds; see
    /// [`MasterIndex::is_within_bounds`].
    pub fn page_range(&self, title: &str) -> Option<Range<usize>> {
        let pos = self.position(title)?;
        let start = self.entries[pos].target_page.saturating_sub(1);
        let end = self
            .entries
            .get(pos + 1)
            .map(|next| next.target_page.saturating_sub(1))
            .unwrap_or(self.page_count);
        Some(start..end)
    }

    /// Whether `range` is non-empty and inside the document
    pub fn is_within_bounds(&self, range: &Range<usize>) -> bool {
        range.start < range.end && range.end <= self.page_count
    }

    /// Whether content target pages strictly increase in stored order
    pub fn is_monotonic(&self) -> bool {
        let pages: Vec<usize> = self.content_entries().map(|e| e.target_page).collect();
        pages.windows(2).all(|w| w[0] < w[1])
    }
}
