//! Table-of-contents generation.
//!
//! This module contains:
//! - title: Display-title cleanup and difficulty symbols
//! - layout: Multi-column paginated placement of entries
//! - render: Drawing a layout into PDF pages

pub mod layout;
pub mod render;
pub mod title;

pub use layout::{NavRecord, TocGenerator, TocItem, TocLayout};
pub use render::{pdf_rect, render_document, render_pages};
pub use title::short_title;
