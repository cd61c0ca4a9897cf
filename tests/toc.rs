//! Table-of-Contents Integration Tests
//!
//! Standalone TOC documents: pagination, numbering and printed titles.

mod common;

use songbook::domain::RESERVED_TOC_TITLE;
use songbook::pdf::text::find_text;
use songbook::toc::{render_document, TocGenerator, TocItem};
use songbook::TocLayoutConfig;

use common::open;

fn songs(n: usize) -> Vec<TocItem> {
    (0..n).map(|i| TocItem::new(format!("Song {}", i))).collect()
}

#[test]
fn test_rendered_pages_match_page_count() {
    let generator = TocGenerator::new(TocLayoutConfig::default()).unwrap();
    let items = songs(139);

    let layout = generator.layout(&items, 0);
    let bytes = render_document(&layout).unwrap();
    let (doc, pages) = open(&bytes);

    assert_eq!(pages.len(), generator.page_count_for(items.len()));
    assert_eq!(pages.len(), 2);
    for page in &pages {
        assert!(find_text(&doc, *page, RESERVED_TOC_TITLE).unwrap().is_some());
    }

    // The overflow entry lands on the second page only
    assert!(find_text(&doc, pages[0], "Song 138").unwrap().is_none());
    assert!(find_text(&doc, pages[1], "Song 138").unwrap().is_some());
}

#[test]
fn test_page_numbers_follow_item_lengths() {
    let generator = TocGenerator::new(TocLayoutConfig::default()).unwrap();
    let items = vec![
        TocItem::new("Hallelujah").with_page_count(3),
        TocItem::new("Jolene"),
        TocItem::new("Zombie").with_page_count(2),
    ];

    // Two TOC pages precede the content
    let layout = generator.layout(&items, 2);
    let numbers: Vec<usize> = layout.records.iter().map(|r| r.page_number).collect();
    assert_eq!(numbers, vec![3, 6, 7]);
}

#[test]
fn test_printed_titles_are_shortened() {
    let config = TocLayoutConfig {
        max_toc_entry_length: 20,
        ..TocLayoutConfig::default()
    };
    let generator = TocGenerator::new(config).unwrap();
    let items = vec![
        TocItem::new("Under Pressure (feat. David Bowie) [Remastered]"),
        TocItem::new("Bohemian Rhapsody and Other Very Long Names"),
    ];

    let layout = generator.layout(&items, 0);
    assert_eq!(layout.records[0].display_title, "Under Pressure");
    assert!(layout.records[1].display_title.ends_with("..."));
    assert!(layout.records[1].display_title.chars().count() <= 20);

    // Records keep the full title for lookups
    assert_eq!(layout.records[0].title, items[0].title);

    let bytes = render_document(&layout).unwrap();
    let (doc, pages) = open(&bytes);
    assert!(find_text(&doc, pages[0], "Under Pressure").unwrap().is_some());
    assert!(find_text(&doc, pages[0], "David Bowie").unwrap().is_none());
}

#[test]
fn test_invalid_layout_is_rejected() {
    let config = TocLayoutConfig {
        columns_per_page: 0,
        ..TocLayoutConfig::default()
    };
    assert!(TocGenerator::new(config).is_err());
}
