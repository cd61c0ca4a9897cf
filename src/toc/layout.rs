//! Multi-column, paginated table-of-contents layout.
//!
//! Coordinates are in points with the origin at the top-left corner of the
//! page; `y` values are text baselines.

use crate::config::TocLayoutConfig;
use crate::domain::{Item, RESERVED_TOC_TITLE};
use crate::error::ConfigError;
use crate::pdf::StandardFont;

use super::title::{difficulty_fraction, difficulty_symbol, short_title, READY_MARKER};

/// Distance of the heading baseline above the first entry line
const HEADING_LIFT: f32 = 20.0;

/// One entry to list
#[derive(Debug, Clone, PartialEq)]
pub struct TocItem {
    pub title: String,
    pub difficulty_bin: u8,
    pub ready_to_play: bool,
    /// Pages the item occupies in the document the TOC describes
    pub page_count: usize,
}

impl TocItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            difficulty_bin: 0,
            ready_to_play: false,
            page_count: 1,
        }
    }

    pub fn from_item(item: &Item) -> Self {
        Self {
            title: item.title.clone(),
            difficulty_bin: item.difficulty_bin(),
            ready_to_play: item.is_ready_to_play(),
            page_count: 1,
        }
    }

    pub fn with_page_count(mut self, page_count: usize) -> Self {
        self.page_count = page_count.max(1);
        self
    }
}

/// A line of text placed on a TOC page
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub x: f32,
    pub y: f32,
    pub font: StandardFont,
    pub size: f32,
    pub text: String,
}

/// Difficulty pie drawn in front of a title
#[derive(Debug, Clone, PartialEq)]
pub struct PieGlyph {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    /// Filled share of the circle, clockwise from twelve o'clock
    pub fraction: f32,
}

/// Content of one TOC page
#[derive(Debug, Clone, PartialEq)]
pub struct TocPage {
    pub heading: TextSpan,
    pub spans: Vec<TextSpan>,
    pub glyphs: Vec<PieGlyph>,
}

/// Where an entry was placed, for attaching links
#[derive(Debug, Clone, PartialEq)]
pub struct NavRecord {
    /// Full title of the listed item
    pub title: String,

    /// Title as printed, including difficulty symbol and ready marker
    pub display_title: String,

    /// Printed page number
    pub page_number: usize,

    /// Index of the TOC page holding the entry
    pub toc_page: usize,

    /// Offset of the item's first page from the first content page
    pub content_offset: usize,

    /// Clickable area `[x0, y0, x1, y1]`, top-left origin
    pub rect: [f32; 4],
}

/// Result of laying out a TOC
#[derive(Debug, Clone, PartialEq)]
pub struct TocLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub pages: Vec<TocPage>,
    pub records: Vec<NavRecord>,
}

impl TocLayout {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Lays out table-of-contents pages from an immutable configuration
#[derive(Debug, Clone)]
pub struct TocGenerator {
    config: TocLayoutConfig,
    title_font: StandardFont,
    text_font: StandardFont,
    number_font: StandardFont,
}

impl TocGenerator {
    /// Create a generator, rejecting layouts with no room for entries
    pub fn new(config: TocLayoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            title_font: StandardFont::resolve(&config.title_font),
            text_font: StandardFont::resolve(&config.text_font),
            number_font: StandardFont::resolve(&config.page_number_font),
            config,
        })
    }

    pub fn config(&self) -> &TocLayoutConfig {
        &self.config
    }

    /// TOC pages needed for `entries` entries
    pub fn page_count_for(&self, entries: usize) -> usize {
        entries.div_ceil(self.config.lines_per_page())
    }

    /// Title as printed for `item`
    pub fn display_title(&self, item: &TocItem) -> String {
        let mut title = short_title(&item.title, Some(self.config.max_toc_entry_length));
        if self.config.include_ready_marker && item.ready_to_play {
            title.push(READY_MARKER);
        }

        match self.symbol_for(item) {
            Some(symbol) => format!("{} {}", symbol, title),
            None => title,
        }
    }

    fn symbol_for(&self, item: &TocItem) -> Option<char> {
        if self.config.include_difficulty {
            difficulty_symbol(item.difficulty_bin)
        } else {
            None
        }
    }

    fn heading(&self) -> TextSpan {
        TextSpan {
            x: self.config.margin_left,
            y: self.config.margin_top + self.config.title_height - HEADING_LIFT,
            font: self.title_font,
            size: self.config.title_font_size,
            text: RESERVED_TOC_TITLE.to_string(),
        }
    }

    /// Lay out `items` in order. Page numbers start at `page_offset + 1`
    /// and advance by each item's page count.
    pub fn layout(&self, items: &[TocItem], page_offset: usize) -> TocLayout {
        let config = &self.config;
        let lines_per_column = config.lines_per_column();
        let lines_per_page = config.lines_per_page();
        let size = config.text_font_size;

        let mut pages: Vec<TocPage> = Vec::new();
        let mut records = Vec::with_capacity(items.len());
        let mut content_offset = 0;

        for (index, item) in items.iter().enumerate() {
            let page_index = index / lines_per_page;
            let column = (index % lines_per_page) / lines_per_column;
            let line = index % lines_per_column;

            if page_index == pages.len() {
                pages.push(TocPage {
                    heading: self.heading(),
                    spans: Vec::new(),
                    glyphs: Vec::new(),
                });
            }
            let page = &mut pages[page_index];

            let x = config.margin_left + column as f32 * (config.column_width + config.column_spacing);
            let y = config.title_height + config.margin_top + line as f32 * config.line_spacing;

            // Difficulty pie, then the title text
            let mut text_x = x;
            if let Some(fraction) = difficulty_fraction(item.difficulty_bin)
                .filter(|_| config.include_difficulty)
            {
                let radius = size * 0.4;
                page.glyphs.push(PieGlyph {
                    center_x: x + radius,
                    center_y: y - size * 0.35,
                    radius,
                    fraction,
                });
                text_x += 2.0 * radius + self.text_font.text_width(" ", size);
            }

            let mut title = short_title(&item.title, Some(config.max_toc_entry_length));
            if config.include_ready_marker && item.ready_to_play {
                title.push(READY_MARKER);
            }
            let title_end = text_x + self.text_font.text_width(&title, size);
            page.spans.push(TextSpan {
                x: text_x,
                y,
                font: self.text_font,
                size,
                text: title,
            });

            // Right-aligned page number
            let page_number = page_offset + 1 + content_offset;
            let number = page_number.to_string();
            let number_x = x + config.column_width - self.number_font.text_width(&number, size);
            page.spans.push(TextSpan {
                x: number_x,
                y,
                font: self.number_font,
                size,
                text: number,
            });

            // Dot leader between title and number
            let leader_end = number_x - self.text_font.text_width(" ", size);
            let dot_width = self.text_font.text_width(".", size);
            if dot_width > 0.0 && leader_end > title_end {
                let dots = ((leader_end - title_end) / dot_width).floor() as usize;
                if dots > 0 {
                    page.spans.push(TextSpan {
                        x: title_end,
                        y,
                        font: self.text_font,
                        size,
                        text: format!("{} ", ".".repeat(dots)),
                    });
                }
            }

            records.push(NavRecord {
                title: item.title.clone(),
                display_title: self.display_title(item),
                page_number,
                toc_page: page_index,
                content_offset,
                rect: [x, y - size, x + config.column_width, y + size * 0.2],
            });

            content_offset += item.page_count.max(1);
        }

        TocLayout {
            page_width: config.page_width,
            page_height: config.page_height,
            pages,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> TocGenerator {
        TocGenerator::new(TocLayoutConfig::default()).unwrap()
    }

    fn items(n: usize) -> Vec<TocItem> {
        (0..n).map(|i| TocItem::new(format!("Song {}", i))).collect()
    }

    #[test]
    fn test_empty_list_has_no_pages() {
        let layout = generator().layout(&[], 0);
        assert!(layout.is_empty());
        assert!(layout.records.is_empty());
        assert_eq!(generator().page_count_for(0), 0);
    }

    #[test]
    fn test_columns_then_pages() {
        let generator = generator();
        // 69 lines per column, 2 columns
        let layout = generator.layout(&items(139), 0);

        assert_eq!(layout.page_count(), 2);
        assert_eq!(generator.page_count_for(139), 2);
        assert_eq!(generator.page_count_for(138), 1);

        let first = &layout.records[0];
        let second_column = &layout.records[69];
        let next_page = &layout.records[138];

        assert_eq!(first.rect[0], 50.0);
        assert_eq!(second_column.rect[0], 50.0 + 250.0 + 20.0);
        assert_eq!(second_column.toc_page, 0);
        assert_eq!(next_page.toc_page, 1);
        assert_eq!(next_page.rect[0], 50.0);
        assert_eq!(next_page.rect[1], first.rect[1]);

        // Heading repeated on every page
        for page in &layout.pages {
            assert_eq!(page.heading.text, RESERVED_TOC_TITLE);
            assert_eq!(page.heading.y, 80.0);
        }
    }

    #[test]
    fn test_entry_geometry() {
        let layout = generator().layout(&items(2), 0);
        let record = &layout.records[1];

        // Baseline = title_height + margin_top + line * spacing
        let y = 50.0 + 50.0 + 10.0;
        assert_eq!(record.rect, [50.0, y - 9.0, 300.0, y + 9.0 * 0.2]);

        let number = layout.pages[0]
            .spans
            .iter()
            .find(|s| s.text == "2" && s.y == y)
            .unwrap();
        let width = StandardFont::Helvetica.text_width("2", 9.0);
        assert!((number.x + width - 300.0).abs() < 1e-3);

        let leader = layout.pages[0]
            .spans
            .iter()
            .find(|s| s.text.starts_with("..") && s.y == y)
            .unwrap();
        assert!(leader.text.ends_with(". "));
        assert!(leader.x + StandardFont::Helvetica.text_width(&leader.text, 9.0) <= number.x + 1e-3);
    }

    #[test]
    fn test_page_numbers_follow_page_counts() {
        let items = vec![
            TocItem::new("A"),
            TocItem::new("B").with_page_count(2),
            TocItem::new("C"),
        ];
        let layout = generator().layout(&items, 1);

        let numbers: Vec<usize> = layout.records.iter().map(|r| r.page_number).collect();
        assert_eq!(numbers, vec![2, 3, 5]);
        let offsets: Vec<usize> = layout.records.iter().map(|r| r.content_offset).collect();
        assert_eq!(offsets, vec![0, 1, 3]);
    }

    #[test]
    fn test_display_title_decorations() {
        let generator = generator();
        let mut item = TocItem::new("Valerie (feat. Amy Winehouse)");
        item.difficulty_bin = 2;
        item.ready_to_play = true;

        assert_eq!(generator.display_title(&item), "◑ Valerie*");

        let layout = generator.layout(&[item.clone()], 0);
        assert_eq!(layout.pages[0].glyphs.len(), 1);
        assert_eq!(layout.pages[0].glyphs[0].fraction, 0.5);

        let plain = TocGenerator::new(TocLayoutConfig {
            include_difficulty: false,
            include_ready_marker: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(plain.display_title(&item), "Valerie");
        assert!(plain.layout(&[item], 0).pages[0].glyphs.is_empty());
    }

    #[test]
    fn test_long_titles_are_not_width_limited() {
        let generator = TocGenerator::new(TocLayoutConfig {
            max_toc_entry_length: 500,
            ..Default::default()
        })
        .unwrap();
        let long = TocItem::new("W".repeat(200));

        let layout = generator.layout(&[long], 0);
        let title = &layout.pages[0].spans[0];
        assert_eq!(title.text.len(), 200);
        // No leader when the title overruns the column
        assert_eq!(layout.pages[0].spans.len(), 2);
    }
}
