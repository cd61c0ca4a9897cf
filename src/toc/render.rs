//! Drawing a [`TocLayout`] into PDF pages.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, ObjectId};

use super::layout::{PieGlyph, TextSpan, TocLayout};
use crate::error::PdfError;
use crate::pdf::pages::show_text;
use crate::pdf::{real, save, PageTreeBuilder, StandardFont, PDF_VERSION};

/// Bézier control distance for a quarter circle
const KAPPA: f32 = 0.5523;

/// Convert a top-left-origin rectangle into PDF user space
pub fn pdf_rect(rect: [f32; 4], page_height: f32) -> [f32; 4] {
    let [x0, y0, x1, y1] = rect;
    [x0, page_height - y1, x1, page_height - y0]
}

/// Fonts used by a layout, each registered once under its own key
struct FontTable {
    keys: HashMap<StandardFont, String>,
    resources: Dictionary,
}

impl FontTable {
    fn build(doc: &mut Document, layout: &TocLayout) -> Self {
        let mut keys = HashMap::new();
        let mut fonts = Dictionary::new();

        let spans = layout
            .pages
            .iter()
            .flat_map(|page| std::iter::once(&page.heading).chain(page.spans.iter()));
        for span in spans {
            if keys.contains_key(&span.font) {
                continue;
            }
            let key = format!("F{}", keys.len() + 1);
            let font_id = doc.add_object(span.font.resource());
            fonts.set(key.as_str(), font_id);
            keys.insert(span.font, key);
        }

        let mut resources = Dictionary::new();
        resources.set("Font", fonts);
        Self { keys, resources }
    }

    fn key(&self, font: StandardFont) -> &str {
        self.keys.get(&font).map(String::as_str).unwrap_or("F1")
    }
}

fn text_operations(fonts: &FontTable, span: &TextSpan, page_height: f32) -> Vec<Operation> {
    show_text(
        fonts.key(span.font),
        span.size,
        span.x,
        page_height - span.y,
        &span.text,
    )
}

/// Point on the circle at `angle` degrees (counter-clockwise from three o'clock)
fn on_circle(cx: f32, cy: f32, r: f32, angle: f32) -> (f32, f32) {
    let rad = angle.to_radians();
    (cx + r * rad.cos(), cy + r * rad.sin())
}

/// Clockwise quarter arc starting at `start` degrees, as a `c` operation
fn quarter_arc(cx: f32, cy: f32, r: f32, start: f32) -> Operation {
    let end = start - 90.0;
    let (x0, y0) = on_circle(cx, cy, r, start);
    let (x3, y3) = on_circle(cx, cy, r, end);
    let (s, c) = start.to_radians().sin_cos();
    let (se, ce) = end.to_radians().sin_cos();

    let k = KAPPA * r;
    Operation::new(
        "c",
        vec![
            real(x0 + k * s),
            real(y0 - k * c),
            real(x3 - k * se),
            real(y3 + k * ce),
            real(x3),
            real(y3),
        ],
    )
}

fn pie_operations(glyph: &PieGlyph, page_height: f32) -> Vec<Operation> {
    let cx = glyph.center_x;
    let cy = page_height - glyph.center_y;
    let r = glyph.radius;
    let quarters = ((glyph.fraction.clamp(0.0, 1.0) * 4.0).round() as usize).min(4);

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("w", vec![real(0.5)]),
        Operation::new("G", vec![real(0.0)]),
        Operation::new("g", vec![real(0.0)]),
    ];

    // Outline
    ops.push(Operation::new("m", vec![real(cx), real(cy + r)]));
    for i in 0..4 {
        ops.push(quarter_arc(cx, cy, r, 90.0 - 90.0 * i as f32));
    }
    ops.push(Operation::new("h", vec![]));
    ops.push(Operation::new("S", vec![]));

    // Filled sector from twelve o'clock
    if quarters > 0 {
        if quarters < 4 {
            ops.push(Operation::new("m", vec![real(cx), real(cy)]));
            ops.push(Operation::new("l", vec![real(cx), real(cy + r)]));
        } else {
            ops.push(Operation::new("m", vec![real(cx), real(cy + r)]));
        }
        for i in 0..quarters {
            ops.push(quarter_arc(cx, cy, r, 90.0 - 90.0 * i as f32));
        }
        ops.push(Operation::new("h", vec![]));
        ops.push(Operation::new("f", vec![]));
    }

    ops.push(Operation::new("Q", vec![]));
    ops
}

/// Append the layout's pages to `tree`, returning their ids in order
pub fn render_pages(
    doc: &mut Document,
    tree: &mut PageTreeBuilder,
    layout: &TocLayout,
) -> Result<Vec<ObjectId>, PdfError> {
    let fonts = FontTable::build(doc, layout);
    let height = layout.page_height;

    let mut ids = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let mut operations = vec![Operation::new("g", vec![real(0.0)])];
        operations.extend(text_operations(&fonts, &page.heading, height));
        for glyph in &page.glyphs {
            operations.extend(pie_operations(glyph, height));
        }
        for span in &page.spans {
            operations.extend(text_operations(&fonts, span, height));
        }

        let id = tree.add_content_page(
            doc,
            layout.page_width,
            height,
            fonts.resources.clone(),
            &Content { operations },
        )?;
        ids.push(id);
    }

    Ok(ids)
}

/// Render the layout as a standalone document
pub fn render_document(layout: &TocLayout) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::with_version(PDF_VERSION);
    let mut tree = PageTreeBuilder::new(&mut doc);
    render_pages(&mut doc, &mut tree, layout)?;
    tree.finish(&mut doc);
    save(&mut doc)
}
