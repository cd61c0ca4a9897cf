//! Text search over page content streams.
//!
//! A small interpreter walks the text-showing operators of a page, tracking
//! the text and transformation matrices well enough to place each run of
//! text on the page. Glyph advances use standard font metrics when the font
//! is one of the known standard fonts and an average width otherwise, so
//! rectangles are approximate.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use super::fonts::{decode_simple, StandardFont};
use super::pages::flattened_page;
use super::{as_number, resolve};
use crate::error::PdfError;

/// Advance used for glyphs of unknown fonts (1/1000 units)
const FALLBACK_WIDTH: f32 = 500.0;

/// A line of text as drawn on a page
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Decoded text
    pub text: String,

    /// Bounding rectangle in default user space
    pub rect: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`
    fn then(self, other: Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn origin(&self) -> (f32, f32) {
        (self.0[4], self.0[5])
    }

    fn vertical_scale(&self) -> f32 {
        (self.0[2] * self.0[2] + self.0[3] * self.0[3]).sqrt()
    }
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut values = [0.0f32; 6];
    for (slot, operand) in values.iter_mut().zip(operands) {
        *slot = as_number(operand)?;
    }
    Some(Matrix(values))
}

struct OpenRun {
    text: String,
    x0: f32,
    x1: f32,
    baseline: f32,
    height: f32,
}

struct Interpreter {
    fonts: HashMap<Vec<u8>, Option<StandardFont>>,
    ctm: Matrix,
    stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font: Option<StandardFont>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    current: Option<OpenRun>,
    runs: Vec<TextRun>,
}

impl Interpreter {
    fn new(fonts: HashMap<Vec<u8>, Option<StandardFont>>) -> Self {
        Self {
            fonts,
            ctm: Matrix::IDENTITY,
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font: None,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            current: None,
            runs: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if let Some(run) = self.current.take() {
            if !run.text.trim().is_empty() {
                self.runs.push(TextRun {
                    text: run.text,
                    rect: [
                        run.x0,
                        run.baseline - run.height * 0.2,
                        run.x1,
                        run.baseline + run.height,
                    ],
                });
            }
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(self.tlm);
        self.tm = self.tlm;
    }

    fn glyph_width(&self, byte: u8) -> f32 {
        match self.font {
            Some(font) => font.char_width(byte as char) as f32,
            None => FALLBACK_WIDTH,
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        let device = self.tm.then(self.ctm);
        let (x, y) = device.origin();
        let height = self.font_size * device.vertical_scale();

        let continues = self.current.as_ref().is_some_and(|run| {
            (run.baseline - y).abs() < run.height.max(1.0) * 0.5
                && x >= run.x0
                && x <= run.x1 + run.height.max(1.0) * 3.0
        });
        if !continues {
            self.flush();
            self.current = Some(OpenRun {
                text: String::new(),
                x0: x,
                x1: x,
                baseline: y,
                height,
            });
        }

        let mut advance = 0.0;
        for byte in bytes {
            advance += self.glyph_width(*byte) / 1000.0 * self.font_size + self.char_spacing;
            if *byte == b' ' {
                advance += self.word_spacing;
            }
        }
        self.tm = Matrix::translate(advance, 0.0).then(self.tm);
        let end = self.tm.then(self.ctm).origin().0;

        if let Some(run) = self.current.as_mut() {
            if x > run.x1 + height * 0.2 && !run.text.ends_with(' ') {
                run.text.push(' ');
            }
            run.text.push_str(&decode_simple(bytes));
            run.x1 = run.x1.max(end);
            run.height = run.height.max(height);
        }
    }

    fn kern(&mut self, amount: f32) {
        let tx = -amount / 1000.0 * self.font_size;
        self.tm = Matrix::translate(tx, 0.0).then(self.tm);
    }

    fn run(&mut self, content: &Content) {
        for op in &content.operations {
            let operands = &op.operands;
            let number = |i: usize| operands.get(i).and_then(as_number);

            match op.operator.as_str() {
                "q" => self.stack.push(self.ctm),
                "Q" => {
                    if let Some(ctm) = self.stack.pop() {
                        self.ctm = ctm;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(operands) {
                        self.ctm = m.then(self.ctm);
                    }
                }
                "BT" => {
                    self.tm = Matrix::IDENTITY;
                    self.tlm = Matrix::IDENTITY;
                }
                "ET" => self.flush(),
                "Tf" => {
                    if let Some(Object::Name(key)) = operands.first() {
                        self.font = self.fonts.get(key).copied().flatten();
                    }
                    self.font_size = number(1).unwrap_or(self.font_size);
                }
                "TL" => self.leading = number(0).unwrap_or(self.leading),
                "Tc" => self.char_spacing = number(0).unwrap_or(0.0),
                "Tw" => self.word_spacing = number(0).unwrap_or(0.0),
                "Td" => {
                    if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                        self.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                        self.leading = -ty;
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(operands) {
                        self.tlm = m;
                        self.tm = m;
                    }
                }
                "T*" => self.move_line(0.0, -self.leading),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes);
                    }
                }
                "'" => {
                    self.move_line(0.0, -self.leading);
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes);
                    }
                }
                "\"" => {
                    self.word_spacing = number(0).unwrap_or(self.word_spacing);
                    self.char_spacing = number(1).unwrap_or(self.char_spacing);
                    self.move_line(0.0, -self.leading);
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes),
                                other => {
                                    if let Some(amount) = as_number(other) {
                                        self.kern(amount);
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self.flush();
    }
}

fn page_fonts(
    doc: &Document,
    page_id: ObjectId,
) -> Result<HashMap<Vec<u8>, Option<StandardFont>>, PdfError> {
    let page = flattened_page(doc, page_id)?;
    let mut fonts = HashMap::new();

    let Ok(resources) = page.get(b"Resources") else {
        return Ok(fonts);
    };
    let Ok(resources) = resolve(doc, resources)?.as_dict() else {
        return Ok(fonts);
    };
    let Ok(font_dict) = resources.get(b"Font") else {
        return Ok(fonts);
    };
    let Ok(font_dict) = resolve(doc, font_dict)?.as_dict() else {
        return Ok(fonts);
    };

    for (key, font) in font_dict.iter() {
        let standard = resolve(doc, font)
            .ok()
            .and_then(|font| font.as_dict().ok())
            .and_then(|font| font.get(b"BaseFont").and_then(Object::as_name).ok())
            .and_then(|name| std::str::from_utf8(name).ok())
            .and_then(StandardFont::from_name);
        fonts.insert(key.clone(), standard);
    }

    Ok(fonts)
}

/// Runs of text drawn on a page, in drawing order
pub fn text_runs(doc: &Document, page_id: ObjectId) -> Result<Vec<TextRun>, PdfError> {
    let bytes = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let content = Content::decode(&bytes).map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut interpreter = Interpreter::new(page_fonts(doc, page_id)?);
    interpreter.run(&content);
    Ok(interpreter.runs)
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Rectangle of the first text run containing `needle`.
///
/// Matching ignores case and collapses whitespace.
pub fn find_text(
    doc: &Document,
    page_id: ObjectId,
    needle: &str,
) -> Result<Option<[f32; 4]>, PdfError> {
    let needle = normalize(needle);
    if needle.is_empty() {
        return Ok(None);
    }

    Ok(text_runs(doc, page_id)?
        .into_iter()
        .find(|run| normalize(&run.text).contains(&needle))
        .map(|run| run.rect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::pages::{page_box, show_text, PageTreeBuilder};
    use crate::pdf::{page_ids, PDF_VERSION};
    use lopdf::content::Operation;
    use lopdf::dictionary;

    fn page_with(operations: Vec<Operation>) -> (Document, ObjectId) {
        let mut doc = Document::with_version(PDF_VERSION);
        let font_id = doc.add_object(StandardFont::Helvetica.resource());
        let mut tree = PageTreeBuilder::new(&mut doc);
        let resources = dictionary! { "Font" => dictionary! { "F1" => font_id } };
        tree.add_content_page(&mut doc, 595.0, 842.0, resources, &Content { operations })
            .unwrap();
        tree.finish(&mut doc);
        let page = page_ids(&doc)[0];
        (doc, page)
    }

    #[test]
    fn test_finds_title_position() {
        let (doc, page) = page_with(show_text("F1", 20.0, 72.0, 770.0, "Wonderwall - Oasis"));

        let rect = find_text(&doc, page, "wonderwall").unwrap().unwrap();
        assert!((rect[0] - 72.0).abs() < 0.01);
        assert!(rect[1] < 770.0 && rect[3] > 770.0);
        assert!(rect[2] > 72.0 + 100.0);
        assert_eq!(page_box(&doc, page), [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn test_joins_kerned_and_split_strings() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Tm", vec![Object::Integer(1), Object::Integer(0), Object::Integer(0), Object::Integer(1), Object::Integer(50), Object::Integer(600)]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Hal"),
                    Object::Integer(-20),
                    Object::string_literal("lelujah"),
                ])],
            ),
            Operation::new("Tj", vec![Object::string_literal(" Song")]),
            Operation::new("ET", vec![]),
        ];
        let (doc, page) = page_with(ops);

        let runs = text_runs(&doc, page).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Hallelujah Song");
        assert!(find_text(&doc, page, "HALLELUJAH   song").unwrap().is_some());
    }

    #[test]
    fn test_separate_lines_are_separate_runs() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            Operation::new("TL", vec![Object::Integer(14)]),
            Operation::new("Td", vec![Object::Integer(40), Object::Integer(700)]),
            Operation::new("Tj", vec![Object::string_literal("First")]),
            Operation::new("T*", vec![]),
            Operation::new("Tj", vec![Object::string_literal("Second")]),
            Operation::new("ET", vec![]),
        ];
        let (doc, page) = page_with(ops);

        let runs = text_runs(&doc, page).unwrap();
        let texts: Vec<&str> = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["First", "Second"]);
        assert!(runs[1].rect[1] < runs[0].rect[1]);
        assert!(find_text(&doc, page, "Third").unwrap().is_none());
    }
}
