//! PDF object plumbing on top of `lopdf`.
//!
//! This module contains:
//! - fonts: Standard Type 1 font metrics and WinAnsi text encoding
//! - outline: Document outline (bookmarks) read/write
//! - pages: Page tree assembly, page import and page decoration
//! - text: Text search over page content streams

pub mod fonts;
pub mod outline;
pub mod pages;
pub mod text;

use lopdf::{Document, Object, ObjectId};

use crate::error::PdfError;

pub use fonts::StandardFont;
pub use outline::{read_index, read_outline, write_outline};
pub use pages::PageTreeBuilder;

/// Version written into generated documents
pub const PDF_VERSION: &str = "1.5";

/// Parse a document from memory
pub fn load(bytes: &[u8]) -> Result<Document, PdfError> {
    Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))
}

/// Serialize a document, compressing its streams
pub fn save(doc: &mut Document) -> Result<Vec<u8>, PdfError> {
    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Save(e.to_string()))?;
    Ok(out)
}

/// Page object ids in document order
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Number of pages in the document
pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Follow references until a direct object is reached
pub fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> Result<&'a Object, PdfError> {
    // Reference chains longer than this are treated as cycles
    for _ in 0..32 {
        match object {
            Object::Reference(id) => {
                object = doc
                    .get_object(*id)
                    .map_err(|e| PdfError::Structure(format!("object {:?}: {}", id, e)))?;
            }
            _ => return Ok(object),
        }
    }
    Err(PdfError::Structure("reference cycle".to_string()))
}

/// Numeric value of an integer or real object
pub fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// A real-valued PDF number
pub fn real(value: f32) -> Object {
    Object::Real(value)
}

/// A `[x1 y1 x2 y2]` rectangle array
pub fn rect_object(rect: [f32; 4]) -> Object {
    Object::Array(rect.iter().map(|v| real(*v)).collect())
}

/// Parse a `[x1 y1 x2 y2]` rectangle, normalising corner order
pub fn parse_rect(doc: &Document, object: &Object) -> Option<[f32; 4]> {
    let array = resolve(doc, object).ok()?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = as_number(resolve(doc, item).ok()?)?;
    }

    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

/// Object id of the document catalog
pub fn catalog_id(doc: &Document) -> Result<ObjectId, PdfError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfError::Structure("trailer has no /Root".to_string()))
}
