//! Document outline (bookmarks).
//!
//! The master document carries its index as a flat list of level-1 outline
//! items whose destinations point at each entry's first page.

use std::collections::{HashMap, HashSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use tracing::debug;

use super::{catalog_id, page_count, resolve};
use crate::domain::{MasterIndex, TocEntry};
use crate::error::PdfError;

/// Encode a PDF text string.
///
/// Plain ASCII is written as a literal string; anything else as UTF-16BE
/// with a byte order mark.
pub fn encode_text_string(text: &str) -> Object {
    if text.chars().all(|c| (' '..='~').contains(&c)) {
        return Object::string_literal(text);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode a PDF text string (UTF-16BE with BOM, else single-byte)
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }

    bytes.iter().map(|b| *b as char).collect()
}

/// Read the outline as `(level, title, 1-based page)` entries in tree order.
///
/// Items whose destination cannot be resolved to a page are skipped.
pub fn read_outline(doc: &Document) -> Result<Vec<TocEntry>, PdfError> {
    let catalog = doc
        .get_dictionary(catalog_id(doc)?)
        .map_err(|e| PdfError::Structure(e.to_string()))?;

    let outlines = match catalog.get(b"Outlines") {
        Ok(obj) => resolve(doc, obj)?,
        Err(_) => return Ok(Vec::new()),
    };
    let Ok(outlines) = outlines.as_dict() else {
        return Ok(Vec::new());
    };

    let page_numbers: HashMap<ObjectId, usize> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number as usize))
        .collect();

    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    walk_items(
        doc,
        outlines.get(b"First").ok(),
        1,
        &page_numbers,
        &mut visited,
        &mut entries,
    )?;

    Ok(entries)
}

fn walk_items(
    doc: &Document,
    first: Option<&Object>,
    level: u32,
    page_numbers: &HashMap<ObjectId, usize>,
    visited: &mut HashSet<ObjectId>,
    entries: &mut Vec<TocEntry>,
) -> Result<(), PdfError> {
    let mut next = first.and_then(|obj| obj.as_reference().ok());

    while let Some(id) = next {
        if !visited.insert(id) {
            debug!(?id, "Outline cycle detected, stopping");
            break;
        }

        let item = doc
            .get_dictionary(id)
            .map_err(|e| PdfError::Structure(format!("outline item {:?}: {}", id, e)))?;

        let title = match item.get(b"Title").map(|t| resolve(doc, t)) {
            Ok(Ok(Object::String(bytes, _))) => decode_text_string(bytes),
            _ => String::new(),
        };

        match destination_page(doc, item, page_numbers) {
            Some(page) => entries.push(TocEntry {
                level,
                title,
                target_page: page,
            }),
            None => debug!(%title, "Outline item has no resolvable page, skipping"),
        }

        walk_items(
            doc,
            item.get(b"First").ok(),
            level + 1,
            page_numbers,
            visited,
            entries,
        )?;

        next = item.get(b"Next").ok().and_then(|obj| obj.as_reference().ok());
    }

    Ok(())
}

fn destination_page(
    doc: &Document,
    item: &Dictionary,
    page_numbers: &HashMap<ObjectId, usize>,
) -> Option<usize> {
    let dest = match item.get(b"Dest") {
        Ok(dest) => resolve(doc, dest).ok()?,
        Err(_) => {
            let action = resolve(doc, item.get(b"A").ok()?).ok()?.as_dict().ok()?;
            if action.get(b"S").ok()?.as_name().ok()? != b"GoTo" {
                return None;
            }
            resolve(doc, action.get(b"D").ok()?).ok()?
        }
    };

    match dest.as_array().ok()?.first()? {
        Object::Reference(page_id) => page_numbers.get(page_id).copied(),
        // Remote-style destinations carry a 0-based page index
        Object::Integer(index) => usize::try_from(*index).ok().map(|i| i + 1),
        _ => None,
    }
}

/// Replace the document outline with flat level-1 entries.
///
/// Each entry is `(title, page object id)`. An empty list removes the outline.
pub fn write_outline(doc: &mut Document, entries: &[(String, ObjectId)]) -> Result<(), PdfError> {
    let catalog_id = catalog_id(doc)?;

    if entries.is_empty() {
        let catalog = doc
            .get_dictionary_mut(catalog_id)
            .map_err(|e| PdfError::Structure(e.to_string()))?;
        catalog.remove(b"Outlines");
        return Ok(());
    }

    let outlines_id = doc.new_object_id();
    let item_ids: Vec<ObjectId> = entries.iter().map(|_| doc.new_object_id()).collect();

    for (i, ((title, page_id), item_id)) in entries.iter().zip(&item_ids).enumerate() {
        let mut item = dictionary! {
            "Title" => encode_text_string(title),
            "Parent" => outlines_id,
            "Dest" => vec![Object::Reference(*page_id), "Fit".into()],
        };
        if i > 0 {
            item.set("Prev", item_ids[i - 1]);
        }
        if let Some(next) = item_ids.get(i + 1) {
            item.set("Next", *next);
        }
        doc.objects.insert(*item_id, Object::Dictionary(item));
    }

    doc.objects.insert(
        outlines_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => item_ids[0],
            "Last" => item_ids[item_ids.len() - 1],
            "Count" => item_ids.len() as i64,
        }),
    );

    let catalog = doc
        .get_dictionary_mut(catalog_id)
        .map_err(|e| PdfError::Structure(e.to_string()))?;
    catalog.set("Outlines", outlines_id);
    catalog.set("PageMode", "UseOutlines");

    Ok(())
}

/// Read the title index of a master document
pub fn read_index(doc: &Document) -> Result<MasterIndex, PdfError> {
    Ok(MasterIndex::new(read_outline(doc)?, page_count(doc)))
}
