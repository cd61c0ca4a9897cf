//! Page tree assembly and page-level edits.
//!
//! Pages moved between trees first get their inherited attributes
//! materialised, so they render the same once re-parented.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::fonts::{encode_win_ansi, StandardFont};
use super::{page_ids, parse_rect, real, rect_object, resolve};
use crate::error::PdfError;

/// Page attributes a page may inherit from its ancestors
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Page box used when a page declares none
pub const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 595.0, 842.0];

/// Resource name of the font used by page-number stamps
const PAGE_NUMBER_FONT_KEY: &str = "SbkPageNo";

fn structure_error(id: ObjectId, e: lopdf::Error) -> PdfError {
    PdfError::Structure(format!("object {:?}: {}", id, e))
}

/// Builds a single flat page tree and the catalog pointing at it
#[derive(Debug)]
pub struct PageTreeBuilder {
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl PageTreeBuilder {
    /// Reserve the page tree root in `doc`
    pub fn new(doc: &mut Document) -> Self {
        Self {
            pages_id: doc.new_object_id(),
            kids: Vec::new(),
        }
    }

    /// Object id of the page tree root
    pub fn pages_id(&self) -> ObjectId {
        self.pages_id
    }

    /// Pages added so far, in order
    pub fn pages(&self) -> &[ObjectId] {
        &self.kids
    }

    /// Append an existing page object
    pub fn push(&mut self, doc: &mut Document, page_id: ObjectId) -> Result<(), PdfError> {
        doc.get_dictionary_mut(page_id)
            .map_err(|e| structure_error(page_id, e))?
            .set("Parent", self.pages_id);
        self.kids.push(page_id);
        Ok(())
    }

    /// Append a new page of the given size drawing `content`
    pub fn add_content_page(
        &mut self,
        doc: &mut Document,
        width: f32,
        height: f32,
        resources: Dictionary,
        content: &Content,
    ) -> Result<ObjectId, PdfError> {
        let bytes = content
            .encode()
            .map_err(|e| PdfError::Save(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => rect_object([0.0, 0.0, width, height]),
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id);
        Ok(page_id)
    }

    /// Write the page tree and a fresh catalog, making it the document root
    pub fn finish(self, doc: &mut Document) -> ObjectId {
        let count = self.kids.len() as i64;
        let kids: Vec<Object> = self.kids.into_iter().map(Object::Reference).collect();

        doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        catalog_id
    }
}

fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    // Bounded walk; malformed trees may loop
    for _ in 0..64 {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Copy of a page dictionary with inherited attributes made explicit and
/// its parent link removed
pub fn flattened_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary, PdfError> {
    let original = doc
        .get_dictionary(page_id)
        .map_err(|e| structure_error(page_id, e))?;
    let mut page = original.clone();

    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        if let Some(value) = inherited(doc, original, key) {
            page.set(key.to_vec(), value.clone());
        }
    }

    page.remove(b"Parent");
    Ok(page)
}

/// Move every page of `source` into `target`.
///
/// Returns the moved page ids in source order. The pages are detached;
/// attach them with [`PageTreeBuilder::push`]. Objects only reachable from
/// the source's catalog are left for `Document::prune_objects`.
pub fn import_pages(target: &mut Document, mut source: Document) -> Result<Vec<ObjectId>, PdfError> {
    source.renumber_objects_with(target.max_id + 1);
    let source_max = source.max_id;

    let ids = page_ids(&source);
    let mut pages = Vec::with_capacity(ids.len());
    for id in &ids {
        pages.push((*id, flattened_page(&source, *id)?));
    }

    for (id, object) in source.objects {
        let replaced = matches!(object.type_name(), Ok("Catalog") | Ok("Pages"));
        if !replaced {
            target.objects.insert(id, object);
        }
    }
    for (id, page) in pages {
        target.objects.insert(id, Object::Dictionary(page));
    }

    target.max_id = target.max_id.max(source_max);
    Ok(ids)
}

/// Move the first page of `source` into `target`, dropping its annotations
pub fn import_first_page(target: &mut Document, source: Document) -> Result<ObjectId, PdfError> {
    let ids = import_pages(target, source)?;
    let first = ids
        .first()
        .copied()
        .ok_or_else(|| PdfError::Structure("document has no pages".to_string()))?;
    target
        .get_dictionary_mut(first)
        .map_err(|e| structure_error(first, e))?
        .remove(b"Annots");
    Ok(first)
}

fn is_internal_link(doc: &Document, annotation: &Object) -> bool {
    let Ok(dict) = resolve(doc, annotation).and_then(|obj| {
        obj.as_dict()
            .map_err(|e| PdfError::Structure(e.to_string()))
    }) else {
        return false;
    };

    let is_link = dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Link")
        .unwrap_or(false);
    if !is_link {
        return false;
    }
    if dict.has(b"Dest") {
        return true;
    }

    dict.get(b"A")
        .ok()
        .and_then(|action| resolve(doc, action).ok())
        .and_then(|action| action.as_dict().ok())
        .and_then(|action| action.get(b"S").and_then(Object::as_name).ok())
        .map(|kind| kind == b"GoTo")
        .unwrap_or(false)
}

/// Duplicate a page inside its document, detached from any tree.
///
/// Content and resources are shared with the original. Link annotations
/// that jump inside the document are dropped since their targets may not
/// survive in the new tree.
pub fn clone_page(doc: &mut Document, page_id: ObjectId) -> Result<ObjectId, PdfError> {
    let mut page = flattened_page(doc, page_id)?;

    let kept: Option<Vec<Object>> = match page.get(b"Annots") {
        Ok(annots) => resolve(doc, annots)?.as_array().ok().map(|annots| {
            annots
                .iter()
                .filter(|a| !is_internal_link(doc, a))
                .cloned()
                .collect()
        }),
        Err(_) => None,
    };
    match kept {
        Some(annots) if !annots.is_empty() => page.set("Annots", annots),
        _ => {
            page.remove(b"Annots");
        }
    }

    Ok(doc.add_object(page))
}

/// Visible box of a page (`[llx lly urx ury]`)
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return DEFAULT_PAGE_BOX;
    };

    [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .iter()
        .find_map(|key| {
            let value = page.get(key).ok().or_else(|| inherited(doc, page, key))?;
            parse_rect(doc, value)
        })
        .unwrap_or(DEFAULT_PAGE_BOX)
}

/// Operations drawing one line of text with its baseline at `(x, y)`
pub fn show_text(font_key: &str, size: f32, x: f32, y: f32, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font_key.as_bytes().to_vec()), real(size)]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Register a standard font under `key` in the page's own resources.
///
/// Shared resource dictionaries are copied into the page, never mutated.
pub fn add_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    key: &str,
    font: StandardFont,
) -> Result<(), PdfError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| structure_error(page_id, e))?;

    let mut resources = match page.get(b"Resources") {
        Ok(obj) => resolve(doc, obj)?
            .as_dict()
            .map(Clone::clone)
            .unwrap_or_else(|_| Dictionary::new()),
        Err(_) => Dictionary::new(),
    };
    let mut fonts = match resources.get(b"Font") {
        Ok(obj) => resolve(doc, obj)?
            .as_dict()
            .map(Clone::clone)
            .unwrap_or_else(|_| Dictionary::new()),
        Err(_) => Dictionary::new(),
    };

    let font_id = doc.add_object(font.resource());
    fonts.set(key, font_id);
    resources.set("Font", fonts);

    doc.get_dictionary_mut(page_id)
        .map_err(|e| structure_error(page_id, e))?
        .set("Resources", resources);
    Ok(())
}

/// Draw `overlay` on top of the page's existing content.
///
/// The existing content is wrapped in `q`/`Q` so its graphics state does not
/// leak into the overlay.
pub fn append_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: &Content,
) -> Result<(), PdfError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| structure_error(page_id, e))?;

    let existing: Vec<Object> = match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    };

    let bytes = overlay
        .encode()
        .map_err(|e| PdfError::Save(e.to_string()))?;
    let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let close = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, bytes));

    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(Object::Reference(open));
    contents.extend(existing);
    contents.push(Object::Reference(close));
    contents.push(Object::Reference(overlay_id));

    doc.get_dictionary_mut(page_id)
        .map_err(|e| structure_error(page_id, e))?
        .set("Contents", contents);
    Ok(())
}

/// Add a borderless link over `rect` jumping to `dest_page`
pub fn add_link(
    doc: &mut Document,
    page_id: ObjectId,
    rect: [f32; 4],
    dest_page: ObjectId,
) -> Result<(), PdfError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| structure_error(page_id, e))?;
    let mut annots = match page.get(b"Annots") {
        Ok(obj) => resolve(doc, obj)?
            .as_array()
            .map(Clone::clone)
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    let annot_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => rect_object(rect),
        "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
        "Dest" => vec![Object::Reference(dest_page), "Fit".into()],
    });
    annots.push(Object::Reference(annot_id));

    doc.get_dictionary_mut(page_id)
        .map_err(|e| structure_error(page_id, e))?
        .set("Annots", annots);
    Ok(())
}

/// Stamp `number` in the top-right corner of a page
pub fn stamp_page_number(
    doc: &mut Document,
    page_id: ObjectId,
    number: usize,
) -> Result<(), PdfError> {
    let [_, _, urx, ury] = page_box(doc, page_id);
    add_font_resource(doc, page_id, PAGE_NUMBER_FONT_KEY, StandardFont::Helvetica)?;

    let mut operations = vec![Operation::new("g", vec![real(0.0)])];
    operations.extend(show_text(
        PAGE_NUMBER_FONT_KEY,
        9.0,
        urx - 40.0,
        ury - 30.0,
        &number.to_string(),
    ));

    append_overlay(doc, page_id, &Content { operations })
}
