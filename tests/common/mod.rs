//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tempfile::TempDir;

use songbook::cache::{ContentCache, LocalCache, Metadata, MemoryCache, RetryPolicy};
use songbook::{Services, Settings};

/// Text drawn on page `n` (1-based) of a fixture document
pub fn page_text(title: &str, n: usize) -> String {
    format!("{} - page {}", title, n)
}

/// A PDF with `pages` pages, each carrying one line of text
pub fn fixture_pdf(title: &str, pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for n in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(24)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(770)]),
                Operation::new("Tj", vec![Object::string_literal(page_text(title, n))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    // Media box and resources inherited from the page tree
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
            "Resources" => resources_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Cache key of a seeded item
pub fn item_key(id: &str) -> String {
    format!("song-sheets/{}.pdf", id)
}

/// Store a fixture item with its title in metadata
pub async fn seed(services: &Services, id: &str, title: &str, pages: usize) {
    let mut metadata = Metadata::new();
    metadata.insert("gdrive-file-name".to_string(), title.to_string());

    let key = item_key(id);
    let cache = &services.cache;
    cache.put(&key, &fixture_pdf(title, pages), Some(&metadata)).await.unwrap();
    if !cache.supports_native_metadata() {
        cache.put_metadata(&key, &metadata).await.unwrap();
    }
}

/// Services over a local cache in a temp directory
pub async fn local_services() -> (Services, TempDir) {
    let temp = TempDir::new().unwrap();
    let settings = Settings::rooted_at(temp.path());
    let cache = LocalCache::open(settings.cache_dir.clone(), RetryPolicy::none())
        .await
        .unwrap();
    (Services::new(settings, Arc::new(cache)), temp)
}

/// Services over an in-memory cache
pub fn memory_services() -> Services {
    let settings = Settings::rooted_at(std::env::temp_dir().join("songbook-tests"));
    let cache: Arc<dyn ContentCache> = Arc::new(MemoryCache::new());
    Services::new(settings, cache)
}

/// Load a PDF and return it with its page ids in order
pub fn open(bytes: &[u8]) -> (Document, Vec<ObjectId>) {
    let doc = Document::load_mem(bytes).unwrap();
    let pages = doc.get_pages().into_values().collect();
    (doc, pages)
}

/// Destination pages of the internal links on `page`
pub fn link_targets(doc: &Document, page: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = doc.get_dictionary(page) else {
        return Vec::new();
    };
    let annots = match page.get(b"Annots") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    annots
        .iter()
        .filter_map(|annot| {
            let dict = match annot {
                Object::Reference(id) => doc.get_dictionary(*id).ok()?,
                Object::Dictionary(dict) => dict,
                _ => return None,
            };
            let dest = dict.get(b"Dest").ok()?.as_array().ok()?;
            dest.first()?.as_reference().ok()
        })
        .collect()
}
