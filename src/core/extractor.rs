//! Page extractor.
//!
//! Copies the page ranges of a requested, ordered subset of items out of the
//! cached master document into a new output document. Where each item lives
//! comes from the master index; where it lands is computed per request,
//! together with a fresh table of contents.
//!
//! The whole plan is resolved before any page is copied, so a request either
//! produces a complete document or fails without output.

use std::ops::Range;

use lopdf::{Document, ObjectId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Item, Manifest, MasterIndex, RESERVED_TOC_TITLE};
use crate::error::{ExtractError, PdfError};
use crate::pdf::pages::{add_link, clone_page, import_first_page, stamp_page_number};
use crate::pdf::text::find_text;
use crate::pdf::{self, PageTreeBuilder};
use crate::toc::{pdf_rect, render_pages, short_title, TocGenerator, TocItem, TocLayout};

use super::enrich::enrich_all;
use super::progress::ProgressReporter;
use super::services::Services;

/// One extraction request
#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    /// Items in output order
    pub items: Vec<Item>,
    /// Recorded in the manifest
    pub source_folders: Vec<String>,
    /// Overrides `extract.include_toc`
    pub include_toc: Option<bool>,
    /// Overrides `extract.add_page_numbers`
    pub add_page_numbers: Option<bool>,
    /// Cache keys of documents whose first page goes before the TOC
    pub preface_keys: Vec<String>,
    /// Cache keys of documents whose first page goes after the content
    pub postface_keys: Vec<String>,
}

impl ExtractRequest {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn with_toc(mut self, include: bool) -> Self {
        self.include_toc = Some(include);
        self
    }

    pub fn with_page_numbers(mut self, add: bool) -> Self {
        self.add_page_numbers = Some(add);
        self
    }

    pub fn with_source_folders(mut self, folders: Vec<String>) -> Self {
        self.source_folders = folders;
        self
    }

    pub fn with_preface(mut self, keys: Vec<String>) -> Self {
        self.preface_keys = keys;
        self
    }

    pub fn with_postface(mut self, keys: Vec<String>) -> Self {
        self.postface_keys = keys;
        self
    }
}

/// Where one item comes from and where it goes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedItem {
    pub item: Item,
    /// 0-based, half-open page range in the master document
    pub source_pages: Range<usize>,
    /// 0-based index of the item's first page in the output
    pub destination_offset: usize,
}

impl PlannedItem {
    pub fn page_count(&self) -> usize {
        self.source_pages.len()
    }
}

/// Resolved layout of an output document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionPlan {
    pub items: Vec<PlannedItem>,
    /// Preface pages at the very front of the output
    pub preface_pages: usize,
    /// Generated TOC pages, right after the preface
    pub toc_pages: usize,
    /// Postface pages after the last item
    pub postface_pages: usize,
}

impl ExtractionPlan {
    /// Resolve every item against `index`.
    ///
    /// All missing titles are reported together. Ranges run from an entry's
    /// page to the next entry's page in the index's own order, regardless of
    /// the requested order. Items are placed after `preface_pages` and
    /// `toc_pages` leading pages.
    pub fn resolve(
        index: &MasterIndex,
        items: Vec<Item>,
        preface_pages: usize,
        toc_pages: usize,
    ) -> Result<Self, ExtractError> {
        let missing: Vec<String> = items
            .iter()
            .filter(|item| !index.contains(&item.title))
            .map(|item| item.title.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ExtractError::CacheMiss { titles: missing });
        }

        let mut cursor = preface_pages + toc_pages;
        let mut planned = Vec::with_capacity(items.len());
        for item in items {
            let range = index
                .page_range(&item.title)
                .ok_or_else(|| ExtractError::CacheMiss {
                    titles: vec![item.title.clone()],
                })?;
            if !index.is_within_bounds(&range) {
                return Err(ExtractError::PageRangeOutOfBounds {
                    title: item.title,
                    start: range.start,
                    end: range.end,
                    page_count: index.page_count(),
                });
            }

            let pages = range.len();
            planned.push(PlannedItem {
                item,
                source_pages: range,
                destination_offset: cursor,
            });
            cursor += pages;
        }

        Ok(Self {
            items: planned,
            preface_pages,
            toc_pages,
            postface_pages: 0,
        })
    }

    pub fn with_postface_pages(mut self, pages: usize) -> Self {
        self.postface_pages = pages;
        self
    }

    /// Pages before the first item
    pub fn leading_pages(&self) -> usize {
        self.preface_pages + self.toc_pages
    }

    /// Pages copied rather than generated
    pub fn copied_pages(&self) -> usize {
        self.page_count() - self.toc_pages
    }

    /// Total pages of the output
    pub fn page_count(&self) -> usize {
        self.leading_pages()
            + self.items.iter().map(PlannedItem::page_count).sum::<usize>()
            + self.postface_pages
    }

    /// Printed page number of each item's first page
    pub fn page_numbers(&self) -> Vec<usize> {
        self.items.iter().map(|p| p.destination_offset + 1).collect()
    }
}

/// A finished extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    pub bytes: Vec<u8>,
    pub plan: ExtractionPlan,
    pub manifest: Manifest,
}

/// Builds request-specific documents from the cached master
pub struct PageExtractor<'a> {
    services: &'a Services,
}

impl<'a> PageExtractor<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    /// Fetch the master document and its index
    pub async fn load_master(&self) -> Result<(Document, MasterIndex), ExtractError> {
        let key = &self.services.settings.merge.master_key;
        let bytes = self
            .services
            .cache
            .get(key, None)
            .await?
            .ok_or_else(|| ExtractError::CacheNotFound { key: key.clone() })?;

        let doc = pdf::load(&bytes)?;
        let index = pdf::read_index(&doc)?;
        if index.content_len() == 0 {
            return Err(ExtractError::NoIndex);
        }
        debug!(entries = index.content_len(), pages = index.page_count(), "Loaded master index");
        Ok((doc, index))
    }

    /// Fetch preface or postface documents in order
    async fn load_attachments(&self, keys: &[String]) -> Result<Vec<Document>, ExtractError> {
        let mut documents = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self
                .services
                .cache
                .get(key, None)
                .await?
                .ok_or_else(|| ExtractError::AttachmentNotFound { key: key.clone() })?;
            let doc = pdf::load(&bytes)?;
            if pdf::page_count(&doc) == 0 {
                return Err(PdfError::Structure(format!("'{}' has no pages", key)).into());
            }
            debug!(%key, "Loaded attached document");
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Run an extraction
    #[instrument(skip_all, fields(items = request.items.len()))]
    pub async fn extract(
        &self,
        request: ExtractRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ExtractError> {
        let settings = &self.services.settings;
        let include_toc = request.include_toc.unwrap_or(settings.extract.include_toc);
        let add_page_numbers = request
            .add_page_numbers
            .unwrap_or(settings.extract.add_page_numbers);

        // Loading, at least one page per document, writing
        let documents = request.items.len() + request.preface_keys.len() + request.postface_keys.len();
        progress.expect_remaining(documents as f64 + 2.0);

        let (mut doc, index, prefaces, postfaces) = {
            let step = progress.step(1.0, "Loading master document");
            let (doc, index) = self.load_master().await?;
            let prefaces = self.load_attachments(&request.preface_keys).await?;
            let postfaces = self.load_attachments(&request.postface_keys).await?;
            step.finish();
            (doc, index, prefaces, postfaces)
        };

        let mut items = request.items;
        enrich_all(&self.services.enrichers, &mut items);

        let generator = TocGenerator::new(settings.toc.clone())?;
        let toc_pages = if include_toc {
            generator.page_count_for(items.len())
        } else {
            0
        };
        let plan = ExtractionPlan::resolve(&index, items, prefaces.len(), toc_pages)?
            .with_postface_pages(postfaces.len());
        info!(
            pages = plan.page_count(),
            preface_pages = plan.preface_pages,
            toc_pages,
            postface_pages = plan.postface_pages,
            "Resolved extraction plan"
        );
        progress.expect_remaining(plan.copied_pages() as f64 + 1.0);

        let layout = include_toc.then(|| {
            let toc_items: Vec<TocItem> = plan
                .items
                .iter()
                .map(|p| TocItem::from_item(&p.item).with_page_count(p.page_count()))
                .collect();
            generator.layout(&toc_items, plan.leading_pages())
        });

        let bytes = assemble(
            &mut doc,
            &plan,
            layout.as_ref(),
            Attachments {
                prefaces,
                postfaces,
            },
            AssembleOptions {
                add_page_numbers,
                batch_size: settings.extract.batch_size.max(1),
            },
            progress,
            cancel,
        )?;

        let manifest = Manifest {
            page_count: plan.page_count(),
            has_toc: plan.toc_pages > 0,
            toc_entries: layout.as_ref().map(|l| l.records.len()).unwrap_or(0),
            file_names: plan.items.iter().map(|p| p.item.title.clone()).collect(),
            source_folders: request.source_folders,
        };
        info!(pages = manifest.page_count, bytes = bytes.len(), "Extraction complete");

        Ok(Extraction {
            bytes,
            plan,
            manifest,
        })
    }
}

/// Documents contributing their first page around the content
struct Attachments {
    prefaces: Vec<Document>,
    postfaces: Vec<Document>,
}

#[derive(Debug, Clone, Copy)]
struct AssembleOptions {
    add_page_numbers: bool,
    batch_size: usize,
}

/// Replace `doc`'s page tree with the planned output and serialize it
fn assemble(
    doc: &mut Document,
    plan: &ExtractionPlan,
    layout: Option<&TocLayout>,
    attachments: Attachments,
    options: AssembleOptions,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExtractError> {
    let master_pages = pdf::page_ids(doc);
    let mut tree = PageTreeBuilder::new(doc);
    let step = progress.step(plan.copied_pages() as f64, "Copying pages");

    for preface in attachments.prefaces {
        let page = import_first_page(doc, preface)?;
        tree.push(doc, page)?;
        step.increment(1.0, "Preface");
    }

    let toc_ids = match layout {
        Some(layout) if !layout.is_empty() => render_pages(doc, &mut tree, layout)?,
        _ => Vec::new(),
    };
    if toc_ids.len() != plan.toc_pages {
        return Err(PdfError::Structure(format!(
            "rendered {} TOC pages, planned {}",
            toc_ids.len(),
            plan.toc_pages
        ))
        .into());
    }

    let mut first_pages: Vec<ObjectId> = Vec::with_capacity(plan.items.len());

    for (batch_index, batch) in plan.items.chunks(options.batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        debug!(batch = batch_index, items = batch.len(), "Copying batch");

        for (offset, planned) in batch.iter().enumerate() {
            let entry_index = batch_index * options.batch_size + offset;
            let mut first = None;
            for page in planned.source_pages.clone() {
                let source = master_pages[page];
                let copy = clone_page(doc, source)?;
                tree.push(doc, copy)?;
                first.get_or_insert(copy);
            }
            let first = first.ok_or_else(|| {
                PdfError::Structure(format!("'{}' has no pages", planned.item.title))
            })?;

            if let Some(record) = layout.and_then(|l| l.records.get(entry_index)) {
                link_title_to_toc(doc, first, &planned.item.title, toc_ids[record.toc_page]);
            }
            if options.add_page_numbers {
                stamp_page_number(doc, first, planned.destination_offset + 1)?;
            }

            first_pages.push(first);
            step.increment(planned.page_count() as f64, &planned.item.title);
        }
    }

    for postface in attachments.postfaces {
        let page = import_first_page(doc, postface)?;
        tree.push(doc, page)?;
        step.increment(1.0, "Postface");
    }
    step.finish();

    let finishing = progress.step(1.0, "Writing output document");
    if let Some(layout) = layout {
        for (record, target) in layout.records.iter().zip(&first_pages) {
            let rect = pdf_rect(record.rect, layout.page_height);
            add_link(doc, toc_ids[record.toc_page], rect, *target)?;
        }
    }

    tree.finish(doc);

    let mut outline: Vec<(String, ObjectId)> = Vec::with_capacity(first_pages.len() + 1);
    if let Some(first_toc) = toc_ids.first() {
        outline.push((RESERVED_TOC_TITLE.to_string(), *first_toc));
    }
    outline.extend(
        plan.items
            .iter()
            .zip(&first_pages)
            .map(|(p, id)| (p.item.title.clone(), *id)),
    );
    pdf::write_outline(doc, &outline)?;

    doc.prune_objects();
    let bytes = pdf::save(doc)?;

    let written = pdf::page_count(&pdf::load(&bytes)?);
    if written != plan.page_count() {
        return Err(PdfError::Structure(format!(
            "output has {} pages, planned {}",
            written,
            plan.page_count()
        ))
        .into());
    }
    finishing.finish();

    Ok(bytes)
}

/// Link the item's printed title on `page` to the TOC page listing it.
///
/// Best effort: pages whose text cannot be searched are left unlinked.
fn link_title_to_toc(doc: &mut Document, page: ObjectId, title: &str, toc_page: ObjectId) {
    let short = short_title(title, None);
    let mut candidates = vec![title];
    if short != title && !short.is_empty() {
        candidates.push(&short);
    }

    for candidate in candidates {
        match find_text(doc, page, candidate) {
            Ok(Some(rect)) => {
                if let Err(e) = add_link(doc, page, rect, toc_page) {
                    warn!(%title, error = %e, "Failed to link title");
                }
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(%title, error = %e, "Could not search page text");
                return;
            }
        }
    }
    debug!(%title, "Title not found on first page");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TocEntry;

    fn index() -> MasterIndex {
        MasterIndex::new(
            vec![
                TocEntry::new("A", 1),
                TocEntry::new("B", 2),
                TocEntry::new("C", 4),
            ],
            4,
        )
    }

    fn items(titles: &[&str]) -> Vec<Item> {
        titles.iter().map(|t| Item::new(*t, *t)).collect()
    }

    #[test]
    fn test_plan_uses_master_order_for_ranges() {
        let plan = ExtractionPlan::resolve(&index(), items(&["C", "B", "A"]), 0, 0).unwrap();

        let ranges: Vec<Range<usize>> = plan.items.iter().map(|p| p.source_pages.clone()).collect();
        assert_eq!(ranges, vec![3..4, 1..3, 0..1]);
        assert_eq!(plan.page_numbers(), vec![1, 2, 4]);
        assert_eq!(plan.page_count(), 4);
    }

    #[test]
    fn test_plan_offsets_follow_toc_pages() {
        let plan = ExtractionPlan::resolve(&index(), items(&["C", "A"]), 0, 1).unwrap();
        assert_eq!(plan.page_numbers(), vec![2, 3]);
        assert_eq!(plan.page_count(), 3);
    }

    #[test]
    fn test_plan_counts_preface_and_postface() {
        let plan = ExtractionPlan::resolve(&index(), items(&["B", "A"]), 2, 1)
            .unwrap()
            .with_postface_pages(1);
        assert_eq!(plan.leading_pages(), 3);
        assert_eq!(plan.page_numbers(), vec![4, 6]);
        assert_eq!(plan.page_count(), 7);
        assert_eq!(plan.copied_pages(), 6);
    }

    #[test]
    fn test_plan_reports_every_missing_title() {
        let err = ExtractionPlan::resolve(&index(), items(&["A", "X", "B", "Y"]), 0, 0).unwrap_err();
        match err {
            ExtractError::CacheMiss { titles } => assert_eq!(titles, vec!["X", "Y"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_rejects_out_of_bounds_ranges() {
        // Index claims more pages than the document has
        let broken = MasterIndex::new(vec![TocEntry::new("A", 1), TocEntry::new("B", 6)], 4);
        let err = ExtractionPlan::resolve(&broken, items(&["B"]), 0, 0).unwrap_err();
        assert!(matches!(err, ExtractError::PageRangeOutOfBounds { start: 5, end: 4, .. }));
        assert!(err.is_stale_master());
    }

    #[test]
    fn test_reserved_entry_is_not_content() {
        let with_heading = MasterIndex::new(
            vec![
                TocEntry::new(RESERVED_TOC_TITLE, 1),
                TocEntry::new("A", 2),
                TocEntry::new("B", 3),
            ],
            3,
        );
        let err = ExtractionPlan::resolve(&with_heading, items(&[RESERVED_TOC_TITLE]), 0, 0).unwrap_err();
        assert!(matches!(err, ExtractError::CacheMiss { .. }));

        let plan = ExtractionPlan::resolve(&with_heading, items(&["A"]), 0, 0).unwrap();
        assert_eq!(plan.items[0].source_pages, 1..2);
    }
}
