//! Master document builder.
//!
//! Merges every cached per-item document into one master document whose
//! outline maps each title to its first page, then publishes it back into
//! the cache under a well-known key.

use chrono::Utc;
use glob::Pattern;
use lopdf::{Document, ObjectId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{sidecar_key, Metadata, Timestamp};
use crate::config::MergeSettings;
use crate::error::{ConfigError, MergeError, PdfError};
use crate::pdf::{self, pages::import_pages, PageTreeBuilder, PDF_VERSION};
use crate::toc::{render_document, TocGenerator, TocItem};

use super::progress::ProgressReporter;
use super::services::Services;

/// Master metadata: number of content entries
pub const META_ENTRIES: &str = "songbook-entries";
/// Master metadata: number of skipped items
pub const META_SKIPPED: &str = "songbook-skipped";
/// Master metadata: hex SHA-256 of the master bytes
pub const META_SHA256: &str = "songbook-sha256";
/// Master metadata: RFC 3339 build time
pub const META_BUILT_AT: &str = "songbook-built-at";

/// Options for a single build
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Rebuild even when the master looks current
    pub force: bool,
}

/// How a build ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// A new master was published
    Merged,
    /// No item documents exist; nothing was written
    NothingToMerge,
    /// The existing master already covers every item; nothing was written
    UpToDate,
}

/// Summary of a build
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    /// Content entries in the published master
    pub entries: usize,
    /// Items left out of this build, with the reason
    pub skipped: Vec<(String, String)>,
    pub page_count: usize,
    pub master_key: String,
}

impl MergeReport {
    fn unchanged(outcome: MergeOutcome, master_key: &str) -> Self {
        Self {
            outcome,
            entries: 0,
            skipped: Vec::new(),
            page_count: 0,
            master_key: master_key.to_string(),
        }
    }
}

/// A source document ready to merge
struct Source {
    key: String,
    title: String,
    doc: Document,
    pages: usize,
}

/// Builds the cached master document from cached item documents
pub struct MasterBuilder<'a> {
    services: &'a Services,
}

impl<'a> MasterBuilder<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    fn settings(&self) -> &MergeSettings {
        &self.services.settings.merge
    }

    /// Item keys under the configured prefix whose file name matches the glob
    pub async fn item_keys(&self) -> Result<Vec<String>, MergeError> {
        let settings = self.settings();
        let pattern = Pattern::new(&settings.item_pattern)
            .map_err(|e| ConfigError::invalid("item_pattern", e.to_string()))?;

        let keys = self.services.cache.list(&settings.item_prefix).await?;
        Ok(keys
            .into_iter()
            .filter(|key| {
                let name = key.rsplit('/').next().unwrap_or(key);
                pattern.matches(name)
            })
            .collect())
    }

    /// Run a build
    #[instrument(skip_all, fields(master = %self.settings().master_key, force = options.force))]
    pub async fn build(
        &self,
        options: &MergeOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<MergeReport, MergeError> {
        let master_key = self.settings().master_key.clone();

        let keys = self.item_keys().await?;
        if keys.is_empty() {
            info!("No item documents found, nothing to merge");
            return Ok(MergeReport::unchanged(MergeOutcome::NothingToMerge, &master_key));
        }
        info!(items = keys.len(), "Found item documents");

        if !options.force && self.is_up_to_date(&keys).await? {
            info!("Master document is up to date");
            return Ok(MergeReport::unchanged(MergeOutcome::UpToDate, &master_key));
        }

        // Reading and merging weigh one unit per item, publishing one
        let item_weight = keys.len() as f64;
        progress.expect_remaining(2.0 * item_weight + 1.0);

        let (mut sources, skipped) = self.collect(&keys, progress, cancel).await?;
        if sources.is_empty() {
            warn!(skipped = skipped.len(), "Every item document failed to load, nothing to merge");
            progress.expect_remaining(0.0);
            progress.message("Nothing to merge");
            return Ok(MergeReport {
                skipped,
                ..MergeReport::unchanged(MergeOutcome::NothingToMerge, &master_key)
            });
        }

        // Canonical order: stable, byte-wise by title
        sources.sort_by(|a, b| a.title.cmp(&b.title));

        let toc_items: Vec<TocItem> = sources
            .iter()
            .map(|s| TocItem::new(s.title.clone()).with_page_count(s.pages))
            .collect();

        let (bytes, entries, page_count) = {
            let step = progress.step(item_weight, "Merging documents");
            let merged = merge_documents(sources, cancel, |title| step.increment(1.0, title))?;
            step.finish();
            merged
        };

        let publish = progress.step(1.0, "Publishing master document");
        let mut metadata = Metadata::new();
        metadata.insert(META_ENTRIES.to_string(), entries.to_string());
        metadata.insert(META_SKIPPED.to_string(), skipped.len().to_string());
        metadata.insert(META_SHA256.to_string(), hex::encode(Sha256::digest(&bytes)));
        metadata.insert(META_BUILT_AT.to_string(), Utc::now().to_rfc3339());

        let cache = &self.services.cache;
        let locator = cache.put(&master_key, &bytes, Some(&metadata)).await?;
        if !cache.supports_native_metadata() {
            cache.put_metadata(&master_key, &metadata).await?;
        }
        info!(%locator, entries, page_count, skipped = skipped.len(), "Published master document");

        if self.settings().publish_toc {
            self.publish_toc(&toc_items).await?;
        }
        publish.finish();

        Ok(MergeReport {
            outcome: MergeOutcome::Merged,
            entries,
            skipped,
            page_count,
            master_key,
        })
    }

    /// Whether the master exists, is newer than every item and its metadata,
    /// and indexes as many entries as there are items
    async fn is_up_to_date(&self, keys: &[String]) -> Result<bool, MergeError> {
        let cache = &self.services.cache;
        let master_key = &self.settings().master_key;

        let Some(master_time) = cache.modified_at(master_key).await? else {
            return Ok(false);
        };

        for key in keys {
            if newer_or_equal(cache.modified_at(key).await?, master_time)
                || newer_or_equal(cache.modified_at(&sidecar_key(key)).await?, master_time)
            {
                debug!(%key, "Item changed since last merge");
                return Ok(false);
            }
        }

        let Some(bytes) = cache.get(master_key, None).await? else {
            return Ok(false);
        };
        let indexed = match pdf::load(&bytes).and_then(|doc| pdf::read_index(&doc)) {
            Ok(index) => index.content_len(),
            Err(e) => {
                warn!(error = %e, "Existing master is unreadable, rebuilding");
                return Ok(false);
            }
        };
        Ok(indexed == keys.len())
    }

    /// Fetch and parse every item, skipping the ones that fail
    async fn collect(
        &self,
        keys: &[String],
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Source>, Vec<(String, String)>), MergeError> {
        let step = progress.step(keys.len() as f64, "Reading item documents");
        let mut sources = Vec::with_capacity(keys.len());
        let mut skipped = Vec::new();

        for key in keys {
            if cancel.is_cancelled() {
                return Err(MergeError::Cancelled);
            }

            match self.read_source(key).await {
                Ok(source) => sources.push(source),
                Err(reason) => {
                    warn!(%key, %reason, "Skipping item document");
                    skipped.push((key.clone(), reason));
                }
            }
            step.increment(1.0, key);
        }

        step.finish();
        Ok((sources, skipped))
    }

    async fn read_source(&self, key: &str) -> Result<Source, String> {
        let cache = &self.services.cache;
        let bytes = cache
            .get(key, None)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "document disappeared from the cache".to_string())?;

        let metadata = cache.metadata(key).await.map_err(|e| e.to_string())?;
        let title = metadata
            .as_ref()
            .and_then(|m| m.get(&self.settings().title_metadata_key))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title(key));

        let doc = pdf::load(&bytes).map_err(|e| e.to_string())?;
        let pages = pdf::page_count(&doc);
        if pages == 0 {
            return Err("document has no pages".to_string());
        }

        Ok(Source {
            key: key.to_string(),
            title,
            doc,
            pages,
        })
    }

    async fn publish_toc(&self, items: &[TocItem]) -> Result<(), MergeError> {
        let generator = TocGenerator::new(self.services.settings.toc.clone())?;
        let layout = generator.layout(items, 0);
        let bytes = render_document(&layout)?;

        let toc_key = &self.settings().toc_key;
        let locator = self.services.cache.put(toc_key, &bytes, None).await?;
        info!(%locator, pages = layout.page_count(), "Published table of contents");
        Ok(())
    }
}

fn newer_or_equal(time: Option<Timestamp>, than: Timestamp) -> bool {
    time.map(|t| t >= than).unwrap_or(false)
}

/// File stem of the key's last segment
fn fallback_title(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Concatenate `sources` in order and index them by title.
///
/// Returns the serialized master, the number of entries and the page count.
fn merge_documents(
    sources: Vec<Source>,
    cancel: &CancellationToken,
    mut on_merged: impl FnMut(&str),
) -> Result<(Vec<u8>, usize, usize), MergeError> {
    let mut master = Document::with_version(PDF_VERSION);
    let mut tree = PageTreeBuilder::new(&mut master);
    let mut entries: Vec<(String, ObjectId)> = Vec::with_capacity(sources.len());

    for source in sources {
        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        let ids = import_pages(&mut master, source.doc)?;
        let Some(first) = ids.first().copied() else {
            continue;
        };
        for id in ids {
            tree.push(&mut master, id)?;
        }
        debug!(key = %source.key, title = %source.title, pages = source.pages, "Merged item");
        on_merged(&source.title);
        entries.push((source.title, first));
    }

    tree.finish(&mut master);
    pdf::write_outline(&mut master, &entries)?;
    master.prune_objects();
    let bytes = pdf::save(&mut master)?;

    // The index must read back exactly as written
    let written = pdf::read_index(&pdf::load(&bytes)?)?;
    if written.content_len() != entries.len() || !written.is_monotonic() {
        return Err(PdfError::Structure(format!(
            "master index has {} readable entries, expected {}",
            written.content_len(),
            entries.len()
        ))
        .into());
    }

    Ok((bytes, entries.len(), written.page_count()))
}
