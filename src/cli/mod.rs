//! Command-line interface for songbook.
//!
//! Provides commands for ingesting item documents into the cache, rebuilding
//! the master document, extracting songbooks and rendering tables of
//! contents.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::Metadata;
use crate::config::Settings;
use crate::core::enrich::enrich_all;
use crate::core::{
    ExtractRequest, MasterBuilder, MergeOptions, MergeOutcome, PageExtractor, ProgressReporter,
    Services,
};
use crate::domain::Item;
use crate::pdf;
use crate::toc::{render_document, TocGenerator, TocItem};

/// songbook - Cached songbook assembly
#[derive(Parser, Debug)]
#[command(name = "songbook")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store an item document in the cache
    Ingest {
        /// PDF file to store
        pdf: PathBuf,

        /// Item id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,

        /// Display title (defaults to the file stem)
        #[arg(long)]
        title: Option<String>,

        /// Extra metadata as key=value (repeatable)
        #[arg(long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },

    /// Rebuild the cached master document
    Merge {
        /// Rebuild even if the master is up to date
        #[arg(short, long)]
        force: bool,
    },

    /// Extract a songbook from the cached master document
    Extract {
        /// Title to include, in order (repeatable)
        #[arg(short, long = "title")]
        titles: Vec<String>,

        /// JSON file with a list of items ({id, title, properties})
        #[arg(long)]
        items: Option<PathBuf>,

        /// Output PDF path
        #[arg(short, long)]
        output: PathBuf,

        /// Write the manifest as JSON to this path
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Leave out the table of contents
        #[arg(long)]
        no_toc: bool,

        /// Do not stamp page numbers
        #[arg(long)]
        no_page_numbers: bool,

        /// Source folder recorded in the manifest (repeatable)
        #[arg(long = "source-folder")]
        source_folders: Vec<String>,

        /// Cache key of a document whose first page opens the songbook (repeatable)
        #[arg(long = "preface")]
        prefaces: Vec<String>,

        /// Cache key of a document whose first page closes the songbook (repeatable)
        #[arg(long = "postface")]
        postfaces: Vec<String>,
    },

    /// Render a standalone table of contents
    Toc {
        /// JSON file with a list of items
        #[arg(long)]
        items: PathBuf,

        /// Output PDF path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load()?;

        match self.command {
            Commands::Config => show_config(&settings),
            command => {
                let services = Services::open(settings)
                    .await
                    .context("Failed to open content cache")?;
                run(command, &services).await
            }
        }
    }
}

async fn run(command: Commands, services: &Services) -> Result<()> {
    match command {
        Commands::Ingest {
            pdf,
            id,
            title,
            properties,
        } => ingest(services, &pdf, id, title, properties).await,
        Commands::Merge { force } => merge(services, force).await,
        Commands::Extract {
            titles,
            items,
            output,
            manifest,
            no_toc,
            no_page_numbers,
            source_folders,
            prefaces,
            postfaces,
        } => {
            let mut requested = match items {
                Some(path) => read_items(&path)?,
                None => Vec::new(),
            };
            requested.extend(titles.into_iter().map(|t| Item::new(t.clone(), t)));
            if requested.is_empty() {
                anyhow::bail!("No items requested. Use --title <title> or --items <file>");
            }

            let request = ExtractRequest::new(requested)
                .with_toc(!no_toc)
                .with_page_numbers(!no_page_numbers)
                .with_source_folders(source_folders)
                .with_preface(prefaces)
                .with_postface(postfaces);
            extract(services, request, &output, manifest.as_deref()).await
        }
        Commands::Toc { items, output } => render_toc(services, &items, &output).await,
        Commands::Config => show_config(&services.settings),
    }
}

/// Parse a `key=value` pair
fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
}

fn read_items(path: &Path) -> Result<Vec<Item>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse items file: {}", path.display()))
}

/// Progress reporter that logs each update
fn logging_progress() -> ProgressReporter {
    ProgressReporter::new(|value, message| {
        info!(percent = (value * 100.0).round() as u64, "{}", message);
    })
}

/// Token cancelled on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the current batch");
            child.cancel();
        }
    });
    token
}

/// Store an item document and its metadata
async fn ingest(
    services: &Services,
    path: &Path,
    id: Option<String>,
    title: Option<String>,
    properties: Vec<(String, String)>,
) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read PDF: {}", path.display()))?;

    let doc = pdf::load(&bytes).with_context(|| format!("Not a readable PDF: {}", path.display()))?;
    let pages = pdf::page_count(&doc);
    if pages == 0 {
        anyhow::bail!("PDF has no pages: {}", path.display());
    }

    let stem = file_stem(path).context("Cannot derive an id from the file name")?;
    let id = id.unwrap_or_else(|| stem.clone());
    let title = title.unwrap_or(stem);

    let merge = &services.settings.merge;
    let key = format!("{}/{}.pdf", merge.item_prefix.trim_end_matches('/'), id);

    let mut metadata: Metadata = properties.into_iter().collect();
    metadata.insert(merge.title_metadata_key.clone(), title.clone());

    let cache = &services.cache;
    let locator = cache
        .put(&key, &bytes, Some(&metadata))
        .await
        .with_context(|| format!("Failed to store {}", key))?;
    if !cache.supports_native_metadata() {
        cache
            .put_metadata(&key, &metadata)
            .await
            .with_context(|| format!("Failed to store metadata for {}", key))?;
    }

    println!("Stored '{}' ({} pages) at {}", title, pages, locator);
    Ok(())
}

/// Rebuild the master document while holding the merge lock
async fn merge(services: &Services, force: bool) -> Result<()> {
    let lock_path = services.settings.merge_lock_path();
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    // One rebuild at a time; readers never see a half-written master
    lock.lock_exclusive()
        .context("Failed to acquire merge lock")?;

    let report = MasterBuilder::new(services)
        .build(&MergeOptions { force }, &logging_progress(), &cancel_on_ctrl_c())
        .await
        .context("Merge failed")?;

    for (key, reason) in &report.skipped {
        eprintln!("Skipped {}: {}", key, reason);
    }
    match report.outcome {
        MergeOutcome::Merged => println!(
            "Merged {} items ({} pages) into {}",
            report.entries, report.page_count, report.master_key
        ),
        MergeOutcome::NothingToMerge => println!("Nothing to merge"),
        MergeOutcome::UpToDate => println!("{} is up to date", report.master_key),
    }

    Ok(())
}

async fn extract(
    services: &Services,
    request: ExtractRequest,
    output: &Path,
    manifest_path: Option<&Path>,
) -> Result<()> {
    let progress = logging_progress();
    let extraction = PageExtractor::new(services)
        .extract(request, &progress, &cancel_on_ctrl_c())
        .await
        .map_err(|e| {
            let stale = e.is_stale_master();
            let err = anyhow::Error::new(e);
            if stale {
                err.context("Extraction failed; rebuild the master with `songbook merge`")
            } else {
                err.context("Extraction failed")
            }
        })?;

    tokio::fs::write(output, &extraction.bytes)
        .await
        .with_context(|| format!("Failed to write output: {}", output.display()))?;

    if let Some(path) = manifest_path {
        let json = serde_json::to_string_pretty(&extraction.manifest)
            .context("Failed to serialize manifest")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    }

    println!(
        "Wrote {} pages ({} items) to {}",
        extraction.manifest.page_count,
        extraction.plan.items.len(),
        output.display()
    );
    Ok(())
}

async fn render_toc(services: &Services, items_path: &Path, output: &Path) -> Result<()> {
    let mut items = read_items(items_path)?;
    enrich_all(&services.enrichers, &mut items);

    let generator = TocGenerator::new(services.settings.toc.clone())?;
    let toc_items: Vec<TocItem> = items.iter().map(TocItem::from_item).collect();
    let layout = generator.layout(&toc_items, 0);
    let bytes = render_document(&layout)?;

    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write output: {}", output.display()))?;
    println!(
        "Wrote {} TOC pages ({} entries) to {}",
        layout.page_count(),
        layout.records.len(),
        output.display()
    );
    Ok(())
}

fn show_config(settings: &Settings) -> Result<()> {
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    print!(
        "{}",
        serde_yaml::to_string(settings).context("Failed to serialize settings")?
    );
    Ok(())
}
