//! Configuration for songbook assembly.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SONGBOOK_HOME, SONGBOOK_CACHE_DIR)
//! 2. Config file (.songbook/config.yaml)
//! 3. Defaults (~/.songbook, cache in ~/.songbook/cache)
//!
//! Config file discovery:
//! - Searches the start directory and its parents for .songbook/config.yaml
//! - `home` is relative to the .songbook/ directory, `cache_dir` to the
//!   project root (the parent of .songbook/)
//!
//! Settings are loaded once by the caller and passed down by reference.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::RetryPolicy;
use crate::error::ConfigError;

/// Directory holding the project config file
pub const CONFIG_DIR: &str = ".songbook";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub extract: ExtractSettings,
    #[serde(default)]
    pub toc: TocLayoutConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .songbook/)
    pub home: Option<String>,
    /// Local cache root (relative to the project root)
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Retry policy for transient cache I/O
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Master document build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Namespace holding per-item documents
    #[serde(default = "default_item_prefix")]
    pub item_prefix: String,

    /// Glob matched against the item key's file name
    #[serde(default = "default_item_pattern")]
    pub item_pattern: String,

    /// Key of the master document
    #[serde(default = "default_master_key")]
    pub master_key: String,

    /// Key of the browsable table of contents
    #[serde(default = "default_toc_key")]
    pub toc_key: String,

    /// Metadata key holding an item's display title
    #[serde(default = "default_title_metadata_key")]
    pub title_metadata_key: String,

    /// Whether to publish the browsable table of contents
    #[serde(default)]
    pub publish_toc: bool,
}

fn default_item_prefix() -> String {
    "song-sheets/".to_string()
}
fn default_item_pattern() -> String {
    "*.pdf".to_string()
}
fn default_master_key() -> String {
    "merged-pdf/latest.pdf".to_string()
}
fn default_toc_key() -> String {
    "merged-pdf/latest-toc.pdf".to_string()
}
fn default_title_metadata_key() -> String {
    "gdrive-file-name".to_string()
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            item_prefix: default_item_prefix(),
            item_pattern: default_item_pattern(),
            master_key: default_master_key(),
            toc_key: default_toc_key(),
            title_metadata_key: default_title_metadata_key(),
            publish_toc: false,
        }
    }
}

/// Extraction defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSettings {
    /// Stamp page numbers on each item's first page
    #[serde(default = "default_true")]
    pub add_page_numbers: bool,

    /// Prepend a generated table of contents
    #[serde(default = "default_true")]
    pub include_toc: bool,

    /// Items copied between cancellation checks
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    10
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            add_page_numbers: true,
            include_toc: true,
            batch_size: default_batch_size(),
        }
    }
}

/// Layout of generated table-of-contents pages.
///
/// Lengths are in points. Fonts are standard PDF base-font names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocLayoutConfig {
    #[serde(default = "default_page_width")]
    pub page_width: f32,
    #[serde(default = "default_page_height")]
    pub page_height: f32,
    #[serde(default = "default_columns_per_page")]
    pub columns_per_page: usize,
    #[serde(default = "default_column_width")]
    pub column_width: f32,
    #[serde(default = "default_column_spacing")]
    pub column_spacing: f32,
    #[serde(default = "default_margin")]
    pub margin_top: f32,
    #[serde(default = "default_margin")]
    pub margin_bottom: f32,
    #[serde(default = "default_margin")]
    pub margin_left: f32,
    #[serde(default = "default_title_height")]
    pub title_height: f32,
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
    #[serde(default = "default_title_font")]
    pub title_font: String,
    #[serde(default = "default_text_font")]
    pub text_font: String,
    #[serde(default = "default_text_font")]
    pub page_number_font: String,
    #[serde(default = "default_title_font_size")]
    pub title_font_size: f32,
    #[serde(default = "default_text_font_size")]
    pub text_font_size: f32,
    #[serde(default = "default_max_toc_entry_length")]
    pub max_toc_entry_length: usize,
    #[serde(default = "default_true")]
    pub include_difficulty: bool,
    #[serde(default = "default_true")]
    pub include_ready_marker: bool,
}

fn default_page_width() -> f32 {
    595.0
}
fn default_page_height() -> f32 {
    842.0
}
fn default_columns_per_page() -> usize {
    2
}
fn default_column_width() -> f32 {
    250.0
}
fn default_column_spacing() -> f32 {
    20.0
}
fn default_margin() -> f32 {
    50.0
}
fn default_title_height() -> f32 {
    50.0
}
fn default_line_spacing() -> f32 {
    10.0
}
fn default_title_font() -> String {
    "Helvetica-Bold".to_string()
}
fn default_text_font() -> String {
    "Helvetica".to_string()
}
fn default_title_font_size() -> f32 {
    16.0
}
fn default_text_font_size() -> f32 {
    9.0
}
fn default_max_toc_entry_length() -> usize {
    50
}

impl Default for TocLayoutConfig {
    fn default() -> Self {
        Self {
            page_width: default_page_width(),
            page_height: default_page_height(),
            columns_per_page: default_columns_per_page(),
            column_width: default_column_width(),
            column_spacing: default_column_spacing(),
            margin_top: default_margin(),
            margin_bottom: default_margin(),
            margin_left: default_margin(),
            title_height: default_title_height(),
            line_spacing: default_line_spacing(),
            title_font: default_title_font(),
            text_font: default_text_font(),
            page_number_font: default_text_font(),
            title_font_size: default_title_font_size(),
            text_font_size: default_text_font_size(),
            max_toc_entry_length: default_max_toc_entry_length(),
            include_difficulty: true,
            include_ready_marker: true,
        }
    }
}

impl TocLayoutConfig {
    /// Vertical space available to one column of entries
    pub fn available_column_height(&self) -> f32 {
        self.page_height - self.title_height - self.margin_top - self.margin_bottom
    }

    /// Entry lines that fit in one column
    pub fn lines_per_column(&self) -> usize {
        let lines = (self.available_column_height() / self.line_spacing).floor();
        if lines.is_finite() && lines > 0.0 {
            lines as usize
        } else {
            0
        }
    }

    /// Entry lines that fit on one page
    pub fn lines_per_page(&self) -> usize {
        self.lines_per_column() * self.columns_per_page
    }

    /// Reject layouts that cannot place a single entry
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("page_width", self.page_width),
            ("page_height", self.page_height),
            ("column_width", self.column_width),
            ("line_spacing", self.line_spacing),
            ("title_font_size", self.title_font_size),
            ("text_font_size", self.text_font_size),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, format!("must be positive, got {}", value)));
            }
        }

        let non_negative = [
            ("column_spacing", self.column_spacing),
            ("margin_top", self.margin_top),
            ("margin_bottom", self.margin_bottom),
            ("margin_left", self.margin_left),
            ("title_height", self.title_height),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(field, format!("must not be negative, got {}", value)));
            }
        }

        if self.columns_per_page == 0 {
            return Err(ConfigError::invalid("columns_per_page", "must be at least 1"));
        }
        if self.max_toc_entry_length == 0 {
            return Err(ConfigError::invalid("max_toc_entry_length", "must be at least 1"));
        }
        if self.lines_per_column() == 0 {
            return Err(ConfigError::invalid(
                "line_spacing",
                format!(
                    "no room for a single line in {} points",
                    self.available_column_height()
                ),
            ));
        }

        Ok(())
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Engine state directory (lock files)
    pub home: PathBuf,
    /// Local cache root
    pub cache_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub merge: MergeSettings,
    pub extract: ExtractSettings,
    pub toc: TocLayoutConfig,
}

impl Settings {
    /// Defaults rooted at `home`
    pub fn rooted_at(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            cache_dir: home.join("cache"),
            home,
            config_file: None,
            retry: RetryPolicy::default(),
            merge: MergeSettings::default(),
            extract: ExtractSettings::default(),
            toc: TocLayoutConfig::default(),
        }
    }

    /// Load settings, discovering the config file from the current directory
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        Self::load_from(&cwd)
    }

    /// Load settings, discovering the config file from `start`
    pub fn load_from(start: &Path) -> Result<Self> {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(CONFIG_DIR);

        let found = match find_config_file(start) {
            Some(path) => {
                let file = load_config_file(&path)?;
                Some((path, file))
            }
            None => None,
        };

        let settings = resolve(
            default_home,
            found,
            std::env::var("SONGBOOK_HOME").ok(),
            std::env::var("SONGBOOK_CACHE_DIR").ok(),
        );
        settings
            .toc
            .validate()
            .context("Invalid table of contents layout")?;
        Ok(settings)
    }

    /// Lock file serialising master rebuilds
    pub fn merge_lock_path(&self) -> PathBuf {
        self.home.join("merge.lock")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine defaults, an optional config file and environment overrides
fn resolve(
    default_home: PathBuf,
    found: Option<(PathBuf, ConfigFile)>,
    env_home: Option<String>,
    env_cache_dir: Option<String>,
) -> Settings {
    let Some((config_path, file)) = found else {
        let home = env_home.map(PathBuf::from).unwrap_or(default_home);
        let mut settings = Settings::rooted_at(home);
        if let Some(dir) = env_cache_dir {
            settings.cache_dir = PathBuf::from(dir);
        }
        return settings;
    };

    // .songbook/ and the project root above it
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    let project_root = config_dir.parent().unwrap_or(Path::new("."));

    let home = if let Some(env) = env_home {
        PathBuf::from(env)
    } else if let Some(ref home) = file.paths.home {
        resolve_path(config_dir, home)
    } else {
        default_home
    };

    let cache_dir = if let Some(env) = env_cache_dir {
        PathBuf::from(env)
    } else if let Some(ref dir) = file.paths.cache_dir {
        resolve_path(project_root, dir)
    } else {
        home.join("cache")
    };

    Settings {
        home,
        cache_dir,
        config_file: Some(config_path),
        retry: file.cache.retry,
        merge: file.merge,
        extract: file.extract,
        toc: file.toc,
    }
}
