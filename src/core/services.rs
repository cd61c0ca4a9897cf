//! Caller-owned collaborators shared by the engine components.

use std::fmt;
use std::sync::Arc;

use crate::cache::{ContentCache, LocalCache};
use crate::config::Settings;
use crate::error::CacheError;

use super::enrich::{DifficultyBins, Enricher};

/// Built once at process start and passed by reference to each component
pub struct Services {
    pub settings: Settings,
    pub cache: Arc<dyn ContentCache>,
    /// Run in order over requested items before layout
    pub enrichers: Vec<Box<dyn Enricher>>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enrichers: Vec<&str> = self.enrichers.iter().map(|e| e.name()).collect();
        f.debug_struct("Services")
            .field("cache", &self.cache.backend_name())
            .field("enrichers", &enrichers)
            .finish()
    }
}

impl Services {
    /// Services over `cache` with the default enrichers
    pub fn new(settings: Settings, cache: Arc<dyn ContentCache>) -> Self {
        Self {
            settings,
            cache,
            enrichers: vec![Box::new(DifficultyBins::default())],
        }
    }

    /// Services over the local cache directory named in `settings`
    pub async fn open(settings: Settings) -> Result<Self, CacheError> {
        let cache = LocalCache::open(settings.cache_dir.clone(), settings.retry.clone()).await?;
        Ok(Self::new(settings, Arc::new(cache)))
    }

    /// Replace the enricher list
    pub fn with_enrichers(mut self, enrichers: Vec<Box<dyn Enricher>>) -> Self {
        self.enrichers = enrichers;
        self
    }
}
