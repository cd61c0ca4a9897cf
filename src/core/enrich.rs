//! Item enrichment applied before table-of-contents layout.
//!
//! Enrichers are passed in as an explicit, ordered list and run in that
//! order over the requested items.

use tracing::debug;

use crate::domain::item::{DIFFICULTY_BIN_PROPERTY, DIFFICULTY_PROPERTY};
use crate::domain::Item;

/// Rewrites item properties in place
pub trait Enricher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn enrich(&self, items: &mut [Item]);
}

/// Run `enrichers` in order over `items`
pub fn enrich_all(enrichers: &[Box<dyn Enricher>], items: &mut [Item]) {
    for enricher in enrichers {
        debug!(enricher = enricher.name(), items = items.len(), "Enriching items");
        enricher.enrich(items);
    }
}

/// Sorts raw `difficulty` values into `difficulty_bin` 1..=5.
///
/// Values are normalised against the smallest valid difficulty and a fixed
/// maximum of 5. Items without a valid difficulty get bin 0, as do all items
/// when none has one.
#[derive(Debug, Clone)]
pub struct DifficultyBins {
    bins: u8,
    max_difficulty: f64,
}

impl Default for DifficultyBins {
    fn default() -> Self {
        Self {
            bins: 5,
            max_difficulty: 5.0,
        }
    }
}

impl DifficultyBins {
    fn raw(item: &Item) -> Option<f64> {
        item.property(DIFFICULTY_PROPERTY)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v != -1.0)
    }

    /// Bin for a value normalised to `[0, 1]`: the first `i` with
    /// `value <= i / bins`, clamped to `1..=bins`
    fn bin_for(&self, normalised: f64) -> u8 {
        let bins = self.bins.max(1);
        (1..=bins)
            .find(|i| normalised <= *i as f64 / bins as f64)
            .unwrap_or(bins)
    }
}

impl Enricher for DifficultyBins {
    fn name(&self) -> &str {
        "difficulty-bins"
    }

    fn enrich(&self, items: &mut [Item]) {
        let raw: Vec<Option<f64>> = items.iter().map(Self::raw).collect();

        let Some(min) = raw.iter().flatten().copied().reduce(f64::min) else {
            for item in items.iter_mut() {
                item.properties
                    .insert(DIFFICULTY_BIN_PROPERTY.to_string(), "0".to_string());
            }
            return;
        };

        let mut scaler = self.max_difficulty - min;
        if scaler <= 0.0 {
            scaler = 1.0;
        }

        for (item, value) in items.iter_mut().zip(raw) {
            let bin = match value {
                Some(v) => self.bin_for((v - min) / scaler),
                None => 0,
            };
            item.properties
                .insert(DIFFICULTY_BIN_PROPERTY.to_string(), bin.to_string());
        }
    }
}
