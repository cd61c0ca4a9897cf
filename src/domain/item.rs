//! Source items supplied by content ingestion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Property holding the 0-5 difficulty bin
pub const DIFFICULTY_BIN_PROPERTY: &str = "difficulty_bin";

/// Property holding the raw difficulty score
pub const DIFFICULTY_PROPERTY: &str = "difficulty";

/// Property holding the item's workflow status
pub const STATUS_PROPERTY: &str = "status";

/// Status value marking an item as ready to play
pub const READY_TO_PLAY: &str = "READY_TO_PLAY";

/// One source document to be merged or extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, also the cache key stem
    pub id: String,

    /// Display title, used as the index key
    pub title: String,

    /// Arbitrary key/value tags
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Item {
    /// Create an item with an empty property bag
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Difficulty bin in 0..=5, where 0 means unknown.
    ///
    /// Unparseable or out-of-range values count as unknown.
    pub fn difficulty_bin(&self) -> u8 {
        self.property(DIFFICULTY_BIN_PROPERTY)
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|bin| *bin <= 5)
            .unwrap_or(0)
    }

    /// Whether the status flag marks the item ready to play
    pub fn is_ready_to_play(&self) -> bool {
        self.property(STATUS_PROPERTY) == Some(READY_TO_PLAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_bin_parsing() {
        let item = Item::new("1", "Song");
        assert_eq!(item.difficulty_bin(), 0);

        assert_eq!(item.clone().with_property("difficulty_bin", "3").difficulty_bin(), 3);
        assert_eq!(item.clone().with_property("difficulty_bin", " 5 ").difficulty_bin(), 5);
        assert_eq!(item.clone().with_property("difficulty_bin", "9").difficulty_bin(), 0);
        assert_eq!(item.clone().with_property("difficulty_bin", "-1").difficulty_bin(), 0);
        assert_eq!(item.with_property("difficulty_bin", "hard").difficulty_bin(), 0);
    }

    #[test]
    fn test_ready_to_play() {
        let item = Item::new("1", "Song");
        assert!(!item.is_ready_to_play());
        assert!(item.clone().with_property("status", "READY_TO_PLAY").is_ready_to_play());
        assert!(!item.with_property("status", "DRAFT").is_ready_to_play());
    }

    #[test]
    fn test_deserialize_without_properties() {
        let item: Item = serde_json::from_str(r#"{"id": "abc", "title": "Jolene"}"#).unwrap();
        assert_eq!(item.id, "abc");
        assert!(item.properties.is_empty());
    }
}
