//! Summary record of an extracted songbook, consumed by downstream validators.

use serde::{Deserialize, Serialize};

/// Manifest describing one extraction output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Total pages in the output document
    pub page_count: usize,

    /// Whether the output starts with generated TOC pages
    pub has_toc: bool,

    /// Number of content entries listed in the TOC
    pub toc_entries: usize,

    /// Titles of the included items, in output order
    pub file_names: Vec<String>,

    /// Source folders the request was drawn from
    pub source_folders: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_uses_camel_case_keys() {
        let manifest = Manifest {
            page_count: 3,
            has_toc: true,
            toc_entries: 2,
            file_names: vec!["A".to_string(), "B".to_string()],
            source_folders: vec!["folder-1".to_string()],
        };

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["pageCount"], 3);
        assert_eq!(json["hasToc"], true);
        assert_eq!(json["tocEntries"], 2);
        assert_eq!(json["fileNames"][1], "B");
        assert_eq!(json["sourceFolders"][0], "folder-1");
    }
}
