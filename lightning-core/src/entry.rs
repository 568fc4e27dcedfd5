//! The persisted record for one file or directory.

use serde::{Deserialize, Serialize};

/// Metadata for one filesystem object, keyed by `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Absolute path or content-URI string. Unique within one index generation.
    pub path: String,
    pub name: String,
    /// Lowercased `name`; the search key.
    pub name_lower: String,
    pub extension: Option<String>,
    /// Byte length, 0 for directories
    pub size: u64,
    /// Epoch milliseconds
    pub modified_time: i64,
    pub is_directory: bool,
    /// Containing directory. A lookup key, not an ownership edge.
    pub parent_path: Option<String>,
}

impl EntryRecord {
    /// Build a record, deriving `name_lower` and `extension` from `name`.
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        is_directory: bool,
        size: u64,
        modified_time: i64,
        parent_path: Option<String>,
    ) -> Self {
        let name = name.into();
        let name_lower = name.to_lowercase();
        let extension = if is_directory {
            None
        } else {
            extension_of(&name)
        };

        Self {
            path: path.into(),
            name,
            name_lower,
            extension,
            size: if is_directory { 0 } else { size },
            modified_time,
            is_directory,
            parent_path,
        }
    }
}

/// Lowercase suffix after the last `.`, or `None` when there is no suffix.
pub fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_suffix() {
        assert_eq!(extension_of("notes.TXT"), Some("txt".to_string()));
        assert_eq!(extension_of("archive.tar.GZ"), Some("gz".to_string()));
        assert_eq!(extension_of("Makefile"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn directories_have_no_extension_or_size() {
        let record = EntryRecord::new("/r/photos.d", "photos.d", true, 4096, 1, Some("/r".into()));
        assert_eq!(record.extension, None);
        assert_eq!(record.size, 0);
        assert_eq!(record.name_lower, "photos.d");
    }

    #[test]
    fn file_record_derives_search_key() {
        let record = EntryRecord::new("/r/Sub/notes.TXT", "notes.TXT", false, 12, 5, None);
        assert_eq!(record.name_lower, "notes.txt");
        assert_eq!(record.extension.as_deref(), Some("txt"));
        assert_eq!(record.size, 12);
    }
}
