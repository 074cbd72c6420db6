//! Watch-mode file map
//!
//! The per-file record of {last-scanned, hash, pattern ids} the watch
//! engine consults to decide whether an event is a real change. Replaced
//! atomically on every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{path_key, write_atomic};

/// Current on-disk document version
const FILE_MAP_VERSION: &str = "1";

/// One file's entry in the map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMapEntry {
    /// When the file was last scanned
    pub last_scanned: DateTime<Utc>,
    /// Short content hash at last scan
    pub hash: String,
    /// Stable ids of patterns present in the file
    pub patterns: Vec<String>,
}

/// The watch-mode file map document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMap {
    /// Document version
    pub version: String,
    /// Per-file entries keyed by workspace-relative path
    pub files: BTreeMap<String, FileMapEntry>,
    /// When the map was last written
    pub last_updated: DateTime<Utc>,
}

impl FileMap {
    /// An empty map
    pub fn empty() -> Self {
        Self {
            version: FILE_MAP_VERSION.to_string(),
            files: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Loads the map from `path`; missing yields an empty map, corrupt
    /// surfaces an error
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| Error::Store {
                path: path.to_path_buf(),
                message: format!("corrupt file map: {e}"),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(Error::Store {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// The recorded hash for a file, if any
    pub fn hash_of(&self, file: &Path) -> Option<&str> {
        self.files.get(&path_key(file)).map(|e| e.hash.as_str())
    }

    /// Records a file's scan outcome
    pub fn record(&mut self, file: &Path, hash: impl Into<String>, patterns: Vec<String>) {
        self.files.insert(
            path_key(file),
            FileMapEntry {
                last_scanned: Utc::now(),
                hash: hash.into(),
                patterns,
            },
        );
    }

    /// Removes a file's entry, returning the pattern ids it carried
    pub fn remove(&mut self, file: &Path) -> Option<Vec<String>> {
        self.files.remove(&path_key(file)).map(|e| e.patterns)
    }

    /// Writes the map atomically (write-then-rename)
    pub fn save(&mut self, path: &PathBuf) -> Result<()> {
        self.last_updated = Utc::now();
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json).map_err(|e| Error::Store {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file-map.json");
        let mut map = FileMap::empty();
        map.record(Path::new("src/a.ts"), "h1", vec!["p1".to_string()]);
        map.save(&path).unwrap();

        let reloaded = FileMap::load(&path).unwrap();
        assert_eq!(reloaded.hash_of(Path::new("src/a.ts")), Some("h1"));
        assert_eq!(reloaded.files["src/a.ts"].patterns, vec!["p1"]);
    }

    #[test]
    fn test_missing_is_empty() {
        let map = FileMap::load(Path::new("/nonexistent/file-map.json")).unwrap();
        assert!(map.files.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut map = FileMap::empty();
        map.record(Path::new("src/a.ts"), "h1", vec!["p1".to_string()]);
        assert_eq!(map.remove(Path::new("src/a.ts")), Some(vec!["p1".to_string()]));
        assert_eq!(map.remove(Path::new("src/a.ts")), None);
    }
}
