//! The cross-file semantic location map
//!
//! The manifest records, per pattern, the semantic locations witnessing it
//! and, per file, the reverse index of pattern ids observed there together
//! with the file's content hash at scan time. The reverse index is what
//! makes surgical invalidation possible: clearing a file walks only the
//! patterns that file contributed to.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern as GlobPattern;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash;
use crate::model::{Outlier, PatternCategory, PatternStatus, SemanticLocation};
use crate::store::{path_key, write_atomic};

/// Current on-disk document version
const MANIFEST_VERSION: &str = "1";

/// A pattern as the manifest records it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPattern {
    /// Stable pattern id
    pub id: String,
    /// Readable key: "category/subcategory/local-id"
    pub key: String,
    /// Human name
    pub name: String,
    /// Category
    pub category: PatternCategory,
    /// Lifecycle status mirrored from the pattern catalog
    pub status: PatternStatus,
    /// Confidence score mirrored from the pattern catalog
    pub confidence: f64,
    /// Semantic locations witnessing the pattern
    pub locations: Vec<SemanticLocation>,
    /// Outlier locations
    #[serde(default)]
    pub outliers: Vec<Outlier>,
}

/// Per-file record: the reverse index entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFileRecord {
    /// Short content hash at last scan
    pub hash: String,
    /// Stable ids of patterns observed in the file
    pub patterns: Vec<String>,
    /// When the file was last scanned
    pub last_scanned: DateTime<Utc>,
}

/// Summary block recomputed on every save
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestSummary {
    /// Total patterns
    pub total_patterns: usize,
    /// Patterns by status
    pub by_status: BTreeMap<String, usize>,
    /// Patterns by category
    pub by_category: BTreeMap<String, usize>,
    /// Files tracked
    pub total_files: usize,
    /// Semantic locations tracked
    pub total_locations: usize,
}

/// The manifest document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Document version
    pub version: String,
    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Digest of all per-file hashes (sorted, concatenated, digested)
    pub codebase_hash: String,
    /// Patterns keyed by stable id
    pub patterns: BTreeMap<String, ManifestPattern>,
    /// Reverse index keyed by workspace-relative path
    pub files: BTreeMap<String, ManifestFileRecord>,
    /// Summary block
    pub summary: ManifestSummary,
}

impl Manifest {
    /// An empty manifest
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            generated_at: Utc::now(),
            codebase_hash: String::new(),
            patterns: BTreeMap::new(),
            files: BTreeMap::new(),
            summary: ManifestSummary::default(),
        }
    }

    /// The recorded hash for a file, if any
    pub fn file_hash(&self, file: &Path) -> Option<&str> {
        self.files.get(&path_key(file)).map(|r| r.hash.as_str())
    }
}

/// Query over the manifest's patterns
#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    /// Case-insensitive substring matched against id, key, and name
    pub text: Option<String>,
    /// Restrict to one category
    pub category: Option<PatternCategory>,
    /// Restrict to one status
    pub status: Option<PatternStatus>,
    /// Minimum confidence score
    pub min_confidence: Option<f64>,
    /// Restrict to locations matching a file glob (`*` and `**`)
    pub file_glob: Option<String>,
    /// Cap on locations returned per pattern
    pub limit: Option<usize>,
}

/// One pattern returned by a pattern query
#[derive(Debug, Clone, Serialize)]
pub struct PatternQueryHit {
    /// Stable pattern id
    pub pattern_id: String,
    /// Human name
    pub pattern_name: String,
    /// Category
    pub category: PatternCategory,
    /// Locations (limited per the query)
    pub locations: Vec<SemanticLocation>,
    /// Total locations before limiting
    pub total_count: usize,
}

/// Result of a file query
#[derive(Debug, Clone, Serialize)]
pub struct FileQueryResult {
    /// Workspace-relative path
    pub file: String,
    /// Stable ids of patterns observed in the file
    pub patterns: Vec<String>,
    /// Short content hash at last scan
    pub hash: String,
    /// When the file was last scanned
    pub last_scanned: DateTime<Utc>,
}

/// Owner of `.drift/index/manifest.json`
pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
    dirty: bool,
}

impl ManifestStore {
    /// Creates an empty store over the given document path
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            manifest: Manifest::empty(),
            dirty: false,
        }
    }

    /// Loads the document if it exists; missing yields an empty manifest,
    /// corrupt surfaces an error
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::create(path.clone());
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                store.manifest = serde_json::from_str(&content).map_err(|e| Error::Store {
                    path: path.clone(),
                    message: format!("corrupt manifest: {e}"),
                })?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Store {
                    path,
                    message: e.to_string(),
                });
            }
        }
        Ok(store)
    }

    /// The in-memory manifest
    pub fn get(&self) -> &Manifest {
        &self.manifest
    }

    /// True when in-memory state differs from disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a file's content differs from what the manifest recorded.
    /// Absence of a record counts as changed.
    pub fn has_file_changed(&self, file: &Path, current_hash: &str) -> bool {
        match self.manifest.file_hash(file) {
            Some(recorded) => recorded != current_hash,
            None => true,
        }
    }

    /// Filters `files` down to those whose hashes differ from the record
    pub fn changed_files<'a>(
        &self,
        files: impl IntoIterator<Item = (&'a Path, &'a str)>,
    ) -> Vec<PathBuf> {
        files
            .into_iter()
            .filter(|(path, hash)| self.has_file_changed(path, hash))
            .map(|(path, _)| path.to_path_buf())
            .collect()
    }

    /// Removes every trace of `file`: its locations and outliers are
    /// dropped from every pattern the reverse index names, patterns left
    /// without evidence are deleted, and the per-file record is removed.
    pub fn clear_file_patterns(&mut self, file: &Path) {
        let key = path_key(file);
        let Some(record) = self.manifest.files.remove(&key) else {
            return;
        };
        for pattern_id in &record.patterns {
            let remove = if let Some(pattern) = self.manifest.patterns.get_mut(pattern_id) {
                pattern.locations.retain(|l| l.file != file);
                pattern.outliers.retain(|o| o.location.file != file);
                pattern.locations.is_empty() && pattern.outliers.is_empty()
            } else {
                false
            };
            if remove {
                debug!("manifest pattern {pattern_id} lost its last evidence");
                self.manifest.patterns.remove(pattern_id);
            }
        }
        self.dirty = true;
    }

    /// Upserts a manifest pattern, deduplicating its semantic locations
    /// and wiring the reverse index for every file it touches
    pub fn update_pattern(&mut self, mut pattern: ManifestPattern) {
        let mut seen = HashSet::new();
        pattern.locations.retain(|l| seen.insert(l.dedup_key()));

        let now = Utc::now();
        for location in &pattern.locations {
            let key = path_key(&location.file);
            let record = self
                .manifest
                .files
                .entry(key)
                .or_insert_with(|| ManifestFileRecord {
                    hash: location.content_hash.clone(),
                    patterns: Vec::new(),
                    last_scanned: now,
                });
            record.hash = location.content_hash.clone();
            record.last_scanned = now;
            if !record.patterns.contains(&pattern.id) {
                record.patterns.push(pattern.id.clone());
            }
        }

        self.manifest.patterns.insert(pattern.id.clone(), pattern);
        self.dirty = true;
    }

    /// Upserts a batch of patterns
    pub fn update_patterns(&mut self, patterns: Vec<ManifestPattern>) {
        for pattern in patterns {
            self.update_pattern(pattern);
        }
    }

    /// Records a file's scan result even when it contributed no patterns,
    /// so unchanged-detection has a hash to compare against
    pub fn record_file(&mut self, file: &Path, content_hash: &str, pattern_ids: Vec<String>) {
        self.manifest.files.insert(
            path_key(file),
            ManifestFileRecord {
                hash: content_hash.to_string(),
                patterns: pattern_ids,
                last_scanned: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// Queries patterns by substring, category, status, confidence, and
    /// file glob
    pub fn query_patterns(&self, query: &PatternQuery) -> Result<Vec<PatternQueryHit>> {
        let glob = query
            .file_glob
            .as_deref()
            .map(GlobPattern::new)
            .transpose()
            .map_err(|e| Error::Parse(format!("invalid file glob: {e}")))?;
        let needle = query.text.as_deref().map(str::to_lowercase);

        let mut hits = Vec::new();
        for pattern in self.manifest.patterns.values() {
            if let Some(needle) = &needle {
                let hay = format!(
                    "{} {} {}",
                    pattern.id.to_lowercase(),
                    pattern.key.to_lowercase(),
                    pattern.name.to_lowercase()
                );
                if !hay.contains(needle) {
                    continue;
                }
            }
            if query.category.is_some_and(|c| c != pattern.category) {
                continue;
            }
            if query.status.is_some_and(|s| s != pattern.status) {
                continue;
            }
            if query.min_confidence.is_some_and(|m| pattern.confidence < m) {
                continue;
            }
            let locations: Vec<&SemanticLocation> = match &glob {
                Some(g) => pattern
                    .locations
                    .iter()
                    .filter(|l| g.matches(&path_key(&l.file)))
                    .collect(),
                None => pattern.locations.iter().collect(),
            };
            if glob.is_some() && locations.is_empty() {
                continue;
            }
            let total_count = locations.len();
            let limited: Vec<SemanticLocation> = locations
                .into_iter()
                .take(query.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect();
            hits.push(PatternQueryHit {
                pattern_id: pattern.id.clone(),
                pattern_name: pattern.name.clone(),
                category: pattern.category,
                locations: limited,
                total_count,
            });
        }
        Ok(hits)
    }

    /// Returns the first file matching `path_or_glob`, with its reverse
    /// index entry
    pub fn query_file(&self, path_or_glob: &str) -> Result<Option<FileQueryResult>> {
        let normalized = path_or_glob.replace('\\', "/");
        if let Some(record) = self.manifest.files.get(&normalized) {
            return Ok(Some(file_result(&normalized, record)));
        }
        let glob = GlobPattern::new(&normalized)
            .map_err(|e| Error::Parse(format!("invalid file glob: {e}")))?;
        Ok(self
            .manifest
            .files
            .iter()
            .find(|(key, _)| glob.matches(key))
            .map(|(key, record)| file_result(key, record)))
    }

    /// Recomputes the summary block and codebase hash, then writes the
    /// document atomically. A clean store is a no-op.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.manifest.summary = self.compute_summary();
        self.manifest.codebase_hash =
            hash::codebase_hash(self.manifest.files.values().map(|r| r.hash.as_str()));
        self.manifest.generated_at = Utc::now();

        let json = serde_json::to_vec_pretty(&self.manifest)?;
        write_atomic(&self.path, &json).map_err(|e| Error::Store {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.dirty = false;
        debug!(
            "manifest saved ({} patterns, {} files)",
            self.manifest.patterns.len(),
            self.manifest.files.len()
        );
        Ok(())
    }

    fn compute_summary(&self) -> ManifestSummary {
        let mut summary = ManifestSummary {
            total_patterns: self.manifest.patterns.len(),
            total_files: self.manifest.files.len(),
            ..Default::default()
        };
        for pattern in self.manifest.patterns.values() {
            let status = match pattern.status {
                PatternStatus::Discovered => "discovered",
                PatternStatus::Approved => "approved",
                PatternStatus::Ignored => "ignored",
            };
            *summary.by_status.entry(status.to_string()).or_default() += 1;
            *summary
                .by_category
                .entry(pattern.category.id().to_string())
                .or_default() += 1;
            summary.total_locations += pattern.locations.len();
        }
        summary
    }
}

fn file_result(key: &str, record: &ManifestFileRecord) -> FileQueryResult {
    FileQueryResult {
        file: key.to_string(),
        patterns: record.patterns.clone(),
        hash: record.hash.clone(),
        last_scanned: record.last_scanned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Language;
    use crate::model::SymbolKind;

    fn semantic(file: &str, start: u32, name: &str, hash: &str) -> SemanticLocation {
        SemanticLocation {
            file: PathBuf::from(file),
            content_hash: hash.to_string(),
            start_line: start,
            end_line: start + 2,
            kind: SymbolKind::Function,
            name: name.to_string(),
            signature: None,
            language: Language::TypeScript,
            confidence: 0.9,
        }
    }

    fn pattern(id: &str, locations: Vec<SemanticLocation>) -> ManifestPattern {
        ManifestPattern {
            id: id.to_string(),
            key: format!("api/rest/{id}"),
            name: "REST endpoint".to_string(),
            category: PatternCategory::Api,
            status: PatternStatus::Discovered,
            confidence: 0.8,
            locations,
            outliers: vec![],
        }
    }

    #[test]
    fn test_update_wires_reverse_index() {
        let mut store = ManifestStore::create("/tmp/unused.json");
        store.update_pattern(pattern(
            "p1",
            vec![semantic("src/a.ts", 1, "foo", "h1"), semantic("src/b.ts", 4, "bar", "h2")],
        ));
        let manifest = store.get();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files["src/a.ts"].patterns, vec!["p1"]);
        assert_eq!(manifest.files["src/a.ts"].hash, "h1");
    }

    #[test]
    fn test_semantic_dedup() {
        let mut store = ManifestStore::create("/tmp/unused.json");
        store.update_pattern(pattern(
            "p1",
            vec![semantic("src/a.ts", 1, "foo", "h1"), semantic("src/a.ts", 1, "foo", "h1")],
        ));
        assert_eq!(store.get().patterns["p1"].locations.len(), 1);
    }

    #[test]
    fn test_clear_file_patterns() {
        let mut store = ManifestStore::create("/tmp/unused.json");
        store.update_pattern(pattern(
            "p1",
            vec![semantic("src/a.ts", 1, "foo", "h1"), semantic("src/b.ts", 4, "bar", "h2")],
        ));
        store.update_pattern(pattern("p2", vec![semantic("src/a.ts", 9, "baz", "h1")]));

        store.clear_file_patterns(Path::new("src/a.ts"));
        let manifest = store.get();
        assert!(!manifest.files.contains_key("src/a.ts"));
        // p1 keeps its b.ts evidence, p2 dies with a.ts
        assert_eq!(manifest.patterns["p1"].locations.len(), 1);
        assert!(!manifest.patterns.contains_key("p2"));
    }

    #[test]
    fn test_changed_files() {
        let mut store = ManifestStore::create("/tmp/unused.json");
        store.record_file(Path::new("src/a.ts"), "h1", vec![]);
        let changed = store.changed_files([
            (Path::new("src/a.ts"), "h1"),
            (Path::new("src/a.ts"), "h9"),
            (Path::new("src/new.ts"), "h2"),
        ]);
        assert_eq!(
            changed,
            vec![PathBuf::from("src/a.ts"), PathBuf::from("src/new.ts")]
        );
    }

    #[test]
    fn test_query_patterns() {
        let mut store = ManifestStore::create("/tmp/unused.json");
        store.update_pattern(pattern("p1", vec![semantic("src/a.ts", 1, "foo", "h1")]));
        store.update_pattern(ManifestPattern {
            category: PatternCategory::Logging,
            confidence: 0.4,
            ..pattern("p2", vec![semantic("lib/log.ts", 2, "log", "h3")])
        });

        let hits = store
            .query_patterns(&PatternQuery {
                text: Some("REST".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 2); // both share the name

        let hits = store
            .query_patterns(&PatternQuery {
                category: Some(PatternCategory::Logging),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern_id, "p2");

        let hits = store
            .query_patterns(&PatternQuery {
                min_confidence: Some(0.5),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = store
            .query_patterns(&PatternQuery {
                file_glob: Some("src/**".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern_id, "p1");
    }

    #[test]
    fn test_query_file_glob() {
        let mut store = ManifestStore::create("/tmp/unused.json");
        store.record_file(Path::new("src/a.ts"), "h1", vec!["p1".to_string()]);
        let hit = store.query_file("src/*.ts").unwrap().unwrap();
        assert_eq!(hit.file, "src/a.ts");
        assert_eq!(hit.patterns, vec!["p1"]);
        assert!(store.query_file("missing/*.rs").unwrap().is_none());
    }

    #[test]
    fn test_save_recomputes_codebase_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut store = ManifestStore::create(&path);
        store.record_file(Path::new("src/a.ts"), "h1", vec![]);
        store.save().unwrap();
        let first = store.get().codebase_hash.clone();
        assert!(!first.is_empty());

        store.record_file(Path::new("src/a.ts"), "h2", vec![]);
        store.save().unwrap();
        assert_ne!(store.get().codebase_hash, first);

        let reloaded = ManifestStore::load(&path).unwrap();
        assert_eq!(reloaded.get().files.len(), 1);
    }
}
