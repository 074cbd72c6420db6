//! The learned-pattern catalog
//!
//! Sole owner of `.drift/patterns.json`. Merging is evidence-driven: for a
//! given pattern id and a set of re-scanned files, existing locations and
//! outliers belonging to those files are dropped before the new ones are
//! appended, so re-detecting a file never double-counts. User-set status
//! (`approved`/`ignored`), tags, and firstSeen survive every merge.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    ConfidenceRecord, DetectorDescriptor, Location, Outlier, PatternCategory, PatternMetadata,
    PatternSeverity, PatternStatus, StoredPattern, MAX_PATTERN_LOCATIONS,
};
use crate::store::write_atomic;

/// Current on-disk document version
const DOCUMENT_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
struct PatternsDocument {
    version: String,
    generated_at: DateTime<Utc>,
    patterns: Vec<StoredPattern>,
}

/// Immutable identity fields supplied when evidence first creates a pattern
#[derive(Debug, Clone)]
pub struct PatternSeed {
    /// Category
    pub category: PatternCategory,
    /// Subcategory
    pub subcategory: String,
    /// Human name
    pub name: String,
    /// Description
    pub description: String,
    /// Originating detector
    pub detector: DetectorDescriptor,
    /// Whether quick fixes exist for deviations
    pub auto_fixable: bool,
    /// Component that produced the evidence ("scan", "watch")
    pub source: String,
    /// Severity derived from observed violations, if any
    pub observed_severity: Option<PatternSeverity>,
}

/// Counts describing the catalog
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatternStoreStats {
    /// Total patterns
    pub total: usize,
    /// Patterns by status
    pub by_status: BTreeMap<String, usize>,
    /// Patterns by category
    pub by_category: BTreeMap<String, usize>,
    /// Total conforming locations
    pub locations: usize,
    /// Total outliers
    pub outliers: usize,
}

/// The on-disk pattern catalog
pub struct PatternStore {
    path: PathBuf,
    patterns: BTreeMap<String, StoredPattern>,
    dirty: bool,
}

impl PatternStore {
    /// Creates a store over the given document path without touching disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            patterns: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Loads the document if it exists; a missing file yields an empty
    /// store, a corrupt file surfaces an error
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::new(path.clone());
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let doc: PatternsDocument =
                    serde_json::from_str(&content).map_err(|e| Error::Store {
                        path: path.clone(),
                        message: format!("corrupt pattern document: {e}"),
                    })?;
                store.patterns = doc.patterns.into_iter().map(|p| (p.id.clone(), p)).collect();
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

    /// Gets a pattern by id
    pub fn get(&self, id: &str) -> Option<&StoredPattern> {
        self.patterns.get(id)
    }

    /// All patterns, ordered by id
    pub fn get_all(&self) -> impl Iterator<Item = &StoredPattern> {
        self.patterns.values()
    }

    /// Number of stored patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when in-memory state differs from disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Inserts or replaces a pattern wholesale
    pub fn add(&mut self, pattern: StoredPattern) {
        self.patterns.insert(pattern.id.clone(), pattern);
        self.dirty = true;
    }

    /// Applies a closure to an existing pattern
    pub fn update<F: FnOnce(&mut StoredPattern)>(&mut self, id: &str, f: F) -> bool {
        if let Some(pattern) = self.patterns.get_mut(id) {
            f(pattern);
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Removes a pattern from the catalog
    pub fn delete(&mut self, id: &str) -> Option<StoredPattern> {
        let removed = self.patterns.remove(id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Sets a pattern's lifecycle status (user action)
    pub fn set_status(&mut self, id: &str, status: PatternStatus) -> bool {
        self.update(id, |p| p.status = status)
    }

    /// Merges one round of evidence into a pattern, creating it when new.
    ///
    /// `files` names every file the evidence covers, including files that
    /// produced no matches this round, so their stale locations are dropped.
    /// When the merge leaves a pattern with no evidence at all, the
    /// pattern is deleted.
    pub fn merge_evidence(
        &mut self,
        id: &str,
        seed: &PatternSeed,
        files: &[PathBuf],
        locations: Vec<Location>,
        outliers: Vec<Outlier>,
    ) {
        let now = Utc::now();
        let file_set: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();

        let entry = self.patterns.entry(id.to_string()).or_insert_with(|| {
            debug!("pattern {id} discovered ({}/{})", seed.category, seed.subcategory);
            StoredPattern {
                id: id.to_string(),
                category: seed.category,
                subcategory: seed.subcategory.clone(),
                name: seed.name.clone(),
                description: seed.description.clone(),
                detector: seed.detector.clone(),
                confidence: ConfidenceRecord::compute(0, 0, 0, now, now),
                locations: Vec::new(),
                outliers: Vec::new(),
                metadata: PatternMetadata {
                    first_seen: now,
                    last_seen: now,
                    source: seed.source.clone(),
                    tags: Vec::new(),
                },
                severity: seed.observed_severity.unwrap_or(PatternSeverity::Info),
                auto_fixable: seed.auto_fixable,
                status: PatternStatus::Discovered,
            }
        });

        // 1. Drop existing evidence for the re-scanned files.
        entry
            .locations
            .retain(|l| !file_set.contains(l.file.as_path()));
        entry
            .outliers
            .retain(|o| !file_set.contains(o.location.file.as_path()));

        // 2. Append new locations, dedup, cap FIFO at the limit.
        entry.locations.extend(locations);
        let mut seen = HashSet::new();
        entry.locations.retain(|l| seen.insert(l.dedup_key()));
        if entry.locations.len() > MAX_PATTERN_LOCATIONS {
            let excess = entry.locations.len() - MAX_PATTERN_LOCATIONS;
            entry.locations.drain(..excess);
        }

        // 3. Append new outliers; dedup by (file, line, reason).
        entry.outliers.extend(outliers);
        let mut seen = HashSet::new();
        entry.outliers.retain(|o| seen.insert(o.dedup_key()));

        if entry.is_empty() {
            let id = entry.id.clone();
            self.patterns.remove(&id);
            self.dirty = true;
            return;
        }

        // 4. Recompute confidence; status, tags, and firstSeen are
        // untouched, lastSeen advances.
        let distinct = entry.distinct_files();
        entry.confidence = ConfidenceRecord::compute(
            entry.locations.len(),
            entry.outliers.len(),
            distinct,
            entry.metadata.first_seen,
            now,
        );
        entry.metadata.last_seen = now;
        self.dirty = true;
    }

    /// Drops evidence belonging to `files` from every pattern except
    /// those in `keep` (patterns whose merge already replaced their
    /// evidence this round). Patterns left with no evidence are deleted.
    ///
    /// Run after a round of [`merge_evidence`](Self::merge_evidence)
    /// calls so a file edited out of a pattern stops witnessing it while
    /// the pattern's status survives.
    pub fn prune_files_except(&mut self, files: &[PathBuf], keep: &HashSet<String>) {
        let file_set: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        let mut emptied = Vec::new();
        for pattern in self.patterns.values_mut() {
            if keep.contains(&pattern.id) {
                continue;
            }
            let before = pattern.locations.len() + pattern.outliers.len();
            pattern
                .locations
                .retain(|l| !file_set.contains(l.file.as_path()));
            pattern
                .outliers
                .retain(|o| !file_set.contains(o.location.file.as_path()));
            if pattern.locations.len() + pattern.outliers.len() == before {
                continue;
            }
            self.dirty = true;
            if pattern.is_empty() {
                emptied.push(pattern.id.clone());
            } else {
                let distinct = pattern.distinct_files();
                pattern.confidence = ConfidenceRecord::compute(
                    pattern.locations.len(),
                    pattern.outliers.len(),
                    distinct,
                    pattern.metadata.first_seen,
                    Utc::now(),
                );
            }
        }
        for id in &emptied {
            self.patterns.remove(id);
        }
    }

    /// Removes every location and outlier belonging to `file`, deleting
    /// patterns whose evidence becomes empty. Returns the ids of deleted
    /// patterns.
    pub fn remove_file(&mut self, file: &Path) -> Vec<String> {
        let mut emptied = Vec::new();
        for pattern in self.patterns.values_mut() {
            let before = pattern.locations.len() + pattern.outliers.len();
            pattern.locations.retain(|l| l.file != file);
            pattern.outliers.retain(|o| o.location.file != file);
            let after = pattern.locations.len() + pattern.outliers.len();
            if after != before {
                self.dirty = true;
                if pattern.is_empty() {
                    emptied.push(pattern.id.clone());
                } else {
                    let distinct = pattern.distinct_files();
                    pattern.confidence = ConfidenceRecord::compute(
                        pattern.locations.len(),
                        pattern.outliers.len(),
                        distinct,
                        pattern.metadata.first_seen,
                        Utc::now(),
                    );
                }
            }
        }
        for id in &emptied {
            self.patterns.remove(id);
        }
        emptied
    }

    /// Writes the document atomically. A clean store is a no-op; a failed
    /// write leaves the store dirty so a later save can retry.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let doc = PatternsDocument {
            version: DOCUMENT_VERSION.to_string(),
            generated_at: Utc::now(),
            patterns: self.patterns.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.path, &json).map_err(|e| Error::Store {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.dirty = false;
        debug!("pattern store saved ({} patterns)", self.patterns.len());
        Ok(())
    }

    /// Catalog statistics
    pub fn stats(&self) -> PatternStoreStats {
        let mut stats = PatternStoreStats {
            total: self.patterns.len(),
            ..Default::default()
        };
        for pattern in self.patterns.values() {
            let status = match pattern.status {
                PatternStatus::Discovered => "discovered",
                PatternStatus::Approved => "approved",
                PatternStatus::Ignored => "ignored",
            };
            *stats.by_status.entry(status.to_string()).or_default() += 1;
            *stats
                .by_category
                .entry(pattern.category.id().to_string())
                .or_default() += 1;
            stats.locations += pattern.locations.len();
            stats.outliers += pattern.outliers.len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DetectionKind;

    fn seed() -> PatternSeed {
        PatternSeed {
            category: PatternCategory::Api,
            subcategory: "rest".to_string(),
            name: "REST endpoint".to_string(),
            description: "route registrations".to_string(),
            detector: DetectorDescriptor {
                kind: DetectionKind::Regex,
                config: serde_json::Value::Null,
            },
            auto_fixable: false,
            source: "scan".to_string(),
            observed_severity: None,
        }
    }

    fn loc(file: &str, line: u32) -> Location {
        Location::new(file, line, 1)
    }

    #[test]
    fn test_merge_creates_discovered_pattern() {
        let mut store = PatternStore::new("/tmp/unused.json");
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts")],
            vec![loc("a.ts", 1), loc("a.ts", 5)],
            vec![],
        );
        let p = store.get("abc").unwrap();
        assert_eq!(p.status, PatternStatus::Discovered);
        assert_eq!(p.locations.len(), 2);
    }

    #[test]
    fn test_merge_replaces_file_evidence() {
        let mut store = PatternStore::new("/tmp/unused.json");
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts")],
            vec![loc("a.ts", 1), loc("a.ts", 5)],
            vec![],
        );
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts")],
            vec![loc("a.ts", 9)],
            vec![],
        );
        let p = store.get("abc").unwrap();
        assert_eq!(p.locations.len(), 1);
        assert_eq!(p.locations[0].line, 9);
    }

    #[test]
    fn test_merge_preserves_user_status() {
        let mut store = PatternStore::new("/tmp/unused.json");
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts")],
            vec![loc("a.ts", 1)],
            vec![],
        );
        store.set_status("abc", PatternStatus::Approved);
        let first_seen = store.get("abc").unwrap().metadata.first_seen;

        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("b.ts")],
            vec![loc("b.ts", 3)],
            vec![],
        );
        let p = store.get("abc").unwrap();
        assert_eq!(p.status, PatternStatus::Approved);
        assert_eq!(p.metadata.first_seen, first_seen);
        assert_eq!(p.locations.len(), 2);
    }

    #[test]
    fn test_location_cap_fifo() {
        let mut store = PatternStore::new("/tmp/unused.json");
        let locations: Vec<Location> = (1..=120).map(|i| loc("a.ts", i)).collect();
        store.merge_evidence("abc", &seed(), &[PathBuf::from("a.ts")], locations, vec![]);
        let p = store.get("abc").unwrap();
        assert_eq!(p.locations.len(), MAX_PATTERN_LOCATIONS);
        // oldest entries dropped
        assert_eq!(p.locations.first().unwrap().line, 21);
        assert_eq!(p.locations.last().unwrap().line, 120);
    }

    #[test]
    fn test_empty_evidence_deletes_pattern() {
        let mut store = PatternStore::new("/tmp/unused.json");
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts")],
            vec![loc("a.ts", 1)],
            vec![],
        );
        store.merge_evidence("abc", &seed(), &[PathBuf::from("a.ts")], vec![], vec![]);
        assert!(store.get("abc").is_none());
    }

    #[test]
    fn test_remove_file_purges_evidence() {
        let mut store = PatternStore::new("/tmp/unused.json");
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts"), PathBuf::from("b.ts")],
            vec![loc("a.ts", 1), loc("b.ts", 2)],
            vec![],
        );
        let emptied = store.remove_file(Path::new("b.ts"));
        assert!(emptied.is_empty());
        assert_eq!(store.get("abc").unwrap().locations.len(), 1);

        let emptied = store.remove_file(Path::new("a.ts"));
        assert_eq!(emptied, vec!["abc".to_string()]);
        assert!(store.get("abc").is_none());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let mut store = PatternStore::new(&path);
        store.merge_evidence(
            "abc",
            &seed(),
            &[PathBuf::from("a.ts")],
            vec![loc("a.ts", 1)],
            vec![],
        );
        store.save().unwrap();
        assert!(!store.is_dirty());

        let reloaded = PatternStore::initialize(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let p = reloaded.get("abc").unwrap();
        assert_eq!(p.category, PatternCategory::Api);
        assert_eq!(p.locations.len(), 1);
    }

    #[test]
    fn test_save_noop_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let mut store = PatternStore::new(&path);
        store.save().unwrap();
        assert!(!path.exists());
    }
}
