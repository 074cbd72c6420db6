//! Watch-mode merge engine
//!
//! A single-threaded cooperative engine: filesystem events (re)arm a
//! per-file debounce timer, a fired timer re-runs the per-file detection
//! pipeline and merges the result into the in-memory stores, and a
//! separate save debounce batches persistence. Every on-disk write runs
//! inside the exclusive workspace lock; readers are unsynchronised.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

use crate::detectors::{ContextBuilder, DetectorRegistry, ProjectContext};
use crate::error::{Error, Result};
use crate::hash;
use crate::lang::Language;
use crate::model::PatternCategory;
use crate::scan::{Aggregator, ScanConfig, ScanOrchestrator};
use crate::store::{
    DriftPaths, FileMap, LockOptions, ManifestStore, PatternStore, WorkspaceLock,
};
use crate::store::PatternSeed;
use crate::model::{DetectorDescriptor, PatternSeverity, Severity};
use crate::walker::FileEntry;

/// Holder name written into the lock file by the watch engine
const LOCK_HOLDER: &str = "driftscan-watch";

/// Watch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Per-file debounce window in milliseconds
    pub debounce_ms: u64,
    /// Save debounce window in milliseconds
    pub save_debounce_ms: u64,
    /// Persist merged state to disk
    pub persist: bool,
    /// Restrict to these categories (None = all)
    pub categories: Option<Vec<PatternCategory>>,
    /// Optional file refreshed with a context summary after every save,
    /// for downstream consumers
    pub context_file: Option<PathBuf>,
    /// Path substrings the engine ignores outright
    pub ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            save_debounce_ms: 1000,
            persist: true,
            categories: None,
            context_file: None,
            ignore: vec![
                ".git".to_string(),
                ".drift".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
            ],
        }
    }
}

/// What the engine did with one debounced event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The path was filtered out
    Ignored(PathBuf),
    /// The file vanished; its evidence was purged
    Removed(PathBuf),
    /// The file's hash was unchanged; nothing was done
    Unchanged(PathBuf),
    /// The file was re-scanned and merged
    Updated {
        /// The file
        path: PathBuf,
        /// Stable pattern ids now present in the file
        patterns: usize,
        /// Violations observed
        violations: usize,
    },
}

/// The online merge engine
pub struct WatchEngine {
    root: PathBuf,
    config: WatchConfig,
    paths: DriftPaths,
    lock: WorkspaceLock,
    orchestrator: ScanOrchestrator,
    pattern_store: PatternStore,
    manifest: ManifestStore,
    file_map: FileMap,
    pending: HashMap<PathBuf, Instant>,
    save_due: Option<Instant>,
    stop: Arc<AtomicBool>,
}

impl WatchEngine {
    /// Creates an engine over a workspace, loading both stores and the
    /// file map.
    ///
    /// The detector list is resolved once here; detectors registered
    /// later are not picked up by a running engine.
    pub fn new(
        root: impl Into<PathBuf>,
        registry: Arc<DetectorRegistry>,
        config: WatchConfig,
    ) -> Result<Self> {
        let root = root.into();
        let paths = DriftPaths::new(&root);
        let pattern_store = PatternStore::initialize(paths.patterns_file())?;
        let manifest = ManifestStore::load(paths.manifest_file())?;
        let file_map = FileMap::load(&paths.file_map_file())?;
        let lock = WorkspaceLock::new(paths.lock_file(), LockOptions::default());

        let project = Arc::new(ProjectContext::new(&root, Vec::new()));
        let scan_config = ScanConfig {
            use_worker_pool: false,
            categories: config.categories.clone(),
            generate_manifest: true,
            ..ScanConfig::default()
        };
        let orchestrator =
            ScanOrchestrator::new(registry, ContextBuilder::new(project), scan_config);

        Ok(Self {
            root,
            config,
            paths,
            lock,
            orchestrator,
            pattern_store,
            manifest,
            file_map,
            pending: HashMap::new(),
            save_due: None,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A handle that makes [`run`](Self::run) return
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// The loaded pattern store (reads only; the engine owns mutation)
    pub fn pattern_store(&self) -> &PatternStore {
        &self.pattern_store
    }

    /// The loaded file map
    pub fn file_map(&self) -> &FileMap {
        &self.file_map
    }

    /// Feeds one filesystem event into the debouncer
    pub fn on_event(&mut self, path: &Path) {
        let Some(relative) = self.relative(path) else {
            return;
        };
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if self.config.ignore.iter().any(|i| rel_str.contains(i.as_str())) {
            return;
        }
        if Language::from_path(&relative).is_none() {
            return;
        }
        // Only the final event within the debounce window survives.
        let due = Instant::now() + Duration::from_millis(self.config.debounce_ms);
        self.pending.insert(relative, due);
    }

    /// Fires every due per-file timer and, when the save debounce has
    /// elapsed, persists. Returns the outcomes of fired timers.
    pub fn tick(&mut self) -> Result<Vec<WatchOutcome>> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Result<Vec<WatchOutcome>> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, when)| **when <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut outcomes = Vec::new();
        for path in due {
            self.pending.remove(&path);
            let outcome = self.process(&path)?;
            match &outcome {
                WatchOutcome::Removed(p) => info!("watch: removed {}", p.display()),
                WatchOutcome::Updated {
                    path, patterns, ..
                } => info!("watch: merged {} ({patterns} patterns)", path.display()),
                _ => {}
            }
            if !matches!(outcome, WatchOutcome::Unchanged(_) | WatchOutcome::Ignored(_)) {
                self.schedule_save(now);
            }
            outcomes.push(outcome);
        }

        if self.save_due.is_some_and(|when| when <= now) {
            self.save_due = None;
            if self.config.persist {
                self.save_all()?;
            }
        }
        Ok(outcomes)
    }

    /// Runs the per-file pipeline for one debounced path and merges the
    /// result into the stores
    fn process(&mut self, relative: &Path) -> Result<WatchOutcome> {
        let absolute = self.root.join(relative);

        if !absolute.exists() {
            self.remove_file_from_store(relative);
            return Ok(WatchOutcome::Removed(relative.to_path_buf()));
        }

        let current_hash = hash::hash_file(&absolute).map_err(Error::Io)?;
        if self.file_map.hash_of(relative) == Some(current_hash.as_str()) {
            debug!("watch: {} unchanged", relative.display());
            return Ok(WatchOutcome::Unchanged(relative.to_path_buf()));
        }

        let entry = file_entry(relative, &absolute, &current_hash);
        let outcome = self.orchestrator.scan_file(&entry);
        if let Some(error) = &outcome.error {
            warn!("watch: {} failed: {error}", relative.display());
        }
        let mut aggregator = Aggregator::new(true);
        aggregator.add(outcome);
        let report = aggregator.finish(0);

        // Stale reverse-index entries leave before new findings land.
        self.manifest.clear_file_patterns(relative);

        let mut merged_ids = Vec::new();
        let violations = report.violations.len();
        for pattern in report.patterns.values() {
            let seed = PatternSeed {
                category: pattern.category,
                subcategory: pattern.subcategory.clone(),
                name: pattern.name.clone(),
                description: pattern.description.clone(),
                detector: DetectorDescriptor {
                    kind: pattern.kind,
                    config: serde_json::Value::Null,
                },
                auto_fixable: false,
                source: "watch".to_string(),
                observed_severity: observed_severity(&report.violations, pattern.category),
            };
            self.pattern_store.merge_evidence(
                &pattern.id,
                &seed,
                &[relative.to_path_buf()],
                pattern.locations.clone(),
                pattern.outliers.clone(),
            );
            merged_ids.push(pattern.id.clone());
        }
        // A violation from a detector that matched nothing in this file
        // still counts against the detector's learned pattern, the same
        // way the batch scan attributes it.
        let mut stray: HashMap<String, Vec<crate::model::Outlier>> = HashMap::new();
        for agg in &report.violations {
            let handled = report
                .patterns
                .values()
                .any(|p| p.key.starts_with(&format!("{}/", agg.detector_id)));
            if handled {
                continue;
            }
            let candidate = self
                .pattern_store
                .get_all()
                .filter(|p| {
                    format!("{}/{}", p.category.id(), p.subcategory) == agg.detector_id
                })
                .max_by_key(|p| p.locations.len())
                .map(|p| p.id.clone());
            if let Some(id) = candidate {
                stray.entry(id).or_default().push(crate::model::Outlier {
                    location: agg.violation.location.clone(),
                    reason: agg.violation.message.clone(),
                    deviation: match agg.violation.severity {
                        Severity::Error => 0.9,
                        Severity::Warning => 0.6,
                        Severity::Info => 0.3,
                        Severity::Hint => 0.1,
                    },
                });
            }
        }
        for (id, outliers) in stray {
            let Some(existing) = self.pattern_store.get(&id) else {
                continue;
            };
            let seed = PatternSeed {
                category: existing.category,
                subcategory: existing.subcategory.clone(),
                name: existing.name.clone(),
                description: existing.description.clone(),
                detector: existing.detector.clone(),
                auto_fixable: existing.auto_fixable,
                source: "watch".to_string(),
                observed_severity: None,
            };
            self.pattern_store
                .merge_evidence(&id, &seed, &[relative.to_path_buf()], vec![], outliers);
            if !merged_ids.contains(&id) {
                merged_ids.push(id);
            }
        }

        // Patterns this file stopped witnessing lose its evidence; their
        // status survives.
        let keep: std::collections::HashSet<String> = merged_ids.iter().cloned().collect();
        self.pattern_store
            .prune_files_except(&[relative.to_path_buf()], &keep);

        self.manifest
            .update_patterns(report.manifest_patterns.into_values().collect());
        self.manifest
            .record_file(relative, &current_hash, merged_ids.clone());
        self.file_map
            .record(relative, current_hash, merged_ids.clone());

        Ok(WatchOutcome::Updated {
            path: relative.to_path_buf(),
            patterns: merged_ids.len(),
            violations,
        })
    }

    /// Purges a deleted file from the pattern store, manifest, and file
    /// map
    fn remove_file_from_store(&mut self, relative: &Path) {
        self.pattern_store.remove_file(relative);
        self.manifest.clear_file_patterns(relative);
        self.file_map.remove(relative);
    }

    fn schedule_save(&mut self, now: Instant) {
        let due = now + Duration::from_millis(self.config.save_debounce_ms);
        // Batch: an already-armed save timer is left alone.
        self.save_due.get_or_insert(due);
    }

    /// Persists all stores inside the workspace lock
    pub fn save_all(&mut self) -> Result<()> {
        let file_map_path = self.paths.file_map_file();
        let pattern_store = &mut self.pattern_store;
        let manifest = &mut self.manifest;
        let file_map = &mut self.file_map;
        self.lock.with_lock(LOCK_HOLDER, || {
            pattern_store.save()?;
            manifest.save()?;
            file_map.save(&file_map_path)?;
            Ok(())
        })?;
        if let Some(context_file) = &self.config.context_file {
            let summary = serde_json::json!({
                "patterns": self.pattern_store.len(),
                "files": self.file_map.files.len(),
                "updated": chrono::Utc::now().to_rfc3339(),
            });
            if let Err(e) = std::fs::write(context_file, summary.to_string()) {
                warn!("failed to refresh context file: {e}");
            }
        }
        Ok(())
    }

    /// Runs the notify-backed event loop until the stop handle flips.
    ///
    /// On shutdown, pending timers are cancelled and a final locked save
    /// runs; a save failure is reported but does not prevent exit.
    pub fn run(&mut self) -> Result<()> {
        let (tx, rx) = channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(event);
        })
        .map_err(|e| Error::Watch(e.to_string()))?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(e.to_string()))?;
        info!("watching {}", self.root.display());

        while !self.stop.load(Ordering::Relaxed) {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(Ok(event)) => {
                    for path in event.paths {
                        self.on_event(&path);
                    }
                }
                Ok(Err(e)) => warn!("watch event error: {e}"),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
            for outcome in self.tick()? {
                if let WatchOutcome::Updated { path, violations, .. } = outcome {
                    if violations > 0 {
                        println!("drift: {} ({violations} violations)", path.display());
                    }
                }
            }
        }

        self.pending.clear();
        self.save_due = None;
        if self.config.persist {
            if let Err(e) = self.save_all() {
                warn!("final save failed: {e}");
            }
        }
        Ok(())
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
        } else {
            Some(path.to_path_buf())
        }
    }
}

fn observed_severity(
    violations: &[crate::scan::AggregatedViolation],
    category: PatternCategory,
) -> Option<PatternSeverity> {
    let relevant: Vec<_> = violations
        .iter()
        .filter(|v| v.category == category)
        .collect();
    if relevant.is_empty() {
        return None;
    }
    if relevant.iter().any(|v| v.violation.severity == Severity::Error) {
        Some(PatternSeverity::Error)
    } else if relevant
        .iter()
        .any(|v| v.violation.severity == Severity::Warning)
    {
        Some(PatternSeverity::Warning)
    } else {
        Some(PatternSeverity::Info)
    }
}

fn file_entry(relative: &Path, absolute: &Path, hash: &str) -> FileEntry {
    let extension = relative
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let metadata = std::fs::metadata(absolute).ok();
    FileEntry {
        relative_path: relative.to_path_buf(),
        absolute_path: absolute.to_path_buf(),
        name: relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension: extension.clone(),
        size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
        modified: metadata.as_ref().and_then(|m| m.modified().ok()),
        created: metadata.as_ref().and_then(|m| m.created().ok()),
        is_symlink: false,
        language: Language::from_extension(&extension),
        content_hash: Some(hash.to_string()),
    }
}
