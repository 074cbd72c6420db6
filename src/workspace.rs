//! Workspace facade
//!
//! Ties the walker, the scan orchestrator, and the stores together into
//! the consumer-facing operations: trigger a full or incremental scan,
//! query the manifest, enumerate gate history, run the quality gates, and
//! start watch mode.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use crate::config::Config;
use crate::detectors::{registry, ContextBuilder, DetectorRegistry, ProjectContext};
use crate::error::Result;
use crate::gates::{
    GateOrchestrator, GateRequest, GateRunRecord, GateRunReport, HealthSnapshot,
    RunHistoryStore, SnapshotStore,
};
use crate::model::{PatternSeverity, Severity};
use crate::scan::{IncrementalPlanner, ScanOrchestrator, ScanReport};
use crate::store::PatternSeed;
use crate::store::{
    DriftPaths, FileQueryResult, ManifestStore, PatternQuery, PatternQueryHit, PatternStore,
    PatternStoreStats,
};
use crate::model::DetectorDescriptor;
use crate::walker::{WalkResult, Walker};
use crate::watch::{WatchConfig, WatchEngine};

/// Summary returned by [`Workspace::scan`]
#[derive(Debug)]
pub struct ScanSummary {
    /// Files the walker emitted
    pub files_walked: usize,
    /// Files actually dispatched (after incremental planning)
    pub files_scanned: usize,
    /// Patterns now in the catalog
    pub patterns: usize,
    /// Violations observed in this scan
    pub violations: usize,
    /// Per-file errors collected
    pub errors: usize,
    /// The full scan report
    pub report: ScanReport,
}

/// A workspace under analysis
pub struct Workspace {
    root: PathBuf,
    config: Config,
    paths: DriftPaths,
    registry: Arc<DetectorRegistry>,
}

impl Workspace {
    /// Opens a workspace rooted at `root` with the given configuration
    pub fn open(root: impl Into<PathBuf>, config: Config) -> Self {
        let root = root.into();
        let paths = DriftPaths::new(&root);
        Self {
            root,
            config,
            paths,
            registry: registry::global(),
        }
    }

    /// Overrides the detector registry (tests, external catalogs)
    pub fn with_registry(mut self, registry: Arc<DetectorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The workspace root
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// The on-disk layout
    pub fn paths(&self) -> &DriftPaths {
        &self.paths
    }

    /// Walks the workspace with the configured options
    pub fn walk(&self) -> WalkResult {
        Walker::new(&self.root, self.config.walker.clone()).walk()
    }

    /// Runs a scan and merges the results into both stores.
    ///
    /// With `incremental` set, only files whose hashes differ from the
    /// manifest are dispatched, and each dispatched file's reverse index
    /// is cleared before its new findings land. `explicit_files`
    /// restricts the scan to a caller-supplied list.
    pub fn scan(
        &self,
        incremental: bool,
        explicit_files: Option<Vec<PathBuf>>,
    ) -> Result<ScanSummary> {
        let walk = self.walk();
        // The walk is the authoritative live set; manifest entries for
        // files no longer present lose their evidence.
        let live: std::collections::HashSet<String> = walk
            .files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().replace('\\', "/"))
            .collect();

        let mut files = walk.files;
        if let Some(explicit) = explicit_files {
            files.retain(|f| explicit.iter().any(|e| e == &f.relative_path));
        }
        let files_walked = files.len();

        let mut pattern_store = PatternStore::initialize(self.paths.patterns_file())?;
        let mut manifest = ManifestStore::load(self.paths.manifest_file())?;

        let known: Vec<String> = manifest.get().files.keys().cloned().collect();
        for stale in known.iter().filter(|k| !live.contains(*k)) {
            let path = PathBuf::from(stale);
            manifest.clear_file_patterns(&path);
            pattern_store.remove_file(&path);
        }

        let dispatch = if incremental {
            IncrementalPlanner::new(&manifest).plan(&files)
        } else {
            files
        };
        info!(
            "scan: dispatching {} of {files_walked} files{}",
            dispatch.len(),
            if incremental { " (incremental)" } else { "" }
        );

        let project = Arc::new(ProjectContext::new(
            &self.root,
            dispatch.iter().map(|f| f.relative_path.clone()).collect(),
        ));
        let mut scan_config = self.config.scan.clone();
        scan_config.incremental = incremental;
        let orchestrator = ScanOrchestrator::new(
            Arc::clone(&self.registry),
            ContextBuilder::new(project),
            scan_config,
        );

        // Stale reverse-index entries leave before new findings land.
        for entry in &dispatch {
            manifest.clear_file_patterns(&entry.relative_path);
        }
        let report = orchestrator.scan(&dispatch);

        let scanned: Vec<PathBuf> = report.scanned_files();
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
                source: "scan".to_string(),
                observed_severity: observed_severity(&report, pattern.category),
            };
            pattern_store.merge_evidence(
                &pattern.id,
                &seed,
                &scanned,
                pattern.locations.clone(),
                pattern.outliers.clone(),
            );
        }
        // Patterns the dispatched files no longer witness lose that
        // evidence; their status survives.
        let merged_ids: std::collections::HashSet<String> =
            report.patterns.keys().cloned().collect();
        pattern_store.prune_files_except(&scanned, &merged_ids);

        manifest.update_patterns(report.manifest_patterns.values().cloned().collect());
        for (file, hash) in &report.file_hashes {
            let ids = report.file_patterns.get(file).cloned().unwrap_or_default();
            manifest.record_file(std::path::Path::new(file), hash, ids);
        }

        pattern_store.save()?;
        manifest.save()?;

        Ok(ScanSummary {
            files_walked,
            files_scanned: report.stats.files_scanned,
            patterns: pattern_store.len(),
            violations: report.violations.len(),
            errors: report.errors.len() + walk.errors.len(),
            report,
        })
    }

    /// Queries the manifest by pattern
    pub fn query_patterns(&self, query: &PatternQuery) -> Result<Vec<PatternQueryHit>> {
        let manifest = ManifestStore::load(self.paths.manifest_file())?;
        manifest.query_patterns(query)
    }

    /// Queries the manifest by file path or glob
    pub fn query_file(&self, path_or_glob: &str) -> Result<Option<FileQueryResult>> {
        let manifest = ManifestStore::load(self.paths.manifest_file())?;
        manifest.query_file(path_or_glob)
    }

    /// Pattern catalog statistics
    pub fn stats(&self) -> Result<PatternStoreStats> {
        let store = PatternStore::initialize(self.paths.patterns_file())?;
        Ok(store.stats())
    }

    /// The newest gate runs
    pub fn recent_runs(&self, limit: usize) -> Vec<GateRunRecord> {
        RunHistoryStore::new(self.paths.runs_dir()).get_recent(limit)
    }

    /// The newest health snapshots on a branch
    pub fn recent_snapshots(&self, branch: &str, limit: usize) -> Vec<HealthSnapshot> {
        SnapshotStore::new(self.paths.gates_dir().join("snapshots")).get_by_branch(branch, limit)
    }

    /// Runs the configured gate policy over a change set
    pub fn run_gates(&self, request: GateRequest) -> Result<GateRunReport> {
        GateOrchestrator::new(self.config.gates.clone()).run(&self.paths, request)
    }

    /// Creates a watch engine over this workspace
    pub fn watch(&self, config: WatchConfig) -> Result<WatchEngine> {
        WatchEngine::new(&self.root, Arc::clone(&self.registry), config)
    }
}

fn observed_severity(report: &ScanReport, category: crate::model::PatternCategory) -> Option<PatternSeverity> {
    let relevant: Vec<_> = report
        .violations
        .iter()
        .filter(|v| v.category == category)
        .collect();
    if relevant.is_empty() {
        return None;
    }
    if relevant
        .iter()
        .any(|v| v.violation.severity == Severity::Error)
    {
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
