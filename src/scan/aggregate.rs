//! Order-independent aggregation of per-file detection outputs
//!
//! Per-file outcomes may arrive in any order: location dedup is a set
//! union and max-confidence is associative, so the final pattern and
//! violation sets are a function of the input files alone, not of
//! scheduling order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::hash::stable_pattern_id;
use crate::lang::Language;
use crate::model::{
    DetectionKind, DetectionResult, Location, Outlier, PatternCategory, SemanticLocation,
    Severity, Violation,
};
use crate::store::ManifestPattern;
use crate::model::PatternStatus;

/// Identity of the detector that produced an output
#[derive(Debug, Clone)]
pub struct DetectorMeta {
    /// Detector id ("category/subcategory")
    pub id: String,
    /// Category
    pub category: PatternCategory,
    /// Subcategory
    pub subcategory: String,
    /// Human name
    pub name: String,
    /// Description
    pub description: String,
    /// Detection kind
    pub kind: DetectionKind,
}

/// One detector's output for one file
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    /// The producing detector
    pub meta: DetectorMeta,
    /// Matches and violations
    pub result: DetectionResult,
    /// Semantic anchors parallel to `result.patterns`, present when
    /// manifest generation is enabled
    pub semantics: Vec<SemanticLocation>,
}

/// Everything one worker task returns for one file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Workspace-relative path
    pub file: PathBuf,
    /// Short content hash at scan time
    pub content_hash: String,
    /// Resolved language, when the file was scannable
    pub language: Option<Language>,
    /// Per-detector outputs
    pub outputs: Vec<DetectorOutput>,
    /// Detectors that ran
    pub detectors_run: usize,
    /// Detectors skipped by language/category/flag filters
    pub detectors_skipped: usize,
    /// Detector-local failures; the rest of the file's detectors still ran
    pub detector_errors: Vec<(String, String)>,
    /// Fatal per-file error, when the whole file failed
    pub error: Option<String>,
}

/// A pattern aggregated across files, keyed by stable id
#[derive(Debug, Clone)]
pub struct AggregatedPattern {
    /// Stable pattern id
    pub id: String,
    /// Readable key: "category/subcategory/local-id"
    pub key: String,
    /// Category
    pub category: PatternCategory,
    /// Subcategory
    pub subcategory: String,
    /// Human name (from the detector)
    pub name: String,
    /// Description (from the detector)
    pub description: String,
    /// Detection kind
    pub kind: DetectionKind,
    /// Total matches observed
    pub occurrences: usize,
    /// Maximum confidence observed across matches
    pub max_confidence: f64,
    /// Deduplicated locations
    pub locations: Vec<Location>,
    /// Outliers converted from same-detector violations
    pub outliers: Vec<Outlier>,
}

/// A violation carried to the scan report with its detector's identity
#[derive(Debug, Clone)]
pub struct AggregatedViolation {
    /// Producing detector id
    pub detector_id: String,
    /// Detector category
    pub category: PatternCategory,
    /// The violation itself
    pub violation: Violation,
}

/// A per-file error recorded without aborting the scan
#[derive(Debug, Clone)]
pub struct FileError {
    /// The file the error belongs to
    pub file: PathBuf,
    /// The detector at fault, when the failure was detector-local
    pub detector: Option<String>,
    /// What went wrong
    pub message: String,
}

/// Counters describing a scan
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Files dispatched to detection
    pub files_scanned: usize,
    /// Files skipped (unknown language)
    pub files_skipped: usize,
    /// Detector executions
    pub detectors_run: usize,
    /// Detector executions skipped by filters
    pub detectors_skipped: usize,
    /// Wall-clock duration
    pub duration_ms: u128,
}

/// The aggregated result of one scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Aggregated patterns keyed by stable id
    pub patterns: BTreeMap<String, AggregatedPattern>,
    /// Flat violation list
    pub violations: Vec<AggregatedViolation>,
    /// Manifest patterns keyed by readable key, when manifest generation
    /// was enabled
    pub manifest_patterns: BTreeMap<String, ManifestPattern>,
    /// Content hash per scanned file (forward-slash keys)
    pub file_hashes: BTreeMap<String, String>,
    /// Stable pattern ids observed per file
    pub file_patterns: BTreeMap<String, Vec<String>>,
    /// Collected per-file errors
    pub errors: Vec<FileError>,
    /// Counters
    pub stats: ScanStats,
}

impl ScanReport {
    /// The files this report covers, as paths
    pub fn scanned_files(&self) -> Vec<PathBuf> {
        self.file_hashes.keys().map(PathBuf::from).collect()
    }
}

/// Accumulates per-file outcomes into a [`ScanReport`]
pub struct Aggregator {
    generate_manifest: bool,
    report: ScanReport,
    // per stable id: semantic locations pending manifest assembly
    semantics: HashMap<String, Vec<SemanticLocation>>,
    // per detector id: matches per local id, to pick the dominant pattern
    // a detector's violations attach to as outliers
    detector_local_counts: HashMap<String, HashMap<String, usize>>,
    pending_violations: Vec<AggregatedViolation>,
    location_keys: HashSet<(String, String, u32, u32)>,
    semantic_keys: HashSet<(String, String, u32, u32, String)>,
}

impl Aggregator {
    /// Creates an aggregator
    pub fn new(generate_manifest: bool) -> Self {
        Self {
            generate_manifest,
            report: ScanReport::default(),
            semantics: HashMap::new(),
            detector_local_counts: HashMap::new(),
            pending_violations: Vec::new(),
            location_keys: HashSet::new(),
            semantic_keys: HashSet::new(),
        }
    }

    /// Folds one file outcome into the aggregate
    pub fn add(&mut self, outcome: FileOutcome) {
        let file_key = outcome.file.to_string_lossy().replace('\\', "/");

        if let Some(error) = outcome.error {
            self.report.errors.push(FileError {
                file: outcome.file.clone(),
                detector: None,
                message: error,
            });
            return;
        }
        for (detector, message) in outcome.detector_errors {
            self.report.errors.push(FileError {
                file: outcome.file.clone(),
                detector: Some(detector),
                message,
            });
        }
        if outcome.language.is_none() {
            self.report.stats.files_skipped += 1;
            return;
        }

        self.report.stats.files_scanned += 1;
        self.report.stats.detectors_run += outcome.detectors_run;
        self.report.stats.detectors_skipped += outcome.detectors_skipped;
        self.report
            .file_hashes
            .insert(file_key.clone(), outcome.content_hash.clone());
        let file_ids = self.report.file_patterns.entry(file_key).or_default();

        for output in outcome.outputs {
            let meta = output.meta;
            for (index, m) in output.result.patterns.iter().enumerate() {
                let stable = stable_pattern_id(
                    meta.category.id(),
                    &meta.subcategory,
                    &meta.id,
                    &m.local_id,
                );
                let key = format!("{}/{}/{}", meta.category.id(), meta.subcategory, m.local_id);
                let entry = self
                    .report
                    .patterns
                    .entry(stable.clone())
                    .or_insert_with(|| AggregatedPattern {
                        id: stable.clone(),
                        key: key.clone(),
                        category: meta.category,
                        subcategory: meta.subcategory.clone(),
                        name: meta.name.clone(),
                        description: meta.description.clone(),
                        kind: meta.kind,
                        occurrences: 0,
                        max_confidence: 0.0,
                        locations: Vec::new(),
                        outliers: Vec::new(),
                    });
                entry.occurrences += 1;
                entry.max_confidence = entry.max_confidence.max(m.confidence);
                let lkey = (
                    stable.clone(),
                    m.location.file.to_string_lossy().into_owned(),
                    m.location.line,
                    m.location.column,
                );
                if self.location_keys.insert(lkey) {
                    entry.locations.push(m.location.clone());
                }

                if !file_ids.contains(&stable) {
                    file_ids.push(stable.clone());
                }
                *self
                    .detector_local_counts
                    .entry(meta.id.clone())
                    .or_default()
                    .entry(m.local_id.clone())
                    .or_default() += 1;

                if self.generate_manifest {
                    if let Some(sem) = output.semantics.get(index) {
                        let skey = (
                            stable.clone(),
                            sem.file.to_string_lossy().into_owned(),
                            sem.start_line,
                            sem.end_line,
                            sem.name.clone(),
                        );
                        if self.semantic_keys.insert(skey) {
                            self.semantics
                                .entry(stable.clone())
                                .or_default()
                                .push(sem.clone());
                        }
                    }
                }
            }
            for violation in output.result.violations {
                self.pending_violations.push(AggregatedViolation {
                    detector_id: meta.id.clone(),
                    category: meta.category,
                    violation,
                });
            }
        }
    }

    /// Records a task-level failure for a file
    pub fn add_error(&mut self, file: PathBuf, detector: Option<String>, message: String) {
        self.report.errors.push(FileError {
            file,
            detector,
            message,
        });
    }

    /// Finalizes the report.
    ///
    /// Violations attach as outliers to the dominant pattern of their
    /// detector (the local id the detector matched most often); detectors
    /// with no matches anywhere keep their violations in the flat list
    /// only.
    pub fn finish(mut self, duration_ms: u128) -> ScanReport {
        for agg in self.pending_violations {
            let dominant = self
                .detector_local_counts
                .get(&agg.detector_id)
                .and_then(|counts| {
                    counts
                        .iter()
                        .max_by_key(|(_, count)| **count)
                        .map(|(local, _)| local.clone())
                });
            if let Some(local_id) = dominant {
                let meta_category = agg.category;
                let stable = self
                    .report
                    .patterns
                    .values()
                    .find(|p| {
                        p.category == meta_category && p.key.ends_with(&format!("/{local_id}"))
                    })
                    .map(|p| p.id.clone());
                if let Some(stable) = stable {
                    if let Some(pattern) = self.report.patterns.get_mut(&stable) {
                        pattern.outliers.push(Outlier {
                            location: agg.violation.location.clone(),
                            reason: agg.violation.message.clone(),
                            deviation: deviation_for(agg.violation.severity),
                        });
                        let file_key = agg
                            .violation
                            .location
                            .file
                            .to_string_lossy()
                            .replace('\\', "/");
                        let ids = self.report.file_patterns.entry(file_key).or_default();
                        if !ids.contains(&stable) {
                            ids.push(stable);
                        }
                    }
                }
            }
            self.report.violations.push(agg);
        }

        if self.generate_manifest {
            for (stable, locations) in self.semantics {
                let Some(pattern) = self.report.patterns.get(&stable) else {
                    continue;
                };
                self.report.manifest_patterns.insert(
                    pattern.key.clone(),
                    ManifestPattern {
                        id: stable,
                        key: pattern.key.clone(),
                        name: pattern.name.clone(),
                        category: pattern.category,
                        status: PatternStatus::Discovered,
                        confidence: pattern.max_confidence,
                        locations,
                        outliers: pattern.outliers.clone(),
                    },
                );
            }
        }

        self.report.stats.duration_ms = duration_ms;
        self.report
    }
}

fn deviation_for(severity: Severity) -> f64 {
    match severity {
        Severity::Error => 0.9,
        Severity::Warning => 0.6,
        Severity::Info => 0.3,
        Severity::Hint => 0.1,
    }
}
