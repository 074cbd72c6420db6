//! Shared data model for patterns, violations, and locations
//!
//! These types flow across every component boundary: detectors emit
//! [`PatternMatch`]es and [`Violation`]s, the scan orchestrator aggregates
//! them, and the stores persist [`StoredPattern`]s with confidence records
//! and semantic locations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::lang::Language;

/// Categories a pattern can belong to (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    /// API surface patterns (routes, endpoints, handlers)
    Api,
    /// Authentication and authorization
    Auth,
    /// Security-sensitive constructs
    Security,
    /// Error creation and propagation
    Errors,
    /// Project and module structure
    Structural,
    /// UI components
    Components,
    /// Styling conventions
    Styling,
    /// Logging conventions
    Logging,
    /// Test structure and helpers
    Testing,
    /// Database and data-layer access
    DataAccess,
    /// Configuration access
    Config,
    /// Type definitions and usage
    Types,
    /// Performance-sensitive constructs
    Performance,
    /// Accessibility conventions
    Accessibility,
    /// Documentation conventions
    Documentation,
}

impl PatternCategory {
    /// All categories
    pub fn all() -> &'static [PatternCategory] {
        &[
            PatternCategory::Api,
            PatternCategory::Auth,
            PatternCategory::Security,
            PatternCategory::Errors,
            PatternCategory::Structural,
            PatternCategory::Components,
            PatternCategory::Styling,
            PatternCategory::Logging,
            PatternCategory::Testing,
            PatternCategory::DataAccess,
            PatternCategory::Config,
            PatternCategory::Types,
            PatternCategory::Performance,
            PatternCategory::Accessibility,
            PatternCategory::Documentation,
        ]
    }

    /// Short identifier used in stable pattern ids and persisted documents
    pub fn id(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Auth => "auth",
            Self::Security => "security",
            Self::Errors => "errors",
            Self::Structural => "structural",
            Self::Components => "components",
            Self::Styling => "styling",
            Self::Logging => "logging",
            Self::Testing => "testing",
            Self::DataAccess => "data-access",
            Self::Config => "config",
            Self::Types => "types",
            Self::Performance => "performance",
            Self::Accessibility => "accessibility",
            Self::Documentation => "documentation",
        }
    }

    /// Parses a category from its short identifier
    pub fn parse(s: &str) -> Option<PatternCategory> {
        Self::all().iter().copied().find(|c| c.id() == s)
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Severity of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be fixed
    Error,
    /// Should be fixed
    Warning,
    /// Informational
    Info,
    /// Cosmetic suggestion
    Hint,
}

/// Default severity a pattern assigns to its violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSeverity {
    /// Deviations are errors
    Error,
    /// Deviations are warnings
    Warning,
    /// Deviations are informational
    Info,
}

/// Lifecycle status of a stored pattern.
///
/// Patterns are born `discovered`; user action moves them to `approved` or
/// `ignored`. A user-set status is never overwritten by re-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// Automatically learned, awaiting review
    Discovered,
    /// Confirmed by a user
    Approved,
    /// Dismissed by a user
    Ignored,
}

/// Confidence level bands derived from the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Score >= 0.85
    High,
    /// Score >= 0.65
    Medium,
    /// Score >= 0.45
    Low,
    /// Anything below
    Uncertain,
}

impl ConfidenceLevel {
    /// Maps a score in [0, 1] to its level band
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            Self::High
        } else if score >= 0.65 {
            Self::Medium
        } else if score >= 0.45 {
            Self::Low
        } else {
            Self::Uncertain
        }
    }
}

/// A position in a source file (1-based line and column)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Workspace-relative file path
    pub file: PathBuf,
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
    /// End line for ranges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    /// End column for ranges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

impl Location {
    /// Creates a point location
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line: None,
            end_column: None,
        }
    }

    /// The dedup key for pattern location lists
    pub fn dedup_key(&self) -> (String, u32, u32) {
        (self.file.to_string_lossy().into_owned(), self.line, self.column)
    }
}

/// Kinds of named constructs a semantic location can be anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// Class declaration
    Class,
    /// Interface declaration
    Interface,
    /// Type alias or typedef
    Type,
    /// Free function
    Function,
    /// Method on a class
    Method,
    /// Property or field
    Property,
    /// Decorator or annotation
    Decorator,
    /// Module or file scope
    Module,
    /// Anonymous block
    Block,
}

/// A location annotated with its enclosing named construct and the file's
/// content hash at scan time. The unit the manifest tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticLocation {
    /// Workspace-relative file path
    pub file: PathBuf,
    /// Short content hash of the file when the location was recorded
    pub content_hash: String,
    /// Start line (1-based)
    pub start_line: u32,
    /// End line (1-based, inclusive)
    pub end_line: u32,
    /// Kind of the enclosing construct
    pub kind: SymbolKind,
    /// Name of the enclosing construct
    pub name: String,
    /// Signature string if one could be extracted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Language of the file
    pub language: Language,
    /// Confidence of the anchoring (0.0 to 1.0)
    pub confidence: f64,
}

impl SemanticLocation {
    /// The dedup key for semantic location lists
    pub fn dedup_key(&self) -> (String, u32, u32, String) {
        (
            self.file.to_string_lossy().into_owned(),
            self.start_line,
            self.end_line,
            self.name.clone(),
        )
    }
}

/// A single match a detector reports for its detector-local pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Detector-local pattern identifier
    pub local_id: String,
    /// Match confidence (0.0 to 1.0)
    pub confidence: f64,
    /// Where the match occurred
    pub location: Location,
}

/// A specific, actionable deviation reported by a detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// How severe the deviation is
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// What the pattern expects
    pub expected: String,
    /// What was found instead
    pub actual: String,
    /// The offending range
    pub location: Location,
    /// Suggested fix if one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    /// Longer explanation if one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// The result a detector returns for one file.
///
/// Absence is modelled as empty collections, never as missing fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Pattern matches found in the file
    pub patterns: Vec<PatternMatch>,
    /// Violations found in the file
    pub violations: Vec<Violation>,
    /// Free-form metadata about the detection
    pub metadata: HashMap<String, String>,
}

impl DetectionResult {
    /// An empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the result carries no matches and no violations
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.violations.is_empty()
    }
}

/// How a detector performs its analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    /// Regular-expression matching over raw content
    Regex,
    /// Syntax-tree queries
    Ast,
    /// Cross-file semantic analysis
    Semantic,
    /// A combination of the above
    Hybrid,
}

/// Descriptor of the detector a stored pattern originates from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorDescriptor {
    /// How the originating detector works
    pub kind: DetectionKind,
    /// Opaque detector configuration blob
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Weights of the linear confidence combination.
///
/// These are part of the persisted format: changing them shifts pattern
/// statuses and is observable in the pattern store, so they must stay
/// stable across versions.
pub const CONFIDENCE_WEIGHTS: ConfidenceWeights = ConfidenceWeights {
    frequency: 0.35,
    consistency: 0.30,
    age: 0.15,
    spread: 0.20,
};

/// Named weights for the confidence score components
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    /// Weight of the frequency component
    pub frequency: f64,
    /// Weight of the consistency component
    pub consistency: f64,
    /// Weight of the age component
    pub age: f64,
    /// Weight of the spread component
    pub spread: f64,
}

/// Confidence record of a stored pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    /// min(1, locations / 10)
    pub frequency: f64,
    /// 0.9 minus a small penalty per outlier
    pub consistency: f64,
    /// How long the pattern has been observed, saturating at 30 days
    pub age: f64,
    /// 1.0 when locations span at least two files, else partial
    pub spread: f64,
    /// Weighted combination of the components
    pub score: f64,
    /// Band the score falls in
    pub level: ConfidenceLevel,
}

impl ConfidenceRecord {
    /// Recomputes all components from current evidence.
    ///
    /// `first_seen`/`now` feed the age component; `distinct_files` feeds
    /// spread.
    pub fn compute(
        locations: usize,
        outliers: usize,
        distinct_files: usize,
        first_seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let frequency = (locations as f64 / 10.0).min(1.0);
        let consistency = (0.9 - 0.05 * outliers as f64).max(0.0);
        let days = (now - first_seen).num_days().max(0) as f64;
        let age = (days / 30.0).min(1.0);
        let spread = if locations == 0 {
            0.0
        } else if distinct_files >= 2 {
            1.0
        } else {
            0.5
        };
        let w = CONFIDENCE_WEIGHTS;
        let score = w.frequency * frequency
            + w.consistency * consistency
            + w.age * age
            + w.spread * spread;
        Self {
            frequency,
            consistency,
            age,
            spread,
            score,
            level: ConfidenceLevel::from_score(score),
        }
    }
}

/// An outlier location with the reason it deviates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    /// Where the deviation occurred
    pub location: Location,
    /// Why it deviates from the pattern
    pub reason: String,
    /// Deviation score (0.0 to 1.0)
    pub deviation: f64,
}

impl Outlier {
    /// The dedup key for outlier lists
    pub fn dedup_key(&self) -> (String, u32, String) {
        (
            self.location.file.to_string_lossy().into_owned(),
            self.location.line,
            self.reason.clone(),
        )
    }
}

/// Timestamps and provenance of a stored pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// When the pattern was first observed
    pub first_seen: DateTime<Utc>,
    /// When the pattern was last observed
    pub last_seen: DateTime<Utc>,
    /// Which component produced it (e.g. "scan", "watch")
    pub source: String,
    /// Free-form tags set by the user
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A learned pattern as the PatternStore persists it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPattern {
    /// Stable identifier (pure function of the pattern's coordinates)
    pub id: String,
    /// Category
    pub category: PatternCategory,
    /// Free-form subcategory within the category
    pub subcategory: String,
    /// Human-readable name
    pub name: String,
    /// What the pattern captures
    pub description: String,
    /// Originating detector
    pub detector: DetectorDescriptor,
    /// Current confidence record
    pub confidence: ConfidenceRecord,
    /// Conforming locations (capped at [`MAX_PATTERN_LOCATIONS`])
    pub locations: Vec<Location>,
    /// Outlier locations
    pub outliers: Vec<Outlier>,
    /// Timestamps and provenance
    pub metadata: PatternMetadata,
    /// Default severity for deviations
    pub severity: PatternSeverity,
    /// Whether violations of this pattern can be fixed automatically
    pub auto_fixable: bool,
    /// Lifecycle status
    pub status: PatternStatus,
}

/// Cap on the number of conforming locations a pattern retains.
///
/// Enforced FIFO: once full, the oldest entries are dropped. This can shed
/// the earliest-discovered evidence; preserved deliberately from the
/// reference behaviour.
pub const MAX_PATTERN_LOCATIONS: usize = 100;

impl StoredPattern {
    /// Number of distinct files the pattern's locations span
    pub fn distinct_files(&self) -> usize {
        let mut files: Vec<&PathBuf> = self.locations.iter().map(|l| &l.file).collect();
        files.sort();
        files.dedup();
        files.len()
    }

    /// True when no evidence remains (no locations and no outliers)
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.outliers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.5), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.1), ConfidenceLevel::Uncertain);
    }

    #[test]
    fn test_confidence_compute() {
        let now = Utc::now();
        let rec = ConfidenceRecord::compute(10, 0, 3, now, now);
        assert!((rec.frequency - 1.0).abs() < f64::EPSILON);
        assert!((rec.consistency - 0.9).abs() < f64::EPSILON);
        assert!((rec.spread - 1.0).abs() < f64::EPSILON);
        // age is zero for a brand-new pattern
        assert!(rec.age.abs() < f64::EPSILON);

        let sparse = ConfidenceRecord::compute(1, 2, 1, now, now);
        assert!(sparse.score < rec.score);
        assert!((sparse.spread - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_spread_empty() {
        let now = Utc::now();
        let rec = ConfidenceRecord::compute(0, 1, 0, now, now);
        assert!(rec.spread.abs() < f64::EPSILON);
    }

    #[test]
    fn test_category_roundtrip() {
        for cat in PatternCategory::all() {
            assert_eq!(PatternCategory::parse(cat.id()), Some(*cat));
        }
        assert_eq!(PatternCategory::parse("nope"), None);
    }
}
