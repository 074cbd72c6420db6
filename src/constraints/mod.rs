//! Constraint derivation
//!
//! Converts evidence from the pattern catalog, the call graph, the
//! boundary store, the test-topology analyzer, and the error-handling
//! analyzer into declarative invariants of the codebase. Each rule only
//! fires above its evidence threshold; every emitted invariant carries
//! the conforming/violating counts and sample locations it was derived
//! from.

pub mod sources;

pub use sources::{
    AccessMap, AccessPoint, CallGraphData, CallRef, ErrorBoundary, ErrorFunctionInfo,
    ErrorIssue, ErrorSummary, ErrorTopology, FunctionInfo, SensitiveField, TestTopologySummary,
};

use std::collections::{BTreeMap, HashSet};

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::model::{Location, PatternCategory, PatternSeverity, PatternStatus, StoredPattern};

/// Kinds of derived invariants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantKind {
    /// One thing must happen before another (e.g. auth before data access)
    MustPrecede,
    /// Bodies must be wrapped (e.g. try/catch)
    MustWrap,
    /// A property must hold
    MustHave,
    /// A property must not hold
    MustNotHave,
    /// Data must flow through a designated layer
    DataFlow,
}

/// Evidence backing a derived invariant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvariantEvidence {
    /// Conforming observations
    pub conforming: usize,
    /// Violating observations
    pub violating: usize,
    /// Sample conforming locations (at most 5)
    pub samples_conforming: Vec<Location>,
    /// Sample violating locations (at most 5)
    pub samples_violating: Vec<Location>,
    /// Source components consulted ("patterns", "call-graph", ...)
    pub sources: Vec<String>,
}

/// A derived invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invariant {
    /// Stable id within one derivation run
    pub id: String,
    /// Kind
    pub kind: InvariantKind,
    /// Human-readable statement of the rule
    pub description: String,
    /// Category, for pattern-derived invariants
    pub category: Option<PatternCategory>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Severity of violations
    pub severity: PatternSeverity,
    /// Directory globs the invariant applies to (empty = whole tree)
    pub scope: Vec<String>,
    /// The evidence it was derived from
    pub evidence: InvariantEvidence,
}

/// Options for one derivation run
#[derive(Debug, Clone)]
pub struct ConstraintOptions {
    /// Minimum confidence an invariant needs to be emitted
    pub min_confidence: f64,
    /// Restrict pattern-derived invariants to these categories
    pub categories: Option<Vec<PatternCategory>>,
}

impl Default for ConstraintOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.90,
            categories: None,
        }
    }
}

/// Everything a derivation run may consult
#[derive(Default)]
pub struct ConstraintInputs<'a> {
    /// Stored patterns
    pub patterns: &'a [StoredPattern],
    /// Call graph, when available
    pub call_graph: Option<&'a CallGraphData>,
    /// Boundary access map, when available
    pub boundaries: Option<&'a AccessMap>,
    /// Test topology summary, when available
    pub tests: Option<&'a TestTopologySummary>,
    /// Error-handling topology, when available
    pub errors: Option<&'a ErrorTopology>,
    /// Error-handling summary, when available
    pub error_summary: Option<&'a ErrorSummary>,
}

const SAMPLE_CAP: usize = 5;

fn auth_keywords() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)auth",
            r"(?i)authenticate",
            r"(?i)authorize",
            r"(?i)checkAuth",
            r"(?i)requireAuth",
            r"(?i)isAuthenticated",
            r"(?i)verifyToken",
            r"(?i)validateToken",
            r"(?i)checkPermission",
            r"(?i)hasRole",
        ])
        .expect("auth keyword set is valid")
    })
}

fn validation_keywords() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)validate",
            r"(?i)sanitize",
            r"(?i)check",
            r"(?i)verify",
            r"(?i)parse",
            r"(?i)schema",
            r"(?i)zod",
            r"(?i)yup",
            r"(?i)joi",
        ])
        .expect("validation keyword set is valid")
    })
}

/// Whether a function name looks like an authentication or authorization
/// guard
pub fn is_auth_function(name: &str) -> bool {
    auth_keywords().is_match(name)
}

/// Derives invariants from all supplied sources
pub struct ConstraintEngine {
    options: ConstraintOptions,
}

impl ConstraintEngine {
    /// Creates an engine with the given options
    pub fn new(options: ConstraintOptions) -> Self {
        Self { options }
    }

    /// Runs every derivation rule and applies the confidence and category
    /// filters
    pub fn derive(&self, inputs: &ConstraintInputs) -> Vec<Invariant> {
        let mut invariants = Vec::new();
        invariants.extend(self.from_patterns(inputs.patterns));
        if let Some(graph) = inputs.call_graph {
            invariants.extend(self.auth_before_data(graph));
            invariants.extend(self.input_validation(graph));
        }
        if let Some(boundaries) = inputs.boundaries {
            invariants.extend(self.data_access_layer(boundaries));
            invariants.extend(self.sensitive_protection(boundaries));
        }
        if let Some(tests) = inputs.tests {
            invariants.extend(self.test_coverage(tests));
            invariants.extend(self.mock_ratio(tests));
        }
        if let Some(errors) = inputs.errors {
            invariants.extend(self.async_try_catch(errors));
        }
        if let (Some(errors), Some(summary)) = (inputs.errors, inputs.error_summary) {
            invariants.extend(self.no_silent_swallow(errors, summary));
        }

        invariants.retain(|inv| inv.confidence >= self.options.min_confidence);
        if let Some(categories) = &self.options.categories {
            invariants.retain(|inv| {
                inv.category.is_none() || inv.category.is_some_and(|c| categories.contains(&c))
            });
        }
        invariants
    }

    /// Approved, high-confidence, well-evidenced patterns become
    /// invariants; the kind is inferred from the category.
    fn from_patterns(&self, patterns: &[StoredPattern]) -> Vec<Invariant> {
        patterns
            .iter()
            .filter(|p| p.status == PatternStatus::Approved)
            .filter(|p| p.confidence.score >= 0.85 && p.locations.len() >= 3)
            .map(|p| {
                let kind = match p.category {
                    PatternCategory::Auth => InvariantKind::MustPrecede,
                    PatternCategory::Errors => InvariantKind::MustWrap,
                    _ => InvariantKind::MustHave,
                };
                let conforming = p.locations.len();
                let violating = p.outliers.len();
                let confidence = conforming as f64 / (conforming + violating).max(1) as f64;
                Invariant {
                    id: format!("pattern/{}", p.id),
                    kind,
                    description: format!("{} holds across the codebase", p.name),
                    category: Some(p.category),
                    confidence,
                    severity: p.severity,
                    scope: directory_scopes(&p.locations),
                    evidence: InvariantEvidence {
                        conforming,
                        violating,
                        samples_conforming: p.locations.iter().take(SAMPLE_CAP).cloned().collect(),
                        samples_violating: p
                            .outliers
                            .iter()
                            .take(SAMPLE_CAP)
                            .map(|o| o.location.clone())
                            .collect(),
                        sources: vec!["patterns".to_string()],
                    },
                }
            })
            .collect()
    }

    /// Entry points reaching data access must pass through an auth
    /// function first (>= 3 entries observed, >= 80% conforming).
    fn auth_before_data(&self, graph: &CallGraphData) -> Vec<Invariant> {
        self.keyword_partition_rule(
            graph,
            auth_keywords(),
            0.8,
            "auth/call-graph",
            InvariantKind::MustPrecede,
            "authentication precedes data access on entry-point paths",
            PatternSeverity::Error,
        )
    }

    /// Entry points reaching data access should validate their input
    /// (>= 3 entries observed, >= 70% conforming).
    fn input_validation(&self, graph: &CallGraphData) -> Vec<Invariant> {
        self.keyword_partition_rule(
            graph,
            validation_keywords(),
            0.7,
            "validation/call-graph",
            InvariantKind::MustPrecede,
            "input validation precedes data access on entry-point paths",
            PatternSeverity::Warning,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn keyword_partition_rule(
        &self,
        graph: &CallGraphData,
        keywords: &RegexSet,
        threshold: f64,
        id: &str,
        kind: InvariantKind,
        description: &str,
        severity: PatternSeverity,
    ) -> Vec<Invariant> {
        let mut conforming = Vec::new();
        let mut violating = Vec::new();
        for entry in &graph.entry_points {
            if !graph.reaches_data_access(entry) {
                continue;
            }
            let closure = graph.transitive_callees(entry);
            let guarded = closure
                .iter()
                .filter_map(|id| graph.functions.get(id))
                .any(|f| keywords.is_match(&f.name));
            let location = graph
                .functions
                .get(entry)
                .map(|f| Location::new(f.file.clone(), f.start_line, 1));
            if guarded {
                conforming.push(location);
            } else {
                violating.push(location);
            }
        }
        let total = conforming.len() + violating.len();
        if total < 3 {
            return Vec::new();
        }
        let ratio = conforming.len() as f64 / total as f64;
        if ratio < threshold {
            return Vec::new();
        }
        vec![Invariant {
            id: id.to_string(),
            kind,
            description: description.to_string(),
            category: None,
            confidence: ratio,
            severity,
            scope: Vec::new(),
            evidence: InvariantEvidence {
                conforming: conforming.len(),
                violating: violating.len(),
                samples_conforming: conforming.into_iter().flatten().take(SAMPLE_CAP).collect(),
                samples_violating: violating.into_iter().flatten().take(SAMPLE_CAP).collect(),
                sources: vec!["call-graph".to_string()],
            },
        }]
    }

    /// Per table, when one accessor layer covers >= 80% of accesses it
    /// becomes the designated layer; stragglers are violations.
    fn data_access_layer(&self, boundaries: &AccessMap) -> Vec<Invariant> {
        static LAYER: OnceLock<regex::Regex> = OnceLock::new();
        let layer_re = LAYER.get_or_init(|| {
            regex::Regex::new(r"([A-Za-z0-9_]+)(Repository|Service|DAO|Store|Manager)")
                .expect("layer regex is valid")
        });

        let mut per_table: BTreeMap<&str, Vec<(&AccessPoint, Option<String>)>> = BTreeMap::new();
        for point in boundaries.access_points.values() {
            let layer = point
                .context
                .as_deref()
                .and_then(|c| layer_re.captures(c))
                .map(|caps| format!("{}{}", &caps[1], &caps[2]));
            per_table.entry(&point.table).or_default().push((point, layer));
        }

        let mut invariants = Vec::new();
        for (table, accesses) in per_table {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for (_, layer) in &accesses {
                if let Some(layer) = layer {
                    *counts.entry(layer.as_str()).or_default() += 1;
                }
            }
            let Some((dominant, count)) = counts.iter().max_by_key(|(_, c)| **c) else {
                continue;
            };
            let ratio = *count as f64 / accesses.len() as f64;
            if ratio < 0.8 {
                continue;
            }
            let dominant = dominant.to_string();
            let conforming: Vec<Location> = accesses
                .iter()
                .filter(|(_, l)| l.as_deref() == Some(dominant.as_str()))
                .map(|(p, _)| Location::new(p.file.clone(), p.line, 1))
                .collect();
            let violating: Vec<Location> = accesses
                .iter()
                .filter(|(_, l)| l.as_deref() != Some(dominant.as_str()))
                .map(|(p, _)| Location::new(p.file.clone(), p.line, 1))
                .collect();
            invariants.push(Invariant {
                id: format!("data-flow/{table}"),
                kind: InvariantKind::DataFlow,
                description: format!("access to {table} goes through {dominant}"),
                category: None,
                confidence: ratio,
                severity: PatternSeverity::Warning,
                scope: Vec::new(),
                evidence: InvariantEvidence {
                    conforming: conforming.len(),
                    violating: violating.len(),
                    samples_conforming: conforming.into_iter().take(SAMPLE_CAP).collect(),
                    samples_violating: violating.into_iter().take(SAMPLE_CAP).collect(),
                    sources: vec!["boundaries".to_string()],
                },
            });
        }
        invariants
    }

    /// Every table with sensitive fields demands auth and audit on those
    /// fields, at a fixed confidence of 0.95.
    fn sensitive_protection(&self, boundaries: &AccessMap) -> Vec<Invariant> {
        let mut tables: Vec<&str> = boundaries.sensitive_tables().into_iter().collect();
        tables.sort_unstable();
        tables
            .into_iter()
            .map(|table| {
                let fields: Vec<&SensitiveField> = boundaries
                    .sensitive_fields
                    .iter()
                    .filter(|f| f.table == table)
                    .collect();
                Invariant {
                    id: format!("sensitive/{table}"),
                    kind: InvariantKind::MustHave,
                    description: format!(
                        "sensitive fields of {table} require auth and audit ({})",
                        fields
                            .iter()
                            .map(|f| f.field.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    category: None,
                    confidence: 0.95,
                    severity: PatternSeverity::Error,
                    scope: Vec::new(),
                    evidence: InvariantEvidence {
                        conforming: fields.len(),
                        violating: 0,
                        samples_conforming: Vec::new(),
                        samples_violating: Vec::new(),
                        sources: vec!["boundaries".to_string()],
                    },
                }
            })
            .collect()
    }

    /// When >= 70% of non-test functions are covered, coverage becomes an
    /// invariant at the discovered ratio.
    fn test_coverage(&self, tests: &TestTopologySummary) -> Vec<Invariant> {
        if tests.total_functions == 0 {
            return Vec::new();
        }
        let ratio = tests.covered_functions as f64 / tests.total_functions as f64;
        if ratio < 0.7 {
            return Vec::new();
        }
        vec![Invariant {
            id: "testing/coverage".to_string(),
            kind: InvariantKind::MustHave,
            description: "functions are covered by at least one test".to_string(),
            category: None,
            confidence: ratio,
            severity: PatternSeverity::Warning,
            scope: Vec::new(),
            evidence: InvariantEvidence {
                conforming: tests.covered_functions,
                violating: tests.total_functions - tests.covered_functions,
                samples_conforming: Vec::new(),
                samples_violating: Vec::new(),
                sources: vec!["test-topology".to_string()],
            },
        }]
    }

    /// A codebase that tests mostly against real collaborators earns a
    /// cap on mock ratio.
    fn mock_ratio(&self, tests: &TestTopologySummary) -> Vec<Invariant> {
        if tests.test_cases == 0 || tests.avg_mock_ratio >= 0.5 {
            return Vec::new();
        }
        vec![Invariant {
            id: "testing/mock-ratio".to_string(),
            kind: InvariantKind::MustNotHave,
            description: "tests keep mock ratio below 0.7".to_string(),
            category: None,
            confidence: 1.0 - tests.avg_mock_ratio,
            severity: PatternSeverity::Info,
            scope: Vec::new(),
            evidence: InvariantEvidence {
                conforming: tests.test_cases,
                violating: 0,
                samples_conforming: Vec::new(),
                samples_violating: Vec::new(),
                sources: vec!["test-topology".to_string()],
            },
        }]
    }

    /// When >= 70% of async functions wrap their bodies in try/catch,
    /// wrapping becomes an invariant.
    fn async_try_catch(&self, errors: &ErrorTopology) -> Vec<Invariant> {
        let async_functions: Vec<&ErrorFunctionInfo> =
            errors.functions.values().filter(|f| f.is_async).collect();
        if async_functions.is_empty() {
            return Vec::new();
        }
        let wrapped: Vec<&&ErrorFunctionInfo> = async_functions
            .iter()
            .filter(|f| f.has_try_catch)
            .collect();
        let ratio = wrapped.len() as f64 / async_functions.len() as f64;
        if ratio < 0.7 {
            return Vec::new();
        }
        vec![Invariant {
            id: "errors/async-try-catch".to_string(),
            kind: InvariantKind::MustWrap,
            description: "async function bodies are wrapped in try/catch".to_string(),
            category: None,
            confidence: ratio,
            severity: PatternSeverity::Warning,
            scope: Vec::new(),
            evidence: InvariantEvidence {
                conforming: wrapped.len(),
                violating: async_functions.len() - wrapped.len(),
                samples_conforming: wrapped
                    .iter()
                    .take(SAMPLE_CAP)
                    .map(|f| Location::new(f.file.clone(), f.line, 1))
                    .collect(),
                samples_violating: async_functions
                    .iter()
                    .filter(|f| !f.has_try_catch)
                    .take(SAMPLE_CAP)
                    .map(|f| Location::new(f.file.clone(), f.line, 1))
                    .collect(),
                sources: vec!["error-handling".to_string()],
            },
        }]
    }

    /// When fewer than 10% of functions swallow exceptions silently,
    /// silent swallowing becomes forbidden.
    fn no_silent_swallow(
        &self,
        errors: &ErrorTopology,
        summary: &ErrorSummary,
    ) -> Vec<Invariant> {
        let total = summary.total_functions.max(errors.functions.len());
        if total == 0 {
            return Vec::new();
        }
        let swallowing = summary
            .top_issues
            .iter()
            .filter(|i| i.issue_type == "empty-catch")
            .map(|i| i.count)
            .sum::<usize>();
        let ratio = swallowing as f64 / total as f64;
        if ratio >= 0.10 {
            return Vec::new();
        }
        vec![Invariant {
            id: "errors/no-silent-swallow".to_string(),
            kind: InvariantKind::MustNotHave,
            description: "catch blocks never swallow exceptions silently".to_string(),
            category: None,
            confidence: 1.0 - ratio,
            severity: PatternSeverity::Error,
            scope: Vec::new(),
            evidence: InvariantEvidence {
                conforming: total - swallowing,
                violating: swallowing,
                samples_conforming: Vec::new(),
                samples_violating: Vec::new(),
                sources: vec!["error-handling".to_string()],
            },
        }]
    }
}

impl Default for ConstraintEngine {
    fn default() -> Self {
        Self::new(ConstraintOptions::default())
    }
}

/// Expresses the distinct parent directories of a location list as globs
fn directory_scopes(locations: &[Location]) -> Vec<String> {
    let mut dirs: HashSet<String> = locations
        .iter()
        .filter_map(|l| l.file.parent())
        .map(|d| {
            let d = d.to_string_lossy().replace('\\', "/");
            if d.is_empty() {
                "**".to_string()
            } else {
                format!("{d}/**")
            }
        })
        .collect();
    let mut scopes: Vec<String> = dirs.drain().collect();
    scopes.sort();
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::model::{
        ConfidenceRecord, DetectionKind, DetectorDescriptor, PatternMetadata,
    };

    fn approved_pattern(locations: usize, outliers: usize) -> StoredPattern {
        let now = Utc::now();
        StoredPattern {
            id: "p1".to_string(),
            category: PatternCategory::Auth,
            subcategory: "guard".to_string(),
            name: "auth guard".to_string(),
            description: String::new(),
            detector: DetectorDescriptor {
                kind: DetectionKind::Regex,
                config: serde_json::Value::Null,
            },
            confidence: ConfidenceRecord {
                frequency: 1.0,
                consistency: 0.9,
                age: 1.0,
                spread: 1.0,
                score: 0.9,
                level: crate::model::ConfidenceLevel::High,
            },
            locations: (0..locations)
                .map(|i| Location::new(format!("src/m{i}/a.ts"), 1, 1))
                .collect(),
            outliers: (0..outliers)
                .map(|i| crate::model::Outlier {
                    location: Location::new(format!("src/x{i}.ts"), 2, 1),
                    reason: "missing guard".to_string(),
                    deviation: 0.8,
                })
                .collect(),
            metadata: PatternMetadata {
                first_seen: now,
                last_seen: now,
                source: "scan".to_string(),
                tags: vec![],
            },
            severity: PatternSeverity::Error,
            auto_fixable: false,
            status: PatternStatus::Approved,
        }
    }

    #[test]
    fn test_pattern_invariant_thresholds() {
        let engine = ConstraintEngine::default();
        let strong = approved_pattern(5, 0);
        let invariants = engine.derive(&ConstraintInputs {
            patterns: std::slice::from_ref(&strong),
            ..Default::default()
        });
        assert_eq!(invariants.len(), 1);
        assert_eq!(invariants[0].kind, InvariantKind::MustPrecede);
        assert!(!invariants[0].scope.is_empty());

        // Two locations is below the evidence floor.
        let weak = approved_pattern(2, 0);
        let invariants = engine.derive(&ConstraintInputs {
            patterns: std::slice::from_ref(&weak),
            ..Default::default()
        });
        assert!(invariants.is_empty());
    }

    #[test]
    fn test_auth_before_data_rule() {
        let mut graph = CallGraphData::default();
        for i in 0..4 {
            let entry = format!("handler{i}");
            let auth = format!("requireAuth{i}");
            let db = format!("query{i}");
            graph.functions.insert(
                entry.clone(),
                FunctionInfo {
                    name: entry.clone(),
                    file: "src/api.ts".to_string(),
                    start_line: 1,
                    is_async: true,
                    decorators: vec![],
                    parameters: vec![],
                    return_type: None,
                    data_access: vec![],
                    calls: vec![
                        CallRef {
                            callee_id: Some(auth.clone()),
                        },
                        CallRef {
                            callee_id: Some(db.clone()),
                        },
                    ],
                },
            );
            graph.functions.insert(
                auth.clone(),
                FunctionInfo {
                    name: auth,
                    file: "src/auth.ts".to_string(),
                    start_line: 10,
                    is_async: false,
                    decorators: vec![],
                    parameters: vec![],
                    return_type: None,
                    data_access: vec![],
                    calls: vec![],
                },
            );
            graph.functions.insert(
                db.clone(),
                FunctionInfo {
                    name: db,
                    file: "src/db.ts".to_string(),
                    start_line: 20,
                    is_async: false,
                    decorators: vec![],
                    parameters: vec![],
                    return_type: None,
                    data_access: vec!["users".to_string()],
                    calls: vec![],
                },
            );
            graph.entry_points.push(entry);
        }

        let engine = ConstraintEngine::new(ConstraintOptions {
            min_confidence: 0.8,
            categories: None,
        });
        let invariants = engine.derive(&ConstraintInputs {
            call_graph: Some(&graph),
            ..Default::default()
        });
        let auth = invariants
            .iter()
            .find(|i| i.id == "auth/call-graph")
            .expect("auth invariant emitted");
        assert_eq!(auth.kind, InvariantKind::MustPrecede);
        assert!((auth.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(auth.evidence.conforming, 4);
    }

    #[test]
    fn test_sensitive_protection_fixed_confidence() {
        let boundaries = AccessMap {
            access_points: Default::default(),
            sensitive_fields: vec![
                SensitiveField {
                    table: "users".to_string(),
                    field: "ssn".to_string(),
                },
                SensitiveField {
                    table: "users".to_string(),
                    field: "email".to_string(),
                },
            ],
        };
        let engine = ConstraintEngine::default();
        let invariants = engine.derive(&ConstraintInputs {
            boundaries: Some(&boundaries),
            ..Default::default()
        });
        assert_eq!(invariants.len(), 1);
        assert!((invariants[0].confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(invariants[0].severity, PatternSeverity::Error);
    }

    #[test]
    fn test_silent_swallow_threshold() {
        let mut errors = ErrorTopology::default();
        for i in 0..20 {
            errors.functions.insert(
                format!("f{i}"),
                ErrorFunctionInfo {
                    file: "src/a.ts".to_string(),
                    line: i,
                    qualified_name: format!("f{i}"),
                    is_async: false,
                    has_try_catch: true,
                    async_handling: None,
                },
            );
        }
        let summary = ErrorSummary {
            total_functions: 20,
            top_issues: vec![ErrorIssue {
                issue_type: "empty-catch".to_string(),
                count: 1,
            }],
        };
        let engine = ConstraintEngine::default();
        let invariants = engine.derive(&ConstraintInputs {
            errors: Some(&errors),
            error_summary: Some(&summary),
            ..Default::default()
        });
        assert!(invariants
            .iter()
            .any(|i| i.id == "errors/no-silent-swallow"));

        // 30% swallowing functions kill the invariant.
        let noisy = ErrorSummary {
            total_functions: 20,
            top_issues: vec![ErrorIssue {
                issue_type: "empty-catch".to_string(),
                count: 6,
            }],
        };
        let invariants = engine.derive(&ConstraintInputs {
            errors: Some(&errors),
            error_summary: Some(&noisy),
            ..Default::default()
        });
        assert!(!invariants
            .iter()
            .any(|i| i.id == "errors/no-silent-swallow"));
    }
}
