//! Quality-gate orchestration
//!
//! A policy names a set of gates; the orchestrator builds the shared
//! context once, dispatches the configured gates in parallel, aggregates
//! their results under the policy's aggregation mode, and persists a run
//! record plus a health snapshot. A gate that fails to execute reports
//! `errored` with score 0, treated like a failure for the verdict but
//! distinguished in the summary.

mod boundary;
mod compliance;
mod history;
mod impact;
mod policy;
mod regression;
mod rules;
mod verification;

pub use boundary::SecurityBoundaryGate;
pub use compliance::PatternComplianceGate;
pub use history::{
    record_id, ConstraintHealth, GateRunRecord, GateScore, HealthSnapshot, PatternHealth,
    RunHistoryStore, SecuritySummary, SnapshotCounts, SnapshotStore, MAX_RUNS,
    MAX_SNAPSHOTS_PER_BRANCH,
};
pub use impact::{BreakingRisk, ImpactSimulationGate};
pub use policy::{Aggregation, GateKind, GatePolicy, GateSpec};
pub use regression::RegressionGate;
pub use rules::{CustomRule, CustomRulesGate, NamingTarget, RuleCondition};
pub use verification::ConstraintVerificationGate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constraints::{
    is_auth_function, AccessMap, CallGraphData, ConstraintEngine, ConstraintInputs, Invariant,
};
use crate::error::Result;
use crate::model::{Severity, StoredPattern};
use crate::store::{DriftPaths, PatternStore};

/// Execution status of one gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    /// The gate's checks held
    Passed,
    /// The gate's checks failed
    Failed,
    /// Held, with warnings
    Warned,
    /// Not executed (disabled or missing inputs)
    Skipped,
    /// Execution itself failed
    Errored,
}

/// A violation a gate reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateViolation {
    /// Severity
    pub severity: Severity,
    /// What went wrong
    pub message: String,
    /// Offending file, when known
    #[serde(default)]
    pub file: Option<String>,
    /// Offending line, when known
    #[serde(default)]
    pub line: Option<u32>,
}

/// The result one gate returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    /// Which gate
    pub gate: GateKind,
    /// Execution status
    pub status: GateStatus,
    /// Whether the gate passed
    pub passed: bool,
    /// Score 0-100
    pub score: f64,
    /// One-line summary
    pub summary: String,
    /// Violations found
    pub violations: Vec<GateViolation>,
    /// Non-fatal warnings
    pub warnings: Vec<String>,
    /// Execution time
    pub duration_ms: u128,
    /// Gate-specific details blob
    pub details: serde_json::Value,
    /// Error string when status is `errored`
    #[serde(default)]
    pub error: Option<String>,
}

impl GateOutcome {
    /// A skipped outcome
    pub fn skipped(gate: GateKind, reason: &str) -> Self {
        Self {
            gate,
            status: GateStatus::Skipped,
            passed: true,
            score: 100.0,
            summary: format!("skipped: {reason}"),
            violations: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::Value::Null,
            error: None,
        }
    }

    /// An errored outcome
    pub fn errored(gate: GateKind, error: String) -> Self {
        Self {
            gate,
            status: GateStatus::Errored,
            passed: false,
            score: 0.0,
            summary: "gate execution failed".to_string(),
            violations: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::Value::Null,
            error: Some(error),
        }
    }
}

/// Context shared by every gate of one run, built exactly once
#[derive(Default)]
pub struct GateContext {
    /// Stored patterns
    pub patterns: Vec<StoredPattern>,
    /// Derived invariants
    pub invariants: Vec<Invariant>,
    /// Call graph, when supplied
    pub call_graph: Option<CallGraphData>,
    /// Boundary access map, when supplied
    pub boundaries: Option<AccessMap>,
    /// Previous health snapshot for regression comparison
    pub previous_snapshot: Option<HealthSnapshot>,
    /// User-defined rules
    pub custom_rules: Vec<CustomRule>,
}

/// Per-run input handed to every gate
pub struct GateInput<'a> {
    /// The change set under evaluation (workspace-relative)
    pub files: &'a [PathBuf],
    /// Workspace root
    pub project_root: &'a Path,
    /// Branch under evaluation
    pub branch: &'a str,
    /// Base branch, when the change set was derived from one
    pub base_branch: Option<&'a str>,
    /// Commit, when known
    pub commit: Option<&'a str>,
    /// Whether this is a CI run
    pub ci: bool,
    /// Gate-specific configuration from the policy
    pub config: &'a serde_json::Value,
    /// The shared context
    pub context: &'a GateContext,
}

/// The gate contract
pub trait Gate: Send + Sync {
    /// Which gate this is
    fn kind(&self) -> GateKind;

    /// Executes the gate. Errors are converted to `errored` outcomes by
    /// the orchestrator.
    fn execute(&self, input: &GateInput) -> Result<GateOutcome>;
}

fn gate_for(kind: GateKind) -> Box<dyn Gate> {
    match kind {
        GateKind::PatternCompliance => Box::new(PatternComplianceGate),
        GateKind::ConstraintVerification => Box::new(ConstraintVerificationGate),
        GateKind::Regression => Box::new(RegressionGate),
        GateKind::ImpactSimulation => Box::new(ImpactSimulationGate),
        GateKind::SecurityBoundary => Box::new(SecurityBoundaryGate),
        GateKind::CustomRules => Box::new(CustomRulesGate),
    }
}

/// A request to evaluate a change set
pub struct GateRequest {
    /// Files in the change set (workspace-relative)
    pub files: Vec<PathBuf>,
    /// Branch
    pub branch: String,
    /// Base branch
    pub base_branch: Option<String>,
    /// Commit
    pub commit: Option<String>,
    /// CI flag
    pub ci: bool,
    /// External call graph, when available
    pub call_graph: Option<CallGraphData>,
    /// External boundary data, when available
    pub boundaries: Option<AccessMap>,
    /// User rules
    pub custom_rules: Vec<CustomRule>,
}

/// The full result of one orchestrated run
#[derive(Debug)]
pub struct GateRunReport {
    /// The persisted run record
    pub record: GateRunRecord,
    /// Per-gate outcomes
    pub outcomes: Vec<GateOutcome>,
    /// The snapshot written for this run
    pub snapshot: HealthSnapshot,
}

impl GateRunReport {
    /// Process exit code for this run: 0 on pass, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.record.passed)
    }
}

/// Runs a policy's gates over a change set
pub struct GateOrchestrator {
    policy: GatePolicy,
}

impl GateOrchestrator {
    /// Creates an orchestrator for a policy
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    /// The policy
    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Executes the run: builds the shared context, dispatches gates in
    /// parallel, aggregates, and persists the run record and snapshot.
    pub fn run(&self, paths: &DriftPaths, request: GateRequest) -> Result<GateRunReport> {
        let started = Instant::now();
        let GateRequest {
            files,
            branch,
            base_branch,
            commit,
            ci,
            call_graph,
            boundaries,
            custom_rules,
        } = request;

        // Shared context: loaded exactly once for all gates.
        let pattern_store = PatternStore::initialize(paths.patterns_file())?;
        let patterns: Vec<StoredPattern> = pattern_store.get_all().cloned().collect();
        let engine = ConstraintEngine::default();
        let invariants = engine.derive(&ConstraintInputs {
            patterns: &patterns,
            call_graph: call_graph.as_ref(),
            boundaries: boundaries.as_ref(),
            ..Default::default()
        });
        let snapshot_store = SnapshotStore::new(paths.gates_dir().join("snapshots"));
        let previous_snapshot = snapshot_store.latest(&branch);

        let context = GateContext {
            patterns,
            invariants,
            call_graph,
            boundaries,
            previous_snapshot,
            custom_rules,
        };

        let specs: Vec<&GateSpec> = self.policy.gates.iter().collect();
        let outcomes: Vec<GateOutcome> = specs
            .par_iter()
            .map(|spec| {
                if !spec.enabled {
                    return GateOutcome::skipped(spec.kind, "disabled by policy");
                }
                let gate = gate_for(spec.kind);
                let gate_started = Instant::now();
                let input = GateInput {
                    files: &files,
                    project_root: paths.workspace_root(),
                    branch: &branch,
                    base_branch: base_branch.as_deref(),
                    commit: commit.as_deref(),
                    ci,
                    config: &spec.config,
                    context: &context,
                };
                let mut outcome = match gate.execute(&input) {
                    Ok(outcome) => outcome,
                    Err(e) => GateOutcome::errored(spec.kind, e.to_string()),
                };
                outcome.duration_ms = gate_started.elapsed().as_millis();
                outcome
            })
            .collect();

        let (passed, score) = self.aggregate(&outcomes);
        let now = Utc::now();
        let record = GateRunRecord {
            id: record_id("run", now),
            timestamp: now,
            branch: branch.clone(),
            commit: commit.clone(),
            policy_id: self.policy.id.clone(),
            passed,
            score,
            gates: outcomes
                .iter()
                .map(|o| {
                    (
                        o.gate.id().to_string(),
                        GateScore {
                            passed: o.passed,
                            score: o.score,
                        },
                    )
                })
                .collect(),
            violations: outcomes.iter().map(|o| o.violations.len()).sum(),
            duration_ms: started.elapsed().as_millis(),
            ci,
        };
        let snapshot = build_snapshot(&context, &branch, commit.as_deref(), files.len(), score, now);

        let run_store = RunHistoryStore::new(paths.runs_dir());
        if let Err(e) = run_store.save(&record) {
            warn!("failed to persist gate run: {e}");
        }
        if let Err(e) = snapshot_store.save(&snapshot) {
            warn!("failed to persist health snapshot: {e}");
        }

        info!(
            "quality gates {}: score {score:.0} ({} gates)",
            if passed { "passed" } else { "failed" },
            outcomes.len()
        );
        Ok(GateRunReport {
            record,
            outcomes,
            snapshot,
        })
    }

    /// Aggregates per-gate outcomes into an overall verdict and score.
    /// `errored` counts as failed; required gates force failure.
    fn aggregate(&self, outcomes: &[GateOutcome]) -> (bool, f64) {
        let executed: Vec<&GateOutcome> = outcomes
            .iter()
            .filter(|o| o.status != GateStatus::Skipped)
            .collect();
        if executed.is_empty() {
            return (true, 100.0);
        }

        let score = {
            let total_weight: f64 = executed
                .iter()
                .map(|o| self.weight_of(o.gate))
                .sum::<f64>()
                .max(f64::MIN_POSITIVE);
            executed
                .iter()
                .map(|o| self.weight_of(o.gate) * o.score)
                .sum::<f64>()
                / total_weight
        };

        let mut passed = match self.policy.aggregation {
            Aggregation::Any => executed.iter().any(|o| o.passed),
            Aggregation::All => executed.iter().all(|o| o.passed),
            Aggregation::Weighted | Aggregation::Threshold => score >= self.policy.pass_threshold,
        };

        for required in &self.policy.required_gates {
            let ok = outcomes
                .iter()
                .find(|o| o.gate == *required)
                .map(|o| o.status == GateStatus::Skipped || o.passed)
                .unwrap_or(true);
            if !ok {
                passed = false;
            }
        }
        (passed, score)
    }

    fn weight_of(&self, kind: GateKind) -> f64 {
        self.policy
            .gates
            .iter()
            .find(|spec| spec.kind == kind)
            .map(|spec| spec.weight)
            .unwrap_or(1.0)
    }
}

/// Assembles the health snapshot persisted after a run
fn build_snapshot(
    context: &GateContext,
    branch: &str,
    commit: Option<&str>,
    change_set_size: usize,
    health_score: f64,
    now: chrono::DateTime<Utc>,
) -> HealthSnapshot {
    let patterns: BTreeMap<String, PatternHealth> = context
        .patterns
        .iter()
        .map(|p| {
            let conforming = p.locations.len();
            let outliers = p.outliers.len();
            let compliance = if conforming + outliers == 0 {
                100.0
            } else {
                conforming as f64 / (conforming + outliers) as f64 * 100.0
            };
            (
                p.id.clone(),
                PatternHealth {
                    confidence: p.confidence.score * 100.0,
                    compliance,
                    locations: conforming,
                    outliers,
                },
            )
        })
        .collect();

    let constraints: BTreeMap<String, ConstraintHealth> = context
        .invariants
        .iter()
        .map(|inv| {
            (
                inv.id.clone(),
                ConstraintHealth {
                    satisfied: inv.evidence.violating == 0,
                    confidence: inv.confidence,
                },
            )
        })
        .collect();

    let security = context
        .call_graph
        .as_ref()
        .map(|graph| security_summary(graph, context.boundaries.as_ref()))
        .unwrap_or_default();

    HealthSnapshot {
        id: record_id("snap", now),
        branch: branch.to_string(),
        commit: commit.map(str::to_string),
        timestamp: now,
        health_score,
        counts: SnapshotCounts {
            patterns: patterns.len(),
            constraints: constraints.len(),
            files: change_set_size,
        },
        patterns,
        constraints,
        security,
    }
}

/// Computes auth coverage and sensitive access counts from the call graph
/// and boundary data
pub(crate) fn security_summary(
    graph: &CallGraphData,
    boundaries: Option<&AccessMap>,
) -> SecuritySummary {
    let mut guarded = 0usize;
    let mut total = 0usize;
    for entry in &graph.entry_points {
        if !graph.reaches_data_access(entry) {
            continue;
        }
        total += 1;
        let closure = graph.transitive_callees(entry);
        if closure
            .iter()
            .filter_map(|id| graph.functions.get(id))
            .any(|f| is_auth_function(&f.name))
        {
            guarded += 1;
        }
    }
    let auth_coverage = if total == 0 {
        100.0
    } else {
        guarded as f64 / total as f64 * 100.0
    };

    let (sensitive_access, protected_tables, unprotected_tables) = boundaries
        .map(|map| {
            let sensitive = map.sensitive_tables();
            let sensitive_access = map
                .access_points
                .values()
                .filter(|p| sensitive.contains(p.table.as_str()))
                .count();
            // A table counts as protected when auth coverage is total;
            // refined per-table status is the boundary gate's job.
            let protected = if auth_coverage >= 100.0 {
                sensitive.len()
            } else {
                0
            };
            (sensitive_access, protected, sensitive.len() - protected)
        })
        .unwrap_or((0, 0, 0));

    SecuritySummary {
        auth_coverage,
        sensitive_access,
        protected_tables,
        unprotected_tables,
    }
}
