//! Quality-gate orchestration tests: regression detection, errored
//! gates, aggregation, and history persistence.

mod common;

use std::collections::BTreeMap;

use chrono::Utc;
use common::TestWorkspace;
use driftscan::gates::{
    record_id, Aggregation, GateKind, GatePolicy, GateRequest, GateSpec, GateStatus,
    HealthSnapshot, PatternHealth, RuleCondition, SecuritySummary, SnapshotCounts, SnapshotStore,
};
use driftscan::model::{
    ConfidenceLevel, ConfidenceRecord, DetectionKind, DetectorDescriptor, Location, Outlier,
    PatternCategory, PatternMetadata, PatternSeverity, PatternStatus, StoredPattern,
};
use driftscan::store::PatternStore;
use driftscan::Workspace;
use pretty_assertions::assert_eq;

fn stored_pattern(id: &str, score: f64, locations: usize, outliers: usize) -> StoredPattern {
    let now = Utc::now();
    StoredPattern {
        id: id.to_string(),
        category: PatternCategory::Logging,
        subcategory: "structured".to_string(),
        name: "structured logging".to_string(),
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
            score,
            level: ConfidenceLevel::from_score(score),
        },
        locations: (0..locations)
            .map(|i| Location::new(format!("src/f{i}.ts"), i as u32 + 1, 1))
            .collect(),
        outliers: (0..outliers)
            .map(|i| Outlier {
                location: Location::new(format!("src/bad{i}.ts"), 1, 1),
                reason: "console logging".to_string(),
                deviation: 0.6,
            })
            .collect(),
        metadata: PatternMetadata {
            first_seen: now,
            last_seen: now,
            source: "scan".to_string(),
            tags: vec![],
        },
        severity: PatternSeverity::Warning,
        auto_fixable: false,
        status: PatternStatus::Approved,
    }
}

fn write_pattern(tree: &TestWorkspace, pattern: StoredPattern) {
    let mut store = PatternStore::new(tree.patterns_file());
    store.add(pattern);
    store.save().unwrap();
}

fn previous_snapshot(tree: &TestWorkspace, pattern_id: &str, confidence: f64, compliance: f64) {
    let store = SnapshotStore::new(tree.root_path.join(".drift/quality-gates/snapshots"));
    let mut patterns = BTreeMap::new();
    patterns.insert(
        pattern_id.to_string(),
        PatternHealth {
            confidence,
            compliance,
            locations: 19,
            outliers: 1,
        },
    );
    store
        .save(&HealthSnapshot {
            id: record_id("snap", Utc::now() - chrono::Duration::minutes(5)),
            branch: "main".to_string(),
            commit: Some("baseline".to_string()),
            timestamp: Utc::now() - chrono::Duration::minutes(5),
            health_score: 95.0,
            patterns,
            constraints: BTreeMap::new(),
            security: SecuritySummary::default(),
            counts: SnapshotCounts::default(),
        })
        .unwrap();
}

fn request() -> GateRequest {
    GateRequest {
        files: vec!["src/f0.ts".into()],
        branch: "main".to_string(),
        base_branch: None,
        commit: Some("current".to_string()),
        ci: false,
        call_graph: None,
        boundaries: None,
        custom_rules: Vec::new(),
    }
}

#[test]
fn regression_gate_fails_on_health_drop() {
    let tree = TestWorkspace::new();
    // Pattern X: previously confidence 90 / compliance 95, now 70 / 80.
    write_pattern(&tree, stored_pattern("x", 0.70, 8, 2));
    previous_snapshot(&tree, "x", 90.0, 95.0);

    let mut config = tree.create_config();
    config.gates = GatePolicy {
        id: "regression-only".to_string(),
        name: "regression".to_string(),
        gates: vec![GateSpec::new(GateKind::Regression)],
        aggregation: Aggregation::All,
        required_gates: vec![GateKind::Regression],
        pass_threshold: 70.0,
    };
    let workspace = Workspace::open(&tree.root_path, config);
    let report = workspace.run_gates(request()).unwrap();

    let regression = report
        .outcomes
        .iter()
        .find(|o| o.gate == GateKind::Regression)
        .unwrap();
    assert_eq!(regression.status, GateStatus::Failed);
    assert!(!regression.violations.is_empty());
    assert!(!report.record.passed);
    assert_eq!(report.exit_code(), 1);

    // The run record and a fresh snapshot were written; the baseline
    // snapshot is untouched.
    assert_eq!(workspace.recent_runs(10).len(), 1);
    let snapshots = workspace.recent_snapshots("main", 10);
    assert_eq!(snapshots.len(), 2);
    let baseline = snapshots
        .iter()
        .find(|s| s.commit.as_deref() == Some("baseline"))
        .unwrap();
    assert_eq!(baseline.patterns["x"].confidence, 90.0);
}

#[test]
fn regression_gate_passes_within_caps() {
    let tree = TestWorkspace::new();
    write_pattern(&tree, stored_pattern("x", 0.88, 19, 1));
    previous_snapshot(&tree, "x", 90.0, 95.0);

    let mut config = tree.create_config();
    config.gates = GatePolicy {
        id: "regression-only".to_string(),
        name: "regression".to_string(),
        gates: vec![GateSpec::new(GateKind::Regression)],
        aggregation: Aggregation::All,
        required_gates: vec![],
        pass_threshold: 70.0,
    };
    let workspace = Workspace::open(&tree.root_path, config);
    let report = workspace.run_gates(request()).unwrap();

    let regression = report
        .outcomes
        .iter()
        .find(|o| o.gate == GateKind::Regression)
        .unwrap();
    // Logging is not a critical category and the drops stay inside the
    // 10-point caps.
    assert_eq!(regression.status, GateStatus::Passed);
}

#[test]
fn errored_gate_reports_and_others_still_run() {
    let tree = TestWorkspace::new();
    write_pattern(&tree, stored_pattern("x", 0.9, 5, 0));

    let mut config = tree.create_config();
    config.gates = GatePolicy {
        id: "mixed".to_string(),
        name: "mixed".to_string(),
        gates: vec![
            GateSpec::new(GateKind::PatternCompliance),
            GateSpec {
                kind: GateKind::CustomRules,
                enabled: true,
                weight: 1.0,
                config: serde_json::Value::Null,
            },
        ],
        aggregation: Aggregation::All,
        required_gates: vec![],
        pass_threshold: 70.0,
    };
    let workspace = Workspace::open(&tree.root_path, config);

    // A rule with an unparseable regex makes the custom-rules gate
    // error out during execution.
    let mut request = request();
    request.custom_rules = vec![driftscan::gates::CustomRule {
        id: "broken".to_string(),
        name: "broken rule".to_string(),
        description: String::new(),
        severity: driftscan::model::Severity::Error,
        enabled: true,
        condition: RuleCondition::ContentMatches {
            files: "**/*.ts".to_string(),
            regex: "(unclosed".to_string(),
        },
    }];
    let report = workspace.run_gates(request).unwrap();

    let errored = report
        .outcomes
        .iter()
        .find(|o| o.gate == GateKind::CustomRules)
        .unwrap();
    assert_eq!(errored.status, GateStatus::Errored);
    assert_eq!(errored.score, 0.0);
    assert!(errored.error.is_some());

    let compliance = report
        .outcomes
        .iter()
        .find(|o| o.gate == GateKind::PatternCompliance)
        .unwrap();
    assert_ne!(compliance.status, GateStatus::Errored);

    assert!(!report.record.passed);
}

#[test]
fn any_aggregation_passes_with_one_passing_gate() {
    let tree = TestWorkspace::new();
    // Clean pattern: compliance passes; no snapshot: regression skips.
    write_pattern(&tree, stored_pattern("x", 0.9, 5, 0));

    let mut config = tree.create_config();
    config.gates = GatePolicy {
        id: "any".to_string(),
        name: "any".to_string(),
        gates: vec![
            GateSpec::new(GateKind::PatternCompliance),
            GateSpec::new(GateKind::Regression),
        ],
        aggregation: Aggregation::Any,
        required_gates: vec![],
        pass_threshold: 70.0,
    };
    let workspace = Workspace::open(&tree.root_path, config);
    let report = workspace.run_gates(request()).unwrap();

    let regression = report
        .outcomes
        .iter()
        .find(|o| o.gate == GateKind::Regression)
        .unwrap();
    assert_eq!(regression.status, GateStatus::Skipped);
    assert!(report.record.passed);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn required_gate_failure_forces_overall_fail() {
    let tree = TestWorkspace::new();
    // An outlier inside the change set violates the compliance budget.
    let mut pattern = stored_pattern("x", 0.9, 10, 1);
    pattern.outliers[0].location = Location::new("src/f0.ts", 3, 1);
    write_pattern(&tree, pattern);

    let mut config = tree.create_config();
    config.gates = GatePolicy {
        id: "strict".to_string(),
        name: "strict".to_string(),
        gates: vec![GateSpec::new(GateKind::PatternCompliance)],
        aggregation: Aggregation::Weighted,
        required_gates: vec![GateKind::PatternCompliance],
        pass_threshold: 10.0,
    };
    let workspace = Workspace::open(&tree.root_path, config);
    let report = workspace.run_gates(request()).unwrap();

    // The weighted score clears the threshold, but the required gate
    // failed on the new outlier.
    let compliance = report
        .outcomes
        .iter()
        .find(|o| o.gate == GateKind::PatternCompliance)
        .unwrap();
    assert_eq!(compliance.status, GateStatus::Failed);
    assert!(!report.record.passed);
}

#[test]
fn run_history_is_bounded_and_ordered() {
    let tree = TestWorkspace::new();
    write_pattern(&tree, stored_pattern("x", 0.9, 5, 0));

    let mut config = tree.create_config();
    config.gates = GatePolicy {
        id: "tiny".to_string(),
        name: "tiny".to_string(),
        gates: vec![GateSpec::new(GateKind::PatternCompliance)],
        aggregation: Aggregation::All,
        required_gates: vec![],
        pass_threshold: 70.0,
    };
    let workspace = Workspace::open(&tree.root_path, config);
    for _ in 0..3 {
        workspace.run_gates(request()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let runs = workspace.recent_runs(10);
    assert_eq!(runs.len(), 3);
    // Newest first, ids sortable.
    assert!(runs[0].id > runs[1].id);
    assert!(runs[1].id > runs[2].id);
}
