//! End-to-end scan pipeline tests: fresh scans, incremental re-scans,
//! file removal, and store round-trips.

mod common;

use common::{read_json, sample_workspaces, TestWorkspace};
use driftscan::model::{ConfidenceLevel, PatternStatus};
use driftscan::store::{ManifestStore, PatternQuery, PatternStore};
use driftscan::Workspace;
use pretty_assertions::assert_eq;

fn open(workspace: &TestWorkspace) -> Workspace {
    Workspace::open(&workspace.root_path, workspace.create_config())
}

#[test]
fn fresh_scan_of_three_file_tree() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);

    let summary = workspace.scan(false, None).unwrap();
    assert_eq!(summary.files_walked, 3);
    assert_eq!(summary.files_scanned, 3);
    assert_eq!(summary.violations, 1);
    assert_eq!(summary.errors, 0);

    // One learned pattern: conforming logger usage in a.ts, with the
    // console.log in c.ts recorded as its outlier.
    let store = PatternStore::initialize(tree.patterns_file()).unwrap();
    assert_eq!(store.len(), 1);
    let pattern = store.get_all().next().unwrap();
    assert_eq!(pattern.locations.len(), 2);
    assert_eq!(pattern.outliers.len(), 1);
    assert_eq!(pattern.status, PatternStatus::Discovered);
    assert!(pattern
        .outliers
        .iter()
        .all(|o| o.location.file.to_string_lossy().contains("c.ts")));

    // The manifest records two semantic locations for the pattern, plus
    // all three files with their hashes.
    let manifest = ManifestStore::load(tree.manifest_file()).unwrap();
    let doc = manifest.get();
    assert!(!doc.codebase_hash.is_empty());
    assert_eq!(doc.files.len(), 3);
    assert!(doc.files.values().all(|f| !f.hash.is_empty()));
    let pattern = doc.patterns.values().next().unwrap();
    assert_eq!(pattern.locations.len(), 2);
    let names: Vec<&str> = pattern.locations.iter().map(|l| l.name.as_str()).collect();
    assert!(names.contains(&"foo"));
    assert!(names.contains(&"fooDone"));
}

#[test]
fn rescan_of_unchanged_tree_is_deterministic() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);

    workspace.scan(false, None).unwrap();
    let first = read_json(&tree.patterns_file());

    workspace.scan(false, None).unwrap();
    let second = read_json(&tree.patterns_file());

    // Identical modulo timestamps: compare with the timestamp fields
    // stripped.
    let strip = |mut value: serde_json::Value| {
        let obj = value.as_object_mut().unwrap();
        obj.remove("generated_at");
        for pattern in obj["patterns"].as_array_mut().unwrap() {
            let metadata = pattern["metadata"].as_object_mut().unwrap();
            metadata.remove("first_seen");
            metadata.remove("last_seen");
            // age feeds off first_seen
            pattern["confidence"].as_object_mut().unwrap().remove("age");
            pattern["confidence"]
                .as_object_mut()
                .unwrap()
                .remove("score");
        }
        value
    };
    assert_eq!(strip(first), strip(second));
}

#[test]
fn incremental_rescan_dispatches_only_changed_files() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);
    workspace.scan(false, None).unwrap();

    // Nothing changed: nothing is dispatched.
    let summary = workspace.scan(true, None).unwrap();
    assert_eq!(summary.files_scanned, 0);

    // One modified file: exactly that file is dispatched.
    tree.add_file(
        "src/b.ts",
        "export function plain(): void {\n  logger.debug('hi');\n}\n",
    );
    let summary = workspace.scan(true, None).unwrap();
    assert_eq!(summary.files_scanned, 1);

    let store = PatternStore::initialize(tree.patterns_file()).unwrap();
    let pattern = store.get_all().next().unwrap();
    // b.ts now contributes a third conforming location.
    assert_eq!(pattern.locations.len(), 3);
}

#[test]
fn deleting_a_file_removes_its_evidence() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);
    workspace.scan(false, None).unwrap();

    tree.remove_file("src/c.ts");
    workspace.scan(true, None).unwrap();

    let store = PatternStore::initialize(tree.patterns_file()).unwrap();
    assert_eq!(store.len(), 1);
    let pattern = store.get_all().next().unwrap();
    assert_eq!(pattern.locations.len(), 2);
    assert!(pattern.outliers.is_empty());
    // Two locations in one file is thin evidence.
    assert_eq!(pattern.confidence.level, ConfidenceLevel::Uncertain);

    let manifest = ManifestStore::load(tree.manifest_file()).unwrap();
    assert_eq!(manifest.get().files.len(), 2);

    // Removing the last witness removes the pattern itself.
    tree.remove_file("src/a.ts");
    workspace.scan(true, None).unwrap();
    let store = PatternStore::initialize(tree.patterns_file()).unwrap();
    assert_eq!(store.len(), 0);
    let manifest = ManifestStore::load(tree.manifest_file()).unwrap();
    assert!(manifest.get().patterns.is_empty());
}

#[test]
fn user_status_survives_rescans() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);
    workspace.scan(false, None).unwrap();

    let id = {
        let mut store = PatternStore::initialize(tree.patterns_file()).unwrap();
        let id = store.get_all().next().unwrap().id.clone();
        store.set_status(&id, PatternStatus::Approved);
        store.save().unwrap();
        id
    };

    tree.add_file("src/a.ts", "export function foo() {\n  logger.warn('rewritten');\n}\n");
    workspace.scan(false, None).unwrap();

    let store = PatternStore::initialize(tree.patterns_file()).unwrap();
    let pattern = store.get(&id).unwrap();
    assert_eq!(pattern.status, PatternStatus::Approved);
    // Evidence did change: a.ts now holds a single call.
    assert_eq!(pattern.locations.len(), 1);
}

#[test]
fn codebase_hash_tracks_content_changes() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);
    workspace.scan(false, None).unwrap();
    let before = ManifestStore::load(tree.manifest_file())
        .unwrap()
        .get()
        .codebase_hash
        .clone();

    tree.add_file("src/b.ts", "export const LIMIT = 4;\n");
    workspace.scan(true, None).unwrap();
    let after = ManifestStore::load(tree.manifest_file())
        .unwrap()
        .get()
        .codebase_hash
        .clone();
    assert_ne!(before, after);
}

#[test]
fn manifest_queries_answer_where_and_file() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);
    workspace.scan(false, None).unwrap();

    let hits = workspace
        .query_patterns(&PatternQuery {
            text: Some("logger".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].total_count, 2);

    let file = workspace.query_file("src/a.ts").unwrap().unwrap();
    assert_eq!(file.patterns.len(), 1);
    let by_glob = workspace.query_file("src/*.ts").unwrap().unwrap();
    assert!(by_glob.file.starts_with("src/"));
}

#[test]
fn pattern_store_roundtrip_is_lossless() {
    let tree = sample_workspaces::logger_tree();
    let workspace = open(&tree);
    workspace.scan(false, None).unwrap();

    let original = PatternStore::initialize(tree.patterns_file()).unwrap();
    let reloaded = PatternStore::initialize(tree.patterns_file()).unwrap();
    assert_eq!(original.len(), reloaded.len());
    for pattern in original.get_all() {
        let other = reloaded.get(&pattern.id).unwrap();
        assert_eq!(pattern.locations, other.locations);
        assert_eq!(pattern.outliers, other.outliers);
        assert_eq!(pattern.status, other.status);
        assert_eq!(pattern.confidence, other.confidence);
    }
}
