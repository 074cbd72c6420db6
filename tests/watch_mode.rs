//! Watch-mode engine tests: debounced merging, idempotence, deletion
//! handling, and lock behaviour during saves.

mod common;

use std::path::Path;

use common::{sample_workspaces, TestWorkspace};
use driftscan::store::{LockInfo, PatternStore};
use driftscan::watch::{WatchConfig, WatchOutcome};
use driftscan::{WatchEngine, Workspace};
use pretty_assertions::assert_eq;

fn engine_for(tree: &TestWorkspace) -> WatchEngine {
    let workspace = Workspace::open(&tree.root_path, tree.create_config());
    workspace
        .watch(WatchConfig {
            debounce_ms: 0,
            save_debounce_ms: 0,
            ..WatchConfig::default()
        })
        .unwrap()
}

#[test]
fn event_merges_file_into_stores() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);

    engine.on_event(Path::new("src/a.ts"));
    let outcomes = engine.tick().unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        WatchOutcome::Updated { path, patterns, .. } => {
            assert_eq!(path, Path::new("src/a.ts"));
            assert_eq!(*patterns, 1);
        }
        other => panic!("expected update, got {other:?}"),
    }

    assert_eq!(engine.pattern_store().len(), 1);
    assert!(engine.file_map().hash_of(Path::new("src/a.ts")).is_some());
    // The save debounce fired within the same tick window eventually.
    engine.save_all().unwrap();
    assert!(tree.patterns_file().exists());
}

#[test]
fn unchanged_file_is_a_noop() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);

    engine.on_event(Path::new("src/a.ts"));
    engine.tick().unwrap();
    let recorded = engine
        .file_map()
        .hash_of(Path::new("src/a.ts"))
        .unwrap()
        .to_string();

    engine.on_event(Path::new("src/a.ts"));
    let outcomes = engine.tick().unwrap();
    assert_eq!(
        outcomes,
        vec![WatchOutcome::Unchanged("src/a.ts".into())]
    );
    assert_eq!(
        engine.file_map().hash_of(Path::new("src/a.ts")).unwrap(),
        recorded
    );
}

#[test]
fn deleted_file_is_purged_from_all_stores() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);

    engine.on_event(Path::new("src/a.ts"));
    engine.tick().unwrap();
    assert_eq!(engine.pattern_store().len(), 1);

    tree.remove_file("src/a.ts");
    engine.on_event(Path::new("src/a.ts"));
    let outcomes = engine.tick().unwrap();
    assert_eq!(outcomes, vec![WatchOutcome::Removed("src/a.ts".into())]);
    assert_eq!(engine.pattern_store().len(), 0);
    assert!(engine.file_map().hash_of(Path::new("src/a.ts")).is_none());
}

#[test]
fn ignored_paths_never_schedule_work() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);

    engine.on_event(Path::new("node_modules/pkg/index.js"));
    engine.on_event(Path::new("README.md"));
    engine.on_event(Path::new(".drift/patterns.json"));
    assert!(engine.tick().unwrap().is_empty());
}

#[test]
fn debounce_keeps_only_the_final_event() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);

    for _ in 0..5 {
        engine.on_event(Path::new("src/a.ts"));
    }
    let outcomes = engine.tick().unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[test]
fn save_writes_hold_the_lock_and_release_it() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);
    engine.on_event(Path::new("src/a.ts"));
    engine.tick().unwrap();

    engine.save_all().unwrap();
    // Released after the write; the documents landed.
    assert!(!tree.lock_file().exists());
    assert!(tree.patterns_file().exists());
    assert!(tree.root_path.join(".drift/index/file-map.json").exists());
}

#[test]
fn stale_lock_is_reclaimed_by_a_save() {
    let tree = sample_workspaces::logger_tree();
    let mut engine = engine_for(&tree);
    engine.on_event(Path::new("src/a.ts"));
    engine.tick().unwrap();

    // A dead process left a lock behind a minute ago.
    let stale = LockInfo {
        pid: 999_999,
        timestamp: chrono::Utc::now() - chrono::Duration::seconds(60),
        holder: "dead-watcher".to_string(),
    };
    std::fs::create_dir_all(tree.lock_file().parent().unwrap()).unwrap();
    std::fs::write(&tree.lock_file(), serde_json::to_vec(&stale).unwrap()).unwrap();

    engine.save_all().unwrap();
    assert!(!tree.lock_file().exists());

    let store = PatternStore::initialize(tree.patterns_file()).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn watch_merge_matches_offline_scan() {
    let tree = sample_workspaces::logger_tree();

    // Offline scan on a sibling copy of the same content.
    let offline = sample_workspaces::logger_tree();
    let workspace = Workspace::open(&offline.root_path, offline.create_config());
    workspace.scan(false, None).unwrap();
    let offline_store = PatternStore::initialize(offline.patterns_file()).unwrap();

    let mut engine = engine_for(&tree);
    for file in ["src/a.ts", "src/b.ts", "src/c.ts"] {
        engine.on_event(Path::new(file));
        engine.tick().unwrap();
    }

    // Same stable ids, same evidence counts, regardless of which engine
    // produced them.
    assert_eq!(engine.pattern_store().len(), offline_store.len());
    for pattern in offline_store.get_all() {
        let online = engine.pattern_store().get(&pattern.id).unwrap();
        assert_eq!(online.locations.len(), pattern.locations.len());
        assert_eq!(online.outliers.len(), pattern.outliers.len());
    }
}
