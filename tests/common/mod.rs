//! Common test utilities and helpers for integration tests
#![allow(dead_code)]

use driftscan::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates a temporary directory with a sample polyglot workspace
pub struct TestWorkspace {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestWorkspace {
    /// Create a new empty workspace
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root_path = temp_dir.path().canonicalize().unwrap();
        fs::create_dir_all(root_path.join("src")).unwrap();
        Self {
            temp_dir,
            root_path,
        }
    }

    /// Add a file to the workspace
    pub fn add_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&file_path, content).unwrap();
        file_path
    }

    /// Remove a file from the workspace
    pub fn remove_file(&self, relative_path: &str) {
        fs::remove_file(self.root_path.join(relative_path)).unwrap();
    }

    /// The path of the pattern store document
    pub fn patterns_file(&self) -> PathBuf {
        self.root_path.join(".drift/patterns.json")
    }

    /// The path of the manifest document
    pub fn manifest_file(&self) -> PathBuf {
        self.root_path.join(".drift/index/manifest.json")
    }

    /// The path of the workspace lock
    pub fn lock_file(&self) -> PathBuf {
        self.root_path.join(".drift/index/.lock")
    }

    /// Create a configuration for this workspace
    pub fn create_config(&self) -> Config {
        let mut config = Config::default();
        config.project.root_dir = self.root_path.clone();
        // Worker pools add nothing on tiny test trees.
        config.scan.use_worker_pool = false;
        config
    }
}

/// Sample workspace generators
pub mod sample_workspaces {
    use super::*;

    /// A three-file TypeScript tree: one file with conforming logger
    /// usage, one with nothing of interest, one with a violation of the
    /// same pattern.
    pub fn logger_tree() -> TestWorkspace {
        let workspace = TestWorkspace::new();

        workspace.add_file(
            "src/a.ts",
            r#"
export function foo() {
  logger.info('starting');
}

export function fooDone() {
  logger.info('done');
}
"#,
        );
        workspace.add_file(
            "src/b.ts",
            r#"
export const LIMIT = 3;

export function plain(x: number): number {
  return x + LIMIT;
}
"#,
        );
        workspace.add_file(
            "src/c.ts",
            r#"
export function bar() {
  console.log('oops');
}
"#,
        );
        workspace
    }
}

/// Reads a JSON document from disk
pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}
