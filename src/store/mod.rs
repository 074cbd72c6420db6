//! Persistent stores under `.drift/`
//!
//! All persistent state lives under `.drift/` at the workspace root:
//!
//! ```text
//! .drift/
//!   patterns.json                 (PatternStore document)
//!   index/
//!     manifest.json               (ManifestStore document)
//!     file-map.json               (watch-mode file map)
//!     .lock                       (workspace writer lock)
//!   quality-gates/
//!     snapshots/<branch>/<id>.json
//!     history/runs/<id>.json
//! ```
//!
//! Documents are UTF-8 JSON written atomically (temp file then rename).

mod file_map;
mod lock;
mod manifest;
mod patterns;

pub use file_map::{FileMap, FileMapEntry};
pub use lock::{LockInfo, LockOptions, WorkspaceLock};
pub use manifest::{
    FileQueryResult, Manifest, ManifestFileRecord, ManifestPattern, ManifestStore,
    ManifestSummary, PatternQuery, PatternQueryHit,
};
pub use patterns::{PatternSeed, PatternStore, PatternStoreStats};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolves the on-disk layout of a workspace's `.drift/` directory
#[derive(Debug, Clone)]
pub struct DriftPaths {
    root: PathBuf,
}

impl DriftPaths {
    /// Creates the layout resolver for a workspace root
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            root: workspace_root.into(),
        }
    }

    /// The workspace root
    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    /// `.drift/`
    pub fn drift_dir(&self) -> PathBuf {
        self.root.join(".drift")
    }

    /// `.drift/patterns.json`
    pub fn patterns_file(&self) -> PathBuf {
        self.drift_dir().join("patterns.json")
    }

    /// `.drift/index/`
    pub fn index_dir(&self) -> PathBuf {
        self.drift_dir().join("index")
    }

    /// `.drift/index/manifest.json`
    pub fn manifest_file(&self) -> PathBuf {
        self.index_dir().join("manifest.json")
    }

    /// `.drift/index/file-map.json`
    pub fn file_map_file(&self) -> PathBuf {
        self.index_dir().join("file-map.json")
    }

    /// `.drift/index/.lock`
    pub fn lock_file(&self) -> PathBuf {
        self.index_dir().join(".lock")
    }

    /// `.drift/quality-gates/`
    pub fn gates_dir(&self) -> PathBuf {
        self.drift_dir().join("quality-gates")
    }

    /// `.drift/quality-gates/history/runs/`
    pub fn runs_dir(&self) -> PathBuf {
        self.gates_dir().join("history").join("runs")
    }

    /// `.drift/quality-gates/snapshots/<sanitized-branch>/`
    pub fn snapshots_dir(&self, branch: &str) -> PathBuf {
        self.gates_dir()
            .join("snapshots")
            .join(sanitize_branch(branch))
    }
}

/// Replaces filesystem-hostile characters in a branch name with `-`
pub fn sanitize_branch(branch: &str) -> String {
    branch
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect()
}

/// Writes `bytes` to `path` atomically: the content lands in a temp file
/// in the same directory, which is then renamed over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("path has no parent directory"))?;
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string()),
        std::process::id()
    ));
    fs::write(&tmp, bytes)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Normalizes a path to the forward-slash string form used as map keys in
/// persisted documents
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_branch() {
        assert_eq!(sanitize_branch("feature/login"), "feature-login");
        assert_eq!(sanitize_branch("a:b*c?d"), "a-b-c-d");
        assert_eq!(sanitize_branch("main"), "main");
    }

    #[test]
    fn test_layout() {
        let paths = DriftPaths::new("/ws");
        assert_eq!(paths.patterns_file(), Path::new("/ws/.drift/patterns.json"));
        assert_eq!(
            paths.manifest_file(),
            Path::new("/ws/.drift/index/manifest.json")
        );
        assert_eq!(paths.lock_file(), Path::new("/ws/.drift/index/.lock"));
        assert_eq!(
            paths.snapshots_dir("feature/x"),
            Path::new("/ws/.drift/quality-gates/snapshots/feature-x")
        );
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("doc.json");
        write_atomic(&target, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\":1}");
        write_atomic(&target, b"{\"a\":2}").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\":2}");
        // no temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
