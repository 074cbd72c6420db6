//! Gate-run and health-snapshot stores
//!
//! Append-only file-per-record stores under the quality-gates directory.
//! Record ids embed a monotonic timestamp, so lexicographic filename
//! order is chronological order. Both stores are bounded caches: once a
//! bound is exceeded the oldest files are deleted; cleanup errors are
//! silent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{sanitize_branch, write_atomic};

/// Default cap on retained gate runs
pub const MAX_RUNS: usize = 100;

/// Default cap on retained snapshots per branch
pub const MAX_SNAPSHOTS_PER_BRANCH: usize = 50;

/// Per-gate result embedded in a run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateScore {
    /// Whether the gate passed
    pub passed: bool,
    /// Score 0-100
    pub score: f64,
}

/// One quality-gate run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRunRecord {
    /// Record id (embeds the run timestamp)
    pub id: String,
    /// When the run happened
    pub timestamp: DateTime<Utc>,
    /// Branch the run evaluated
    pub branch: String,
    /// Commit, when known
    #[serde(default)]
    pub commit: Option<String>,
    /// Policy that ran
    pub policy_id: String,
    /// Overall verdict
    pub passed: bool,
    /// Overall score 0-100
    pub score: f64,
    /// Per-gate results keyed by gate id
    pub gates: BTreeMap<String, GateScore>,
    /// Total violations across gates
    pub violations: usize,
    /// Execution duration
    pub duration_ms: u128,
    /// Whether the run happened in CI
    pub ci: bool,
}

/// Pattern health inside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternHealth {
    /// Confidence 0-100
    pub confidence: f64,
    /// Compliance 0-100
    pub compliance: f64,
    /// Conforming location count
    pub locations: usize,
    /// Outlier count
    pub outliers: usize,
}

/// Constraint health inside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintHealth {
    /// Whether the constraint held
    pub satisfied: bool,
    /// Confidence 0-1
    pub confidence: f64,
}

/// Security summary inside a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecuritySummary {
    /// Percent of data-reaching entry points with auth in their chain
    pub auth_coverage: f64,
    /// Sensitive access point count
    pub sensitive_access: usize,
    /// Tables whose sensitive accesses are all guarded
    pub protected_tables: usize,
    /// Tables with unguarded sensitive access
    pub unprotected_tables: usize,
}

/// Entity counts inside a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotCounts {
    /// Patterns observed
    pub patterns: usize,
    /// Constraints evaluated
    pub constraints: usize,
    /// Files in the change set
    pub files: usize,
}

/// A point-in-time summary of the codebase's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Record id (embeds the snapshot timestamp)
    pub id: String,
    /// Branch
    pub branch: String,
    /// Commit, when known
    #[serde(default)]
    pub commit: Option<String>,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Overall health score 0-100
    pub health_score: f64,
    /// Per-pattern health keyed by stable pattern id
    pub patterns: BTreeMap<String, PatternHealth>,
    /// Per-constraint health keyed by invariant id
    pub constraints: BTreeMap<String, ConstraintHealth>,
    /// Security posture
    pub security: SecuritySummary,
    /// Entity counts
    pub counts: SnapshotCounts,
}

/// Formats a timestamp into a sortable record id component
pub fn record_id(prefix: &str, timestamp: DateTime<Utc>) -> String {
    format!("{prefix}-{}", timestamp.format("%Y%m%dT%H%M%S%3fZ"))
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Store {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| Error::Store {
        path: path.to_path_buf(),
        message: format!("corrupt record: {e}"),
    })
}

/// Lists a directory's JSON files sorted by filename, newest first
fn list_records(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files.reverse();
    files
}

/// Deletes the oldest files beyond `cap`; errors are silent
fn enforce_bound(dir: &Path, cap: usize) {
    let files = list_records(dir);
    for stale in files.iter().skip(cap) {
        let _ = std::fs::remove_file(stale);
    }
}

/// Bounded store of gate runs under `history/runs/`
pub struct RunHistoryStore {
    dir: PathBuf,
    cap: usize,
}

impl RunHistoryStore {
    /// Creates a store over the runs directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cap: MAX_RUNS,
        }
    }

    /// Overrides the retention bound
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// Appends a run record and enforces the bound
    pub fn save(&self, record: &GateRunRecord) -> Result<()> {
        let path = self.dir.join(format!("{}.json", record.id));
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &json).map_err(|e| Error::Store {
            path,
            message: e.to_string(),
        })?;
        enforce_bound(&self.dir, self.cap);
        Ok(())
    }

    /// The newest `limit` runs
    pub fn get_recent(&self, limit: usize) -> Vec<GateRunRecord> {
        list_records(&self.dir)
            .iter()
            .take(limit)
            .filter_map(|p| read_record(p).ok())
            .collect()
    }

    /// The newest `limit` runs on one branch
    pub fn get_by_branch(&self, branch: &str, limit: usize) -> Vec<GateRunRecord> {
        self.get_recent(self.cap)
            .into_iter()
            .filter(|r| r.branch == branch)
            .take(limit)
            .collect()
    }
}

/// Bounded per-branch store of health snapshots
pub struct SnapshotStore {
    base_dir: PathBuf,
    cap_per_branch: usize,
}

impl SnapshotStore {
    /// Creates a store over the snapshots base directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cap_per_branch: MAX_SNAPSHOTS_PER_BRANCH,
        }
    }

    /// Overrides the per-branch retention bound
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap_per_branch = cap;
        self
    }

    fn branch_dir(&self, branch: &str) -> PathBuf {
        self.base_dir.join(sanitize_branch(branch))
    }

    /// Appends a snapshot and enforces the per-branch bound
    pub fn save(&self, snapshot: &HealthSnapshot) -> Result<()> {
        let dir = self.branch_dir(&snapshot.branch);
        let path = dir.join(format!("{}.json", snapshot.id));
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&path, &json).map_err(|e| Error::Store {
            path,
            message: e.to_string(),
        })?;
        enforce_bound(&dir, self.cap_per_branch);
        Ok(())
    }

    /// The newest `limit` snapshots on one branch
    pub fn get_by_branch(&self, branch: &str, limit: usize) -> Vec<HealthSnapshot> {
        list_records(&self.branch_dir(branch))
            .iter()
            .take(limit)
            .filter_map(|p| read_record(p).ok())
            .collect()
    }

    /// The newest snapshot on one branch
    pub fn latest(&self, branch: &str) -> Option<HealthSnapshot> {
        self.get_by_branch(branch, 1).into_iter().next()
    }

    /// Linear-scans one branch for a snapshot of a commit
    pub fn get_by_commit(&self, branch: &str, commit: &str) -> Option<HealthSnapshot> {
        self.get_by_branch(branch, self.cap_per_branch)
            .into_iter()
            .find(|s| s.commit.as_deref() == Some(commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id_suffix: u32, branch: &str) -> GateRunRecord {
        GateRunRecord {
            id: format!("run-2026080100{id_suffix:04}"),
            timestamp: Utc::now(),
            branch: branch.to_string(),
            commit: None,
            policy_id: "standard".to_string(),
            passed: true,
            score: 90.0,
            gates: BTreeMap::new(),
            violations: 0,
            duration_ms: 10,
            ci: false,
        }
    }

    fn snapshot(id_suffix: u32, branch: &str, commit: Option<&str>) -> HealthSnapshot {
        HealthSnapshot {
            id: format!("snap-2026080100{id_suffix:04}"),
            branch: branch.to_string(),
            commit: commit.map(str::to_string),
            timestamp: Utc::now(),
            health_score: 80.0,
            patterns: BTreeMap::new(),
            constraints: BTreeMap::new(),
            security: SecuritySummary::default(),
            counts: SnapshotCounts::default(),
        }
    }

    #[test]
    fn test_run_bound_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunHistoryStore::new(dir.path()).with_cap(3);
        for i in 0..5 {
            store.save(&run(i, "main")).unwrap();
        }
        let recent = store.get_recent(10);
        assert_eq!(recent.len(), 3);
        // newest first
        assert_eq!(recent[0].id, "run-20260801000004");
        assert_eq!(recent[2].id, "run-20260801000002");
    }

    #[test]
    fn test_branch_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunHistoryStore::new(dir.path());
        store.save(&run(1, "main")).unwrap();
        store.save(&run(2, "feature/x")).unwrap();
        assert_eq!(store.get_by_branch("main", 10).len(), 1);
    }

    #[test]
    fn test_snapshot_branch_dirs_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&snapshot(1, "feature/login", None)).unwrap();
        assert!(dir.path().join("feature-login").exists());
        assert_eq!(store.get_by_branch("feature/login", 10).len(), 1);
    }

    #[test]
    fn test_snapshot_by_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&snapshot(1, "main", Some("abc123"))).unwrap();
        store.save(&snapshot(2, "main", Some("def456"))).unwrap();
        let found = store.get_by_commit("main", "abc123").unwrap();
        assert_eq!(found.id, "snap-20260801000001");
        assert!(store.get_by_commit("main", "zzz").is_none());
    }

    #[test]
    fn test_record_id_is_sortable() {
        let early = record_id("run", Utc::now());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let late = record_id("run", Utc::now());
        assert!(late > early);
    }
}
