//! Exclusive workspace writer lock
//!
//! All on-disk mutation of the pattern store, manifest, and file map in
//! watch mode happens while holding `.drift/index/.lock`. The lock file
//! records {pid, timestamp, holder}; a lock whose timestamp is older than
//! the stale timeout is reclaimable. Readers never take the lock and must
//! tolerate momentarily inconsistent on-disk state.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Holder process id
    pub pid: u32,
    /// When the lock was taken
    pub timestamp: DateTime<Utc>,
    /// Free-form holder name (always present)
    pub holder: String,
}

/// Timeouts governing acquisition
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// A lock older than this is treated as stale and reclaimed
    pub stale_timeout: Duration,
    /// Interval between acquisition attempts
    pub retry_interval: Duration,
    /// Overall acquisition deadline
    pub acquire_timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(100),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// The exclusive workspace lock
pub struct WorkspaceLock {
    path: PathBuf,
    options: LockOptions,
}

impl WorkspaceLock {
    /// Creates a lock handle over the given lock file path
    pub fn new(path: impl Into<PathBuf>, options: LockOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// The lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires the lock, retrying until the acquisition timeout elapses.
    ///
    /// Returns a guard that releases on drop. Failure is recoverable:
    /// callers may retry later.
    pub fn acquire(&self, holder: &str) -> Result<LockGuard> {
        let deadline = Instant::now() + self.options.acquire_timeout;
        loop {
            match self.try_acquire(holder) {
                Ok(guard) => return Ok(guard),
                Err(_) if Instant::now() < deadline => {
                    if self.reclaim_if_stale()? {
                        continue;
                    }
                    std::thread::sleep(self.options.retry_interval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs `f` while holding the lock, releasing it afterwards even when
    /// `f` fails
    pub fn with_lock<T>(&self, holder: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let guard = self.acquire(holder)?;
        let result = f();
        drop(guard);
        result
    }

    fn try_acquire(&self, holder: &str) -> Result<LockGuard> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Lock(format!("cannot create lock directory: {e}")))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| Error::Lock(format!("lock at {} is held: {e}", self.path.display())))?;
        let info = LockInfo {
            pid: std::process::id(),
            timestamp: Utc::now(),
            holder: holder.to_string(),
        };
        let json = serde_json::to_vec(&info)?;
        file.write_all(&json)
            .map_err(|e| Error::Lock(format!("cannot write lock file: {e}")))?;
        debug!("lock acquired by {holder} (pid {})", info.pid);
        Ok(LockGuard {
            path: self.path.clone(),
            pid: info.pid,
        })
    }

    /// Reads the current lock and unlinks it when its timestamp is older
    /// than the stale timeout. Returns true when a stale lock was removed.
    fn reclaim_if_stale(&self) -> Result<bool> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            // Holder released between our attempt and this read.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(Error::Lock(format!("cannot read lock file: {e}"))),
        };
        let info: LockInfo = match serde_json::from_str(&content) {
            Ok(i) => i,
            Err(_) => {
                // An unparseable lock cannot prove freshness; reclaim it.
                warn!("removing unparseable lock file at {}", self.path.display());
                let _ = std::fs::remove_file(&self.path);
                return Ok(true);
            }
        };
        let age = Utc::now() - info.timestamp;
        let stale = age
            .to_std()
            .map(|a| a > self.options.stale_timeout)
            .unwrap_or(false);
        if stale {
            warn!(
                "reclaiming stale lock held by {} (pid {}, {}s old)",
                info.holder,
                info.pid,
                age.num_seconds()
            );
            let _ = std::fs::remove_file(&self.path);
            return Ok(true);
        }
        Ok(false)
    }
}

/// Guard returned by a successful acquisition; releases on drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
}

impl LockGuard {
    /// Releases the lock, unlinking the file only when the recorded pid
    /// matches this process
    fn release(&self) {
        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            .is_some_and(|info| info.pid == self.pid);
        if ours {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("failed to release lock at {}: {e}", self.path.display());
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_options() -> LockOptions {
        LockOptions {
            stale_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(10),
            acquire_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        let lock = WorkspaceLock::new(&lock_path, quick_options());

        {
            let _guard = lock.acquire("test").unwrap();
            assert!(lock_path.exists());
            let info: LockInfo =
                serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
            assert_eq!(info.pid, std::process::id());
            assert_eq!(info.holder, "test");
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_contention_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        let lock = WorkspaceLock::new(&lock_path, quick_options());

        let _guard = lock.acquire("first").unwrap();
        let second = WorkspaceLock::new(&lock_path, quick_options());
        let err = second.acquire("second").unwrap_err();
        assert!(err.is_recoverable());
        // The holder's lock survives the failed attempt.
        assert!(lock_path.exists());
    }

    #[test]
    fn test_stale_lock_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        let stale = LockInfo {
            pid: 999_999,
            timestamp: Utc::now() - chrono::Duration::seconds(60),
            holder: "dead".to_string(),
        };
        std::fs::write(&lock_path, serde_json::to_vec(&stale).unwrap()).unwrap();

        let lock = WorkspaceLock::new(&lock_path, quick_options());
        let _guard = lock.acquire("live").unwrap();
        let info: LockInfo =
            serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
        assert_eq!(info.holder, "live");
    }

    #[test]
    fn test_with_lock_releases_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        let lock = WorkspaceLock::new(&lock_path, quick_options());

        let result: Result<()> =
            lock.with_lock("test", || Err(Error::Generic("boom".to_string())));
        assert!(result.is_err());
        assert!(!lock_path.exists());
    }
}
