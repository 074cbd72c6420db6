//! Incremental re-scan planning
//!
//! Given a candidate file list, the planner compares each file's current
//! short content hash against the manifest's recorded per-file hash and
//! keeps only the files whose hashes differ. New files, for which no prior
//! hash exists, always count as changed. Hashes are computed by streaming;
//! no more of a file is read than the digest needs.

use log::debug;

use crate::hash;
use crate::store::ManifestStore;
use crate::walker::FileEntry;

/// Decides which files a scan must re-process
pub struct IncrementalPlanner<'a> {
    manifest: &'a ManifestStore,
}

impl<'a> IncrementalPlanner<'a> {
    /// Creates a planner over the current manifest
    pub fn new(manifest: &'a ManifestStore) -> Self {
        Self { manifest }
    }

    /// Filters `files` down to those whose content differs from the
    /// manifest record. Entries without a precomputed hash are hashed
    /// here; unreadable files are kept so the scan can report the error.
    pub fn plan(&self, files: &[FileEntry]) -> Vec<FileEntry> {
        let mut changed = Vec::new();
        for entry in files {
            let current_hash = match &entry.content_hash {
                Some(h) => h.clone(),
                None => match hash::hash_file(&entry.absolute_path) {
                    Ok(h) => h,
                    Err(_) => {
                        changed.push(entry.clone());
                        continue;
                    }
                },
            };
            if self
                .manifest
                .has_file_changed(&entry.relative_path, &current_hash)
            {
                let mut entry = entry.clone();
                entry.content_hash = Some(current_hash);
                changed.push(entry);
            }
        }
        debug!(
            "incremental plan: {} of {} files changed",
            changed.len(),
            files.len()
        );
        changed
    }
}
