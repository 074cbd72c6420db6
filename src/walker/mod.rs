//! Ignore-aware workspace file walker
//!
//! Traverses a workspace depth-first, layering gitignore-style rules per
//! directory, and emits a [`FileEntry`] for each surviving file. Path-level
//! failures are collected, never thrown: the final [`WalkResult`] carries
//! the error list and a success flag that is true iff the list is empty.

mod options;

pub use options::WalkOptions;

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use glob::Pattern;
use ignore::WalkBuilder;
use log::{debug, warn};

use crate::hash;
use crate::lang::Language;

/// Name of the tool-specific ignore file honoured next to `.gitignore`
pub const DRIFT_IGNORE_FILE: &str = ".driftignore";

/// A file the walker emitted
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the workspace root
    pub relative_path: PathBuf,
    /// Absolute path
    pub absolute_path: PathBuf,
    /// File name
    pub name: String,
    /// Extension without the leading dot (empty when none)
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time
    pub modified: Option<SystemTime>,
    /// Creation time
    pub created: Option<SystemTime>,
    /// Whether the directory entry itself is a symlink
    pub is_symlink: bool,
    /// Detected language, when the extension resolves to one
    pub language: Option<Language>,
    /// Short content hash, when hashing was requested
    pub content_hash: Option<String>,
}

/// Kinds of per-path walk failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkErrorKind {
    /// Permission or access failure
    Access,
    /// Read failure
    Read,
    /// Symlink loop detected
    SymlinkLoop,
    /// Hash computation failure
    Hash,
    /// The root itself was unusable
    InvalidRoot,
}

/// A collected per-path failure
#[derive(Debug, Clone)]
pub struct WalkError {
    /// The path the failure occurred at (when known)
    pub path: Option<PathBuf>,
    /// Failure kind
    pub kind: WalkErrorKind,
    /// Failure description
    pub message: String,
}

/// Counters describing a traversal
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    /// Files seen before filtering
    pub files_discovered: usize,
    /// Files emitted after filtering
    pub files_emitted: usize,
    /// Directories entered
    pub dirs_visited: usize,
    /// Entries skipped by ignore rules
    pub ignored: usize,
    /// Files skipped for exceeding the size cap
    pub too_large: usize,
    /// Files skipped by the extension filter
    pub wrong_extension: usize,
    /// Files skipped by include/exclude globs
    pub filtered_by_glob: usize,
    /// Entries skipped for resolving outside the workspace root
    pub outside_root: usize,
    /// Symlinks skipped because following is disabled
    pub symlinks_skipped: usize,
}

/// Final result of a traversal
#[derive(Debug)]
pub struct WalkResult {
    /// Emitted files
    pub files: Vec<FileEntry>,
    /// Collected per-path errors
    pub errors: Vec<WalkError>,
    /// Traversal counters
    pub stats: WalkStats,
    /// True iff no errors were collected
    pub success: bool,
}

/// Phase of a traversal reported to progress callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPhase {
    /// Enumerating directory entries
    Discovering,
    /// Filtering and hashing files
    Scanning,
    /// Traversal finished
    Complete,
}

/// Progress snapshot passed to the optional progress callback
#[derive(Debug, Clone)]
pub struct WalkProgress {
    /// Current phase
    pub phase: WalkPhase,
    /// Files processed so far
    pub files_processed: usize,
    /// Percent complete (0-100); best-effort during discovery
    pub percent: u8,
    /// Milliseconds since the walk started
    pub elapsed_ms: u128,
    /// The most recently added file
    pub current: Option<PathBuf>,
}

/// Callback type for walk progress
pub type ProgressFn<'a> = dyn Fn(&WalkProgress) + 'a;

/// The workspace walker
pub struct Walker {
    root: PathBuf,
    options: WalkOptions,
}

impl Walker {
    /// Creates a walker over `root` with the given options
    pub fn new(root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Performs the traversal
    pub fn walk(&self) -> WalkResult {
        self.walk_inner(None)
    }

    /// Performs the traversal, reporting progress through `progress`
    pub fn walk_with_progress(&self, progress: &ProgressFn) -> WalkResult {
        self.walk_inner(Some(progress))
    }

    fn walk_inner(&self, progress: Option<&ProgressFn>) -> WalkResult {
        let started = Instant::now();
        let mut stats = WalkStats::default();
        let mut errors = Vec::new();
        let mut files = Vec::new();

        // A root that is missing, unreadable, or not a directory is an
        // immediate failure with a single error.
        let root = match std::fs::canonicalize(&self.root) {
            Ok(p) => p,
            Err(e) => {
                return failed_result(&self.root, WalkErrorKind::InvalidRoot, e.to_string());
            }
        };
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return failed_result(
                    &root,
                    WalkErrorKind::InvalidRoot,
                    "root is not a directory".to_string(),
                );
            }
            Err(e) => {
                return failed_result(&root, WalkErrorKind::InvalidRoot, e.to_string());
            }
        }

        report(progress, WalkPhase::Discovering, 0, 0, started, None);

        let include = compile_globs(&self.options.include, &mut errors);
        let exclude = compile_globs(&self.options.exclude, &mut errors);
        let custom = compile_globs(&self.options.custom_ignores, &mut errors);

        let mut builder = WalkBuilder::new(&root);
        builder
            .hidden(false)
            .parents(false)
            .git_global(false)
            .git_exclude(false)
            .git_ignore(self.options.respect_gitignore)
            .require_git(false)
            .ignore(false)
            .follow_links(self.options.follow_symlinks)
            .max_depth(self.options.max_depth)
            .sort_by_file_name(std::ffi::OsStr::cmp);
        if self.options.respect_driftignore {
            builder.add_custom_ignore_filename(DRIFT_IGNORE_FILE);
        }

        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    errors.push(classify_walk_error(&err));
                    continue;
                }
            };
            let path = entry.path();
            let Some(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                stats.dirs_visited += 1;
                continue;
            }
            if entry.path_is_symlink() && !self.options.follow_symlinks {
                stats.symlinks_skipped += 1;
                continue;
            }
            stats.files_discovered += 1;

            let relative = path.strip_prefix(&root).unwrap_or(path).to_path_buf();
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            // Custom ignore patterns layer on top of the gitignore stack.
            if custom.iter().any(|p| p.matches(&rel_str)) {
                stats.ignored += 1;
                continue;
            }
            if !include.is_empty() && !include.iter().any(|p| p.matches(&rel_str)) {
                stats.filtered_by_glob += 1;
                continue;
            }
            if exclude.iter().any(|p| p.matches(&rel_str)) {
                stats.filtered_by_glob += 1;
                continue;
            }

            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if let Some(allowed) = &self.options.extensions {
                if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
                    stats.wrong_extension += 1;
                    continue;
                }
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    errors.push(WalkError {
                        path: Some(path.to_path_buf()),
                        kind: WalkErrorKind::Access,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if metadata.len() > self.options.max_file_size {
                stats.too_large += 1;
                continue;
            }

            // When following symlinks, a target resolving outside the
            // workspace root is skipped rather than emitted.
            if self.options.follow_symlinks && entry.path_is_symlink() {
                match std::fs::canonicalize(path) {
                    Ok(real) if !real.starts_with(&root) => {
                        stats.outside_root += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        errors.push(WalkError {
                            path: Some(path.to_path_buf()),
                            kind: WalkErrorKind::SymlinkLoop,
                            message: e.to_string(),
                        });
                        continue;
                    }
                }
            }

            let content_hash = if self.options.compute_hashes {
                match hash::hash_file(path) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        errors.push(WalkError {
                            path: Some(path.to_path_buf()),
                            kind: WalkErrorKind::Hash,
                            message: e.to_string(),
                        });
                        continue;
                    }
                }
            } else {
                None
            };

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            files.push(FileEntry {
                relative_path: relative,
                absolute_path: path.to_path_buf(),
                name,
                extension: extension.clone(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
                created: metadata.created().ok(),
                is_symlink: entry.path_is_symlink(),
                language: Language::from_extension(&extension),
                content_hash,
            });
            stats.files_emitted += 1;

            if stats.files_emitted % 64 == 0 {
                report(
                    progress,
                    WalkPhase::Scanning,
                    stats.files_emitted,
                    50,
                    started,
                    files.last().map(|f| f.relative_path.clone()),
                );
            }
        }

        debug!(
            "walk of {} finished: {} files, {} errors",
            root.display(),
            files.len(),
            errors.len()
        );
        if !errors.is_empty() {
            warn!("walk collected {} path errors", errors.len());
        }

        report(
            progress,
            WalkPhase::Complete,
            stats.files_emitted,
            100,
            started,
            files.last().map(|f| f.relative_path.clone()),
        );

        let success = errors.is_empty();
        WalkResult {
            files,
            errors,
            stats,
            success,
        }
    }
}

fn failed_result(path: &Path, kind: WalkErrorKind, message: String) -> WalkResult {
    WalkResult {
        files: Vec::new(),
        errors: vec![WalkError {
            path: Some(path.to_path_buf()),
            kind,
            message,
        }],
        stats: WalkStats::default(),
        success: false,
    }
}

fn compile_globs(patterns: &[String], errors: &mut Vec<WalkError>) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pat) => Some(pat),
            Err(e) => {
                errors.push(WalkError {
                    path: None,
                    kind: WalkErrorKind::Read,
                    message: format!("invalid glob pattern '{p}': {e}"),
                });
                None
            }
        })
        .collect()
}

fn classify_walk_error(err: &ignore::Error) -> WalkError {
    let message = err.to_string();
    let kind = if message.contains("loop") {
        WalkErrorKind::SymlinkLoop
    } else if message.contains("permission") || message.contains("denied") {
        WalkErrorKind::Access
    } else {
        WalkErrorKind::Read
    };
    WalkError {
        path: None,
        kind,
        message,
    }
}

fn report(
    progress: Option<&ProgressFn>,
    phase: WalkPhase,
    files_processed: usize,
    percent: u8,
    started: Instant,
    current: Option<PathBuf>,
) {
    if let Some(cb) = progress {
        cb(&WalkProgress {
            phase,
            files_processed,
            percent,
            elapsed_ms: started.elapsed().as_millis(),
            current,
        });
    }
}
