//! Parallel scan orchestration
//!
//! Dispatches per-file detection across a fixed-size worker pool, warming
//! every worker up front so the detector registry is loaded once per
//! worker, and aggregates the outputs order-independently. When the pool
//! cannot be built the orchestrator falls back to single-threaded
//! execution with identical aggregation.

mod aggregate;
mod incremental;

pub use aggregate::{
    AggregatedPattern, AggregatedViolation, Aggregator, DetectorMeta, DetectorOutput, FileError,
    FileOutcome, ScanReport, ScanStats,
};
pub use incremental::IncrementalPlanner;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::detectors::{
    enclosing_symbol, ContextBuilder, DetectionContext, Detector, DetectorRegistry,
};
use crate::hash;
use crate::model::{DetectionResult, PatternCategory, SemanticLocation};
use crate::walker::FileEntry;

/// Configuration of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Dispatch per-file work across a worker pool
    pub use_worker_pool: bool,
    /// Worker count (default: logical cores minus one)
    pub workers: Option<usize>,
    /// Restrict to these categories (None = all)
    pub categories: Option<Vec<PatternCategory>>,
    /// Restrict to the critical detector subset
    pub critical_only: bool,
    /// Re-scan only files whose hashes changed
    pub incremental: bool,
    /// Produce manifest patterns with semantic locations
    pub generate_manifest: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            use_worker_pool: true,
            workers: None,
            categories: None,
            critical_only: false,
            incremental: false,
            generate_manifest: true,
        }
    }
}

impl ScanConfig {
    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}

/// Dispatches detection over a file list and aggregates the results
pub struct ScanOrchestrator {
    registry: Arc<DetectorRegistry>,
    builder: ContextBuilder,
    config: ScanConfig,
}

impl ScanOrchestrator {
    /// Creates an orchestrator
    pub fn new(
        registry: Arc<DetectorRegistry>,
        builder: ContextBuilder,
        config: ScanConfig,
    ) -> Self {
        Self {
            registry,
            builder,
            config,
        }
    }

    /// The scan configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Runs detection over `files` and aggregates the outputs.
    ///
    /// Worker-level failures become per-file errors; the scan always
    /// returns a complete picture of what succeeded and what did not.
    pub fn scan(&self, files: &[FileEntry]) -> ScanReport {
        let started = Instant::now();
        info!("scanning {} files", files.len());

        let outcomes: Vec<FileOutcome> = if self.config.use_worker_pool {
            match ThreadPoolBuilder::new()
                .num_threads(self.config.worker_count())
                .build()
            {
                Ok(pool) => {
                    // Warm-up: every worker touches the registry once, in
                    // parallel, before dispatch begins.
                    pool.broadcast(|_| {
                        let _ = self.registry.len();
                    });
                    pool.install(|| {
                        files.par_iter().map(|f| self.scan_file(f)).collect()
                    })
                }
                Err(e) => {
                    warn!("worker pool unavailable ({e}), falling back to single-threaded scan");
                    files.iter().map(|f| self.scan_file(f)).collect()
                }
            }
        } else {
            files.iter().map(|f| self.scan_file(f)).collect()
        };

        let mut aggregator = Aggregator::new(self.config.generate_manifest);
        for outcome in outcomes {
            aggregator.add(outcome);
        }
        aggregator.finish(started.elapsed().as_millis())
    }

    /// Runs the full per-file pipeline for one file: read, hash, build
    /// context, run every applicable detector.
    pub fn scan_file(&self, entry: &FileEntry) -> FileOutcome {
        let content = match std::fs::read_to_string(&entry.absolute_path) {
            Ok(c) => c,
            Err(e) => {
                return FileOutcome {
                    file: entry.relative_path.clone(),
                    content_hash: String::new(),
                    language: None,
                    outputs: Vec::new(),
                    detectors_run: 0,
                    detectors_skipped: 0,
                    detector_errors: Vec::new(),
                    error: Some(format!("read failed: {e}")),
                };
            }
        };
        let content_hash = entry
            .content_hash
            .clone()
            .unwrap_or_else(|| hash::short_hash(content.as_bytes()));

        let context = match self.builder.build(&entry.relative_path, content) {
            Ok(Some(ctx)) => ctx,
            Ok(None) => {
                return FileOutcome {
                    file: entry.relative_path.clone(),
                    content_hash,
                    language: None,
                    outputs: Vec::new(),
                    detectors_run: 0,
                    detectors_skipped: 0,
                    detector_errors: Vec::new(),
                    error: None,
                };
            }
            Err(e) => {
                return FileOutcome {
                    file: entry.relative_path.clone(),
                    content_hash,
                    language: None,
                    outputs: Vec::new(),
                    detectors_run: 0,
                    detectors_skipped: 0,
                    detector_errors: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let applicable = self.registry.applicable(
            &context,
            self.config.categories.as_deref(),
            self.config.critical_only,
        );
        let detectors_skipped = self.registry.len() - applicable.len();
        let mut outputs = Vec::new();
        let mut detectors_run = 0;
        let mut detector_errors = Vec::new();

        for detector in &applicable {
            detectors_run += 1;
            match run_detector(detector.as_ref(), &context) {
                Ok(result) if result.is_empty() => {}
                Ok(result) => {
                    let semantics = if self.config.generate_manifest {
                        result
                            .patterns
                            .iter()
                            .map(|m| {
                                semantic_for(&context, &content_hash, m.location.line, m.location.end_line)
                            })
                            .collect()
                    } else {
                        Vec::new()
                    };
                    outputs.push(DetectorOutput {
                        meta: DetectorMeta {
                            id: detector.id().to_string(),
                            category: detector.category(),
                            subcategory: detector.subcategory().to_string(),
                            name: detector.name().to_string(),
                            description: detector.description().to_string(),
                            kind: detector.kind(),
                        },
                        result,
                        semantics,
                    });
                }
                Err(message) => {
                    debug!(
                        "detector {} failed on {}: {message}",
                        detector.id(),
                        entry.relative_path.display()
                    );
                    detector_errors.push((detector.id().to_string(), message));
                }
            }
        }

        FileOutcome {
            file: entry.relative_path.clone(),
            content_hash,
            language: Some(context.language),
            outputs,
            detectors_run,
            detectors_skipped,
            detector_errors,
            error: None,
        }
    }
}

/// Runs one detector, converting both errors and panics into messages so
/// a misbehaving detector never takes the scan down
fn run_detector(
    detector: &dyn Detector,
    context: &DetectionContext,
) -> std::result::Result<DetectionResult, String> {
    match catch_unwind(AssertUnwindSafe(|| detector.detect(context))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "detector panicked".to_string());
            Err(message)
        }
    }
}

fn semantic_for(
    context: &DetectionContext,
    content_hash: &str,
    line: u32,
    end_line: Option<u32>,
) -> SemanticLocation {
    let (kind, name) = enclosing_symbol(&context.content, line);
    SemanticLocation {
        file: context.file.clone(),
        content_hash: content_hash.to_string(),
        start_line: line,
        end_line: end_line.unwrap_or(line),
        kind,
        name,
        signature: None,
        language: context.language,
        confidence: 0.8,
    }
}
