//! driftscan: an architectural-drift analyzer
//!
//! This library learns the recurring structural, security, data-access,
//! and stylistic patterns of a polyglot source tree, persists them as an
//! evolving knowledge base under `.drift/`, and reports locations where
//! subsequent code deviates from the learned norms.
//!
//! # Features
//!
//! - **Ignore-aware walking**: gitignore-style rules layered per directory
//! - **Pluggable detectors**: a registry of per-language detection units
//! - **Learned patterns**: a confidence-scored catalog with a lifecycle
//!   (`discovered`, then `approved` or `ignored`) that survives re-scans
//! - **Incremental re-scans**: content hashes drive surgical invalidation
//! - **Watch mode**: debounced online merging under an exclusive lock
//! - **Quality gates**: policy-driven pass/fail over a change set
//!
//! # Quick Start
//!
//! ```no_run
//! use driftscan::{Config, Workspace};
//!
//! let workspace = Workspace::open(".", Config::default());
//! let summary = workspace.scan(false, None)?;
//!
//! println!("{} patterns learned", summary.patterns);
//! # Ok::<(), driftscan::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`walker`]: ignore-aware file walking
//! - [`lang`]: extension to language resolution
//! - [`detectors`]: detector contract, registry, and context building
//! - [`scan`]: parallel scan orchestration and incremental planning
//! - [`store`]: the pattern catalog, manifest, file map, and lock
//! - [`watch`]: the online merge engine
//! - [`primitives`]: the framework primitive catalog
//! - [`constraints`]: invariant derivation
//! - [`contracts`]: backend/frontend contract matching
//! - [`gates`]: quality-gate orchestration and history

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constraints;
pub mod contracts;
pub mod detectors;
pub mod error;
pub mod gates;
pub mod hash;
pub mod lang;
pub mod model;
pub mod primitives;
pub mod scan;
pub mod store;
pub mod walker;
pub mod watch;
pub mod workspace;

pub use config::Config;
pub use error::{Error, Result};
pub use lang::Language;
pub use workspace::{ScanSummary, Workspace};

// Re-export the high-traffic types for consumers
pub use detectors::{DetectionContext, Detector, DetectorRegistry};
pub use gates::{GatePolicy, GateRequest, GateRunReport};
pub use model::{PatternCategory, PatternStatus, StoredPattern};
pub use scan::{ScanConfig, ScanOrchestrator, ScanReport};
pub use store::{ManifestStore, PatternQuery, PatternStore};
pub use watch::{WatchConfig, WatchEngine};
