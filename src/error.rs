//! Error types for the driftscan library

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for driftscan operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File walking errors that abort a traversal before it starts
    #[error("Walk error: {0}")]
    Walk(String),

    /// Detector failures at the detection boundary
    #[error("Detector error in {detector}: {message}")]
    Detector {
        /// Id of the failing detector
        detector: String,
        /// What went wrong
        message: String,
    },

    /// Persistent store errors (corrupt documents, failed writes)
    #[error("Store error at {path}: {message}")]
    Store {
        /// Document the store was operating on
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Workspace lock acquisition failures (recoverable; callers may retry)
    #[error("Lock error: {0}")]
    Lock(String),

    /// Quality-gate execution errors
    #[error("Gate error in {gate}: {message}")]
    Gate {
        /// Id of the failing gate
        gate: String,
        /// What went wrong
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parsing errors (globs, regexes, paths)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Generic errors
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Returns true for errors a caller can reasonably retry,
    /// currently only lock contention.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Lock(_))
    }
}

/// Type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;
