//! Detector contract and registry
//!
//! A detector is an addressable unit that, given a file's
//! [`DetectionContext`], emits pattern matches and violations. Detectors
//! observe only their context: they must not read other files, must not
//! write anything, and must never panic across the boundary; the scan
//! orchestrator converts failures into per-file errors and continues with
//! the remaining detectors.

mod builtin;
mod context;
pub mod registry;

pub use builtin::builtin_detectors;
pub use context::{
    enclosing_symbol, is_test_file, is_type_definition_file, ContextBuilder, DetectionContext,
    ProjectContext, SyntaxTree,
};
pub use registry::{DetectorRegistry, CRITICAL_DETECTOR_IDS};

use crate::error::Result;
use crate::lang::Language;
use crate::model::{DetectionKind, DetectionResult, PatternCategory, Violation};

/// The pluggable detection unit.
///
/// Ids are of the form `"category/subcategory"` and must be stable: the
/// stable pattern id derivation includes them.
pub trait Detector: Send + Sync {
    /// Stable detector id of the form "category/subcategory"
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// What the detector looks for
    fn description(&self) -> &str;

    /// Category of the patterns this detector emits
    fn category(&self) -> PatternCategory;

    /// Subcategory within the category
    fn subcategory(&self) -> &str;

    /// Languages the detector understands
    fn languages(&self) -> &[Language];

    /// How the detector analyzes files
    fn kind(&self) -> DetectionKind;

    /// Runs detection over one file.
    ///
    /// Must be pure with respect to on-disk state. Errors are reported to
    /// the caller; they never abort the scan of the file.
    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult>;

    /// Produces a quick fix for a violation this detector emitted, if one
    /// can be derived mechanically.
    fn generate_quick_fix(&self, _violation: &Violation) -> Option<String> {
        None
    }

    /// Whether this detector wants to run on the given context.
    ///
    /// The default skips test files and type-definition files; detectors
    /// for testing conventions override this.
    fn applies_to(&self, context: &DetectionContext) -> bool {
        if self.category() == PatternCategory::Testing {
            return true;
        }
        !context.is_test && !context.is_type_def
    }
}
