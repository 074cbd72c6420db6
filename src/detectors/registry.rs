//! Detector registry
//!
//! Holds the set of detectors a scan draws from, filterable by category,
//! language, and a fixed critical subset. The registry is a per-process
//! singleton with an initialise-once, read-many lifecycle and an explicit
//! reset for tests.

use std::sync::{Arc, RwLock};

use crate::detectors::{builtin_detectors, DetectionContext, Detector};
use crate::lang::Language;
use crate::model::PatternCategory;

/// Detector ids always included when a scan requests the critical subset.
///
/// Spans security, auth, API structure, data access, structure, error
/// handling, and logging.
pub const CRITICAL_DETECTOR_IDS: &[&str] = &[
    "security/raw-sql",
    "auth/guard",
    "api/rest-endpoint",
    "data-access/orm-query",
    "structural/module-layout",
    "errors/try-catch-wrapper",
    "logging/structured-logger",
];

/// The registry of detectors available to a scan
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Creates a registry pre-populated with the bundled detectors
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for detector in builtin_detectors() {
            registry.register(detector);
        }
        registry
    }

    /// Registers a detector. Later registrations with the same id replace
    /// earlier ones.
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.retain(|d| d.id() != detector.id());
        self.detectors.push(detector);
    }

    /// All registered detectors
    pub fn all(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    /// Number of registered detectors
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// True when no detectors are registered
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Looks a detector up by id
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Detector>> {
        self.detectors.iter().find(|d| d.id() == id)
    }

    /// Detectors whose category is in `categories`
    pub fn by_categories(&self, categories: &[PatternCategory]) -> Vec<Arc<dyn Detector>> {
        self.detectors
            .iter()
            .filter(|d| categories.contains(&d.category()))
            .cloned()
            .collect()
    }

    /// The fixed critical subset
    pub fn critical(&self) -> Vec<Arc<dyn Detector>> {
        self.detectors
            .iter()
            .filter(|d| CRITICAL_DETECTOR_IDS.contains(&d.id()))
            .cloned()
            .collect()
    }

    /// Detectors applicable to one file: the language must be supported,
    /// the optional category filter must intersect, and the detector must
    /// opt in for the context.
    pub fn applicable(
        &self,
        context: &DetectionContext,
        categories: Option<&[PatternCategory]>,
        critical_only: bool,
    ) -> Vec<Arc<dyn Detector>> {
        self.detectors
            .iter()
            .filter(|d| d.languages().contains(&context.language))
            .filter(|d| categories.is_none_or(|cats| cats.contains(&d.category())))
            .filter(|d| !critical_only || CRITICAL_DETECTOR_IDS.contains(&d.id()))
            .filter(|d| d.applies_to(context))
            .cloned()
            .collect()
    }

    /// Languages any registered detector supports
    pub fn supported_languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self
            .detectors
            .iter()
            .flat_map(|d| d.languages().iter().copied())
            .collect();
        langs.sort();
        langs.dedup();
        langs
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static GLOBAL: RwLock<Option<Arc<DetectorRegistry>>> = RwLock::new(None);

/// Returns the process-wide registry, initialising it with the bundled
/// detectors on first access
pub fn global() -> Arc<DetectorRegistry> {
    if let Some(existing) = GLOBAL.read().expect("registry lock poisoned").as_ref() {
        return Arc::clone(existing);
    }
    let mut slot = GLOBAL.write().expect("registry lock poisoned");
    slot.get_or_insert_with(|| Arc::new(DetectorRegistry::with_builtins()))
        .clone()
}

/// Replaces the process-wide registry
pub fn initialize(registry: DetectorRegistry) {
    *GLOBAL.write().expect("registry lock poisoned") = Some(Arc::new(registry));
}

/// Clears the process-wide registry so the next access re-initialises it.
/// Intended for tests.
pub fn reset() {
    *GLOBAL.write().expect("registry lock poisoned") = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = DetectorRegistry::with_builtins();
        assert!(!registry.is_empty());
        assert!(registry.get("api/rest-endpoint").is_some());
        assert!(registry.get("security/raw-sql").is_some());
    }

    #[test]
    fn test_category_filter() {
        let registry = DetectorRegistry::with_builtins();
        let api = registry.by_categories(&[PatternCategory::Api]);
        assert!(api.iter().all(|d| d.category() == PatternCategory::Api));
        assert!(!api.is_empty());
    }

    #[test]
    fn test_critical_subset() {
        let registry = DetectorRegistry::with_builtins();
        let critical = registry.critical();
        assert!(!critical.is_empty());
        assert!(critical
            .iter()
            .all(|d| CRITICAL_DETECTOR_IDS.contains(&d.id())));
    }

    #[test]
    fn test_replacement_by_id() {
        let mut registry = DetectorRegistry::with_builtins();
        let before = registry.len();
        let existing = registry.get("api/rest-endpoint").unwrap().clone();
        registry.register(existing);
        assert_eq!(registry.len(), before);
    }
}
