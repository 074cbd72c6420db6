//! Bundled regex detectors
//!
//! A small set of regex-kind detectors covering the critical categories so
//! the pipeline is exercised end-to-end out of the box. The full detector
//! catalog is an external artifact registered through
//! [`registry::initialize`](super::registry::initialize).

use std::sync::Arc;

use regex::Regex;

use crate::detectors::{DetectionContext, Detector};
use crate::error::Result;
use crate::lang::Language;
use crate::model::{
    DetectionKind, DetectionResult, Location, PatternCategory, PatternMatch, Severity, Violation,
};

/// All bundled detectors
pub fn builtin_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(RestEndpointDetector::new()),
        Arc::new(StructuredLoggerDetector::new()),
        Arc::new(TryCatchDetector::new()),
        Arc::new(RawSqlDetector::new()),
    ]
}

const WEB_LANGUAGES: &[Language] = &[
    Language::TypeScript,
    Language::JavaScript,
    Language::Python,
    Language::Java,
    Language::CSharp,
    Language::Php,
    Language::Go,
];

const ALL_LANGUAGES: &[Language] = &[
    Language::TypeScript,
    Language::JavaScript,
    Language::Python,
    Language::Java,
    Language::CSharp,
    Language::Php,
    Language::Go,
    Language::Rust,
    Language::Cpp,
    Language::C,
];

fn location_of(context: &DetectionContext, offset: usize, len: usize) -> Location {
    let before = &context.content[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let column = before.rsplit('\n').next().map_or(0, str::len) as u32 + 1;
    let mut loc = Location::new(context.file.clone(), line, column);
    loc.end_line = Some(line);
    loc.end_column = Some(column + len as u32);
    loc
}

/// Detects REST endpoint registrations (router calls, route decorators)
pub struct RestEndpointDetector {
    route: Regex,
}

impl RestEndpointDetector {
    /// Creates the detector
    pub fn new() -> Self {
        Self {
            route: Regex::new(
                r#"(?x)
                (?: \b(?:app|router|server)\.(?:get|post|put|delete|patch)\s*\( )
                | (?: @(?:Get|Post|Put|Delete|Patch)Mapping\b )
                | (?: @(?:app|router)\.(?:get|post|put|delete|patch|route)\s*\( )
                | (?: \[\s*Http(?:Get|Post|Put|Delete|Patch) )
                "#,
            )
            .expect("route regex is valid"),
        }
    }
}

impl Detector for RestEndpointDetector {
    fn id(&self) -> &str {
        "api/rest-endpoint"
    }

    fn name(&self) -> &str {
        "REST endpoint registration"
    }

    fn description(&self) -> &str {
        "Route registrations on the application router or via route decorators"
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Api
    }

    fn subcategory(&self) -> &str {
        "rest"
    }

    fn languages(&self) -> &[Language] {
        WEB_LANGUAGES
    }

    fn kind(&self) -> DetectionKind {
        DetectionKind::Regex
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult> {
        let mut result = DetectionResult::empty();
        for m in self.route.find_iter(&context.content) {
            result.patterns.push(PatternMatch {
                local_id: "rest-endpoint".to_string(),
                confidence: 0.9,
                location: location_of(context, m.start(), m.len()),
            });
        }
        Ok(result)
    }
}

/// Detects structured logger usage and flags bare console/print logging
pub struct StructuredLoggerDetector {
    structured: Regex,
    bare: Regex,
}

impl StructuredLoggerDetector {
    /// Creates the detector
    pub fn new() -> Self {
        Self {
            structured: Regex::new(
                r"\b(?:logger|log)\.(?:trace|debug|info|warn|warning|error|fatal)\s*\(",
            )
            .expect("structured logger regex is valid"),
            bare: Regex::new(r"\bconsole\.(?:log|error|warn)\s*\(")
                .expect("bare logger regex is valid"),
        }
    }
}

impl Detector for StructuredLoggerDetector {
    fn id(&self) -> &str {
        "logging/structured-logger"
    }

    fn name(&self) -> &str {
        "Structured logger usage"
    }

    fn description(&self) -> &str {
        "Log statements routed through the project logger rather than the console"
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Logging
    }

    fn subcategory(&self) -> &str {
        "structured"
    }

    fn languages(&self) -> &[Language] {
        ALL_LANGUAGES
    }

    fn kind(&self) -> DetectionKind {
        DetectionKind::Regex
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult> {
        let mut result = DetectionResult::empty();
        for m in self.structured.find_iter(&context.content) {
            result.patterns.push(PatternMatch {
                local_id: "structured-logger".to_string(),
                confidence: 0.85,
                location: location_of(context, m.start(), m.len()),
            });
        }
        for m in self.bare.find_iter(&context.content) {
            result.violations.push(Violation {
                severity: Severity::Warning,
                message: "console logging bypasses the project logger".to_string(),
                expected: "logger.<level>(...)".to_string(),
                actual: m.as_str().trim_end_matches('(').to_string(),
                location: location_of(context, m.start(), m.len()),
                fix: Some("route the message through the project logger".to_string()),
                explanation: None,
            });
        }
        Ok(result)
    }

    fn generate_quick_fix(&self, violation: &Violation) -> Option<String> {
        violation
            .actual
            .strip_prefix("console.")
            .map(|level| format!("logger.{}", if level == "log" { "info" } else { level }))
    }
}

/// Detects try/catch wrapping and flags silently swallowed exceptions
pub struct TryCatchDetector {
    wrapped: Regex,
    swallowed: Regex,
}

impl TryCatchDetector {
    /// Creates the detector
    pub fn new() -> Self {
        Self {
            wrapped: Regex::new(r"\btry\s*(?:\{|:)").expect("try regex is valid"),
            swallowed: Regex::new(r"(?:catch\s*(?:\([^)]*\))?\s*\{\s*\})|(?:except[^:\n]*:\s*pass\b)")
                .expect("swallow regex is valid"),
        }
    }
}

impl Detector for TryCatchDetector {
    fn id(&self) -> &str {
        "errors/try-catch-wrapper"
    }

    fn name(&self) -> &str {
        "Exception wrapping"
    }

    fn description(&self) -> &str {
        "Fallible blocks wrapped in try/catch with a non-empty handler"
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Errors
    }

    fn subcategory(&self) -> &str {
        "try-catch"
    }

    fn languages(&self) -> &[Language] {
        ALL_LANGUAGES
    }

    fn kind(&self) -> DetectionKind {
        DetectionKind::Regex
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult> {
        let mut result = DetectionResult::empty();
        for m in self.wrapped.find_iter(&context.content) {
            result.patterns.push(PatternMatch {
                local_id: "try-catch".to_string(),
                confidence: 0.8,
                location: location_of(context, m.start(), m.len()),
            });
        }
        for m in self.swallowed.find_iter(&context.content) {
            result.violations.push(Violation {
                severity: Severity::Error,
                message: "exception swallowed by an empty handler".to_string(),
                expected: "handler that logs or rethrows".to_string(),
                actual: "empty catch body".to_string(),
                location: location_of(context, m.start(), m.len()),
                fix: None,
                explanation: Some(
                    "Silently discarding exceptions hides failures from operators".to_string(),
                ),
            });
        }
        Ok(result)
    }
}

/// Detects string-built SQL passed to query functions
pub struct RawSqlDetector {
    concat: Regex,
}

impl RawSqlDetector {
    /// Creates the detector
    pub fn new() -> Self {
        Self {
            concat: Regex::new(
                r#"(?xi)
                \b(?:query|execute|exec|raw)\s*\(\s*
                (?: ["'`][^"'`]*\b(?:select|insert|update|delete)\b[^"'`]*["'`]\s*\+
                  | `[^`]*\$\{ )
                "#,
            )
            .expect("sql regex is valid"),
        }
    }
}

impl Detector for RawSqlDetector {
    fn id(&self) -> &str {
        "security/raw-sql"
    }

    fn name(&self) -> &str {
        "String-built SQL"
    }

    fn description(&self) -> &str {
        "SQL statements assembled by string concatenation or interpolation"
    }

    fn category(&self) -> PatternCategory {
        PatternCategory::Security
    }

    fn subcategory(&self) -> &str {
        "raw-sql"
    }

    fn languages(&self) -> &[Language] {
        ALL_LANGUAGES
    }

    fn kind(&self) -> DetectionKind {
        DetectionKind::Regex
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult> {
        let mut result = DetectionResult::empty();
        for m in self.concat.find_iter(&context.content) {
            result.violations.push(Violation {
                severity: Severity::Error,
                message: "SQL assembled from strings; use parameterized queries".to_string(),
                expected: "parameterized query".to_string(),
                actual: "string-concatenated SQL".to_string(),
                location: location_of(context, m.start(), m.len()),
                fix: None,
                explanation: Some(
                    "Interpolated values reach the database unescaped".to_string(),
                ),
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ProjectContext;
    use std::path::Path;

    fn context_for(file: &str, content: &str) -> DetectionContext {
        let project = Arc::new(ProjectContext::new("/ws", vec![]));
        crate::detectors::ContextBuilder::new(project)
            .build(Path::new(file), content.to_string())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_rest_endpoint_matches() {
        let ctx = context_for(
            "src/routes.ts",
            "app.get('/users', handler);\nrouter.post('/users', create);\n",
        );
        let detector = RestEndpointDetector::new();
        let result = detector.detect(&ctx).unwrap();
        assert_eq!(result.patterns.len(), 2);
        assert_eq!(result.patterns[0].location.line, 1);
        assert_eq!(result.patterns[1].location.line, 2);
    }

    #[test]
    fn test_console_logging_violation() {
        let ctx = context_for("src/svc.ts", "logger.info('ok');\nconsole.log('nope');\n");
        let detector = StructuredLoggerDetector::new();
        let result = detector.detect(&ctx).unwrap();
        assert_eq!(result.patterns.len(), 1);
        assert_eq!(result.violations.len(), 1);
        let fix = detector.generate_quick_fix(&result.violations[0]);
        assert_eq!(fix.as_deref(), Some("logger.info"));
    }

    #[test]
    fn test_empty_catch_flagged() {
        let ctx = context_for("src/a.ts", "try { work(); } catch (e) {}\n");
        let result = TryCatchDetector::new().detect(&ctx).unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].severity, Severity::Error);
    }

    #[test]
    fn test_raw_sql_flagged() {
        let ctx = context_for(
            "src/db.ts",
            "db.query('SELECT * FROM users WHERE id = ' + id);\n",
        );
        let result = RawSqlDetector::new().detect(&ctx).unwrap();
        assert_eq!(result.violations.len(), 1);
    }
}
