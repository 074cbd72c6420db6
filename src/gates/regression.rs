//! Regression-detection gate
//!
//! Compares current pattern health against the previous snapshot:
//! per-pattern confidence and compliance deltas plus newly appeared
//! outliers. A regression in a critical category or a delta beyond its
//! configured cap fails the gate. The previous snapshot itself is never
//! mutated.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gates::{Gate, GateInput, GateKind, GateOutcome, GateStatus, GateViolation};
use crate::model::{PatternCategory, Severity};

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RegressionConfig {
    /// Maximum tolerated confidence drop, in points of 100
    max_confidence_drop: f64,
    /// Maximum tolerated compliance drop, in points of 100
    max_compliance_drop: f64,
    /// Categories where any regression fails the gate
    critical_categories: Vec<PatternCategory>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            max_confidence_drop: 10.0,
            max_compliance_drop: 10.0,
            critical_categories: vec![
                PatternCategory::Security,
                PatternCategory::Auth,
                PatternCategory::DataAccess,
            ],
        }
    }
}

/// How bad one pattern's regression is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum RegressionSeverity {
    Minor,
    Moderate,
    Severe,
}

fn classify(drop: f64, cap: f64) -> RegressionSeverity {
    if drop >= cap {
        RegressionSeverity::Severe
    } else if drop >= cap / 2.0 {
        RegressionSeverity::Moderate
    } else {
        RegressionSeverity::Minor
    }
}

/// Detects health regressions against the previous snapshot
pub struct RegressionGate;

impl Gate for RegressionGate {
    fn kind(&self) -> GateKind {
        GateKind::Regression
    }

    fn execute(&self, input: &GateInput) -> Result<GateOutcome> {
        let config: RegressionConfig =
            serde_json::from_value(input.config.clone()).unwrap_or_default();
        let Some(previous) = &input.context.previous_snapshot else {
            return Ok(GateOutcome::skipped(
                GateKind::Regression,
                "no previous snapshot",
            ));
        };

        let mut violations = Vec::new();
        let mut worst_drop: f64 = 0.0;
        let mut regressions = 0usize;

        for pattern in &input.context.patterns {
            let Some(baseline) = previous.patterns.get(&pattern.id) else {
                continue;
            };
            let confidence = pattern.confidence.score * 100.0;
            let conforming = pattern.locations.len();
            let outliers = pattern.outliers.len();
            let compliance = if conforming + outliers == 0 {
                100.0
            } else {
                conforming as f64 / (conforming + outliers) as f64 * 100.0
            };

            let confidence_drop = baseline.confidence - confidence;
            let compliance_drop = baseline.compliance - compliance;
            let new_outliers = outliers.saturating_sub(baseline.outliers);
            let is_critical = config.critical_categories.contains(&pattern.category);
            let regressed = confidence_drop > 0.0 || compliance_drop > 0.0 || new_outliers > 0;
            if !regressed {
                continue;
            }
            regressions += 1;
            worst_drop = worst_drop.max(confidence_drop).max(compliance_drop);

            let over_cap = confidence_drop > config.max_confidence_drop
                || compliance_drop > config.max_compliance_drop;
            if over_cap || is_critical {
                let severity = classify(
                    confidence_drop.max(compliance_drop),
                    config.max_confidence_drop,
                );
                violations.push(GateViolation {
                    severity: Severity::Error,
                    message: format!(
                        "{} regressed ({severity:?}): confidence {:.0}->{:.0}, compliance {:.0}->{:.0}, {} new outliers",
                        pattern.name,
                        baseline.confidence,
                        confidence,
                        baseline.compliance,
                        compliance,
                        new_outliers
                    ),
                    file: None,
                    line: None,
                });
            }
        }

        let passed = violations.is_empty();
        let score = (100.0 - worst_drop).clamp(0.0, 100.0);
        Ok(GateOutcome {
            gate: GateKind::Regression,
            status: if passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            passed,
            score,
            summary: format!(
                "{regressions} regressed patterns against snapshot {}",
                previous.id
            ),
            violations,
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::json!({
                "baseline": previous.id,
                "regressions": regressions,
                "worst_drop": worst_drop,
            }),
            error: None,
        })
    }
}
