//! Pattern-compliance gate
//!
//! Checks the learned patterns against the change set: outliers newly
//! introduced by the changed files count against the configured budget,
//! and the overall compliance rate must clear the configured floor.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::Result;
use crate::gates::{Gate, GateInput, GateKind, GateOutcome, GateStatus, GateViolation};
use crate::model::{PatternStatus, Severity};

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct ComplianceConfig {
    approved_only: bool,
    min_compliance_rate: f64,
    max_new_outliers: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            approved_only: true,
            min_compliance_rate: 0.8,
            max_new_outliers: 0,
        }
    }
}

/// Checks approved patterns against the supplied files
pub struct PatternComplianceGate;

impl Gate for PatternComplianceGate {
    fn kind(&self) -> GateKind {
        GateKind::PatternCompliance
    }

    fn execute(&self, input: &GateInput) -> Result<GateOutcome> {
        let config: ComplianceConfig =
            serde_json::from_value(input.config.clone()).unwrap_or_default();
        let changed: HashSet<String> = input
            .files
            .iter()
            .map(|f| f.to_string_lossy().replace('\\', "/"))
            .collect();

        let considered: Vec<_> = input
            .context
            .patterns
            .iter()
            .filter(|p| !config.approved_only || p.status == PatternStatus::Approved)
            .filter(|p| p.status != PatternStatus::Ignored)
            .collect();

        let mut conforming = 0usize;
        let mut existing_outliers = 0usize;
        let mut violations = Vec::new();
        for pattern in &considered {
            conforming += pattern.locations.len();
            for outlier in &pattern.outliers {
                let file = outlier.location.file.to_string_lossy().replace('\\', "/");
                if changed.contains(&file) {
                    violations.push(GateViolation {
                        severity: Severity::Error,
                        message: format!("{}: {}", pattern.name, outlier.reason),
                        file: Some(file),
                        line: Some(outlier.location.line),
                    });
                } else {
                    existing_outliers += 1;
                }
            }
        }
        let new_outliers = violations.len();
        let total = conforming + existing_outliers + new_outliers;
        let compliance = if total == 0 {
            1.0
        } else {
            conforming as f64 / total as f64
        };

        let passed =
            compliance >= config.min_compliance_rate && new_outliers <= config.max_new_outliers;
        Ok(GateOutcome {
            gate: GateKind::PatternCompliance,
            status: if passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            passed,
            score: compliance * 100.0,
            summary: format!(
                "{:.0}% compliant across {} patterns, {new_outliers} new outliers",
                compliance * 100.0,
                considered.len()
            ),
            violations,
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::json!({
                "patterns": considered.len(),
                "conforming": conforming,
                "existing_outliers": existing_outliers,
                "new_outliers": new_outliers,
            }),
            error: None,
        })
    }
}
