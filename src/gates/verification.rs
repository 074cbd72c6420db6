//! Constraint-verification gate
//!
//! Evaluates the derived invariants against the change set. An invariant
//! is satisfied when it has no violating evidence, or when none of its
//! violating samples fall inside the changed files; the gate passes when
//! every considered invariant is satisfied.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::Result;
use crate::gates::{Gate, GateInput, GateKind, GateOutcome, GateStatus, GateViolation};
use crate::model::{PatternSeverity, Severity};

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
struct VerificationConfig {
    /// Also evaluate invariants whose confidence is below 0.95
    include_discovered: bool,
}

/// Verifies derived constraints over the change set
pub struct ConstraintVerificationGate;

impl Gate for ConstraintVerificationGate {
    fn kind(&self) -> GateKind {
        GateKind::ConstraintVerification
    }

    fn execute(&self, input: &GateInput) -> Result<GateOutcome> {
        let config: VerificationConfig =
            serde_json::from_value(input.config.clone()).unwrap_or_default();
        let changed: HashSet<String> = input
            .files
            .iter()
            .map(|f| f.to_string_lossy().replace('\\', "/"))
            .collect();

        let considered: Vec<_> = input
            .context
            .invariants
            .iter()
            .filter(|inv| config.include_discovered || inv.confidence >= 0.95)
            .collect();
        if considered.is_empty() {
            return Ok(GateOutcome::skipped(
                GateKind::ConstraintVerification,
                "no constraints to verify",
            ));
        }

        let mut satisfied = 0usize;
        let mut violations = Vec::new();
        for invariant in &considered {
            let offending: Vec<_> = invariant
                .evidence
                .samples_violating
                .iter()
                .filter(|loc| {
                    changed.is_empty()
                        || changed.contains(&loc.file.to_string_lossy().replace('\\', "/"))
                })
                .collect();
            if invariant.evidence.violating == 0 || offending.is_empty() {
                satisfied += 1;
                continue;
            }
            for location in offending {
                violations.push(GateViolation {
                    severity: match invariant.severity {
                        PatternSeverity::Error => Severity::Error,
                        PatternSeverity::Warning => Severity::Warning,
                        PatternSeverity::Info => Severity::Info,
                    },
                    message: invariant.description.clone(),
                    file: Some(location.file.to_string_lossy().replace('\\', "/")),
                    line: Some(location.line),
                });
            }
        }

        let total = considered.len();
        let score = satisfied as f64 / total as f64 * 100.0;
        let passed = satisfied == total;
        Ok(GateOutcome {
            gate: GateKind::ConstraintVerification,
            status: if passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            passed,
            score,
            summary: format!("{satisfied}/{total} constraints satisfied"),
            violations,
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::json!({
                "considered": total,
                "satisfied": satisfied,
            }),
            error: None,
        })
    }
}
