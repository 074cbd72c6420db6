//! Impact-simulation gate
//!
//! Estimates the blast radius of the change set from the call graph:
//! affected files and functions (transitive callers of anything defined
//! in a changed file), affected entry points, a 0-100 friction score,
//! a breaking-risk band, and paths that touch sensitive data.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gates::{Gate, GateInput, GateKind, GateOutcome, GateStatus, GateViolation};
use crate::model::Severity;

/// Risk bands for a change set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakingRisk {
    /// Contained change
    Low,
    /// Noticeable ripple
    Medium,
    /// Wide ripple or entry-point exposure
    High,
    /// Sensitive data on affected paths
    Critical,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct ImpactConfig {
    max_files_affected: usize,
    max_entry_points_affected: usize,
    max_friction: f64,
    max_risk: BreakingRisk,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            max_files_affected: 50,
            max_entry_points_affected: 10,
            max_friction: 70.0,
            max_risk: BreakingRisk::High,
        }
    }
}

/// Simulates the ripple of a change set through the call graph
pub struct ImpactSimulationGate;

impl Gate for ImpactSimulationGate {
    fn kind(&self) -> GateKind {
        GateKind::ImpactSimulation
    }

    fn execute(&self, input: &GateInput) -> Result<GateOutcome> {
        let config: ImpactConfig = serde_json::from_value(input.config.clone()).unwrap_or_default();
        let Some(graph) = &input.context.call_graph else {
            return Ok(GateOutcome::skipped(
                GateKind::ImpactSimulation,
                "no call graph",
            ));
        };

        let changed: HashSet<String> = input
            .files
            .iter()
            .map(|f| f.to_string_lossy().replace('\\', "/"))
            .collect();

        // Functions defined in changed files.
        let seeds: HashSet<&String> = graph
            .functions
            .iter()
            .filter(|(_, f)| changed.contains(&f.file.replace('\\', "/")))
            .map(|(id, _)| id)
            .collect();

        // Reverse edges once, then walk callers transitively.
        let mut callers: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, function) in &graph.functions {
            for call in &function.calls {
                if let Some(callee) = &call.callee_id {
                    callers.entry(callee.as_str()).or_default().push(id);
                }
            }
        }
        let mut affected: HashSet<&str> = seeds.iter().map(|s| s.as_str()).collect();
        let mut stack: Vec<&str> = affected.iter().copied().collect();
        while let Some(current) = stack.pop() {
            if let Some(callers) = callers.get(current) {
                for caller in callers {
                    if affected.insert(caller) {
                        stack.push(caller);
                    }
                }
            }
        }

        let files_affected: HashSet<&str> = affected
            .iter()
            .filter_map(|id| graph.functions.get(*id))
            .map(|f| f.file.as_str())
            .collect();
        let entry_points_affected = graph
            .entry_points
            .iter()
            .filter(|e| affected.contains(e.as_str()))
            .count();
        let sensitive_paths = affected
            .iter()
            .filter_map(|id| graph.functions.get(*id))
            .filter(|f| !f.data_access.is_empty())
            .count();

        let friction = (files_affected.len() as f64 * 2.0
            + affected.len() as f64 * 0.5
            + entry_points_affected as f64 * 5.0)
            .min(100.0);
        let risk = if sensitive_paths > 0 && entry_points_affected > 0 {
            BreakingRisk::Critical
        } else if entry_points_affected > config.max_entry_points_affected / 2
            || friction >= config.max_friction
        {
            BreakingRisk::High
        } else if files_affected.len() > config.max_files_affected / 2 {
            BreakingRisk::Medium
        } else {
            BreakingRisk::Low
        };

        let mut violations = Vec::new();
        if files_affected.len() > config.max_files_affected {
            violations.push(cap_violation(format!(
                "{} files affected (cap {})",
                files_affected.len(),
                config.max_files_affected
            )));
        }
        if entry_points_affected > config.max_entry_points_affected {
            violations.push(cap_violation(format!(
                "{entry_points_affected} entry points affected (cap {})",
                config.max_entry_points_affected
            )));
        }
        if friction > config.max_friction {
            violations.push(cap_violation(format!(
                "friction {friction:.0} (cap {:.0})",
                config.max_friction
            )));
        }
        if risk > config.max_risk {
            violations.push(cap_violation(format!(
                "breaking risk {risk:?} exceeds configured {:?}",
                config.max_risk
            )));
        }

        let passed = violations.is_empty();
        Ok(GateOutcome {
            gate: GateKind::ImpactSimulation,
            status: if passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            passed,
            score: (100.0 - friction).clamp(0.0, 100.0),
            summary: format!(
                "{} functions, {} files, {entry_points_affected} entry points affected; risk {risk:?}",
                affected.len(),
                files_affected.len()
            ),
            violations,
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::json!({
                "functions_affected": affected.len(),
                "files_affected": files_affected.len(),
                "entry_points_affected": entry_points_affected,
                "friction": friction,
                "risk": risk,
                "sensitive_paths": sensitive_paths,
            }),
            error: None,
        })
    }
}

fn cap_violation(message: String) -> GateViolation {
    GateViolation {
        severity: Severity::Error,
        message,
        file: None,
        line: None,
    }
}
