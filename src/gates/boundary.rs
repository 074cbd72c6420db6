//! Security-boundary gate
//!
//! Reads the boundary store and the change set: flags sensitive data
//! access newly introduced by changed files, entry points that reach data
//! access without an auth function in the chain, and per-protected-table
//! status. An unprotected table, or disallowed new sensitive access,
//! fails the gate.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constraints::is_auth_function;
use crate::error::Result;
use crate::gates::{Gate, GateInput, GateKind, GateOutcome, GateStatus, GateViolation};
use crate::model::Severity;

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
struct BoundaryConfig {
    /// Permit new sensitive access points in the change set
    allow_new_sensitive: bool,
}

/// Guard status of one sensitive table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum TableStatus {
    Protected,
    Partial,
    Unprotected,
}

/// Checks sensitive-data access against auth coverage
pub struct SecurityBoundaryGate;

impl Gate for SecurityBoundaryGate {
    fn kind(&self) -> GateKind {
        GateKind::SecurityBoundary
    }

    fn execute(&self, input: &GateInput) -> Result<GateOutcome> {
        let config: BoundaryConfig =
            serde_json::from_value(input.config.clone()).unwrap_or_default();
        let Some(boundaries) = &input.context.boundaries else {
            return Ok(GateOutcome::skipped(
                GateKind::SecurityBoundary,
                "no boundary data",
            ));
        };

        let changed: HashSet<String> = input
            .files
            .iter()
            .map(|f| f.to_string_lossy().replace('\\', "/"))
            .collect();
        let sensitive = boundaries.sensitive_tables();

        // Entry-point auth coverage and the set of guarded files, from
        // the call graph when one was supplied.
        let mut guarded_files: HashSet<&str> = HashSet::new();
        let mut unauthorized_paths = Vec::new();
        let mut entries_reaching = 0usize;
        let mut entries_guarded = 0usize;
        if let Some(graph) = &input.context.call_graph {
            for entry in &graph.entry_points {
                if !graph.reaches_data_access(entry) {
                    continue;
                }
                entries_reaching += 1;
                let closure = graph.transitive_callees(entry);
                let guarded = closure
                    .iter()
                    .filter_map(|id| graph.functions.get(id))
                    .any(|f| is_auth_function(&f.name));
                if guarded {
                    entries_guarded += 1;
                    for id in &closure {
                        if let Some(f) = graph.functions.get(id) {
                            guarded_files.insert(f.file.as_str());
                        }
                    }
                } else {
                    let name = graph
                        .functions
                        .get(entry)
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| entry.clone());
                    unauthorized_paths.push(name);
                }
            }
        }
        let auth_coverage = if entries_reaching == 0 {
            100.0
        } else {
            entries_guarded as f64 / entries_reaching as f64 * 100.0
        };

        // Per-table guard status.
        let mut table_status: BTreeMap<&str, TableStatus> = BTreeMap::new();
        for table in &sensitive {
            let points: Vec<_> = boundaries
                .access_points
                .values()
                .filter(|p| p.table == **table)
                .collect();
            if points.is_empty() {
                table_status.insert(*table, TableStatus::Protected);
                continue;
            }
            let guarded = points
                .iter()
                .filter(|p| {
                    input.context.call_graph.is_none()
                        || guarded_files.contains(p.file.replace('\\', "/").as_str())
                        || guarded_files.contains(p.file.as_str())
                })
                .count();
            let status = if guarded == points.len() {
                TableStatus::Protected
            } else if guarded == 0 {
                TableStatus::Unprotected
            } else {
                TableStatus::Partial
            };
            table_status.insert(*table, status);
        }

        // New sensitive access from the change set.
        let new_sensitive: Vec<GateViolation> = boundaries
            .access_points
            .values()
            .filter(|p| sensitive.contains(p.table.as_str()))
            .filter(|p| changed.contains(&p.file.replace('\\', "/")))
            .map(|p| GateViolation {
                severity: Severity::Warning,
                message: format!("new access to sensitive table {}", p.table),
                file: Some(p.file.clone()),
                line: Some(p.line),
            })
            .collect();

        let mut violations = Vec::new();
        for (table, status) in &table_status {
            if *status == TableStatus::Unprotected {
                violations.push(GateViolation {
                    severity: Severity::Error,
                    message: format!("sensitive table {table} has no auth on its access paths"),
                    file: None,
                    line: None,
                });
            }
        }
        for entry in &unauthorized_paths {
            violations.push(GateViolation {
                severity: Severity::Error,
                message: format!("entry point {entry} reaches data access without auth"),
                file: None,
                line: None,
            });
        }
        let new_sensitive_count = new_sensitive.len();
        if !config.allow_new_sensitive {
            violations.extend(new_sensitive);
        }

        let unprotected = table_status
            .values()
            .filter(|s| **s == TableStatus::Unprotected)
            .count();
        let passed = unprotected == 0
            && unauthorized_paths.is_empty()
            && (config.allow_new_sensitive || new_sensitive_count == 0);
        Ok(GateOutcome {
            gate: GateKind::SecurityBoundary,
            status: if passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            passed,
            score: auth_coverage,
            summary: format!(
                "auth coverage {auth_coverage:.0}%, {} sensitive tables, {unprotected} unprotected",
                sensitive.len()
            ),
            violations,
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::json!({
                "auth_coverage": auth_coverage,
                "new_sensitive_access": new_sensitive_count,
                "tables": table_status,
                "unauthorized_paths": unauthorized_paths,
            }),
            error: None,
        })
    }
}
