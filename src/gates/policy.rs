//! Gate policies
//!
//! A policy names the gates to run, how their results aggregate, and
//! which gates are non-negotiable. Policies are plain data loadable from
//! configuration.

use serde::{Deserialize, Serialize};

/// How per-gate results combine into an overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Pass iff any gate passes
    Any,
    /// Pass iff every non-skipped gate passes
    All,
    /// Weighted mean score against the pass threshold
    Weighted,
    /// Overall score against a configured minimum
    Threshold,
}

/// The gates the orchestrator knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateKind {
    /// Approved patterns hold in the change set
    PatternCompliance,
    /// Derived constraints are satisfied
    ConstraintVerification,
    /// No health regression against the previous snapshot
    Regression,
    /// Blast radius of the change stays within caps
    ImpactSimulation,
    /// No unprotected sensitive data access
    SecurityBoundary,
    /// User-defined rules hold
    CustomRules,
}

impl GateKind {
    /// All gate kinds
    pub fn all() -> &'static [GateKind] {
        &[
            GateKind::PatternCompliance,
            GateKind::ConstraintVerification,
            GateKind::Regression,
            GateKind::ImpactSimulation,
            GateKind::SecurityBoundary,
            GateKind::CustomRules,
        ]
    }

    /// Stable identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::PatternCompliance => "pattern-compliance",
            Self::ConstraintVerification => "constraint-verification",
            Self::Regression => "regression",
            Self::ImpactSimulation => "impact-simulation",
            Self::SecurityBoundary => "security-boundary",
            Self::CustomRules => "custom-rules",
        }
    }
}

/// One gate entry in a policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSpec {
    /// Which gate
    pub kind: GateKind,
    /// Disabled gates are skipped, not failed
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Weight under the `weighted` aggregation
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Gate-specific configuration blob
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl GateSpec {
    /// A spec with defaults for one gate
    pub fn new(kind: GateKind) -> Self {
        Self {
            kind,
            enabled: true,
            weight: 1.0,
            config: serde_json::Value::Null,
        }
    }
}

/// A named set of gates with aggregation semantics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Policy id
    pub id: String,
    /// Human name
    pub name: String,
    /// Gates to run
    pub gates: Vec<GateSpec>,
    /// Aggregation mode
    pub aggregation: Aggregation,
    /// Gates that force overall failure when they do not pass
    #[serde(default)]
    pub required_gates: Vec<GateKind>,
    /// Pass threshold for `weighted`/`threshold` aggregation (0-100)
    #[serde(default = "default_threshold")]
    pub pass_threshold: f64,
}

fn default_threshold() -> f64 {
    70.0
}

impl GatePolicy {
    /// The default policy: every gate, `all` aggregation, compliance and
    /// security required
    pub fn standard() -> Self {
        Self {
            id: "standard".to_string(),
            name: "Standard quality gates".to_string(),
            gates: GateKind::all().iter().map(|k| GateSpec::new(*k)).collect(),
            aggregation: Aggregation::All,
            required_gates: vec![GateKind::PatternCompliance, GateKind::SecurityBoundary],
            pass_threshold: default_threshold(),
        }
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::standard()
    }
}
