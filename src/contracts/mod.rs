//! Backend/frontend contract matching
//!
//! Pairs backend HTTP endpoint definitions with frontend API calls by
//! weighted path similarity and surfaces field-level schema mismatches
//! between the two sides.

mod similarity;

pub use similarity::{normalize_path, path_similarity};

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{ConfidenceLevel, Severity};

/// A field either side of a contract declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type, as written
    pub ty: String,
    /// Whether the field is required
    pub required: bool,
    /// Whether the field is nullable
    pub nullable: bool,
}

/// A backend endpoint definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDef {
    /// HTTP method, uppercase
    pub method: String,
    /// Route path as declared
    pub path: String,
    /// Response fields, when extraction succeeded
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Defining file
    pub file: String,
    /// Line
    pub line: u32,
}

/// A frontend API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallDef {
    /// HTTP method, uppercase
    pub method: String,
    /// Requested path as written
    pub path: String,
    /// Inferred response fields, when extraction succeeded
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Calling file
    pub file: String,
    /// Line
    pub line: u32,
}

/// Kinds of field-level disagreements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Backend declares the field, frontend does not
    MissingInFrontend,
    /// Frontend expects the field, backend does not declare it
    MissingInBackend,
    /// Types disagree after alias normalization
    TypeMismatch,
    /// Required on one side, optional on the other
    OptionalityMismatch,
    /// Nullable on one side only
    NullabilityMismatch,
}

/// One field-level disagreement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMismatch {
    /// Field name
    pub field: String,
    /// Kind of disagreement
    pub kind: MismatchKind,
    /// Severity
    pub severity: Severity,
    /// Backend's declared type, when present
    pub backend_type: Option<String>,
    /// Frontend's inferred type, when present
    pub frontend_type: Option<String>,
    /// Human-readable description
    pub message: String,
}

/// Agreement status of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    /// No error-level mismatches
    Discovered,
    /// At least one error-level mismatch
    Mismatch,
}

/// A matched backend endpoint with its frontend callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// The backend side
    pub backend: EndpointDef,
    /// The matched frontend calls (co-winners included)
    pub frontend: Vec<ApiCallDef>,
    /// Field-level disagreements
    pub mismatches: Vec<FieldMismatch>,
    /// Path-similarity confidence of the match
    pub match_confidence: f64,
    /// Field-extraction confidence (0.5 per side with fields)
    pub field_confidence: f64,
    /// Combined score
    pub score: f64,
    /// Level band of the combined score
    pub level: ConfidenceLevel,
    /// Agreement status
    pub status: ContractStatus,
}

/// Matching options
#[derive(Debug, Clone)]
pub struct MatcherOptions {
    /// Discard candidate pairs below this similarity
    pub min_similarity: f64,
    /// Candidates within this distance of the best are co-winners
    pub co_winner_window: f64,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            min_similarity: 0.65,
            co_winner_window: 0.1,
        }
    }
}

/// Pairs endpoints with calls and assembles contracts
pub struct ContractMatcher {
    options: MatcherOptions,
}

impl ContractMatcher {
    /// Creates a matcher
    pub fn new(options: MatcherOptions) -> Self {
        Self { options }
    }

    /// Matches every backend endpoint against the same-method frontend
    /// calls and emits one contract per matched endpoint
    pub fn match_contracts(
        &self,
        endpoints: &[EndpointDef],
        calls: &[ApiCallDef],
    ) -> Vec<Contract> {
        let mut by_method: BTreeMap<String, Vec<(usize, &ApiCallDef)>> = BTreeMap::new();
        for (index, call) in calls.iter().enumerate() {
            by_method
                .entry(call.method.to_uppercase())
                .or_default()
                .push((index, call));
        }

        let mut matched_calls: HashSet<usize> = HashSet::new();
        let mut contracts = Vec::new();

        for endpoint in endpoints {
            let Some(candidates) = by_method.get(&endpoint.method.to_uppercase()) else {
                continue;
            };
            let mut scored: Vec<(usize, &ApiCallDef, f64)> = candidates
                .iter()
                .map(|(index, call)| (*index, *call, path_similarity(&endpoint.path, &call.path)))
                .filter(|(_, _, score)| *score >= self.options.min_similarity)
                .collect();
            if scored.is_empty() {
                continue;
            }
            scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            let best = scored[0].2;
            let winners: Vec<(usize, &ApiCallDef, f64)> = scored
                .into_iter()
                .filter(|(_, _, score)| best - score <= self.options.co_winner_window)
                .collect();

            let mut mismatches = Vec::new();
            for (_, call, _) in &winners {
                mismatches.extend(field_mismatches(&endpoint.fields, &call.fields));
            }
            for (index, _, _) in &winners {
                matched_calls.insert(*index);
            }

            let frontend: Vec<ApiCallDef> =
                winners.iter().map(|(_, call, _)| (*call).clone()).collect();
            // 0.5 per side that produced at least one extracted field.
            let mut field_confidence = 0.0;
            if !endpoint.fields.is_empty() {
                field_confidence += 0.5;
            }
            if frontend.iter().any(|c| !c.fields.is_empty()) {
                field_confidence += 0.5;
            }
            let errors = mismatches
                .iter()
                .filter(|m| m.severity == Severity::Error)
                .count();
            let score = (0.6 * best + 0.4 * field_confidence)
                * (1.0 - 0.1 * errors as f64).clamp(0.0, 1.0);
            let status = if errors > 0 {
                ContractStatus::Mismatch
            } else {
                ContractStatus::Discovered
            };

            contracts.push(Contract {
                backend: endpoint.clone(),
                frontend,
                mismatches,
                match_confidence: best,
                field_confidence,
                score,
                level: ConfidenceLevel::from_score(score),
                status,
            });
        }
        contracts
    }
}

impl Default for ContractMatcher {
    fn default() -> Self {
        Self::new(MatcherOptions::default())
    }
}

/// Normalizes a declared type to its canonical alias
fn normalize_type(ty: &str) -> &'static str {
    match ty.trim().to_lowercase().as_str() {
        "string" | "str" | "text" => "string",
        "number" | "int" | "integer" | "float" | "double" | "decimal" => "number",
        "boolean" | "bool" => "boolean",
        "object" | "dict" | "record" | "map" => "object",
        "array" | "list" | "sequence" => "array",
        "any" | "unknown" => "any",
        _ => "other",
    }
}

/// Compares both field lists by name and reports every disagreement
pub fn field_mismatches(backend: &[FieldDef], frontend: &[FieldDef]) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();

    for b_field in backend {
        match frontend.iter().find(|f| f.name == b_field.name) {
            None => {
                mismatches.push(FieldMismatch {
                    field: b_field.name.clone(),
                    kind: MismatchKind::MissingInFrontend,
                    severity: if b_field.required {
                        Severity::Error
                    } else {
                        Severity::Warning
                    },
                    backend_type: Some(b_field.ty.clone()),
                    frontend_type: None,
                    message: format!("backend field '{}' is not consumed", b_field.name),
                });
            }
            Some(f_field) => {
                let b_norm = normalize_type(&b_field.ty);
                let f_norm = normalize_type(&f_field.ty);
                if b_norm != f_norm || (b_norm == "other" && b_field.ty != f_field.ty) {
                    mismatches.push(FieldMismatch {
                        field: b_field.name.clone(),
                        kind: MismatchKind::TypeMismatch,
                        severity: Severity::Error,
                        backend_type: Some(b_field.ty.clone()),
                        frontend_type: Some(f_field.ty.clone()),
                        message: format!(
                            "field '{}' is {} on the backend but {} on the frontend",
                            b_field.name, b_field.ty, f_field.ty
                        ),
                    });
                }
                if b_field.required != f_field.required {
                    mismatches.push(FieldMismatch {
                        field: b_field.name.clone(),
                        kind: MismatchKind::OptionalityMismatch,
                        severity: Severity::Warning,
                        backend_type: Some(b_field.ty.clone()),
                        frontend_type: Some(f_field.ty.clone()),
                        message: format!("field '{}' optionality differs", b_field.name),
                    });
                }
                if b_field.nullable != f_field.nullable {
                    mismatches.push(FieldMismatch {
                        field: b_field.name.clone(),
                        kind: MismatchKind::NullabilityMismatch,
                        severity: Severity::Warning,
                        backend_type: Some(b_field.ty.clone()),
                        frontend_type: Some(f_field.ty.clone()),
                        message: format!("field '{}' nullability differs", b_field.name),
                    });
                }
            }
        }
    }

    for f_field in frontend {
        if !backend.iter().any(|b| b.name == f_field.name) {
            mismatches.push(FieldMismatch {
                field: f_field.name.clone(),
                kind: MismatchKind::MissingInBackend,
                severity: if f_field.required {
                    Severity::Error
                } else {
                    Severity::Info
                },
                backend_type: None,
                frontend_type: Some(f_field.ty.clone()),
                message: format!("frontend expects '{}' which the backend never sends", f_field.name),
            });
        }
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: &str) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            ty: ty.to_string(),
            required: true,
            nullable: false,
        }
    }

    fn endpoint(method: &str, path: &str, fields: Vec<FieldDef>) -> EndpointDef {
        EndpointDef {
            method: method.to_string(),
            path: path.to_string(),
            fields,
            file: "server/routes.ts".to_string(),
            line: 10,
        }
    }

    fn call(method: &str, path: &str, fields: Vec<FieldDef>) -> ApiCallDef {
        ApiCallDef {
            method: method.to_string(),
            path: path.to_string(),
            fields,
            file: "web/api.ts".to_string(),
            line: 4,
        }
    }

    #[test]
    fn test_users_by_id_contract() {
        let endpoints = vec![endpoint(
            "GET",
            "/api/v1/users/:id",
            vec![field("id", "number"), field("email", "string")],
        )];
        let calls = vec![call(
            "GET",
            "/users/42",
            vec![field("id", "string"), field("email", "string")],
        )];

        let contracts = ContractMatcher::default().match_contracts(&endpoints, &calls);
        assert_eq!(contracts.len(), 1);
        let contract = &contracts[0];
        assert!(contract.match_confidence >= 0.93);
        assert_eq!(contract.frontend.len(), 1);
        assert_eq!(contract.status, ContractStatus::Mismatch);

        let type_errors: Vec<_> = contract
            .mismatches
            .iter()
            .filter(|m| m.kind == MismatchKind::TypeMismatch)
            .collect();
        assert_eq!(type_errors.len(), 1);
        assert_eq!(type_errors[0].field, "id");
        assert_eq!(type_errors[0].severity, Severity::Error);
    }

    #[test]
    fn test_method_grouping() {
        let endpoints = vec![endpoint("DELETE", "/users/:id", vec![])];
        let calls = vec![call("GET", "/users/42", vec![])];
        let contracts = ContractMatcher::default().match_contracts(&endpoints, &calls);
        assert!(contracts.is_empty());
    }

    #[test]
    fn test_below_min_similarity_discarded() {
        let endpoints = vec![endpoint("GET", "/payments/refunds", vec![])];
        let calls = vec![call("GET", "/users/42", vec![])];
        let contracts = ContractMatcher::default().match_contracts(&endpoints, &calls);
        assert!(contracts.is_empty());
    }

    #[test]
    fn test_co_winners() {
        let endpoints = vec![endpoint("GET", "/users/:id", vec![])];
        let calls = vec![
            call("GET", "/users/42", vec![]),
            call("GET", "/users/me", vec![]),
        ];
        let contracts = ContractMatcher::default().match_contracts(&endpoints, &calls);
        assert_eq!(contracts.len(), 1);
        assert!(!contracts[0].frontend.is_empty());
    }

    #[test]
    fn test_type_alias_normalization() {
        let backend = vec![field("count", "int")];
        let frontend = vec![field("count", "number")];
        assert!(field_mismatches(&backend, &frontend).is_empty());

        let frontend = vec![field("count", "bool")];
        let mismatches = field_mismatches(&backend, &frontend);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::TypeMismatch);
    }

    #[test]
    fn test_missing_optional_is_info() {
        let backend = vec![field("id", "number")];
        let mut extra = field("debug", "string");
        extra.required = false;
        let frontend = vec![field("id", "number"), extra];
        let mismatches = field_mismatches(&backend, &frontend);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::MissingInBackend);
        assert_eq!(mismatches[0].severity, Severity::Info);
    }
}
