//! External collaborator data consumed by the constraint engine
//!
//! The call graph, boundary store, test-topology analyzer, and
//! error-handling analyzer are built elsewhere; the engine consumes them
//! as read-only data keyed by stable ids.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A call site referencing another function by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallRef {
    /// Resolved callee id, when resolution succeeded
    pub callee_id: Option<String>,
}

/// One function node in the call graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Function name
    pub name: String,
    /// Defining file
    pub file: String,
    /// Start line
    pub start_line: u32,
    /// Whether the function is async
    pub is_async: bool,
    /// Decorators or annotations applied to it
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Parameter names
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Return type when known
    #[serde(default)]
    pub return_type: Option<String>,
    /// Tables or entities the function accesses directly
    #[serde(default)]
    pub data_access: Vec<String>,
    /// Outgoing calls
    #[serde(default)]
    pub calls: Vec<CallRef>,
}

/// The read-only call graph: function id to node, plus entry points
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraphData {
    /// All functions keyed by id
    pub functions: HashMap<String, FunctionInfo>,
    /// Ids of entry-point functions
    pub entry_points: Vec<String>,
}

impl CallGraphData {
    /// The transitive callee closure of `id`, including `id` itself
    pub fn transitive_callees(&self, id: &str) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(function) = self.functions.get(&current) {
                for call in &function.calls {
                    if let Some(callee) = &call.callee_id {
                        if !visited.contains(callee) {
                            stack.push(callee.clone());
                        }
                    }
                }
            }
        }
        visited
    }

    /// Whether the closure of `id` touches any data access
    pub fn reaches_data_access(&self, id: &str) -> bool {
        self.transitive_callees(id)
            .iter()
            .filter_map(|callee| self.functions.get(callee))
            .any(|f| !f.data_access.is_empty())
    }
}

/// One data access point reported by the boundary store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPoint {
    /// File of the access
    pub file: String,
    /// Line of the access
    pub line: u32,
    /// Table or entity accessed
    pub table: String,
    /// Free-form context (accessor name, layer hint)
    #[serde(default)]
    pub context: Option<String>,
}

/// A sensitive field flagged by the boundary store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveField {
    /// Table the field belongs to
    pub table: String,
    /// Field name
    pub field: String,
}

/// The boundary store's access map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessMap {
    /// Access points keyed by id
    pub access_points: HashMap<String, AccessPoint>,
    /// Fields flagged as sensitive
    pub sensitive_fields: Vec<SensitiveField>,
}

impl AccessMap {
    /// Tables having at least one sensitive field
    pub fn sensitive_tables(&self) -> HashSet<&str> {
        self.sensitive_fields
            .iter()
            .map(|f| f.table.as_str())
            .collect()
    }
}

/// Summary produced by the test-topology analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestTopologySummary {
    /// Non-test functions in the codebase
    pub total_functions: usize,
    /// Functions covered by at least one test
    pub covered_functions: usize,
    /// Test cases discovered
    pub test_cases: usize,
    /// Average mock ratio per test
    pub avg_mock_ratio: f64,
}

/// One function node in the error-handling topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFunctionInfo {
    /// Defining file
    pub file: String,
    /// Start line
    pub line: u32,
    /// Qualified name
    pub qualified_name: String,
    /// Whether the function is async
    pub is_async: bool,
    /// Whether the body is wrapped in try/catch
    pub has_try_catch: bool,
    /// How async errors are handled, when known
    #[serde(default)]
    pub async_handling: Option<String>,
}

/// An error boundary (framework or hand-rolled)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBoundary {
    /// Boundary name
    pub name: String,
    /// Defining file
    pub file: String,
    /// Line
    pub line: u32,
    /// Whether the framework provides it
    pub is_framework_boundary: bool,
}

/// The error-handling analyzer's topology
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorTopology {
    /// Functions keyed by id
    pub functions: HashMap<String, ErrorFunctionInfo>,
    /// Error boundaries
    pub boundaries: Vec<ErrorBoundary>,
}

/// One aggregate issue the error-handling analyzer reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorIssue {
    /// Issue type, e.g. "empty-catch"
    pub issue_type: String,
    /// Occurrences
    pub count: usize,
}

/// The error-handling analyzer's summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Functions analyzed
    pub total_functions: usize,
    /// Top issues by count
    pub top_issues: Vec<ErrorIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, calls: &[&str], data: &[&str]) -> FunctionInfo {
        FunctionInfo {
            name: name.to_string(),
            file: "src/app.ts".to_string(),
            start_line: 1,
            is_async: false,
            decorators: vec![],
            parameters: vec![],
            return_type: None,
            data_access: data.iter().map(|s| s.to_string()).collect(),
            calls: calls
                .iter()
                .map(|c| CallRef {
                    callee_id: Some(c.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_transitive_closure() {
        let mut graph = CallGraphData::default();
        graph.functions.insert("a".into(), node("a", &["b"], &[]));
        graph.functions.insert("b".into(), node("b", &["c"], &[]));
        graph
            .functions
            .insert("c".into(), node("c", &[], &["users"]));
        // cycle back to a must not loop forever
        graph.functions.get_mut("c").unwrap().calls.push(CallRef {
            callee_id: Some("a".to_string()),
        });

        let closure = graph.transitive_callees("a");
        assert_eq!(closure.len(), 3);
        assert!(graph.reaches_data_access("a"));
        assert!(!graph.reaches_data_access("missing"));
    }
}
