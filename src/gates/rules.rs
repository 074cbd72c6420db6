//! Custom-rules gate
//!
//! Evaluates user rules expressed as composable conditions over the
//! project tree: file presence, content patterns, imports, naming,
//! directory structure, and and/or/not composition. The gate fails when
//! any enabled rule yields one or more violations.

use std::path::{Path, PathBuf};

use glob::Pattern as GlobPattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gates::{Gate, GateInput, GateKind, GateOutcome, GateStatus, GateViolation};
use crate::model::Severity;

/// What a naming rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingTarget {
    /// File names
    File,
    /// Class declarations
    Class,
    /// Function declarations
    Function,
    /// Variable declarations
    Variable,
}

/// A composable rule condition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleCondition {
    /// At least one file matching the glob must exist
    FileExists {
        /// Glob over workspace-relative paths
        pattern: String,
    },
    /// No file matching the glob may exist
    FileAbsent {
        /// Glob over workspace-relative paths
        pattern: String,
    },
    /// Every file matching `source` must have a counterpart at `target`,
    /// where `{name}` expands to the source's file stem
    FileCorrespondence {
        /// Glob selecting source files
        source: String,
        /// Target path template
        target: String,
    },
    /// Files matching the glob must contain the regex
    ContentMatches {
        /// Glob selecting files
        files: String,
        /// Required regex
        regex: String,
    },
    /// Files matching the glob must not contain the regex
    ContentForbids {
        /// Glob selecting files
        files: String,
        /// Forbidden regex
        regex: String,
    },
    /// Files matching the glob must import the given source
    RequiredImport {
        /// Glob selecting files
        files: String,
        /// Import source substring
        import: String,
    },
    /// Files matching the glob must not import the given source
    ForbiddenImport {
        /// Glob selecting files
        files: String,
        /// Import source substring
        import: String,
    },
    /// Declared names of the target kind must match the regex
    Naming {
        /// What to inspect
        target: NamingTarget,
        /// Glob selecting files
        files: String,
        /// Required name regex
        regex: String,
    },
    /// Required directories/files exist and directories stay small
    Structure {
        /// Directories that must exist
        #[serde(default)]
        required_dirs: Vec<String>,
        /// Files that must exist
        #[serde(default)]
        required_files: Vec<String>,
        /// Cap on direct children per directory
        #[serde(default)]
        max_files_per_dir: Option<usize>,
    },
    /// All child conditions must hold
    AllOf {
        /// Children
        conditions: Vec<RuleCondition>,
    },
    /// At least one child condition must hold
    AnyOf {
        /// Children
        conditions: Vec<RuleCondition>,
    },
    /// The child condition must not hold
    Not {
        /// Child
        condition: Box<RuleCondition>,
    },
}

/// A user-defined rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRule {
    /// Rule id
    pub id: String,
    /// Human name
    pub name: String,
    /// What the rule enforces
    #[serde(default)]
    pub description: String,
    /// Severity of violations
    pub severity: Severity,
    /// Disabled rules are not evaluated
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// The condition tree
    pub condition: RuleCondition,
}

fn default_enabled() -> bool {
    true
}

/// Evaluates the user rule set
pub struct CustomRulesGate;

impl Gate for CustomRulesGate {
    fn kind(&self) -> GateKind {
        GateKind::CustomRules
    }

    fn execute(&self, input: &GateInput) -> Result<GateOutcome> {
        let rules: Vec<&CustomRule> = input
            .context
            .custom_rules
            .iter()
            .filter(|r| r.enabled)
            .collect();
        if rules.is_empty() {
            return Ok(GateOutcome::skipped(
                GateKind::CustomRules,
                "no custom rules",
            ));
        }

        let tree = collect_tree(input.project_root);
        let mut violations = Vec::new();
        let mut failed_rules = 0usize;
        for rule in &rules {
            let rule_violations = evaluate(&rule.condition, input.project_root, &tree)?;
            if !rule_violations.is_empty() {
                failed_rules += 1;
                for message in rule_violations {
                    violations.push(GateViolation {
                        severity: rule.severity,
                        message: format!("{}: {message}", rule.name),
                        file: None,
                        line: None,
                    });
                }
            }
        }

        let passed = failed_rules == 0;
        let score = (rules.len() - failed_rules) as f64 / rules.len() as f64 * 100.0;
        Ok(GateOutcome {
            gate: GateKind::CustomRules,
            status: if passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            passed,
            score,
            summary: format!("{}/{} rules held", rules.len() - failed_rules, rules.len()),
            violations,
            warnings: Vec::new(),
            duration_ms: 0,
            details: serde_json::json!({
                "rules": rules.len(),
                "failed": failed_rules,
            }),
            error: None,
        })
    }
}

/// Workspace-relative paths of every file under the root, skipping
/// dotted and dependency directories
fn collect_tree(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name == "node_modules" || name == "target" {
                continue;
            }
            if path.is_dir() {
                walk(&path, root, out);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

fn matching<'a>(tree: &'a [PathBuf], pattern: &str) -> Result<Vec<&'a PathBuf>> {
    let glob = GlobPattern::new(pattern)
        .map_err(|e| Error::Parse(format!("invalid rule glob '{pattern}': {e}")))?;
    Ok(tree
        .iter()
        .filter(|p| glob.matches(&p.to_string_lossy().replace('\\', "/")))
        .collect())
}

fn compile(regex: &str) -> Result<Regex> {
    Regex::new(regex).map_err(|e| Error::Parse(format!("invalid rule regex '{regex}': {e}")))
}

/// Evaluates one condition, returning violation messages (empty = held)
fn evaluate(condition: &RuleCondition, root: &Path, tree: &[PathBuf]) -> Result<Vec<String>> {
    match condition {
        RuleCondition::FileExists { pattern } => {
            if matching(tree, pattern)?.is_empty() {
                Ok(vec![format!("no file matches {pattern}")])
            } else {
                Ok(Vec::new())
            }
        }
        RuleCondition::FileAbsent { pattern } => Ok(matching(tree, pattern)?
            .iter()
            .map(|p| format!("{} must not exist", p.display()))
            .collect()),
        RuleCondition::FileCorrespondence { source, target } => {
            let mut violations = Vec::new();
            for file in matching(tree, source)? {
                let stem = file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let expected = target.replace("{name}", &stem);
                if !root.join(&expected).exists() {
                    violations.push(format!("{} has no counterpart {expected}", file.display()));
                }
            }
            Ok(violations)
        }
        RuleCondition::ContentMatches { files, regex } => {
            let re = compile(regex)?;
            let mut violations = Vec::new();
            for file in matching(tree, files)? {
                let content = std::fs::read_to_string(root.join(file)).unwrap_or_default();
                if !re.is_match(&content) {
                    violations.push(format!("{} lacks required pattern", file.display()));
                }
            }
            Ok(violations)
        }
        RuleCondition::ContentForbids { files, regex } => {
            let re = compile(regex)?;
            let mut violations = Vec::new();
            for file in matching(tree, files)? {
                let content = std::fs::read_to_string(root.join(file)).unwrap_or_default();
                if re.is_match(&content) {
                    violations.push(format!("{} contains forbidden pattern", file.display()));
                }
            }
            Ok(violations)
        }
        RuleCondition::RequiredImport { files, import } => {
            let mut violations = Vec::new();
            for file in matching(tree, files)? {
                let content = std::fs::read_to_string(root.join(file)).unwrap_or_default();
                if !imports_of(&content).iter().any(|i| i.contains(import)) {
                    violations.push(format!("{} does not import {import}", file.display()));
                }
            }
            Ok(violations)
        }
        RuleCondition::ForbiddenImport { files, import } => {
            let mut violations = Vec::new();
            for file in matching(tree, files)? {
                let content = std::fs::read_to_string(root.join(file)).unwrap_or_default();
                if imports_of(&content).iter().any(|i| i.contains(import)) {
                    violations.push(format!("{} imports forbidden {import}", file.display()));
                }
            }
            Ok(violations)
        }
        RuleCondition::Naming {
            target,
            files,
            regex,
        } => {
            let re = compile(regex)?;
            let mut violations = Vec::new();
            for file in matching(tree, files)? {
                match target {
                    NamingTarget::File => {
                        let name = file
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        if !re.is_match(&name) {
                            violations.push(format!("file name {name} violates the convention"));
                        }
                    }
                    _ => {
                        let content =
                            std::fs::read_to_string(root.join(file)).unwrap_or_default();
                        for name in declared_names(&content, *target) {
                            if !re.is_match(&name) {
                                violations.push(format!(
                                    "{} in {} violates the convention",
                                    name,
                                    file.display()
                                ));
                            }
                        }
                    }
                }
            }
            Ok(violations)
        }
        RuleCondition::Structure {
            required_dirs,
            required_files,
            max_files_per_dir,
        } => {
            let mut violations = Vec::new();
            for dir in required_dirs {
                if !root.join(dir).is_dir() {
                    violations.push(format!("required directory {dir} is missing"));
                }
            }
            for file in required_files {
                if !root.join(file).is_file() {
                    violations.push(format!("required file {file} is missing"));
                }
            }
            if let Some(cap) = max_files_per_dir {
                let mut counts: std::collections::BTreeMap<PathBuf, usize> = Default::default();
                for file in tree {
                    let dir = file.parent().unwrap_or(Path::new("")).to_path_buf();
                    *counts.entry(dir).or_default() += 1;
                }
                for (dir, count) in counts {
                    if count > *cap {
                        violations.push(format!(
                            "{} holds {count} files (cap {cap})",
                            if dir.as_os_str().is_empty() {
                                ".".to_string()
                            } else {
                                dir.display().to_string()
                            }
                        ));
                    }
                }
            }
            Ok(violations)
        }
        RuleCondition::AllOf { conditions } => {
            let mut violations = Vec::new();
            for child in conditions {
                violations.extend(evaluate(child, root, tree)?);
            }
            Ok(violations)
        }
        RuleCondition::AnyOf { conditions } => {
            let mut all = Vec::new();
            for child in conditions {
                let violations = evaluate(child, root, tree)?;
                if violations.is_empty() {
                    return Ok(Vec::new());
                }
                all.extend(violations);
            }
            Ok(all)
        }
        RuleCondition::Not { condition } => {
            if evaluate(condition, root, tree)?.is_empty() {
                Ok(vec!["negated condition held".to_string()])
            } else {
                Ok(Vec::new())
            }
        }
    }
}

/// Crude per-line import extraction shared by the import rules
fn imports_of(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| {
            l.starts_with("import ")
                || l.starts_with("from ")
                || l.starts_with("use ")
                || l.starts_with("using ")
                || l.starts_with("#include")
                || l.contains("require(")
        })
        .map(str::to_string)
        .collect()
}

fn declared_names(content: &str, target: NamingTarget) -> Vec<String> {
    let pattern = match target {
        NamingTarget::Class => r"(?m)^\s*(?:export\s+)?(?:abstract\s+)?(?:class|struct|interface)\s+([A-Za-z_][A-Za-z0-9_]*)",
        NamingTarget::Function => {
            r"(?m)^\s*(?:export\s+)?(?:pub\s+)?(?:async\s+)?(?:function|fn|def|func)\s+([A-Za-z_][A-Za-z0-9_]*)"
        }
        NamingTarget::Variable => r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_][A-Za-z0-9_]*)",
        NamingTarget::File => return Vec::new(),
    };
    let Ok(re) = Regex::new(pattern) else {
        return Vec::new();
    };
    re.captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_serde_roundtrip() {
        let rule = CustomRule {
            id: "r1".to_string(),
            name: "tests exist".to_string(),
            description: String::new(),
            severity: Severity::Error,
            enabled: true,
            condition: RuleCondition::AllOf {
                conditions: vec![
                    RuleCondition::FileExists {
                        pattern: "tests/**".to_string(),
                    },
                    RuleCondition::Not {
                        condition: Box::new(RuleCondition::FileExists {
                            pattern: "src/legacy/**".to_string(),
                        }),
                    },
                ],
            },
        };
        let json = serde_json::to_string(&rule).unwrap();
        let back: CustomRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "r1");
        assert!(matches!(back.condition, RuleCondition::AllOf { .. }));
    }

    #[test]
    fn test_declared_names() {
        let content = "export class UserService {}\nfunction helper() {}\nconst MAX = 3;\n";
        assert_eq!(
            declared_names(content, NamingTarget::Class),
            vec!["UserService"]
        );
        assert_eq!(
            declared_names(content, NamingTarget::Function),
            vec!["helper"]
        );
        assert_eq!(declared_names(content, NamingTarget::Variable), vec!["MAX"]);
    }

    #[test]
    fn test_structure_condition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "x").unwrap();
        let tree = collect_tree(dir.path());

        let held = evaluate(
            &RuleCondition::Structure {
                required_dirs: vec!["src".to_string()],
                required_files: vec![],
                max_files_per_dir: Some(5),
            },
            dir.path(),
            &tree,
        )
        .unwrap();
        assert!(held.is_empty());

        let missing = evaluate(
            &RuleCondition::Structure {
                required_dirs: vec!["docs".to_string()],
                required_files: vec![],
                max_files_per_dir: None,
            },
            dir.path(),
            &tree,
        )
        .unwrap();
        assert_eq!(missing.len(), 1);
    }
}
