//! Detection context construction
//!
//! Per scanned file, the builder produces the context handed to every
//! applicable detector: raw content, language, import/export lists,
//! test/type-definition flags, and the shared project context. Files whose
//! language cannot be resolved are skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use std::sync::OnceLock;

use crate::error::Result;
use crate::lang::Language;
use crate::model::SymbolKind;

/// Opaque parsed syntax tree seam.
///
/// The core ships no parser; AST-kind detectors supplied externally can
/// downcast through this trait. Detectors must tolerate its absence.
pub trait SyntaxTree: Send + Sync {
    /// Kind label of the tree's root node
    fn root_kind(&self) -> &str;
}

/// Workspace-wide context shared by every detection
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Workspace root
    pub root: PathBuf,
    /// Workspace-relative paths of every file in the scan
    pub files: Vec<PathBuf>,
    /// Project-level configuration mapping
    pub settings: HashMap<String, String>,
}

impl ProjectContext {
    /// Creates a project context with no settings
    pub fn new(root: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files,
            settings: HashMap::new(),
        }
    }
}

/// Everything a detector may observe about one file
pub struct DetectionContext {
    /// Workspace-relative path
    pub file: PathBuf,
    /// Raw file content
    pub content: String,
    /// Resolved language
    pub language: Language,
    /// Parsed syntax tree, when a parser produced one
    pub tree: Option<Arc<dyn SyntaxTree>>,
    /// Import sources extracted from the content
    pub imports: Vec<String>,
    /// Exported names extracted from the content
    pub exports: Vec<String>,
    /// Extension without the leading dot
    pub extension: String,
    /// Whether the file looks like a test file
    pub is_test: bool,
    /// Whether the file is a type-definition file
    pub is_type_def: bool,
    /// Shared project context
    pub project: Arc<ProjectContext>,
}

/// Builds detection contexts for the files of one scan
pub struct ContextBuilder {
    project: Arc<ProjectContext>,
}

impl ContextBuilder {
    /// Creates a builder over the given project context
    pub fn new(project: Arc<ProjectContext>) -> Self {
        Self { project }
    }

    /// The shared project context
    pub fn project(&self) -> &Arc<ProjectContext> {
        &self.project
    }

    /// Builds the context for one file.
    ///
    /// Returns `Ok(None)` when the file's language cannot be resolved;
    /// such files are skipped, not errors.
    pub fn build(&self, relative: &Path, content: String) -> Result<Option<DetectionContext>> {
        let extension = relative
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let Some(language) = Language::from_extension(&extension) else {
            return Ok(None);
        };

        let imports = extract_imports(&content, language);
        let exports = extract_exports(&content, language);
        let is_test = is_test_file(relative);
        let is_type_def = is_type_definition_file(relative);

        Ok(Some(DetectionContext {
            file: relative.to_path_buf(),
            content,
            language,
            tree: None,
            imports,
            exports,
            extension,
            is_test,
            is_type_def,
            project: Arc::clone(&self.project),
        }))
    }
}

/// Heuristic test-file classification shared by the context builder and
/// the watch engine
pub fn is_test_file(path: &Path) -> bool {
    let p = path.to_string_lossy().replace('\\', "/");
    let lower = p.to_lowercase();
    if lower.contains(".test.") || lower.contains(".spec.") {
        return true;
    }
    let segments: Vec<&str> = lower.split('/').collect();
    segments
        .iter()
        .any(|s| *s == "__tests__" || *s == "test" || *s == "tests")
}

/// True for TypeScript declaration files
pub fn is_type_definition_file(path: &Path) -> bool {
    path.to_string_lossy().to_lowercase().ends_with(".d.ts")
}

fn extract_imports(content: &str, language: Language) -> Vec<String> {
    let mut imports = Vec::new();
    for line in content.lines().map(str::trim) {
        let source = match language {
            Language::TypeScript | Language::JavaScript => {
                if line.starts_with("import ") || line.starts_with("export ") {
                    between(line, " from ", &['\'', '"'])
                } else if let Some(rest) = line.strip_prefix("const ") {
                    rest.contains("require(").then(|| quoted_arg(line)).flatten()
                } else {
                    None
                }
            }
            Language::Python => {
                if let Some(rest) = line.strip_prefix("import ") {
                    Some(rest.split_whitespace().next().unwrap_or("").to_string())
                } else if let Some(rest) = line.strip_prefix("from ") {
                    Some(rest.split_whitespace().next().unwrap_or("").to_string())
                } else {
                    None
                }
            }
            Language::Java | Language::CSharp => {
                let keyword = if language == Language::Java { "import " } else { "using " };
                line.strip_prefix(keyword)
                    .map(|rest| rest.trim_end_matches(';').to_string())
            }
            Language::Go => line
                .strip_prefix("import ")
                .and_then(|_| quoted_arg(line))
                .or_else(|| {
                    (line.starts_with('"') && line.ends_with('"') && line.len() > 2)
                        .then(|| line.trim_matches('"').to_string())
                }),
            Language::Rust => line
                .strip_prefix("use ")
                .map(|rest| rest.trim_end_matches(';').to_string()),
            Language::Php => line
                .strip_prefix("use ")
                .map(|rest| rest.trim_end_matches(';').to_string()),
            Language::Cpp | Language::C => line
                .strip_prefix("#include")
                .map(|rest| rest.trim().trim_matches(&['<', '>', '"'][..]).to_string()),
        };
        if let Some(s) = source {
            if !s.is_empty() {
                imports.push(s);
            }
        }
    }
    imports
}

fn extract_exports(content: &str, language: Language) -> Vec<String> {
    let mut exports = Vec::new();
    for line in content.lines().map(str::trim) {
        match language {
            Language::TypeScript | Language::JavaScript => {
                if let Some(rest) = line.strip_prefix("export ") {
                    if let Some(name) = declared_name(rest) {
                        exports.push(name);
                    }
                }
            }
            Language::Rust => {
                if let Some(rest) = line.strip_prefix("pub ") {
                    if let Some(name) = declared_name(rest) {
                        exports.push(name);
                    }
                }
            }
            Language::Go => {
                if let Some(rest) = line.strip_prefix("func ") {
                    let name: String = rest
                        .chars()
                        .take_while(|c| c.is_alphanumeric() || *c == '_')
                        .collect();
                    if name.chars().next().is_some_and(char::is_uppercase) {
                        exports.push(name);
                    }
                }
            }
            _ => {}
        }
    }
    exports
}

fn declared_name(rest: &str) -> Option<String> {
    let rest = rest
        .trim_start_matches("default ")
        .trim_start_matches("async ");
    for keyword in [
        "function ", "class ", "interface ", "type ", "const ", "let ", "var ", "enum ",
        "fn ", "struct ", "trait ", "mod ",
    ] {
        if let Some(after) = rest.strip_prefix(keyword) {
            let name: String = after
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

fn between(line: &str, marker: &str, quotes: &[char]) -> Option<String> {
    let after = line.split(marker).nth(1)?;
    let after = after.trim().trim_start_matches(quotes);
    let end = after.find(quotes)?;
    Some(after[..end].to_string())
}

fn quoted_arg(line: &str) -> Option<String> {
    let start = line.find(['\'', '"'])?;
    let quote = line.as_bytes()[start] as char;
    let rest = &line[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// Finds the nearest named construct enclosing `line`, scanning upward.
///
/// Best-effort anchoring for semantic locations; returns the module scope
/// when nothing closer matches.
pub fn enclosing_symbol(content: &str, line: u32) -> (SymbolKind, String) {
    static DECL: OnceLock<Regex> = OnceLock::new();
    let decl = DECL.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^\s*(?:export\s+|pub(?:\([^)]*\))?\s+|public\s+|private\s+|protected\s+|static\s+|default\s+|abstract\s+)*
            (?:async\s+)?
            (?P<kw>class|interface|trait|struct|enum|type|function|fn|def|func)\s+
            (?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("declaration regex is valid")
    });

    let lines: Vec<&str> = content.lines().collect();
    let upto = (line as usize).min(lines.len());
    for candidate in lines[..upto].iter().rev() {
        if let Some(caps) = decl.captures(candidate) {
            let kind = match &caps["kw"] {
                "class" | "struct" => SymbolKind::Class,
                "interface" | "trait" => SymbolKind::Interface,
                "type" | "enum" => SymbolKind::Type,
                _ => SymbolKind::Function,
            };
            return (kind, caps["name"].to_string());
        }
    }
    (SymbolKind::Module, "module".to_string())
}
