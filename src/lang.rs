//! Language resolution from file extensions
//!
//! All cross-component identifiers use the closed [`Language`] set. Two
//! distinct extensions may resolve to the same tag (e.g. `.tsx` and `.mts`
//! both resolve to TypeScript).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The closed set of languages the analyzer recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// TypeScript (including TSX)
    TypeScript,
    /// JavaScript (including JSX)
    JavaScript,
    /// Python
    Python,
    /// Java
    Java,
    /// C#
    CSharp,
    /// PHP
    Php,
    /// Go
    Go,
    /// Rust
    Rust,
    /// C++
    Cpp,
    /// C
    C,
}

impl Language {
    /// All recognized languages
    pub fn all() -> &'static [Language] {
        &[
            Language::TypeScript,
            Language::JavaScript,
            Language::Python,
            Language::Java,
            Language::CSharp,
            Language::Php,
            Language::Go,
            Language::Rust,
            Language::Cpp,
            Language::C,
        ]
    }

    /// Resolves a file extension (without the leading dot, any case) to a
    /// language tag. Returns `None` for unrecognized extensions.
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext.to_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "py" | "pyi" => Some(Language::Python),
            "java" => Some(Language::Java),
            "cs" => Some(Language::CSharp),
            "php" => Some(Language::Php),
            "go" => Some(Language::Go),
            "rs" => Some(Language::Rust),
            "cpp" | "cc" | "cxx" | "c++" | "hpp" | "hxx" | "hh" => Some(Language::Cpp),
            "c" | "h" => Some(Language::C),
            _ => None,
        }
    }

    /// Resolves a path to a language tag via its extension
    pub fn from_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    /// Short identifier used in persisted documents and logs
    pub fn id(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::CSharp => "csharp",
            Self::Php => "php",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Cpp => "cpp",
            Self::C => "c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_resolution() {
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("mts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("PY"), Some(Language::Python));
        assert_eq!(Language::from_extension("hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("h"), Some(Language::C));
        assert_eq!(Language::from_extension("txt"), None);
        assert_eq!(Language::from_extension(""), None);
    }

    #[test]
    fn test_path_resolution() {
        assert_eq!(
            Language::from_path(Path::new("src/app.test.tsx")),
            Some(Language::TypeScript)
        );
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }
}
