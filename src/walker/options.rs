//! Walker option record

use serde::{Deserialize, Serialize};

/// Options controlling a workspace traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkOptions {
    /// Honour `.gitignore` files at every directory level
    pub respect_gitignore: bool,
    /// Honour `.driftignore` files at every directory level
    pub respect_driftignore: bool,
    /// Follow symlinks (loops are detected and reported)
    pub follow_symlinks: bool,
    /// Compute a short content hash for every emitted file
    pub compute_hashes: bool,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
    /// Prune directories deeper than this (None = unlimited)
    pub max_depth: Option<usize>,
    /// Only emit files with these extensions (None = all)
    pub extensions: Option<Vec<String>>,
    /// Include globs; when non-empty, a file must match one
    pub include: Vec<String>,
    /// Exclude globs applied after includes
    pub exclude: Vec<String>,
    /// Extra ignore patterns layered on top of the ignore files
    pub custom_ignores: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            respect_driftignore: true,
            follow_symlinks: false,
            compute_hashes: true,
            max_file_size: 2 * 1024 * 1024,
            max_depth: None,
            extensions: None,
            include: Vec::new(),
            exclude: vec![
                "node_modules/**".to_string(),
                "target/**".to_string(),
                "dist/**".to_string(),
                "build/**".to_string(),
                ".git/**".to_string(),
                ".drift/**".to_string(),
            ],
            custom_ignores: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Options restricted to the extensions of the closed language set
    pub fn source_only() -> Self {
        Self {
            extensions: Some(
                [
                    "ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs", "py", "pyi", "java",
                    "cs", "php", "go", "rs", "cpp", "cc", "cxx", "hpp", "hxx", "hh", "c", "h",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ),
            ..Self::default()
        }
    }
}
