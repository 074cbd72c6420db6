//! Configuration structures for driftscan

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::gates::GatePolicy;
use crate::scan::ScanConfig;
use crate::walker::WalkOptions;
use crate::watch::WatchConfig;

/// The main configuration structure for driftscan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project settings
    pub project: ProjectConfig,

    /// Walker options
    pub walker: WalkOptions,

    /// Scan options
    pub scan: ScanConfig,

    /// Watch-mode options
    pub watch: WatchConfig,

    /// Quality-gate policy
    pub gates: GatePolicy,
}

/// Project-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root directory of the workspace
    pub root_dir: PathBuf,

    /// Branch reported in gate runs when none is supplied
    pub default_branch: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            default_branch: "main".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&toml).unwrap();
        assert_eq!(back.project.default_branch, "main");
        assert!(back.walker.respect_gitignore);
        assert!(back.scan.use_worker_pool);
        assert_eq!(back.watch.debounce_ms, 300);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[project]\ndefault_branch = \"trunk\"\n").unwrap();
        assert_eq!(config.project.default_branch, "trunk");
        assert_eq!(config.watch.save_debounce_ms, 1000);
    }
}
