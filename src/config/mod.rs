//! Configuration management for the module system
//!
//! Handles configuration loading and validation for the package access cache
//! and logging.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Package access cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Enable the cache (disabling never changes query results)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry count at which the cache clears itself
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    65_536
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 65_536,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modgraph=debug"); RUST_LOG takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Module system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessConfig {
    /// Package access cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AccessConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AccessConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AccessConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(anyhow::anyhow!(
                "cache.max_entries must be greater than 0 when the cache is enabled"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AccessConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, 65_536);
        assert!(config.logging.filter.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("access.toml");
        std::fs::write(&path, "[cache]\nenabled = false\n").unwrap();

        let config = AccessConfig::from_toml_file(&path).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.max_entries, 65_536);
    }

    #[test]
    fn test_json_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("access.json");
        let mut config = AccessConfig::default();
        config.logging.filter = Some("modgraph=debug".to_string());

        config.to_json_file(&path).unwrap();
        assert_eq!(AccessConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("access.toml");
        std::fs::write(&path, "[cache]\nmax_entries = 0\n").unwrap();
        assert!(AccessConfig::from_toml_file(&path).is_err());
    }
}
