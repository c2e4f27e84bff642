//! Configuration file support.
//!
//! Configuration is read from, in order:
//! - the file named by the `METACATALOG_CONFIG` environment variable
//! - `metacatalog.toml` in the current directory
//!
//! Missing sections fall back to their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV_VAR: &str = "METACATALOG_CONFIG";
pub const CONFIG_FILE_NAME: &str = "metacatalog.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub store: StoreConfig,
    pub legacy_units: LegacyUnitsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite catalog file
    pub path: PathBuf,

    /// Open without write access
    pub readonly: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("catalog.db"),
            readonly: true,
        }
    }
}

/// Where the reference "Units" and "Formats" schemas live for stores
/// without unit-family tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyUnitsConfig {
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` takes
    /// precedence when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "metacatalog=info".to_string(),
        }
    }
}

impl CatalogConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Find and load the configuration, or defaults when none is found.
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if let Ok(config) = Self::load(Path::new(&path)) {
                return config;
            }
        }

        let current = PathBuf::from(CONFIG_FILE_NAME);
        if current.exists() {
            if let Ok(config) = Self::load(&current) {
                return config;
            }
        }

        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.store.path, PathBuf::from("catalog.db"));
        assert!(config.store.readonly);
        assert!(config.legacy_units.directory.is_none());
        assert_eq!(config.logging.filter, "metacatalog=info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: CatalogConfig = toml::from_str(
            r#"
            [legacy_units]
            directory = "/opt/standard"
            "#,
        )
        .unwrap();
        assert_eq!(config.legacy_units.directory, Some(PathBuf::from("/opt/standard")));
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = CatalogConfig::default();
        config.store.path = dir.path().join("plant.db");
        config.store.readonly = false;
        config.logging.filter = "debug".into();

        config.save(&path).unwrap();
        assert_eq!(CatalogConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "store = 3").unwrap();
        let err = CatalogConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
