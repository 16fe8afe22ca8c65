//! Configuration loading for REDI services
//!
//! Resolution priority for every setting: environment variable → TOML
//! config file → compiled default. The TOML file lives at
//! `~/.config/redi/redi-ingest.toml` (override the whole path with
//! `REDI_CONFIG`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML-backed service configuration.
///
/// Every field has a serde default so a partial (or missing) file is
/// still valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite database file path
    pub database_path: PathBuf,

    /// HTTP bind address
    pub bind_address: String,

    /// Two-letter jurisdiction code; rows for any other state are
    /// silently dropped during ingestion
    pub target_state: String,

    /// Primary external parcel-lookup endpoint (search-result text API)
    pub primary_lookup_url: Option<String>,

    /// Secondary external parcel-lookup endpoint, tried after the primary
    pub secondary_lookup_url: Option<String>,

    /// API token for the secondary lookup provider
    pub secondary_lookup_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: "127.0.0.1:5810".to_string(),
            target_state: "WA".to_string(),
            primary_lookup_url: None,
            secondary_lookup_url: None,
            secondary_lookup_token: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration: TOML file first, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REDI_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REDI_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("REDI_TARGET_STATE") {
            self.target_state = v;
        }
        if let Ok(v) = std::env::var("REDI_PRIMARY_LOOKUP_URL") {
            self.primary_lookup_url = Some(v);
        }
        if let Ok(v) = std::env::var("REDI_SECONDARY_LOOKUP_URL") {
            self.secondary_lookup_url = Some(v);
        }
        if let Ok(v) = std::env::var("REDI_SECONDARY_LOOKUP_TOKEN") {
            self.secondary_lookup_token = Some(v);
        }
        // Uppercase so the ingest-time jurisdiction comparison is exact
        self.target_state = self.target_state.trim().to_uppercase();
    }
}

/// Default config file path: `$XDG_CONFIG_HOME/redi/redi-ingest.toml`
/// (overridable with `REDI_CONFIG`).
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("REDI_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("redi").join("redi-ingest.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("redi")
        .join("redi.db")
}

/// Write configuration back to a TOML file (best-effort, atomic rename).
pub fn write_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.target_state, "WA");
        assert!(config.primary_lookup_url.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ServiceConfig = toml::from_str(r#"target_state = "or""#).unwrap();
        assert_eq!(config.target_state, "or");
        assert_eq!(config.bind_address, "127.0.0.1:5810");
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redi-ingest.toml");
        let mut config = ServiceConfig::default();
        config.target_state = "WA".to_string();
        write_config(&config, &path).unwrap();
        let loaded = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.target_state, "WA");
        assert_eq!(loaded.database_path, config.database_path);
    }
}
