//! TOML configuration
//!
//! Every section and every field has a sensible default, so an empty file
//! (or a missing section) yields a working config. Unknown fields are
//! tolerated for forward compatibility.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alert::AlertConfig;
use crate::batch::BatchConfig;
use crate::flow::FlowConfig;

fn default_db_path() -> PathBuf {
    PathBuf::from("packeteye.db")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("models")
}

/// Database section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Model artifact section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding the pretrained artifact bundle
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self { dir: default_artifact_dir() }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

impl Config {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.flow.max_flows, 100_000);
        assert_eq!(config.batch.max_size, 10);
        assert!(config.alerts.webhook_url.is_none());
        assert_eq!(config.database.path, PathBuf::from("packeteye.db"));
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.batch.max_size, 10);
        assert_eq!(config.artifacts.dir, PathBuf::from("models"));
    }

    #[test]
    fn test_partial_override() {
        let raw = r#"
            [batch]
            max_size = 32

            [alerts]
            webhook_url = "http://siem.internal/hook"
            allow_list = ["DDoS"]

            [database]
            path = "/var/lib/packeteye/packets.db"
        "#;
        let config: Config = toml::from_str(raw).unwrap();

        assert_eq!(config.batch.max_size, 32);
        // Unset fields in an overridden section still default
        assert_eq!(config.batch.max_age_secs, 1.0);
        assert_eq!(config.alerts.webhook_url.as_deref(), Some("http://siem.internal/hook"));
        assert_eq!(config.alerts.allow_list, vec!["DDoS".to_string()]);
        assert_eq!(config.flow.idle_timeout_secs, 300);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[flow]\nmax_flows = 500").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.flow.max_flows, 500);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/config.toml")).is_err());
    }
}
