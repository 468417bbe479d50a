// Persistent user preferences

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".config/sockscope";
const CONFIG_FILE: &str = "config.json";

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Preferred socket mapper backend (procfs, lsof, libproc)
    #[serde(default)]
    pub preferred_socket_mapper: Option<String>,

    /// Preferred I/O enrichment backend (procnet, nettop)
    #[serde(default)]
    pub preferred_netio_backend: Option<String>,

    /// Collect per-process byte counters
    #[serde(default = "default_enrichment")]
    pub enrichment: bool,

    /// Upper bound for external commands and a whole collection
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Signal used by `kill` when none is given
    #[serde(default = "default_signal")]
    pub default_signal: String,
}

fn default_enrichment() -> bool {
    true
}

fn default_command_timeout_secs() -> u64 {
    5
}

fn default_signal() -> String {
    "TERM".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_socket_mapper: None,
            preferred_netio_backend: None,
            enrichment: default_enrichment(),
            command_timeout_secs: default_command_timeout_secs(),
            default_signal: default_signal(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sockscope-config-{}-{}", name, std::process::id()))
            .join(CONFIG_FILE)
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"preferred_socket_mapper":"lsof"}"#).unwrap();
        assert_eq!(config.preferred_socket_mapper.as_deref(), Some("lsof"));
        assert!(config.enrichment);
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_signal, "TERM");
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(&scratch_path("missing")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = scratch_path("file");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"preferred_netio_backend":"nettop","enrichment":false,"command_timeout_secs":12}"#,
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded,
            Config {
                preferred_netio_backend: Some("nettop".to_string()),
                enrichment: false,
                command_timeout_secs: 12,
                ..Config::default()
            }
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let path = scratch_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
