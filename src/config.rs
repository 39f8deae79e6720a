//! Engine configuration: where the two remote services live, how long to
//! wait for them, and where durable state goes on disk.
//!
//! Configuration is stored at `~/.config/rutacache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "rutacache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default per-request timeout, generous to accommodate spotty mobile links.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the backend API (login, catalog, orders).
    pub api_base_url: String,
    /// Base URL of the spreadsheet-backed service (routes, visits).
    pub sheet_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Override for the durable store directory; platform default when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            sheet_base_url: String::new(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"api_base_url":"https://api.example.com","sheet_base_url":"https://sheet.example.com"}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.data_dir.is_none());
    }
}
