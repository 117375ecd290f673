//! Application configuration.
//!
//! Settings load from `~/.crewdesk/config.json` when present, with
//! environment variables taking precedence. Every field has a default, so
//! a missing file is not an error.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR: &str = ".crewdesk";
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    HomeDirNotFound,

    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Could not parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Absolute path of the SQLite database. `None` means the default
    /// location under the config directory.
    pub db_path: Option<PathBuf>,
    /// Public base URL used in alert email task links.
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration: file values first, then environment overrides
    /// (`CREWDESK_DB_PATH`, `CREWDESK_BASE_URL`).
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_file_path() {
            Ok(path) if path.exists() => {
                let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            _ => Self::default(),
        };

        if let Ok(path) = std::env::var("CREWDESK_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("CREWDESK_BASE_URL") {
            config.base_url = url;
        }
        Ok(config)
    }

    /// `~/.crewdesk/config.json`
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}
