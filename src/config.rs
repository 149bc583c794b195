//! Application configuration, read from `config.toml`.
//!
//! ```toml
//! data_dir = "/home/me/.local/share/gdd"
//!
//! [remote]
//! sync_endpoint = "http://127.0.0.1:8787/api/projects/sync"
//! rest_url = "http://127.0.0.1:8787/rest/v1"
//! auth_url = "http://127.0.0.1:8787/auth/v1"
//!
//! [server]
//! bind = "127.0.0.1:8787"
//!
//! [server.sessions]
//! "dev-token" = "dev-user"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `data_dir`
pub const DATA_DIR_ENV: &str = "GDD_DATA_DIR";

const DEFAULT_BIND: &str = "127.0.0.1:8787";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Could not determine a config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub server: ServerConfig,
}

/// Where the remote store lives. The table API is required for sync; the
/// sync endpoint is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub sync_endpoint: Option<String>,
    pub rest_url: Option<String>,
    pub auth_url: Option<String>,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        self.rest_url.is_some()
    }
}

/// Settings for the reference sync server (`gdd-cli serve`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Access token to user id
    pub sessions: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            sessions: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/gdd/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("gdd").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            log::debug!("Config: loaded {:?}", path);
            Self::parse(&raw)?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(config)
    }
}
