use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sync-layer settings, read from `.satchel/config.toml`. Every field has a
/// default so a missing file means "local only until told otherwise".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the task server, e.g. `http://127.0.0.1:4000/api`.
    pub server_url: String,
    /// Bearer token attached to remote calls. Issuance and renewal live
    /// outside this tool; paste a valid token here.
    pub auth_token: Option<String>,
    /// Cadence of periodic reconciliation while online.
    pub sync_interval_secs: u64,
    /// How long connectivity must stay up before an offline-to-online
    /// transition fires a pass.
    pub settle_delay_ms: u64,
    /// How often the watch loop probes connectivity.
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4000/api".to_string(),
            auth_token: None,
            sync_interval_secs: 30,
            settle_delay_ms: 1000,
            poll_interval_secs: 5,
        }
    }
}

impl Config {
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self).map_err(ConfigError::Render)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse {
        path: String,
        source: toml::de::Error,
    },
    Render(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config I/O error: {}", err),
            ConfigError::Parse { path, source } => {
                write!(f, "config '{}' is not valid TOML: {}", path, source)
            }
            ConfigError::Render(err) => write!(f, "config could not be rendered: {}", err),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Render(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}
