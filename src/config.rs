use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable pointing to an explicit settings file
pub const CONFIG_ENV: &str = "SWITCH2_BRIDGE_CONFIG";

const CONFIG_DIR: &str = "switch2-bridge";
const CONFIG_FILE: &str = "settings.toml";

const MIN_KEEP_ALIVE_MS: u64 = 10;
const MAX_KEEP_ALIVE_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// Where key events go
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardBackend {
    /// Virtual keyboard through /dev/uinput
    #[default]
    Uinput,
    /// Only log key events
    Log,
}

/// Timing and output settings of the bridge
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeSettings {
    /// How long one discovery scan runs
    pub scan_timeout_ms: u64,

    /// Upper bound for establishing the BLE connection
    pub connect_timeout_ms: u64,

    /// Liveness and stop check interval while connected. Bounds the latency
    /// of disconnect detection and of `stop()`.
    pub keep_alive_interval_ms: u64,

    pub keyboard_backend: KeyboardBackend,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 5_000,
            connect_timeout_ms: 30_000,
            keep_alive_interval_ms: 100,
            keyboard_backend: KeyboardBackend::default(),
        }
    }
}

impl BridgeSettings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "scan_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if !(MIN_KEEP_ALIVE_MS..=MAX_KEEP_ALIVE_MS).contains(&self.keep_alive_interval_ms) {
            return Err(ConfigError::InvalidSetting(format!(
                "keep_alive_interval_ms must be within {}..={} (got {})",
                MIN_KEEP_ALIVE_MS, MAX_KEEP_ALIVE_MS, self.keep_alive_interval_ms
            )));
        }
        Ok(())
    }

    /// Default location: `<config dir>/switch2-bridge/settings.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads the settings file named by [`CONFIG_ENV`] or the default path.
    /// A missing file yields the defaults; the file is never written.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::default_path(),
        };

        match path {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                debug!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
