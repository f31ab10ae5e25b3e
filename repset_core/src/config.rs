//! Configuration file support for Repset.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/repset/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub checkin: CheckInConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    /// Path of the JSON store file inside the data directory
    pub fn store_path(&self) -> PathBuf {
        store_path_in(&self.data_dir)
    }
}

/// Path of the JSON store file inside `data_dir`
pub fn store_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join("store.json")
}

/// Rest timer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Send a desktop notification when a rest period ends
    #[serde(default = "default_true")]
    pub notifications: bool,

    /// Play a sound when a rest period ends
    #[serde(default = "default_true")]
    pub sound: bool,

    /// Used when an exercise has no rest time of its own
    #[serde(default = "default_rest_seconds")]
    pub default_rest_seconds: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            notifications: true,
            sound: true,
            default_rest_seconds: default_rest_seconds(),
        }
    }
}

/// History listing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

/// Check-in configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// Number of most recent check-ins used for streak calculation
    #[serde(default = "default_streak_window")]
    pub streak_window: usize,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            streak_window: default_streak_window(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("repset")
}

fn default_true() -> bool {
    true
}

fn default_rest_seconds() -> u32 {
    crate::DEFAULT_REST_SECONDS
}

fn default_history_limit() -> usize {
    50
}

fn default_streak_window() -> usize {
    60
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("repset").join("config.toml")
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.timer.default_rest_seconds > 300 {
            return Err(Error::Config(
                "timer.default_rest_seconds must be at most 300".into(),
            ));
        }
        if self.checkin.streak_window == 0 {
            return Err(Error::Config("checkin.streak_window must be positive".into()));
        }
        Ok(())
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
