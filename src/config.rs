//! CLI configuration
//!
//! Loaded from `arax.toml`; a missing or unreadable file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AraxConfig {
    /// Base URI that stored response ids are rendered under.
    pub base_uri: Option<String>,
    /// Where stored responses live.
    pub store: StoreConfig,
    /// Where query tracker entries live.
    pub tracker: TrackerConfig,
    pub callback: CallbackConfig,
    pub expand: ExpandConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Fs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Fs,
            dir: arax_home().join("responses"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub backend: Backend,
    pub dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Fs,
            dir: arax_home().join("tracker"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Per-delivery HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    /// Used when neither the request nor `expand` sets `kp_timeout`.
    pub default_kp_timeout_secs: Option<u64>,
}

fn arax_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".arax")
}

impl AraxConfig {
    /// Default location: `~/.arax/arax.toml`.
    pub fn default_path() -> PathBuf {
        arax_home().join("arax.toml")
    }

    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback.timeout_secs)
    }

    pub fn default_kp_timeout(&self) -> Option<Duration> {
        self.expand.default_kp_timeout_secs.map(Duration::from_secs)
    }
}
