//! Configuration for the leasedesk client
//!
//! Layers, lowest first: built-in defaults, `leasedesk.toml`, environment
//! variables (a `.env` file is loaded before this), then command-line flags.

use anyhow::Context;
use review_core::{Panel, RollbackPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_URL: &str = "LEASEDESK_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "LEASEDESK_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "LEASEDESK_DATA_DIR";
pub const ENV_PANEL: &str = "LEASEDESK_PANEL";
pub const ENV_ROLLBACK: &str = "LEASEDESK_ROLLBACK";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub review: ReviewConfig,
    pub storage: StorageConfig,
}

/// Backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout (default: 30)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub panel: Panel,
    pub rollback: RollbackPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the sealed client state lives
    pub data_dir: Option<PathBuf>,
}

/// `<config dir>/leasedesk/leasedesk.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("leasedesk").join("leasedesk.toml"))
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Load `explicit` (which must exist) or the default file (which may not)
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Apply `LEASEDESK_*` overrides read through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(url) = var(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(secs) = var(ENV_TIMEOUT_SECS) {
            self.api.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))?;
        }
        if let Some(dir) = var(ENV_DATA_DIR) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(panel) = var(ENV_PANEL) {
            self.review.panel = panel.parse::<Panel>().map_err(anyhow::Error::msg)?;
        }
        if let Some(policy) = var(ENV_ROLLBACK) {
            self.review.rollback = policy.parse::<RollbackPolicy>().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("leasedesk")))
            .unwrap_or_else(|| PathBuf::from(".leasedesk"))
    }
}
