//! Persisted defaults.
//!
//! Saves check settings to ~/.config/conncheck/config.toml. Every field is
//! optional; whatever is present overrides the built-in default, and command
//! line flags override the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

/// User preferences
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Seconds between probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    /// Per-probe timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
    #[serde(default, skip_serializing_if = "ThresholdPrefs::is_empty")]
    pub thresholds: ThresholdPrefs,
}

/// Threshold overrides in seconds
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excellent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poor: Option<f64>,
}

impl ThresholdPrefs {
    fn is_empty(&self) -> bool {
        self.excellent.is_none() && self.good.is_none() && self.poor.is_none()
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Config(format!("{} must be a non-negative number of seconds", field)))
}

impl Prefs {
    /// Get config file path: ~/.config/conncheck/config.toml
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("conncheck").join("config.toml"))
    }

    /// Load preferences from the default path (returns default if missing/invalid)
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Load preferences from an explicit path, failing on any problem
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save preferences to the default path
    pub fn save(&self) -> Result<()> {
        match Self::path() {
            Some(path) => self.save_to(&path),
            None => Err(Error::Config("no config directory on this platform".into())),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Capture every setting of `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            target: Some(config.target.clone()),
            count: Some(config.count),
            interval: Some(config.interval.as_secs_f64()),
            timeout: Some(config.timeout.as_secs_f64()),
            payload_size: Some(config.payload_size),
            thresholds: ThresholdPrefs {
                excellent: Some(config.thresholds.excellent.as_secs_f64()),
                good: Some(config.thresholds.good.as_secs_f64()),
                poor: Some(config.thresholds.poor.as_secs_f64()),
            },
        }
    }

    /// Override `config` with every field present here
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(ref target) = self.target {
            config.target = target.clone();
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(interval) = self.interval {
            config.interval = seconds("interval", interval)?;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = seconds("timeout", timeout)?;
        }
        if let Some(payload_size) = self.payload_size {
            config.payload_size = payload_size;
        }
        if let Some(excellent) = self.thresholds.excellent {
            config.thresholds.excellent = seconds("thresholds.excellent", excellent)?;
        }
        if let Some(good) = self.thresholds.good {
            config.thresholds.good = seconds("thresholds.good", good)?;
        }
        if let Some(poor) = self.thresholds.poor {
            config.thresholds.poor = seconds("thresholds.poor", poor)?;
        }
        Ok(())
    }
}
