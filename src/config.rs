use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Well-known host probed when no target is given
pub const DEFAULT_TARGET: &str = "8.8.8.8";
/// Probes per batch
pub const DEFAULT_PROBE_COUNT: usize = 5;
/// Upper bound on probes per batch
pub const MAX_PROBE_COUNT: usize = 64;
/// Echo payload size (standard ping)
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// Upper-inclusive RTT bounds used to grade a loss-free batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(with = "duration_serde")]
    pub excellent: Duration,
    #[serde(with = "duration_serde")]
    pub good: Duration,
    #[serde(with = "duration_serde")]
    pub poor: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            excellent: Duration::from_millis(250),
            good: Duration::from_millis(500),
            poor: Duration::from_millis(1500),
        }
    }
}

/// Runtime configuration for one quality check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host the probes are sent to (IP address or hostname)
    pub target: String,
    /// Number of probes in a batch
    pub count: usize,
    /// Delay between consecutive probe sends
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// Per-probe reply timeout
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// ICMP payload bytes per probe
    pub payload_size: usize,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            count: DEFAULT_PROBE_COUNT,
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(3000),
            payload_size: DEFAULT_PAYLOAD_SIZE,
            thresholds: Thresholds::default(),
        }
    }
}

impl Config {
    /// Check that the configuration describes a runnable batch
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::Config("Target cannot be empty".into()));
        }

        if self.count == 0 {
            return Err(Error::Config("Probe count must be at least 1".into()));
        }

        if self.count > MAX_PROBE_COUNT {
            return Err(Error::Config(format!(
                "Probe count cannot exceed {}",
                MAX_PROBE_COUNT
            )));
        }

        if self.interval.is_zero() {
            return Err(Error::Config("Interval must be positive".into()));
        }

        if self.timeout.is_zero() {
            return Err(Error::Config("Timeout must be positive".into()));
        }

        let t = &self.thresholds;
        if !(t.excellent <= t.good && t.good <= t.poor) {
            return Err(Error::Config(format!(
                "Thresholds must ascend: excellent {:?} <= good {:?} <= poor {:?}",
                t.excellent, t.good, t.poor
            )));
        }

        Ok(())
    }
}

/// Serde helper for Duration
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
