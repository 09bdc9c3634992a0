use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use conncheck::config::{Config, MAX_PROBE_COUNT};

/// Grade network path quality from a short burst of ICMP echo probes
#[derive(Parser, Debug, Clone)]
#[command(name = "conncheck")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to probe (IP address or hostname) [default: 8.8.8.8]
    pub target: Option<String>,

    /// Number of probes in the batch
    #[arg(short = 'c', long = "count")]
    pub count: Option<usize>,

    /// Probe interval in seconds
    #[arg(short = 'i', long = "interval")]
    pub interval: Option<f64>,

    /// Per-probe timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<f64>,

    /// ICMP payload size in bytes
    #[arg(short = 's', long = "size")]
    pub payload_size: Option<usize>,

    /// Worst RTT (ms) still graded excellent
    #[arg(long = "excellent-ms")]
    pub excellent_ms: Option<u64>,

    /// Worst RTT (ms) still graded good
    #[arg(long = "good-ms")]
    pub good_ms: Option<u64>,

    /// Worst RTT (ms) still graded slow; above this is poor
    #[arg(long = "poor-ms")]
    pub poor_ms: Option<u64>,

    /// Output JSON
    #[arg(long = "json", conflicts_with_all = ["csv", "report"])]
    pub json: bool,

    /// Output CSV
    #[arg(long = "csv", conflicts_with = "report")]
    pub csv: bool,

    /// Output a text report
    #[arg(long = "report")]
    pub report: bool,

    /// Read settings from this file instead of the default location
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Persist the effective settings to the config file and exit
    #[arg(long = "save-config")]
    pub save_config: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Check if a structured output mode was requested
    pub fn is_batch_mode(&self) -> bool {
        self.json || self.csv || self.report
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if let Some(count) = self.count {
            if count == 0 {
                return Err("Count must be at least 1".into());
            }
            if count > MAX_PROBE_COUNT {
                return Err(format!("Count cannot exceed {}", MAX_PROBE_COUNT));
            }
        }

        if let Some(interval) = self.interval {
            seconds("Interval", interval)?;
        }

        if let Some(timeout) = self.timeout {
            seconds("Timeout", timeout)?;
        }

        if let Some(ref target) = self.target
            && target.trim().is_empty()
        {
            return Err("Target cannot be empty".into());
        }

        Ok(())
    }

    /// Overlay explicitly given flags on top of `config`
    pub fn apply_to(&self, config: &mut Config) -> Result<(), String> {
        if let Some(ref target) = self.target {
            config.target = target.trim().to_string();
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(interval) = self.interval {
            config.interval = seconds("Interval", interval)?;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = seconds("Timeout", timeout)?;
        }
        if let Some(size) = self.payload_size {
            config.payload_size = size;
        }
        if let Some(ms) = self.excellent_ms {
            config.thresholds.excellent = Duration::from_millis(ms);
        }
        if let Some(ms) = self.good_ms {
            config.thresholds.good = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poor_ms {
            config.thresholds.poor = Duration::from_millis(ms);
        }
        Ok(())
    }
}

/// Positive, representable number of seconds
fn seconds(name: &str, secs: f64) -> Result<Duration, String> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        Ok(_) => Err(format!("{} must be positive", name)),
        Err(_) => Err(format!("{} must be a positive number of seconds, got {}", name, secs)),
    }
}
