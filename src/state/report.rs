use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::config::Config;
use crate::state::{ProbeRecord, QualityVerdict};

/// Everything known about one finished (or aborted) quality check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub target: String,
    pub resolved: Option<IpAddr>,
    pub started_at: DateTime<Utc>,
    pub config: Config,
    /// Resolved probes ordered by slot
    pub records: Vec<ProbeRecord>,
    /// None when the run was cancelled or the transport failed
    pub verdict: Option<QualityVerdict>,
    /// Transport failure that ended the run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MeasurementReport {
    pub fn new(config: Config) -> Self {
        Self {
            target: config.target.clone(),
            resolved: None,
            started_at: Utc::now(),
            config,
            records: Vec::new(),
            verdict: None,
            error: None,
        }
    }

    pub fn push(&mut self, record: ProbeRecord) {
        let at = self.records.partition_point(|r| r.slot < record.slot);
        self.records.insert(at, record);
    }

    pub fn lost(&self) -> usize {
        self.records.iter().filter(|r| r.sample.is_lost()).count()
    }

    pub fn loss_pct(&self) -> f64 {
        if self.records.is_empty() {
            0.0
        } else {
            self.lost() as f64 / self.records.len() as f64 * 100.0
        }
    }

    /// Slowest reply, the figure the verdict is graded on
    pub fn worst_rtt(&self) -> Option<Duration> {
        self.records.iter().filter_map(|r| r.sample.rtt()).max()
    }
}
