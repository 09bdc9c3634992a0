//! Per-probe samples, batch lifecycle and the final quality rating.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::duration_serde;

/// Why a probe produced no round-trip time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    /// No reply before the per-probe timeout fired
    TimedOut,
    /// The transport reported it could not send the probe
    SendFailed,
}

impl LossReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TimedOut => "timeout",
            Self::SendFailed => "send failed",
        }
    }
}

/// Outcome of one probe. Resolved exactly once, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeSample {
    Reply {
        #[serde(with = "duration_serde")]
        rtt: Duration,
    },
    Lost {
        reason: LossReason,
    },
}

impl ProbeSample {
    pub fn reply(rtt: Duration) -> Self {
        Self::Reply { rtt }
    }

    pub fn lost(reason: LossReason) -> Self {
        Self::Lost { reason }
    }

    /// Round-trip time, or None for a lost probe
    pub fn rtt(&self) -> Option<Duration> {
        match self {
            Self::Reply { rtt } => Some(*rtt),
            Self::Lost { .. } => None,
        }
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost { .. })
    }
}

/// A resolved probe together with where it sat in the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// 0-based position in the batch schedule
    pub slot: usize,
    /// Echo sequence number the probe was sent with
    pub sequence: u16,
    pub sample: ProbeSample,
}

/// Discrete path quality, worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityVerdict {
    Absent,
    Poor,
    Slow,
    Good,
    Excellent,
}

impl QualityVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Poor => "poor",
            Self::Slow => "slow",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

impl fmt::Display for QualityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of one measurement batch.
///
/// `Ready -> InProgress -> {Finished | Cancelled}`; both ends are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Ready,
    InProgress,
    Finished(QualityVerdict),
    Cancelled,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Cancelled)
    }
}
