//! Reduces a batch of probe samples to a [`QualityVerdict`].
//!
//! Loss dominates: any lost probe forces `Poor`, and a batch with no replies at
//! all is `Absent`. A loss-free batch is graded by its slowest probe against
//! upper-inclusive thresholds.

use std::time::Duration;

use crate::config::Thresholds;
use crate::state::{ProbeSample, QualityVerdict};

/// Anything that can grade a finished batch
pub trait SampleAnalyzer: Send + Sync {
    fn analyze(&self, samples: &[ProbeSample]) -> QualityVerdict;
}

/// Worst-case RTT grading with fixed thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAnalyzer {
    thresholds: Thresholds,
}

impl QualityAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    fn grade(&self, worst: Duration) -> QualityVerdict {
        let t = &self.thresholds;
        if worst <= t.excellent {
            QualityVerdict::Excellent
        } else if worst <= t.good {
            QualityVerdict::Good
        } else if worst <= t.poor {
            QualityVerdict::Slow
        } else {
            QualityVerdict::Poor
        }
    }
}

impl SampleAnalyzer for QualityAnalyzer {
    fn analyze(&self, samples: &[ProbeSample]) -> QualityVerdict {
        let lost = samples.iter().filter(|s| s.is_lost()).count();

        if lost == samples.len() {
            // Covers the empty batch too
            return QualityVerdict::Absent;
        }
        if lost > 0 {
            return QualityVerdict::Poor;
        }

        let worst = samples
            .iter()
            .filter_map(ProbeSample::rtt)
            .max()
            .unwrap_or(Duration::ZERO);
        self.grade(worst)
    }
}
