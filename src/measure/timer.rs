use std::time::Duration;
use tokio::time::Instant;

/// Stopwatch for a single round trip.
///
/// Uses tokio's clock so paused-time tests measure virtual time.
#[derive(Debug, Clone, Copy)]
pub struct RoundTripTimer {
    started: Instant,
}

impl RoundTripTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Time elapsed since the timer was started
    pub fn elapsed(&self) -> Duration {
        Instant::now().duration_since(self.started)
    }
}
