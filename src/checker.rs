//! Application-facing quality check.
//!
//! Owns at most one batch at a time and forwards its progress to a
//! [`QualityObserver`]. All observer callbacks for a run are delivered from a
//! single forwarding task, in order.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::analyzer::{QualityAnalyzer, SampleAnalyzer};
use crate::config::Config;
use crate::error::TransportError;
use crate::measure::{MeasureEvent, ProbeLink, ProbeOrchestrator, ProbeSettings};
use crate::probe::{IcmpPinger, ProbeTransport};
use crate::state::{ProbeRecord, QualityVerdict};

/// Receives the lifecycle of each quality check
pub trait QualityObserver: Send + Sync {
    fn on_start(&self) {}

    /// Fraction of probes resolved (0.0..=1.0)
    fn on_progress(&self, _fraction: f64) {}

    fn on_sample(&self, _record: &ProbeRecord) {}

    /// The transport failed; `on_finish(None)` follows
    fn on_error(&self, _error: &TransportError) {}

    /// Run over. `None` when cancelled or failed.
    fn on_finish(&self, verdict: Option<QualityVerdict>);
}

struct Run {
    id: u64,
    orchestrator: ProbeOrchestrator,
}

pub struct QualityChecker {
    link: Arc<ProbeLink>,
    analyzer: Arc<dyn SampleAnalyzer>,
    settings: ProbeSettings,
    observer: Arc<dyn QualityObserver>,
    current: Arc<Mutex<Option<Run>>>,
    next_run: AtomicU64,
}

impl QualityChecker {
    /// Build a checker over an existing transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        config: &Config,
        observer: Arc<dyn QualityObserver>,
    ) -> Self {
        Self {
            link: ProbeLink::new(transport),
            analyzer: Arc::new(QualityAnalyzer::new(config.thresholds)),
            settings: ProbeSettings::from(config),
            observer,
            current: Arc::new(Mutex::new(None)),
            next_run: AtomicU64::new(0),
        }
    }

    /// Build a checker that pings `config.target` over ICMP
    pub fn icmp(config: &Config, observer: Arc<dyn QualityObserver>) -> Self {
        let pinger = IcmpPinger::with_payload(config.target.clone(), config.payload_size);
        Self::new(pinger, config, observer)
    }

    /// Replace the default worst-case analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SampleAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn transport(&self) -> &Arc<dyn ProbeTransport> {
        self.link.transport()
    }

    pub fn in_progress(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Begin a run. No-op while one is already in flight.
    pub fn start(&self) {
        let mut current = self.current.lock();
        if current.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = ProbeOrchestrator::new(
            Arc::clone(&self.link),
            Arc::clone(&self.analyzer),
            self.settings,
            tx,
        );
        orchestrator.start();

        let id = self.next_run.fetch_add(1, Ordering::SeqCst);
        *current = Some(Run { id, orchestrator });

        debug!(run = id, "Quality check started");
        // Events stay buffered until the forwarder has delivered on_start
        tokio::spawn(forward(
            rx,
            Arc::clone(&self.observer),
            Arc::clone(&self.current),
            id,
        ));
    }

    /// Abort the run in flight. No-op when idle.
    pub fn cancel(&self) {
        if let Some(run) = self.current.lock().as_ref() {
            run.orchestrator.cancel();
        }
    }
}

impl Drop for QualityChecker {
    fn drop(&mut self) {
        if let Some(run) = self.current.lock().take() {
            run.orchestrator.cancel();
        }
    }
}

async fn forward(
    mut events: mpsc::UnboundedReceiver<MeasureEvent>,
    observer: Arc<dyn QualityObserver>,
    current: Arc<Mutex<Option<Run>>>,
    id: u64,
) {
    observer.on_start();

    while let Some(event) = events.recv().await {
        match event {
            MeasureEvent::Sample(record) => observer.on_sample(&record),
            MeasureEvent::Progress(fraction) => observer.on_progress(fraction),
            MeasureEvent::Failed(error) => observer.on_error(&error),
            MeasureEvent::Finished(verdict) => {
                let finished = {
                    let mut current = current.lock();
                    if current.as_ref().is_some_and(|run| run.id == id) {
                        current.take()
                    } else {
                        None
                    }
                };
                // Drop the orchestrator outside the lock, before the observer may restart
                drop(finished);
                debug!(run = id, ?verdict, "Quality check finished");
                observer.on_finish(verdict);
                return;
            }
        }
    }
}
