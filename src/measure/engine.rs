use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::analyzer::SampleAnalyzer;
use crate::config::Config;
use crate::error::TransportError;
use crate::measure::link::{DispatchError, ProbeLink};
use crate::measure::pending::{PendingMap, PendingProbe};
use crate::measure::timer::RoundTripTimer;
use crate::probe::{ProbeTransport, TransportEvent};
use crate::state::{BatchState, LossReason, ProbeRecord, ProbeSample, QualityVerdict};

/// Batch shape used by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Probes per batch
    pub count: usize,
    /// Delay between consecutive probe sends
    pub interval: Duration,
    /// Per-probe reply timeout
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ProbeSettings {
    fn from(config: &Config) -> Self {
        Self {
            count: config.count,
            interval: config.interval,
            timeout: config.timeout,
        }
    }
}

/// Notification from a running batch to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureEvent {
    /// One probe resolved
    Sample(ProbeRecord),
    /// Fraction of probes resolved so far (0.0..=1.0)
    Progress(f64),
    /// The transport failed; a `Finished(None)` follows
    Failed(TransportError),
    /// Batch over. `None` when cancelled or failed.
    Finished(Option<QualityVerdict>),
}

enum Resolution {
    Reply,
    Lost(LossReason),
}

/// Runs one batch of timed probes and grades the result.
///
/// Probe `i` is sent at `start + i * interval`. Every probe resolves exactly
/// once, by reply, send failure or timeout, and once all of them have the
/// samples are handed to the analyzer.
pub struct ProbeOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    link: Arc<ProbeLink>,
    analyzer: Arc<dyn SampleAnalyzer>,
    settings: ProbeSettings,
    phase: Mutex<BatchState>,
    pending: PendingMap,
    samples: Mutex<Vec<ProbeRecord>>,
    resolved: AtomicUsize,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<MeasureEvent>,
}

impl ProbeOrchestrator {
    pub fn new(
        link: Arc<ProbeLink>,
        analyzer: Arc<dyn SampleAnalyzer>,
        settings: ProbeSettings,
        events: mpsc::UnboundedSender<MeasureEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                link,
                analyzer,
                settings,
                phase: Mutex::new(BatchState::Ready),
                pending: PendingMap::new(),
                samples: Mutex::new(Vec::with_capacity(settings.count)),
                resolved: AtomicUsize::new(0),
                cancel: CancellationToken::new(),
                events,
            }),
        }
    }

    /// Start the batch.
    ///
    /// No-op while running or after cancellation. After a finished batch the
    /// stored verdict is replayed as a new `Finished` event without probing.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        {
            let mut phase = self.inner.phase.lock();
            match *phase {
                BatchState::Ready => *phase = BatchState::InProgress,
                BatchState::InProgress | BatchState::Cancelled => return,
                BatchState::Finished(verdict) => {
                    drop(phase);
                    self.inner.emit(MeasureEvent::Finished(Some(verdict)));
                    return;
                }
            }
        }

        let settings = self.inner.settings;
        info!(
            count = settings.count,
            interval_ms = settings.interval.as_millis() as u64,
            timeout_ms = settings.timeout.as_millis() as u64,
            "Starting probe batch"
        );

        if settings.count == 0 {
            self.inner.finish();
            return;
        }

        // Subscribe before the first send so no reply can be missed
        let events = self.inner.link.subscribe();

        // A failure published before we subscribed is only visible here
        if let Some(error) = self.inner.link.transport().failed() {
            warn!(%error, "Probe transport already failed, cancelling batch");
            self.inner.abort(Some(error));
            return;
        }
        tokio::spawn(Arc::clone(&self.inner).pump(events));

        let started = Instant::now();
        for slot in 0..settings.count {
            let inner = Arc::clone(&self.inner);
            let token = self.inner.cancel.child_token();
            let deadline = started + settings.interval * slot as u32;
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => inner.dispatch(slot),
                }
            });
        }
    }

    /// Abort a running batch. Emits `Finished(None)`; no-op unless running.
    pub fn cancel(&self) {
        self.inner.abort(None);
    }

    pub fn state(&self) -> BatchState {
        *self.inner.phase.lock()
    }

    /// Verdict of a finished batch
    pub fn verdict(&self) -> Option<QualityVerdict> {
        match self.state() {
            BatchState::Finished(verdict) => Some(verdict),
            _ => None,
        }
    }

    /// Number of probes resolved so far
    pub fn resolved(&self) -> usize {
        self.inner.resolved.load(Ordering::SeqCst)
    }

    /// Number of probes sent and still awaiting an outcome
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    /// Resolved probes, in resolution order
    pub fn records(&self) -> Vec<ProbeRecord> {
        self.inner.samples.lock().clone()
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.inner.settings
    }
}

impl Drop for ProbeOrchestrator {
    fn drop(&mut self) {
        // Stop scheduled sends, timers and the event pump
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn emit(&self, event: MeasureEvent) {
        // Owner may have gone away; nothing left to notify
        let _ = self.events.send(event);
    }

    fn is_running(&self) -> bool {
        *self.phase.lock() == BatchState::InProgress
    }

    /// Hand the probe for `slot` to the transport, parking it if the transport is cold
    fn dispatch(self: Arc<Self>, slot: usize) {
        let inner = Arc::clone(&self);
        let queued = self
            .link
            .dispatch(move |transport: &dyn ProbeTransport| inner.fire(transport, slot));

        match queued {
            Ok(()) => {}
            Err(DispatchError::QueueFull) => {
                warn!(slot, "Dropping probe: {}", DispatchError::QueueFull);
                self.record(ProbeRecord {
                    slot,
                    sequence: 0,
                    sample: ProbeSample::lost(LossReason::SendFailed),
                });
            }
            Err(DispatchError::Failed(error)) => {
                warn!(slot, %error, "Probe transport failed, cancelling batch");
                self.abort(Some(error));
            }
        }
    }

    fn fire(self: &Arc<Self>, transport: &dyn ProbeTransport, slot: usize) {
        if !self.is_running() {
            debug!(slot, "Batch no longer running, skipping probe");
            return;
        }

        let sequence = transport.next_sequence();
        let timeout = self.cancel.child_token();

        // Register pending BEFORE sending to prevent race with fast responses
        self.pending.insert(
            sequence,
            PendingProbe {
                slot,
                timer: RoundTripTimer::start(),
                timeout: timeout.clone(),
            },
        );
        if self.cancel.is_cancelled() {
            self.pending.remove(&sequence);
            return;
        }

        let inner = Arc::clone(self);
        let limit = self.settings.timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = timeout.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    debug!(sequence, "Probe timed out");
                    inner.resolve(sequence, Resolution::Lost(LossReason::TimedOut));
                }
            }
        });

        debug!(slot, sequence, "Sending probe");
        transport.send_probe(sequence);
    }

    /// Settle the probe with this sequence number. Later calls for it are dropped.
    fn resolve(&self, sequence: u16, resolution: Resolution) {
        let Some(entry) = self.pending.remove(&sequence) else {
            debug!(sequence, "No pending probe for sequence (already resolved)");
            return;
        };
        entry.timeout.cancel();

        let sample = match resolution {
            Resolution::Reply => ProbeSample::reply(entry.timer.elapsed()),
            Resolution::Lost(reason) => ProbeSample::lost(reason),
        };
        self.record(ProbeRecord {
            slot: entry.slot,
            sequence,
            sample,
        });
    }

    fn record(&self, record: ProbeRecord) {
        let phase = self.phase.lock();
        if *phase != BatchState::InProgress {
            return;
        }

        self.samples.lock().push(record);
        let resolved = self.resolved.fetch_add(1, Ordering::SeqCst) + 1;
        let count = self.settings.count;
        debug!(slot = record.slot, sequence = record.sequence, resolved, count, sample = ?record.sample, "Probe resolved");

        self.emit(MeasureEvent::Sample(record));
        self.emit(MeasureEvent::Progress(resolved as f64 / count as f64));

        if resolved < count {
            return;
        }
        self.conclude(phase);
    }

    /// Grade an empty batch straight away
    fn finish(&self) {
        let phase = self.phase.lock();
        if *phase == BatchState::InProgress {
            self.conclude(phase);
        }
    }

    fn conclude(&self, mut phase: MutexGuard<'_, BatchState>) {
        let samples: Vec<ProbeSample> = self.samples.lock().iter().map(|r| r.sample).collect();
        let verdict = self.analyzer.analyze(&samples);
        *phase = BatchState::Finished(verdict);
        drop(phase);

        self.cancel.cancel();
        info!(%verdict, "Probe batch finished");
        self.emit(MeasureEvent::Finished(Some(verdict)));
    }

    fn abort(&self, error: Option<TransportError>) {
        {
            let mut phase = self.phase.lock();
            if *phase != BatchState::InProgress {
                return;
            }
            *phase = BatchState::Cancelled;
        }

        self.cancel.cancel();
        let dropped = self.pending.drain();
        for entry in &dropped {
            entry.timeout.cancel();
        }
        info!(dropped = dropped.len(), "Probe batch cancelled");

        if let Some(error) = error {
            self.emit(MeasureEvent::Failed(error));
        }
        self.emit(MeasureEvent::Finished(None));
    }

    /// Route transport events for this batch until it ends
    async fn pump(self: Arc<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return,
                event = events.recv() => event,
            };

            match event {
                Ok(TransportEvent::Reply(sequence)) => {
                    self.resolve(sequence, Resolution::Reply);
                }
                Ok(TransportEvent::SendFailed(sequence)) => {
                    self.resolve(sequence, Resolution::Lost(LossReason::SendFailed));
                }
                Ok(TransportEvent::Sent(sequence)) => {
                    trace!(sequence, "Probe sent");
                }
                Ok(TransportEvent::Ready) => {}
                Ok(TransportEvent::Fatal(error)) => {
                    warn!(%error, "Probe transport failed, cancelling batch");
                    self.abort(Some(error));
                    return;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Transport events lagged; affected probes will time out");
                }
                Err(RecvError::Closed) => {
                    warn!("Probe transport closed, cancelling batch");
                    self.abort(Some(TransportError::Closed));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QualityAnalyzer;
    use crate::probe::testing::{Script, ScriptedTransport};

    fn orchestrator(
        transport: &Arc<ScriptedTransport>,
    ) -> (ProbeOrchestrator, mpsc::UnboundedReceiver<MeasureEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = ProbeLink::new(transport.clone());
        let orchestrator = ProbeOrchestrator::new(
            link,
            Arc::new(QualityAnalyzer::default()),
            ProbeSettings::default(),
            tx,
        );
        (orchestrator, rx)
    }

    async fn run_to_end(rx: &mut mpsc::UnboundedReceiver<MeasureEvent>) -> Vec<MeasureEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, MeasureEvent::Finished(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn records(events: &[MeasureEvent]) -> Vec<ProbeRecord> {
        events
            .iter()
            .filter_map(|e| match e {
                MeasureEvent::Sample(record) => Some(*record),
                _ => None,
            })
            .collect()
    }

    fn replies(ms: u64) -> Vec<Script> {
        vec![Script::Reply(Duration::from_millis(ms)); 5]
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_replies_excellent() {
        let transport = ScriptedTransport::ready(replies(100));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        assert_eq!(orch.state(), BatchState::InProgress);
        let events = run_to_end(&mut rx).await;

        assert_eq!(
            events.last(),
            Some(&MeasureEvent::Finished(Some(QualityVerdict::Excellent)))
        );
        let records = records(&events);
        assert_eq!(records.len(), 5);
        for record in &records {
            let rtt = record.sample.rtt().unwrap();
            assert!(rtt >= Duration::from_millis(100) && rtt < Duration::from_millis(150));
        }

        let progress: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                MeasureEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0.2, 0.4, 0.6, 0.8, 1.0]);

        assert_eq!(orch.state(), BatchState::Finished(QualityVerdict::Excellent));
        assert_eq!(orch.verdict(), Some(QualityVerdict::Excellent));
        assert_eq!(orch.resolved(), 5);
        assert_eq!(orch.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_are_staggered_by_interval() {
        let transport = ScriptedTransport::ready(replies(10));
        let (orch, mut rx) = orchestrator(&transport);

        let started = Instant::now();
        orch.start();
        run_to_end(&mut rx).await;

        // Last probe leaves at 4 * interval and replies 10ms later
        let elapsed = Instant::now().duration_since(started);
        assert!(elapsed >= Duration::from_millis(4010));
        assert!(elapsed < Duration::from_millis(4100));
        assert_eq!(transport.sent(), vec![0, 1, 2, 3, 4]);

        let records = orch.records();
        for (slot, record) in records.iter().enumerate() {
            assert_eq!(record.slot, slot);
            assert_eq!(record.sequence, slot as u16);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_worst_probe() {
        let mut script = replies(50);
        script[3] = Script::Reply(Duration::from_millis(600));
        let transport = ScriptedTransport::ready(script);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        let events = run_to_end(&mut rx).await;
        assert_eq!(
            events.last(),
            Some(&MeasureEvent::Finished(Some(QualityVerdict::Slow)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_probe_lost() {
        let mut script = replies(50);
        script[1] = Script::Silent;
        let transport = ScriptedTransport::ready(script);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        let events = run_to_end(&mut rx).await;

        assert_eq!(
            events.last(),
            Some(&MeasureEvent::Finished(Some(QualityVerdict::Poor)))
        );
        let lost: Vec<_> = records(&events)
            .into_iter()
            .filter(|r| r.sample.is_lost())
            .collect();
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].slot, 1);
        assert_eq!(lost[0].sample, ProbeSample::lost(LossReason::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_send_failures_absent() {
        let transport = ScriptedTransport::ready(vec![Script::Fail; 5]);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        let events = run_to_end(&mut rx).await;

        assert_eq!(
            events.last(),
            Some(&MeasureEvent::Finished(Some(QualityVerdict::Absent)))
        );
        assert!(
            records(&events)
                .iter()
                .all(|r| r.sample == ProbeSample::lost(LossReason::SendFailed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_after_timeout_is_dropped() {
        let mut script = replies(50);
        script[0] = Script::Reply(Duration::from_millis(3500));
        let transport = ScriptedTransport::ready(script);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        let events = run_to_end(&mut rx).await;

        let records = records(&events);
        assert_eq!(records.len(), 5);
        let first = records.iter().find(|r| r.slot == 0).unwrap();
        assert_eq!(first.sample, ProbeSample::lost(LossReason::TimedOut));
        assert_eq!(
            events.last(),
            Some(&MeasureEvent::Finished(Some(QualityVerdict::Poor)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_resolution_is_noop() {
        let transport = ScriptedTransport::ready(vec![Script::Silent; 5]);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        // Let the first probe go out
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(orch.pending(), 1);

        orch.inner.resolve(0, Resolution::Reply);
        orch.inner.resolve(0, Resolution::Lost(LossReason::TimedOut));
        orch.inner.resolve(0, Resolution::Reply);

        assert_eq!(orch.resolved(), 1);
        assert!(matches!(
            rx.recv().await,
            Some(MeasureEvent::Sample(ProbeRecord {
                slot: 0,
                sample: ProbeSample::Reply { .. },
                ..
            }))
        ));
        orch.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_probe_resolves() {
        let transport = ScriptedTransport::ready(vec![Script::Silent; 5]);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(orch.pending(), 2);

        orch.cancel();
        assert_eq!(orch.state(), BatchState::Cancelled);
        assert_eq!(orch.pending(), 0);
        assert_eq!(rx.recv().await, Some(MeasureEvent::Finished(None)));

        // Nothing else fires: no more sends, no timeouts
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.sent(), vec![0, 1]);
        assert!(rx.try_recv().is_err());
        assert_eq!(orch.resolved(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_batch_skips_analysis() {
        let transport = ScriptedTransport::ready(replies(100));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        let mut samples = 0;
        while samples < 2 {
            if let Some(MeasureEvent::Sample(_)) = rx.recv().await {
                samples += 1;
            }
        }
        orch.cancel();
        orch.cancel();

        let rest = run_to_end(&mut rx).await;
        assert_eq!(rest.last(), Some(&MeasureEvent::Finished(None)));
        assert_eq!(orch.verdict(), None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(orch.resolved(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_noop() {
        let transport = ScriptedTransport::ready(replies(20));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        orch.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        orch.start();

        let events = run_to_end(&mut rx).await;
        assert_eq!(records(&events).len(), 5);
        assert_eq!(transport.sent().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_finish_replays_verdict() {
        let transport = ScriptedTransport::ready(replies(300));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        run_to_end(&mut rx).await;
        assert_eq!(orch.verdict(), Some(QualityVerdict::Good));

        orch.start();
        assert_eq!(
            rx.recv().await,
            Some(MeasureEvent::Finished(Some(QualityVerdict::Good)))
        );
        assert_eq!(transport.sent().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_cancel_is_noop() {
        let transport = ScriptedTransport::ready(replies(20));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        orch.cancel();
        assert_eq!(rx.recv().await, Some(MeasureEvent::Finished(None)));

        orch.start();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(orch.state(), BatchState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_cancels_batch() {
        let transport = ScriptedTransport::ready(vec![Script::Silent; 5]);
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        transport.fail(TransportError::Fatal("interface down".into()));

        let events = run_to_end(&mut rx).await;
        assert_eq!(
            events,
            vec![
                MeasureEvent::Failed(TransportError::Fatal("interface down".into())),
                MeasureEvent::Finished(None),
            ]
        );
        assert_eq!(orch.state(), BatchState::Cancelled);
        assert_eq!(orch.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_transport_flushes_in_order() {
        let transport = ScriptedTransport::cold(replies(40));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(transport.sent().is_empty());

        transport.make_ready();
        let events = run_to_end(&mut rx).await;

        assert_eq!(
            events.last(),
            Some(&MeasureEvent::Finished(Some(QualityVerdict::Excellent)))
        );
        assert_eq!(transport.sent(), vec![0, 1, 2, 3, 4]);
        let mut records = records(&events);
        records.sort_by_key(|r| r.slot);
        for (slot, record) in records.iter().enumerate() {
            assert_eq!(record.sequence, slot as u16);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_settings() {
        let transport = ScriptedTransport::ready(vec![Script::Reply(Duration::from_millis(5)); 3]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = ProbeOrchestrator::new(
            ProbeLink::new(transport.clone()),
            Arc::new(QualityAnalyzer::default()),
            ProbeSettings {
                count: 3,
                interval: Duration::from_millis(200),
                timeout: Duration::from_millis(100),
            },
            tx,
        );

        let started = Instant::now();
        orch.start();
        let events = run_to_end(&mut rx).await;
        assert_eq!(records(&events).len(), 3);
        assert!(Instant::now().duration_since(started) < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_transport_failed_aborts() {
        let transport = ScriptedTransport::cold(replies(40));
        let (orch, mut rx) = orchestrator(&transport);
        transport.fail(TransportError::Socket("EPERM".into()));
        tokio::task::yield_now().await;

        orch.start();
        let events = tokio::time::timeout(Duration::from_secs(600), run_to_end(&mut rx))
            .await
            .unwrap();

        assert_eq!(
            events,
            vec![
                MeasureEvent::Failed(TransportError::Socket("EPERM".into())),
                MeasureEvent::Finished(None),
            ]
        );
        assert_eq!(orch.state(), BatchState::Cancelled);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_while_sends_are_parked() {
        let transport = ScriptedTransport::cold(replies(40));
        let (orch, mut rx) = orchestrator(&transport);

        orch.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        transport.fail(TransportError::Socket("EPERM".into()));

        let events = tokio::time::timeout(Duration::from_secs(600), run_to_end(&mut rx))
            .await
            .unwrap();
        assert_eq!(events.last(), Some(&MeasureEvent::Finished(None)));
        assert_eq!(orch.state(), BatchState::Cancelled);

        transport.make_ready();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_is_absent() {
        let transport = ScriptedTransport::ready(replies(40));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = ProbeOrchestrator::new(
            ProbeLink::new(transport.clone()),
            Arc::new(QualityAnalyzer::default()),
            ProbeSettings {
                count: 0,
                ..ProbeSettings::default()
            },
            tx,
        );

        orch.start();
        let events = run_to_end(&mut rx).await;

        assert_eq!(
            events,
            vec![MeasureEvent::Finished(Some(QualityVerdict::Absent))]
        );
        assert_eq!(orch.verdict(), Some(QualityVerdict::Absent));
        assert!(transport.sent().is_empty());
    }
}
