//! In-memory transport driven by a per-sequence script.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::probe::{EVENT_CHANNEL_CAPACITY, ProbeTransport, TransportEvent};

/// What happens to the probe sent with a given sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Echo reply arrives after this delay
    Reply(Duration),
    /// Transport reports the send as failed
    Fail,
    /// Nothing comes back
    Silent,
}

pub struct ScriptedTransport {
    ready: AtomicBool,
    next: AtomicU16,
    script: Vec<Script>,
    sent: Mutex<Vec<u16>>,
    failure: Mutex<Option<TransportError>>,
    events: broadcast::Sender<TransportEvent>,
}

impl ScriptedTransport {
    fn new(ready: bool, script: Vec<Script>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            ready: AtomicBool::new(ready),
            next: AtomicU16::new(0),
            script,
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            events,
        })
    }

    pub fn ready(script: Vec<Script>) -> Arc<Self> {
        Self::new(true, script)
    }

    pub fn cold(script: Vec<Script>) -> Arc<Self> {
        Self::new(false, script)
    }

    pub fn make_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Ready);
    }

    pub fn fail(&self, error: TransportError) {
        *self.failure.lock() = Some(error.clone());
        let _ = self.events.send(TransportEvent::Fatal(error));
    }

    /// Sequence numbers sent so far, in send order
    pub fn sent(&self) -> Vec<u16> {
        self.sent.lock().clone()
    }
}

impl ProbeTransport for ScriptedTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn next_sequence(&self) -> u16 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    fn send_probe(&self, sequence: u16) {
        self.sent.lock().push(sequence);

        let step = self
            .script
            .get(sequence as usize)
            .copied()
            .unwrap_or(Script::Silent);
        match step {
            Script::Reply(delay) => {
                let _ = self.events.send(TransportEvent::Sent(sequence));
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(TransportEvent::Reply(sequence));
                });
            }
            Script::Fail => {
                let _ = self.events.send(TransportEvent::SendFailed(sequence));
            }
            Script::Silent => {
                let _ = self.events.send(TransportEvent::Sent(sequence));
            }
        }
    }

    fn failed(&self) -> Option<TransportError> {
        self.failure.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
