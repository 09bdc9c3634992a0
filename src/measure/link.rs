//! Shared handle on a probe transport with cold-start buffering.
//!
//! Sends requested before the transport is ready are parked in a FIFO and
//! replayed in order the moment it becomes ready. After that single flush the
//! queue is gone for good and every send goes straight through. If the
//! transport fails instead, parked sends are discarded and later ones refused.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::error::TransportError;
use crate::probe::{ProbeTransport, TransportEvent};

/// Maximum sends parked while the transport warms up
pub const COLD_QUEUE_CAPACITY: usize = 256;

type QueuedSend = Box<dyn FnOnce(&dyn ProbeTransport) + Send>;

enum ColdStart {
    Buffering(VecDeque<QueuedSend>),
    Flushed,
    Failed(TransportError),
}

/// A send the link could not accept
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("cold-start queue full ({COLD_QUEUE_CAPACITY} sends waiting for transport)")]
    QueueFull,

    #[error("transport failed before becoming ready: {0}")]
    Failed(TransportError),
}

pub struct ProbeLink {
    transport: Arc<dyn ProbeTransport>,
    cold: Mutex<ColdStart>,
}

impl ProbeLink {
    /// Wrap a transport and start watching for its readiness signal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn ProbeTransport>) -> Arc<Self> {
        let events = transport.subscribe();
        let cold = match transport.failed() {
            Some(error) => ColdStart::Failed(error),
            None => ColdStart::Buffering(VecDeque::new()),
        };
        let link = Arc::new(Self {
            transport,
            cold: Mutex::new(cold),
        });

        if link.is_failed() {
            debug!("Transport already failed, refusing sends");
        } else if link.transport.is_ready() {
            link.flush();
        } else {
            tokio::spawn(watch_ready(Arc::downgrade(&link), events));
        }

        link
    }

    pub fn transport(&self) -> &Arc<dyn ProbeTransport> {
        &self.transport
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.transport.subscribe()
    }

    /// Run `send` against the transport now, or park it until the transport is ready
    pub fn dispatch<F>(&self, send: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&dyn ProbeTransport) + Send + 'static,
    {
        let mut cold = self.cold.lock();

        if matches!(*cold, ColdStart::Buffering(_)) && !self.transport.is_ready() {
            if let Some(error) = self.transport.failed() {
                *cold = ColdStart::Failed(error);
            }
        }
        if let ColdStart::Failed(error) = &*cold {
            return Err(DispatchError::Failed(error.clone()));
        }
        if let ColdStart::Buffering(queue) = &mut *cold {
            if !self.transport.is_ready() {
                if queue.len() >= COLD_QUEUE_CAPACITY {
                    return Err(DispatchError::QueueFull);
                }
                queue.push_back(Box::new(send));
                debug!(queued = queue.len(), "Transport not ready, parking probe send");
                return Ok(());
            }
            // Ready but the watcher has not flushed yet: flush first to keep order
            Self::flush_locked(&mut *cold, self.transport.as_ref());
        }
        drop(cold);

        send(self.transport.as_ref());
        Ok(())
    }

    /// Replay parked sends in order and disable buffering.
    ///
    /// Returns how many sends were replayed; zero on every call after the first.
    pub fn flush(&self) -> usize {
        let mut cold = self.cold.lock();
        Self::flush_locked(&mut *cold, self.transport.as_ref())
    }

    fn flush_locked(cold: &mut ColdStart, transport: &dyn ProbeTransport) -> usize {
        if !matches!(cold, ColdStart::Buffering(_)) {
            return 0;
        }
        let ColdStart::Buffering(queue) = std::mem::replace(cold, ColdStart::Flushed) else {
            return 0;
        };

        let flushed = queue.len();
        if flushed > 0 {
            debug!(flushed, "Transport ready, replaying parked probe sends");
        }
        for send in queue {
            send(transport);
        }
        flushed
    }

    /// Drop parked sends and refuse new ones. No-op once flushed.
    fn discard(&self, error: TransportError) -> usize {
        let mut cold = self.cold.lock();
        if !matches!(*cold, ColdStart::Buffering(_)) {
            return 0;
        }
        match std::mem::replace(&mut *cold, ColdStart::Failed(error)) {
            ColdStart::Buffering(queue) => queue.len(),
            ColdStart::Flushed | ColdStart::Failed(_) => 0,
        }
    }

    /// Number of sends currently parked
    pub fn queued(&self) -> usize {
        match &*self.cold.lock() {
            ColdStart::Buffering(queue) => queue.len(),
            ColdStart::Flushed | ColdStart::Failed(_) => 0,
        }
    }

    pub fn is_flushed(&self) -> bool {
        matches!(*self.cold.lock(), ColdStart::Flushed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.cold.lock(), ColdStart::Failed(_))
    }
}

async fn watch_ready(link: Weak<ProbeLink>, mut events: broadcast::Receiver<TransportEvent>) {
    loop {
        match events.recv().await {
            Ok(TransportEvent::Ready) => {
                if let Some(link) = link.upgrade() {
                    link.flush();
                }
                return;
            }
            Ok(TransportEvent::Fatal(error)) => {
                if let Some(link) = link.upgrade() {
                    let dropped = link.discard(error);
                    debug!(dropped, "Transport failed, discarded parked probe sends");
                }
                return;
            }
            Err(RecvError::Closed) => {
                if let Some(link) = link.upgrade() {
                    link.discard(TransportError::Closed);
                }
                return;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                // Ready may have been among the skipped events
                match link.upgrade() {
                    Some(link) if link.transport.is_ready() => {
                        link.flush();
                        return;
                    }
                    Some(link) => {
                        if let Some(error) = link.transport.failed() {
                            link.discard(error);
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}
