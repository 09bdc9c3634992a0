//! Boundary between the measurement core and whatever actually sends probes.

use tokio::sync::broadcast;

use crate::error::TransportError;

/// Capacity of a transport's event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Asynchronous notification from a probe transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Target resolved and socket open; sends are accepted from now on. Fires once.
    Ready,
    /// Probe with this sequence number left the host
    Sent(u16),
    /// Echo reply matching this sequence number arrived
    Reply(u16),
    /// Probe with this sequence number could not be sent
    SendFailed(u16),
    /// Transport is unusable; no further replies will arrive
    Fatal(TransportError),
}

/// A long-lived echo probe sender shared across measurement runs.
///
/// Sending is split in two so the caller can register the probe under its
/// sequence number before the packet leaves the host.
pub trait ProbeTransport: Send + Sync {
    /// True once the transport has signalled [`TransportEvent::Ready`]
    fn is_ready(&self) -> bool;

    /// Reserve the sequence number for the next probe
    fn next_sequence(&self) -> u16;

    /// Send a probe with a previously reserved sequence number.
    ///
    /// Fire-and-forget: the outcome arrives as a [`TransportEvent`].
    fn send_probe(&self, sequence: u16);

    /// The error that ended the transport, if any.
    ///
    /// Set before [`TransportEvent::Fatal`] is published and never cleared, so
    /// a subscriber that arrives late can still see the failure.
    fn failed(&self) -> Option<TransportError>;

    /// Subscribe to transport events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
