//! ICMP echo transport for a single long-lived target.
//!
//! Construction returns immediately; target resolution and socket setup run in
//! the background and end in either `Ready` or `Fatal`. Replies are read on a
//! dedicated OS thread (blocking I/O) and published as `Reply(sequence)`.

use parking_lot::{Mutex, RwLock};
use socket2::Socket;
use std::io::Read;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_PAYLOAD_SIZE;
use crate::error::{Error, Result, TransportError};
use crate::probe::{
    EVENT_CHANNEL_CAPACITY, ProbeTransport, TransportEvent, build_echo_request, create_probe_socket,
    get_identifier, is_poll_timeout, parse_echo_reply, send_icmp,
};

/// Maximum consecutive receive errors before the transport gives up
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

struct Connected {
    socket: Socket,
    target: IpAddr,
}

pub struct IcmpPinger {
    host: String,
    identifier: u16,
    payload_size: usize,
    next: AtomicU16,
    ready: AtomicBool,
    connected: RwLock<Option<Connected>>,
    failure: Arc<Mutex<Option<TransportError>>>,
    events: broadcast::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl IcmpPinger {
    /// Start warming up a pinger for `host` with the default payload size.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(host: impl Into<String>) -> Arc<Self> {
        Self::with_payload(host, DEFAULT_PAYLOAD_SIZE)
    }

    pub fn with_payload(host: impl Into<String>, payload_size: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pinger = Arc::new(Self {
            host: host.into(),
            identifier: get_identifier(),
            payload_size,
            next: AtomicU16::new(0),
            ready: AtomicBool::new(false),
            connected: RwLock::new(None),
            failure: Arc::new(Mutex::new(None)),
            events,
            cancel: CancellationToken::new(),
        });

        let host = pinger.host.clone();
        tokio::spawn(connect(Arc::downgrade(&pinger), host));
        pinger
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolved target address, once ready
    pub fn target(&self) -> Option<IpAddr> {
        self.connected.read().as_ref().map(|c| c.target)
    }

    fn publish(&self, event: TransportEvent) {
        // No subscribers simply means nobody is measuring right now
        let _ = self.events.send(event);
    }
}

/// Record the failure, then announce it
fn fail(
    failure: &Mutex<Option<TransportError>>,
    events: &broadcast::Sender<TransportEvent>,
    error: TransportError,
) {
    failure.lock().get_or_insert_with(|| error.clone());
    let _ = events.send(TransportEvent::Fatal(error));
}

impl Drop for IcmpPinger {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ProbeTransport for IcmpPinger {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn next_sequence(&self) -> u16 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    fn send_probe(&self, sequence: u16) {
        let connected = self.connected.read();
        let Some(conn) = connected.as_ref() else {
            debug!(sequence, "Probe sent before transport was ready");
            self.publish(TransportEvent::SendFailed(sequence));
            return;
        };

        let ipv6 = conn.target.is_ipv6();
        let Some(packet) = build_echo_request(self.identifier, sequence, self.payload_size, ipv6)
        else {
            self.publish(TransportEvent::SendFailed(sequence));
            return;
        };

        match send_icmp(&conn.socket, &packet, conn.target) {
            Ok(_) => self.publish(TransportEvent::Sent(sequence)),
            Err(e) => {
                debug!(sequence, error = %e, "Failed to send probe");
                self.publish(TransportEvent::SendFailed(sequence));
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

/// Resolve a host name or literal to an address, preferring IPv4
pub async fn resolve_target(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|_| Error::Resolve {
            host: host.to_string(),
        })?
        .map(|addr| addr.ip())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::Resolve {
            host: host.to_string(),
        })
}

async fn connect(pinger: Weak<IcmpPinger>, host: String) {
    let outcome = async {
        let target = resolve_target(&host).await?;
        let info = create_probe_socket(target.is_ipv6())?;
        let reader = info.socket.try_clone()?;
        Ok::<_, Error>((target, info, reader))
    }
    .await;

    let Some(pinger) = pinger.upgrade() else {
        return;
    };

    match outcome {
        Ok((target, info, reader)) => {
            info!(%host, %target, capability = ?info.capability(), "ICMP transport ready");
            spawn_reply_reader(
                reader,
                info.is_dgram,
                target.is_ipv6(),
                pinger.identifier,
                pinger.events.clone(),
                Arc::clone(&pinger.failure),
                pinger.cancel.clone(),
            );
            *pinger.connected.write() = Some(Connected {
                socket: info.socket,
                target,
            });
            pinger.ready.store(true, Ordering::SeqCst);
            pinger.publish(TransportEvent::Ready);
        }
        Err(e) => {
            warn!(%host, error = %e, "ICMP transport failed to start");
            fail(&pinger.failure, &pinger.events, TransportError::from(&e));
        }
    }
}

/// Read echo replies on a dedicated OS thread until cancelled
fn spawn_reply_reader(
    socket: Socket,
    is_dgram: bool,
    ipv6: bool,
    identifier: u16,
    events: broadcast::Sender<TransportEvent>,
    failure: Arc<Mutex<Option<TransportError>>>,
    cancel: CancellationToken,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buffer = [0u8; 1500];
        let mut consecutive_errors = 0u32;

        while !cancel.is_cancelled() {
            match (&socket).read(&mut buffer) {
                Ok(len) => {
                    consecutive_errors = 0;
                    if let Some(sequence) =
                        parse_echo_reply(&buffer[..len], identifier, is_dgram, ipv6)
                    {
                        let _ = events.send(TransportEvent::Reply(sequence));
                    }
                }
                Err(e) if is_poll_timeout(&e) => {
                    consecutive_errors = 0;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        "Receive error ({}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, e
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        fail(
                            &failure,
                            &events,
                            TransportError::Fatal(format!(
                                "receiver stopped after {} consecutive errors: {}",
                                consecutive_errors, e
                            )),
                        );
                        break;
                    }
                }
            }
        }
        debug!("Reply reader stopped");
    })
}
