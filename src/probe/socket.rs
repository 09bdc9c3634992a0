use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::Result;

/// How often the receiver wakes up to check for shutdown
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Socket capability level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketCapability {
    /// Full raw socket access
    Raw,
    /// Unprivileged ICMP socket (Linux ping_group_range, macOS)
    Dgram,
}

/// Socket with metadata about type (for DGRAM-aware parsing)
#[derive(Debug)]
pub struct SocketInfo {
    pub socket: Socket,
    /// True if SOCK_DGRAM (no IP header in received packets)
    pub is_dgram: bool,
}

impl SocketInfo {
    pub fn capability(&self) -> SocketCapability {
        if self.is_dgram {
            SocketCapability::Dgram
        } else {
            SocketCapability::Raw
        }
    }
}

fn icmp_domain(ipv6: bool) -> (Domain, Protocol) {
    if ipv6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    }
}

/// Create a raw ICMP socket
pub fn create_raw_icmp_socket(ipv6: bool) -> Result<Socket> {
    let (domain, protocol) = icmp_domain(ipv6);
    let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
    socket.set_nonblocking(false)?;
    socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
    Ok(socket)
}

/// Create an unprivileged ICMP socket (SOCK_DGRAM) for either IPv4 or IPv6
pub fn create_dgram_icmp_socket(ipv6: bool) -> Result<Socket> {
    let (domain, protocol) = icmp_domain(ipv6);
    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))?;
    socket.set_nonblocking(false)?;
    socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
    Ok(socket)
}

/// Create the socket used to both send probes and receive their replies.
///
/// Prefers RAW and falls back to DGRAM for unprivileged users. One socket
/// serves both directions because DGRAM replies are only delivered to the
/// socket that sent the request.
pub fn create_probe_socket(ipv6: bool) -> Result<SocketInfo> {
    match create_raw_icmp_socket(ipv6) {
        Ok(socket) => Ok(SocketInfo {
            socket,
            is_dgram: false,
        }),
        Err(raw_err) => {
            tracing::debug!(error = %raw_err, "Raw ICMP socket unavailable, trying DGRAM");
            let socket = create_dgram_icmp_socket(ipv6)?;
            Ok(SocketInfo {
                socket,
                is_dgram: true,
            })
        }
    }
}

/// Send ICMP packet to target
pub fn send_icmp(socket: &Socket, packet: &[u8], target: IpAddr) -> Result<usize> {
    let addr = SocketAddr::new(target, 0);
    let sock_addr = SockAddr::from(addr);
    let sent = socket.send_to(packet, &sock_addr)?;
    Ok(sent)
}

/// True for receive errors that just mean "nothing arrived yet"
pub fn is_poll_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
    )
}
