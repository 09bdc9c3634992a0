use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpType, IcmpTypes, checksum};
use pnet::packet::ipv4::Ipv4Packet;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Minimum payload size (2 bytes identifier + 2 bytes sequence + 4 bytes timestamp)
pub const MIN_PAYLOAD_SIZE: usize = 8;

const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an ICMP Echo Request packet with configurable payload size
///
/// Set ipv6=true to build an ICMPv6 Echo Request (checksum left to the kernel).
///
/// Payload layout:
/// - Bytes 0-1: identifier (backup for kernel override on DGRAM sockets)
/// - Bytes 2-3: sequence
/// - Bytes 4-7: timestamp (lower 32 bits, microseconds)
/// - Bytes 8+: pattern fill
pub fn build_echo_request(
    identifier: u16,
    sequence: u16,
    payload_size: usize,
    ipv6: bool,
) -> Option<Vec<u8>> {
    let payload_size = payload_size.max(MIN_PAYLOAD_SIZE);
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + payload_size];

    let mut packet = MutableEchoRequestPacket::new(&mut buffer)?;
    if ipv6 {
        packet.set_icmp_type(IcmpType::new(ICMPV6_ECHO_REQUEST));
    } else {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
    }
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);

    let payload = packet.payload_mut();
    payload[0..2].copy_from_slice(&identifier.to_be_bytes());
    payload[2..4].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u32)
        .unwrap_or(0);
    payload[4..8].copy_from_slice(&timestamp.to_be_bytes());

    for (i, byte) in payload[8..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }

    if !ipv6 {
        let cksum = checksum(&IcmpPacket::new(&buffer)?);
        MutableEchoRequestPacket::new(&mut buffer)?.set_checksum(cksum);
    }

    Some(buffer)
}

/// Extract the sequence number from an Echo Reply addressed to us.
///
/// RAW IPv4 sockets deliver the IP header, DGRAM and IPv6 sockets do not.
/// On DGRAM sockets the kernel owns the identifier and only routes our own
/// replies to the socket, so the identifier is not checked there.
pub fn parse_echo_reply(packet: &[u8], identifier: u16, is_dgram: bool, ipv6: bool) -> Option<u16> {
    let icmp = if !ipv6 && !is_dgram {
        let ip = Ipv4Packet::new(packet)?;
        let header_len = ip.get_header_length() as usize * 4;
        packet.get(header_len..)?
    } else {
        packet
    };

    let reply = EchoReplyPacket::new(icmp)?;
    let expected_type = if ipv6 {
        ICMPV6_ECHO_REPLY
    } else {
        IcmpTypes::EchoReply.0
    };
    if reply.get_icmp_type().0 != expected_type {
        return None;
    }

    if !is_dgram && reply.get_identifier() != identifier {
        return None;
    }

    Some(reply.get_sequence_number())
}
