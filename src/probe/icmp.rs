//! ICMP echo probes.
//!
//! Prefers unprivileged datagram ICMP sockets (Linux `ping_group_range`,
//! macOS) and falls back to raw sockets when the process is privileged.
//! Datagram sockets let the kernel pick the echo identifier, so replies are
//! matched on sequence number alone in that mode.

use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{checksum, IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::icmpv6::echo_reply::EchoReplyPacket as EchoReplyV6Packet;
use pnet_packet::icmpv6::echo_request::MutableEchoRequestPacket as MutableEchoRequestV6Packet;
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::MutablePacket;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::ProbeFailure;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Echo payload size
pub const PAYLOAD_SIZE: usize = 32;

/// Receive buffer, large enough for an IPv4 header plus a full reply.
const RECV_BUFFER_SIZE: usize = 1500;

/// Identifier placed in outgoing echo requests.
pub fn identifier() -> u16 {
    std::process::id() as u16
}

fn fill_pattern(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }
}

/// Build an ICMP or ICMPv6 echo request.
///
/// The ICMPv4 checksum is filled in here; for ICMPv6 the kernel computes it
/// over the pseudo-header, which needs the source address we do not know.
pub fn build_echo_request(
    identifier: u16,
    sequence: u16,
    ipv6: bool,
) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + PAYLOAD_SIZE];

    if ipv6 {
        if let Some(mut packet) = MutableEchoRequestV6Packet::new(&mut buffer) {
            packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
            packet.set_icmpv6_code(Icmpv6Code::new(0));
            packet.set_identifier(identifier);
            packet.set_sequence_number(sequence);
            fill_pattern(packet.payload_mut());
        }
        return buffer;
    }

    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        fill_pattern(packet.payload_mut());
    }

    let cksum = IcmpPacket::new(&buffer).map(|packet| checksum(&packet));
    if let (Some(cksum), Some(mut packet)) =
        (cksum, MutableEchoRequestPacket::new(&mut buffer))
    {
        packet.set_checksum(cksum);
    }

    buffer
}

/// Extract `(identifier, sequence)` from an echo reply.
///
/// `has_ip_header` is set for raw IPv4 sockets, which deliver the IP header
/// in front of the ICMP message. Anything other than an echo reply yields
/// `None`.
pub fn parse_echo_reply(
    buf: &[u8],
    ipv6: bool,
    has_ip_header: bool,
) -> Option<(u16, u16)> {
    let icmp = if has_ip_header {
        let ip_packet = Ipv4Packet::new(buf)?;
        let header_len = (ip_packet.get_header_length() as usize) * 4;
        buf.get(header_len..)?
    } else {
        buf
    };

    if ipv6 {
        if Icmpv6Packet::new(icmp)?.get_icmpv6_type() != Icmpv6Types::EchoReply {
            return None;
        }
        let reply = EchoReplyV6Packet::new(icmp)?;
        return Some((reply.get_identifier(), reply.get_sequence_number()));
    }

    if IcmpPacket::new(icmp)?.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }
    let reply = EchoReplyPacket::new(icmp)?;
    Some((reply.get_identifier(), reply.get_sequence_number()))
}

struct IcmpSocket {
    socket: Socket,
    /// Raw IPv4 sockets include the IP header on receive.
    has_ip_header: bool,
    /// Datagram sockets rewrite the echo identifier.
    kernel_identifier: bool,
}

fn open_socket(ipv6: bool) -> io::Result<IcmpSocket> {
    let (domain, protocol) = if ipv6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };

    match Socket::new(domain, Type::DGRAM, Some(protocol)) {
        Ok(socket) => Ok(IcmpSocket {
            socket,
            has_ip_header: false,
            kernel_identifier: true,
        }),
        Err(_) => {
            let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
            Ok(IcmpSocket {
                socket,
                has_ip_header: !ipv6,
                kernel_identifier: false,
            })
        }
    }
}

/// Try to open an IPv4 ICMP socket of either kind, reporting why it failed.
pub fn check_icmp_socket() -> io::Result<()> {
    open_socket(false).map(drop)
}

/// Whether this process may open an IPv4 ICMP socket of either kind.
pub fn icmp_available() -> bool {
    check_icmp_socket().is_ok()
}

/// Send one echo request to `addr` and wait for the matching reply.
///
/// The blocking socket work runs on tokio's blocking pool; the socket is
/// closed when the call returns.
pub async fn echo(
    addr: IpAddr,
    sequence: u16,
    timeout: Duration,
) -> Result<f64, ProbeFailure> {
    tokio::task::spawn_blocking(move || echo_blocking(addr, sequence, timeout))
        .await
        .map_err(|e| ProbeFailure::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

fn echo_blocking(
    addr: IpAddr,
    sequence: u16,
    timeout: Duration,
) -> Result<f64, ProbeFailure> {
    let ipv6 = addr.is_ipv6();
    let IcmpSocket { mut socket, has_ip_header, kernel_identifier } =
        open_socket(ipv6)?;

    let ident = identifier();
    let packet = build_echo_request(ident, sequence, ipv6);
    let destination = SockAddr::from(SocketAddr::new(addr, 0));

    let start = Instant::now();
    socket.send_to(&packet, &destination)?;

    let mut buf = [0u8; RECV_BUFFER_SIZE];
    loop {
        let remaining = timeout
            .checked_sub(start.elapsed())
            .filter(|remaining| !remaining.is_zero())
            .ok_or(ProbeFailure::Timeout(timeout))?;
        socket.set_read_timeout(Some(remaining))?;

        let len = match socket.read(&mut buf) {
            Ok(len) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ProbeFailure::Timeout(timeout));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if let Some((reply_ident, reply_sequence)) =
            parse_echo_reply(&buf[..len], ipv6, has_ip_header)
        {
            if reply_sequence == sequence
                && (kernel_identifier || reply_ident == ident)
            {
                return Ok(start.elapsed().as_secs_f64() * 1000.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_echo_request() {
        let packet = build_echo_request(1234, 5678, false);
        assert_eq!(packet.len(), ICMP_HEADER_SIZE + PAYLOAD_SIZE);
        assert_eq!(packet[0], 8); // Echo Request type
        assert_eq!(packet[1], 0); // Code
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 1234);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 5678);
    }

    #[test]
    fn test_build_echo_request_checksum_verifies() {
        let packet = build_echo_request(0xBEEF, 42, false);
        let parsed = IcmpPacket::new(&packet).unwrap();
        assert_eq!(checksum(&parsed), parsed.get_checksum());
    }

    #[test]
    fn test_build_echo_request_ipv6() {
        let packet = build_echo_request(1234, 5678, true);
        assert_eq!(packet[0], 128); // ICMPv6 Echo Request type
        assert_eq!(&packet[2..4], &[0, 0]);
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 1234);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 5678);
    }

    #[test]
    fn test_parse_echo_reply_without_ip_header() {
        let mut reply = build_echo_request(7, 9, false);
        reply[0] = 0;
        assert_eq!(parse_echo_reply(&reply, false, false), Some((7, 9)));
    }

    #[test]
    fn test_parse_echo_reply_with_ip_header() {
        let mut datagram = vec![0u8; 20];
        datagram[0] = 0x45; // IPv4, IHL = 5 words
        let mut reply = build_echo_request(7, 9, false);
        reply[0] = 0;
        datagram.extend_from_slice(&reply);

        assert_eq!(parse_echo_reply(&datagram, false, true), Some((7, 9)));
    }

    #[test]
    fn test_parse_echo_reply_ipv6() {
        let mut reply = build_echo_request(7, 9, true);
        reply[0] = 129;
        assert_eq!(parse_echo_reply(&reply, true, false), Some((7, 9)));
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        // An echo request looped back is not a reply.
        let request = build_echo_request(7, 9, false);
        assert_eq!(parse_echo_reply(&request, false, false), None);

        // Destination unreachable.
        let mut unreachable = request.clone();
        unreachable[0] = 3;
        assert_eq!(parse_echo_reply(&unreachable, false, false), None);

        // Truncated.
        assert_eq!(parse_echo_reply(&[0, 0, 0], false, false), None);
        assert_eq!(parse_echo_reply(&[], false, true), None);
    }
}
