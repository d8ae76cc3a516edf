//! Echo-request frame construction.
//!
//! Wire layout for everything this tool sends and accepts:
//! 14-byte Ethernet header, plain 20-byte IPv4 header (no options),
//! 8-byte ICMP echo header, optional pad payload.

use std::net::Ipv4Addr;
use std::time::Instant;

use crate::net::checksum::{checksum, verify};
use crate::net::mac::MacAddr;

pub const ETH_HDR_LEN: usize = 14;
pub const IP_HDR_LEN: usize = 20;
pub const ICMP_HDR_LEN: usize = 8;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// Version 4, IHL 5 words. The only first byte the tool emits or
/// accepts.
pub const IP_VERSION_IHL: u8 = 0x45;
pub const IP_PROTO_ICMP: u8 = 1;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

/// Checksum field offsets within their own headers.
pub const IP_CHECKSUM_OFFSET: usize = 10;
pub const ICMP_CHECKSUM_OFFSET: usize = 2;

const DEFAULT_TTL: u8 = 64;
/// Don't Fragment, offset 0.
const IP_FLAGS_DF: u16 = 0x4000;

/// One outstanding echo request: correlation keys, addressing, send
/// timestamp, and the encoded frame. Owned by the session for exactly
/// one send/await cycle.
pub struct EchoRequest {
    pub identifier: u16,
    pub sequence: u16,
    pub local_mac: MacAddr,
    pub local_ip: Ipv4Addr,
    pub dest_mac: MacAddr,
    pub dest_ip: Ipv4Addr,
    pub sent_at: Instant,
    frame: Vec<u8>,
}

impl EchoRequest {
    /// Encodes a complete echo-request frame. Both checksums are
    /// computed over their regions with the checksum field zeroed,
    /// then stored in network byte order, so the returned frame is
    /// self-consistent.
    ///
    /// `payload_len` only pads the packet; the pad bytes carry a
    /// fixed repeating pattern.
    pub fn build(
        identifier: u16,
        sequence: u16,
        local_mac: MacAddr,
        local_ip: Ipv4Addr,
        dest_mac: MacAddr,
        dest_ip: Ipv4Addr,
        payload_len: usize,
    ) -> EchoRequest {
        let ip_total_len = (IP_HDR_LEN + ICMP_HDR_LEN + payload_len) as u16;
        let mut frame = vec![0u8; ETH_HDR_LEN + ip_total_len as usize];

        // Ethernet header
        frame[0..6].copy_from_slice(&dest_mac.octets());
        frame[6..12].copy_from_slice(&local_mac.octets());
        frame[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        // IPv4 header
        let ip = &mut frame[ETH_HDR_LEN..ETH_HDR_LEN + IP_HDR_LEN];
        ip[0] = IP_VERSION_IHL;
        ip[1] = 0x00; // DSCP / ECN
        ip[2..4].copy_from_slice(&ip_total_len.to_be_bytes());
        ip[4..6].copy_from_slice(&identifier.to_be_bytes());
        ip[6..8].copy_from_slice(&IP_FLAGS_DF.to_be_bytes());
        ip[8] = DEFAULT_TTL;
        ip[9] = IP_PROTO_ICMP;
        // checksum stays zero while the header is summed
        ip[12..16].copy_from_slice(&local_ip.octets());
        ip[16..20].copy_from_slice(&dest_ip.octets());
        let ip_sum = checksum(ip);
        ip[IP_CHECKSUM_OFFSET..IP_CHECKSUM_OFFSET + 2].copy_from_slice(&ip_sum.to_be_bytes());

        // ICMP echo header + pad
        let icmp = &mut frame[ETH_HDR_LEN + IP_HDR_LEN..];
        icmp[0] = ICMP_ECHO_REQUEST;
        icmp[1] = 0;
        icmp[4..6].copy_from_slice(&identifier.to_be_bytes());
        icmp[6..8].copy_from_slice(&sequence.to_be_bytes());
        for (i, b) in icmp[ICMP_HDR_LEN..].iter_mut().enumerate() {
            *b = (i & 0xFF) as u8;
        }
        let icmp_sum = checksum(icmp);
        icmp[ICMP_CHECKSUM_OFFSET..ICMP_CHECKSUM_OFFSET + 2]
            .copy_from_slice(&icmp_sum.to_be_bytes());

        debug_assert!(verify(&frame[ETH_HDR_LEN..ETH_HDR_LEN + IP_HDR_LEN]));
        debug_assert!(verify(&frame[ETH_HDR_LEN + IP_HDR_LEN..]));

        EchoRequest {
            identifier,
            sequence,
            local_mac,
            local_ip,
            dest_mac,
            dest_ip,
            sent_at: Instant::now(),
            frame,
        }
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }
}
