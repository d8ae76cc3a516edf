//! Inbound frame filtering and reply correlation.
//!
//! Raw traffic on a promiscuous link-layer socket is mostly noise;
//! the matcher runs a strict, ordered filter pipeline and classifies
//! every rejection so the session can log and move on. The cheap
//! discriminators (destination MAC, EtherType) run before any
//! checksum arithmetic.

use std::fmt;
use std::net::Ipv4Addr;

use crate::net::checksum::checksum;
use crate::net::cursor::{Cursor, Truncated};
use crate::net::frame::{
    EchoRequest, ETHERTYPE_IPV4, ICMP_CHECKSUM_OFFSET, ICMP_ECHO_REPLY, ICMP_HDR_LEN,
    ICMP_TIME_EXCEEDED, IP_CHECKSUM_OFFSET, IP_HDR_LEN, IP_PROTO_ICMP, IP_VERSION_IHL,
};
use crate::net::mac::MacAddr;

/// Why a frame was dropped from the wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// Frame ended before a required field, or the declared IP total
    /// length overruns the received bytes.
    Truncated,
    /// Destination MAC is not the local interface.
    ForeignDestMac,
    /// EtherType is not IPv4.
    NotIpv4,
    /// Version/IHL byte is not a plain 20-byte IPv4 header. Options
    /// and fragments are out of scope, by design.
    UnsupportedIpHeader,
    /// IP protocol is not ICMP.
    NotIcmp,
    IpChecksumMismatch,
    /// Destination IP is not the local address.
    ForeignDestIp,
    /// An ICMP type/code this tool does not correlate.
    UnexpectedIcmp { icmp_type: u8, code: u8 },
    IcmpChecksumMismatch,
    IdentifierMismatch,
    SequenceMismatch,
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reject::Truncated => write!(f, "truncated frame"),
            Reject::ForeignDestMac => write!(f, "destination MAC is not ours"),
            Reject::NotIpv4 => write!(f, "EtherType is not IPv4"),
            Reject::UnsupportedIpHeader => write!(f, "not a plain 20-byte IPv4 header"),
            Reject::NotIcmp => write!(f, "IP protocol is not ICMP"),
            Reject::IpChecksumMismatch => write!(f, "IP header checksum mismatch"),
            Reject::ForeignDestIp => write!(f, "destination IP is not ours"),
            Reject::UnexpectedIcmp { icmp_type, code } => {
                write!(f, "unexpected ICMP type {icmp_type} code {code}")
            }
            Reject::IcmpChecksumMismatch => write!(f, "ICMP checksum mismatch"),
            Reject::IdentifierMismatch => write!(f, "echo identifier mismatch"),
            Reject::SequenceMismatch => write!(f, "echo sequence mismatch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// The frame is the reply to the outstanding request.
    Matched { source_ip: Ipv4Addr, ttl: u8 },
    /// A router reported time-to-live exceeded for our probe.
    TtlExceeded { source_ip: Ipv4Addr },
    NoMatch(Reject),
}

/// Runs one received frame through the filter pipeline against the
/// outstanding request. Never fails; a frame that cannot be parsed is
/// a `NoMatch`.
pub fn try_match(frame: &[u8], expected: &EchoRequest) -> MatchResult {
    match inspect(frame, expected) {
        Ok(result) => result,
        Err(Truncated) => MatchResult::NoMatch(Reject::Truncated),
    }
}

fn inspect(frame: &[u8], expected: &EchoRequest) -> Result<MatchResult, Truncated> {
    use MatchResult::NoMatch;

    let mut cur = Cursor::new(frame);

    let dest_mac = MacAddr(cur.read_octets::<6>()?);
    if dest_mac != expected.local_mac {
        return Ok(NoMatch(Reject::ForeignDestMac));
    }
    cur.skip(MacAddr::LEN)?; // sender MAC

    if cur.read_u16()? != ETHERTYPE_IPV4 {
        return Ok(NoMatch(Reject::NotIpv4));
    }

    let ip_start = cur.position();
    if cur.read_u8()? != IP_VERSION_IHL {
        return Ok(NoMatch(Reject::UnsupportedIpHeader));
    }
    cur.skip(1)?; // DSCP / ECN
    let total_len = cur.read_u16()? as usize;
    cur.skip(4)?; // identification, flags, fragment offset
    let ttl = cur.read_u8()?;
    if cur.read_u8()? != IP_PROTO_ICMP {
        return Ok(NoMatch(Reject::NotIcmp));
    }
    let ip_sum = cur.read_u16()?;
    let source_ip = Ipv4Addr::from(cur.read_octets::<4>()?);
    let dest_ip = Ipv4Addr::from(cur.read_octets::<4>()?);

    // Validate the IP checksum over a working copy with the stored
    // field zeroed.
    let ip_hdr = frame.get(ip_start..ip_start + IP_HDR_LEN).ok_or(Truncated)?;
    let mut work = [0u8; IP_HDR_LEN];
    work.copy_from_slice(ip_hdr);
    work[IP_CHECKSUM_OFFSET] = 0;
    work[IP_CHECKSUM_OFFSET + 1] = 0;
    if checksum(&work) != ip_sum {
        return Ok(NoMatch(Reject::IpChecksumMismatch));
    }

    if dest_ip != expected.local_ip {
        return Ok(NoMatch(Reject::ForeignDestIp));
    }

    let icmp_start = cur.position();
    let icmp_type = cur.read_u8()?;
    let code = cur.read_u8()?;
    match (icmp_type, code) {
        (ICMP_ECHO_REPLY, 0) => {}
        // Time-exceeded quotes the expired datagram rather than our
        // echo header, so it resolves here without the id/seq stages.
        (ICMP_TIME_EXCEEDED, _) => return Ok(MatchResult::TtlExceeded { source_ip }),
        _ => return Ok(NoMatch(Reject::UnexpectedIcmp { icmp_type, code })),
    }

    let icmp_sum = cur.read_u16()?;
    let identifier = cur.read_u16()?;
    let sequence = cur.read_u16()?;

    // The ICMP region runs for the IP total length minus the header;
    // received frames may carry trailing link padding past it. The
    // declared length is untrusted: an echo reply needs the full
    // 8-byte ICMP header, anything shorter cannot hold the checksum
    // field about to be zeroed.
    let icmp_len = total_len.checked_sub(IP_HDR_LEN).ok_or(Truncated)?;
    if icmp_len < ICMP_HDR_LEN {
        return Ok(NoMatch(Reject::Truncated));
    }
    let icmp_region = frame
        .get(icmp_start..icmp_start + icmp_len)
        .ok_or(Truncated)?;
    let mut work = icmp_region.to_vec();
    work[ICMP_CHECKSUM_OFFSET] = 0;
    work[ICMP_CHECKSUM_OFFSET + 1] = 0;
    if checksum(&work) != icmp_sum {
        return Ok(NoMatch(Reject::IcmpChecksumMismatch));
    }

    if identifier != expected.identifier {
        return Ok(NoMatch(Reject::IdentifierMismatch));
    }
    if sequence != expected.sequence {
        return Ok(NoMatch(Reject::SequenceMismatch));
    }

    Ok(MatchResult::Matched { source_ip, ttl })
}
