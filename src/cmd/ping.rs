use crate::net::frame::EchoRequest;
use crate::net::mac::MacAddr;
use crate::net::rawsock::{LinkTransport, RawSocket};
use crate::net::reply::{self, MatchResult};

use std::fmt;
use std::net::Ipv4Addr;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, select, tick, Receiver};

/// Enough for a full-size untagged Ethernet frame.
const RECV_BUFFER_LEN: usize = 2048;

/// How one send/await cycle resolved. Exactly one is produced per
/// sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success {
        source_ip: Ipv4Addr,
        ttl: u8,
        elapsed: Duration,
    },
    TtlExceeded {
        source_ip: Ipv4Addr,
    },
    Timeout,
    /// The receive collaborator failed mid-wait. Reported, then fatal.
    ParseFailure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success {
                source_ip,
                ttl,
                elapsed,
            } => write!(
                f,
                "Reply from {source_ip}: ttl={ttl} time={:.3} ms",
                millis(*elapsed)
            ),
            Outcome::TtlExceeded { source_ip } => {
                write!(f, "Reply from {source_ip}: Time to live exceeded")
            }
            Outcome::Timeout => write!(f, "Request timed out"),
            Outcome::ParseFailure => write!(f, "Error handling reply"),
        }
    }
}

/// Whole seconds fold into milliseconds at 1 s = 1000 ms.
fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

pub struct Config {
    pub local_mac: MacAddr,
    pub local_ip: Ipv4Addr,
    pub dest_mac: MacAddr,
    pub dest_ip: Ipv4Addr,
    pub count: u16,
    pub payload_len: usize,
    pub max_wait: Duration,
    pub interval: Duration,
}

#[derive(Default)]
struct Stats {
    sent: u32,
    received: u32,
    lost: u32,
    min_rtt: Option<Duration>,
    max_rtt: Duration,
    rtt_sum: Duration,
}

impl Stats {
    fn record(&mut self, outcome: &Outcome) {
        self.sent += 1;
        match outcome {
            Outcome::Success { elapsed, .. } => {
                self.received += 1;
                self.rtt_sum += *elapsed;
                self.max_rtt = self.max_rtt.max(*elapsed);
                self.min_rtt = Some(self.min_rtt.map_or(*elapsed, |min| min.min(*elapsed)));
            }
            _ => self.lost += 1,
        }
    }

    fn loss_percent(&self) -> u32 {
        if self.sent == 0 {
            0
        } else {
            self.lost * 100 / self.sent
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} packets transmitted, {} packets received, {}% packet loss",
            self.sent,
            self.received,
            self.loss_percent()
        )?;
        if let Some(min) = self.min_rtt {
            let avg = self.rtt_sum / self.received;
            write!(
                f,
                "round-trip min/avg/max = {:.3}/{:.3}/{:.3} ms",
                millis(min),
                millis(avg),
                millis(self.max_rtt)
            )?;
        }
        Ok(())
    }
}

/// One ping session: a fixed identifier, a monotonically increasing
/// sequence number, and strictly one request in flight at a time.
pub struct Ping<T> {
    link: T,
    config: Config,
    identifier: u16,
    seq: u16,
    buff: Vec<u8>,
    stats: Stats,
}

impl Ping<RawSocket> {
    pub fn open(interface: &str, config: Config) -> Result<Self> {
        // The socket receive timeout doubles as the per-probe wait
        // bound, so a quiet wire wakes us exactly once per probe.
        let sock = RawSocket::open(interface, config.max_wait)?;
        Ok(Self::with_link(sock, config))
    }
}

impl<T: LinkTransport> Ping<T> {
    fn with_link(link: T, config: Config) -> Self {
        Ping {
            link,
            config,
            identifier: process::id() as u16,
            seq: 0,
            buff: vec![0; RECV_BUFFER_LEN],
            stats: Stats::default(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let c = &self.config;
        println!(
            "PING {} ({} -> {}): {} data bytes",
            c.dest_ip, c.local_mac, c.dest_mac, c.payload_len
        );
        let ctrl_c_events = ctrl_channel()?;
        let ticks = tick(self.config.interval);

        while self.seq < self.config.count {
            select! {
                recv(ticks) -> _ => {
                    self.seq += 1;
                    let outcome = self.echo(self.seq)?;
                    self.stats.record(&outcome);
                    println!("[{}] {}", self.seq, outcome);
                    if outcome == Outcome::ParseFailure {
                        bail!("receive failed for icmp_seq={}", self.seq);
                    }
                }
                recv(ctrl_c_events) -> _ => {
                    println!();
                    break;
                }
            }
        }

        println!("--- {} ping statistics ---", self.config.dest_ip);
        println!("{}", self.stats);
        Ok(())
    }

    /// Runs exactly one request/reply cycle for `seq`: build, stamp,
    /// send, then filter inbound frames until a resolution.
    fn echo(&mut self, seq: u16) -> Result<Outcome> {
        let req = EchoRequest::build(
            self.identifier,
            seq,
            self.config.local_mac,
            self.config.local_ip,
            self.config.dest_mac,
            self.config.dest_ip,
            self.config.payload_len,
        );

        let sent = self.link.send_frame(self.config.dest_mac, req.frame())?;
        if sent != req.frame().len() {
            bail!(
                "send bytes size = {} must be equal size of the request frame = {}",
                sent,
                req.frame().len(),
            );
        }

        // Two bounds on the wait: the socket timeout covers a silent
        // wire, the deadline covers a wire busy with frames we keep
        // rejecting.
        let deadline = req.sent_at + self.config.max_wait;
        loop {
            if Instant::now() >= deadline {
                return Ok(Outcome::Timeout);
            }
            let nb = match self.link.recv_frame(&mut self.buff) {
                Ok(Some(nb)) => nb,
                Ok(None) => return Ok(Outcome::Timeout),
                Err(err) => {
                    log::error!("receive failed while awaiting icmp_seq={seq}: {err}");
                    return Ok(Outcome::ParseFailure);
                }
            };

            match reply::try_match(&self.buff[..nb], &req) {
                MatchResult::Matched { source_ip, ttl } => {
                    return Ok(Outcome::Success {
                        source_ip,
                        ttl,
                        elapsed: req.sent_at.elapsed(),
                    });
                }
                MatchResult::TtlExceeded { source_ip } => {
                    return Ok(Outcome::TtlExceeded { source_ip });
                }
                MatchResult::NoMatch(reason) => {
                    log::trace!("discarding frame ({nb} bytes): {reason}");
                }
            }
        }
    }
}

fn ctrl_channel() -> Result<Receiver<()>, ctrlc::Error> {
    let (sender, receiver) = bounded(100);
    ctrlc::set_handler(move || {
        let _ = sender.send(());
    })?;

    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::checksum::checksum;
    use crate::net::frame::{
        ETH_HDR_LEN, ICMP_ECHO_REPLY, ICMP_TIME_EXCEEDED, IP_HDR_LEN,
    };

    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted stand-in for the raw socket: each receive either
    /// delivers a canned frame or times out.
    struct FakeLink {
        inbound: RefCell<VecDeque<Option<Vec<u8>>>>,
    }

    impl FakeLink {
        fn new(inbound: Vec<Option<Vec<u8>>>) -> Self {
            FakeLink {
                inbound: RefCell::new(inbound.into()),
            }
        }
    }

    impl LinkTransport for FakeLink {
        fn send_frame(&self, _dest_mac: MacAddr, frame: &[u8]) -> Result<usize> {
            Ok(frame.len())
        }

        fn recv_frame(&self, buf: &mut [u8]) -> Result<Option<usize>> {
            match self.inbound.borrow_mut().pop_front() {
                Some(Some(frame)) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(Some(frame.len()))
                }
                // Script exhausted or explicit gap: receive timeout.
                _ => Ok(None),
            }
        }
    }

    fn config() -> Config {
        Config {
            local_mac: "02:00:00:00:00:01".parse().unwrap(),
            local_ip: Ipv4Addr::new(10, 32, 143, 1),
            dest_mac: "02:00:00:00:00:02".parse().unwrap(),
            dest_ip: Ipv4Addr::new(10, 32, 143, 2),
            count: 2,
            payload_len: 16,
            max_wait: Duration::from_secs(2),
            interval: Duration::from_millis(10),
        }
    }

    fn session(inbound: Vec<Option<Vec<u8>>>) -> Ping<FakeLink> {
        Ping::with_link(FakeLink::new(inbound), config())
    }

    fn fix_icmp(frame: &mut [u8], icmp_type: u8) {
        let icmp_start = ETH_HDR_LEN + IP_HDR_LEN;
        frame[icmp_start] = icmp_type;
        frame[icmp_start + 2] = 0;
        frame[icmp_start + 3] = 0;
        let sum = checksum(&frame[icmp_start..]);
        frame[icmp_start + 2..icmp_start + 4].copy_from_slice(&sum.to_be_bytes());
    }

    /// The reply the destination would send for (`identifier`, `seq`):
    /// roles swapped, type flipped to echo reply, checksum fixed up.
    fn reply_frame(c: &Config, identifier: u16, seq: u16) -> Vec<u8> {
        let mut frame = EchoRequest::build(
            identifier,
            seq,
            c.dest_mac,
            c.dest_ip,
            c.local_mac,
            c.local_ip,
            c.payload_len,
        )
        .frame()
        .to_vec();
        fix_icmp(&mut frame, ICMP_ECHO_REPLY);
        frame
    }

    #[test]
    fn matching_reply_resolves_success() {
        let c = config();
        let reply = reply_frame(&c, process::id() as u16, 1);
        let mut ping = session(vec![Some(reply)]);

        match ping.echo(1).unwrap() {
            Outcome::Success { source_ip, ttl, .. } => {
                assert_eq!(source_ip, c.dest_ip);
                assert_eq!(ttl, 64);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn quiet_wire_resolves_timeout_once_and_session_continues() {
        let mut ping = session(vec![]);

        assert_eq!(ping.echo(1).unwrap(), Outcome::Timeout);
        // The next sequence number still runs a full cycle.
        assert_eq!(ping.echo(2).unwrap(), Outcome::Timeout);
    }

    #[test]
    fn stale_sequence_does_not_end_the_wait() {
        let c = config();
        let stale = reply_frame(&c, process::id() as u16, 2);
        let mut ping = session(vec![Some(stale), None]);

        // The seq=2 reply is rejected while waiting on seq=1, and the
        // wait keeps going until the timeout.
        assert_eq!(ping.echo(1).unwrap(), Outcome::Timeout);
    }

    #[test]
    fn foreign_traffic_is_skipped_before_the_real_reply() {
        let c = config();
        let id = process::id() as u16;
        let mut foreign = reply_frame(&c, id, 1);
        foreign[0] ^= 0xFF; // someone else's MAC
        let reply = reply_frame(&c, id, 1);
        let mut ping = session(vec![Some(foreign), Some(reply)]);

        assert!(matches!(ping.echo(1).unwrap(), Outcome::Success { .. }));
    }

    #[test]
    fn time_exceeded_resolves_with_router_ip() {
        let c = config();
        let router_ip = Ipv4Addr::new(10, 32, 0, 254);
        let mut frame =
            EchoRequest::build(0, 0, c.dest_mac, router_ip, c.local_mac, c.local_ip, 16)
                .frame()
                .to_vec();
        fix_icmp(&mut frame, ICMP_TIME_EXCEEDED);
        let mut ping = session(vec![Some(frame)]);

        assert_eq!(
            ping.echo(1).unwrap(),
            Outcome::TtlExceeded {
                source_ip: router_ip
            }
        );
    }

    #[test]
    fn seconds_fold_into_millis_at_one_thousand() {
        assert_eq!(millis(Duration::from_secs(2)), 2000.0);
        assert_eq!(millis(Duration::from_millis(1500)), 1500.0);
        assert!((millis(Duration::new(1, 500_000)) - 1000.5).abs() < 1e-6);
    }

    #[test]
    fn stats_track_loss_and_rtt_bounds() {
        let mut stats = Stats::default();
        let ip = Ipv4Addr::new(10, 32, 143, 2);
        stats.record(&Outcome::Success {
            source_ip: ip,
            ttl: 64,
            elapsed: Duration::from_millis(10),
        });
        stats.record(&Outcome::Success {
            source_ip: ip,
            ttl: 64,
            elapsed: Duration::from_millis(30),
        });
        stats.record(&Outcome::Timeout);

        assert_eq!(stats.sent, 3);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.loss_percent(), 33);
        assert_eq!(stats.min_rtt, Some(Duration::from_millis(10)));
        assert_eq!(stats.max_rtt, Duration::from_millis(30));
    }
}
