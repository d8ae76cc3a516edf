use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::net::mac::MacAddr;

mod ping;

/// Link-layer ICMP echo: crafts raw Ethernet/IPv4/ICMP frames and
/// matches replies off the wire, bypassing the IP stack.
#[derive(Parser)]
#[command(name = "rawping", version)]
pub struct Cli {
    /// MAC address of the local interface.
    local_mac: MacAddr,
    /// IPv4 address of the local interface.
    local_ip: Ipv4Addr,
    /// MAC address of the destination host (or the gateway towards it).
    dest_mac: MacAddr,
    /// IPv4 address of the destination host.
    dest_ip: Ipv4Addr,

    /// Interface to send and capture on.
    #[arg(short = 'I', long, default_value = "eth0")]
    interface: String,
    /// Number of echo requests to send.
    #[arg(short, long, default_value_t = 4)]
    count: u16,
    /// Seconds to wait for each reply; also the socket receive timeout.
    #[arg(short = 'W', long, default_value_t = 2)]
    wait: u64,
    /// Seconds between requests.
    #[arg(short, long, default_value_t = 1)]
    interval: u64,
    /// ICMP payload bytes (padding only).
    #[arg(short = 's', long, default_value_t = 32)]
    size: usize,
}

impl Cli {
    pub fn exec(self) -> Result<()> {
        let config = ping::Config {
            local_mac: self.local_mac,
            local_ip: self.local_ip,
            dest_mac: self.dest_mac,
            dest_ip: self.dest_ip,
            count: self.count,
            payload_len: self.size,
            max_wait: Duration::from_secs(self.wait),
            interval: Duration::from_secs(self.interval),
        };
        let mut ping = ping::Ping::open(&self.interface, config)?;

        ping.run()
    }
}
