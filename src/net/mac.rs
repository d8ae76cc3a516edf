use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};

/// Ethernet hardware address, 6 bytes, byte-wise equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const LEN: usize = 6;

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    /// Accepts the conventional `aa:bb:cc:dd:ee:ff` notation, case
    /// insensitive. Malformed input is an error, never a zero address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| anyhow!("MAC address {s:?} has fewer than 6 octets"))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| anyhow!("MAC address {s:?} has invalid octet {part:?}"))?;
        }
        if parts.next().is_some() {
            return Err(anyhow!("MAC address {s:?} has more than 6 octets"));
        }

        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}
