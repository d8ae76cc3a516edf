//! One's-complement internet checksum (RFC 1071), shared by the IPv4
//! and ICMP headers.

/// Sums `data` as big-endian 16-bit words with end-around carry and
/// returns the one's complement of the final accumulator.
///
/// A trailing odd byte is treated as the high byte of a zero-padded
/// word. The IP and ICMP regions this tool checksums are even-length,
/// but the padding keeps the function total.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for w in data.chunks(2) {
        let word = if w.len() == 2 {
            u16::from_be_bytes([w[0], w[1]])
        } else {
            u16::from_be_bytes([w[0], 0])
        };

        sum += word as u32;

        let carry = (0xFFFF_0000 & sum) >> 16;
        sum = (sum & 0x0000_FFFF) + carry;
    }

    let carry = (0xFFFF_0000 & sum) >> 16;
    sum = (sum & 0x0000_FFFF) + carry;

    !(sum as u16)
}

/// A region that carries its own checksum sums to zero when the stored
/// field is included.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_buffer_sums_to_ffff() {
        assert_eq!(checksum(&[0u8; 20]), 0xFFFF);
    }

    #[test]
    fn all_ones_buffer_sums_to_zero() {
        assert_eq!(checksum(&[0xFFu8; 20]), 0x0000);
    }

    #[test]
    fn known_ip_header() {
        // Example header from RFC 1071 discussions; checksum field at
        // bytes 10..12 is zeroed.
        let hdr = [
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0xac, 0x10,
            0x0a, 0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        let sum = checksum(&hdr);

        let mut with_sum = hdr;
        with_sum[10..12].copy_from_slice(&sum.to_be_bytes());
        assert!(verify(&with_sum));
    }

    #[test]
    fn self_verification_is_zero() {
        let mut data = [0x08, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00, 0x01, 0x61, 0x62];
        let sum = checksum(&data);
        data[2..4].copy_from_slice(&sum.to_be_bytes());

        assert!(verify(&data));
    }

    #[test]
    fn odd_length_pads_low_byte() {
        assert_eq!(checksum(&[0x45]), !0x4500);
    }
}
