//! Bounds-checked reader over a received frame.
//!
//! Field extraction advances a position through an immutable byte
//! slice; running off the end is an explicit error, not undefined
//! behavior.

use std::error;
use std::fmt;

/// The frame ended before the requested field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated;

impl fmt::Display for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame truncated")
    }
}

impl error::Error for Truncated {}

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    /// Byte offset of the next read, from the start of the frame.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Truncated> {
        let end = self.pos.checked_add(len).ok_or(Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Truncated> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, Truncated> {
        self.take(1).map(|b| b[0])
    }

    /// Reads a 16-bit field in network byte order.
    pub fn read_u16(&mut self) -> Result<u16, Truncated> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_octets<const N: usize>(&mut self) -> Result<[u8; N], Truncated> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_in_order() {
        let buf = [0x08, 0x00, 0x12, 0x34, 0xAA, 0xBB, 0xCC];
        let mut cur = Cursor::new(&buf);

        assert_eq!(cur.read_u16().unwrap(), 0x0800);
        assert_eq!(cur.read_u16().unwrap(), 0x1234);
        assert_eq!(cur.position(), 4);
        assert_eq!(cur.read_octets::<3>().unwrap(), [0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn skip_advances_position() {
        let buf = [0u8; 8];
        let mut cur = Cursor::new(&buf);

        cur.skip(6).unwrap();
        assert_eq!(cur.position(), 6);
        assert_eq!(cur.read_u16().unwrap(), 0);
    }

    #[test]
    fn reading_past_end_is_an_error() {
        let buf = [0x01, 0x02];
        let mut cur = Cursor::new(&buf);

        assert_eq!(cur.read_u8().unwrap(), 0x01);
        assert_eq!(cur.read_u16(), Err(Truncated));
        // The failed read does not advance; the remaining byte is
        // still there.
        assert_eq!(cur.read_u8().unwrap(), 0x02);
        assert_eq!(cur.read_u8(), Err(Truncated));
    }

    #[test]
    fn skip_past_end_is_an_error() {
        let mut cur = Cursor::new(&[0u8; 4]);
        assert_eq!(cur.skip(5), Err(Truncated));
    }
}
