//! Checkpoint byte framing.
//!
//! Integers are fixed-width little-endian; strings are an `i32` length
//! followed by the bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::error;

use crate::{Result, RowError};

/// Checkpoint output buffer.
#[derive(Debug, Default)]
pub struct KvOut {
    buf: BytesMut,
}

impl KvOut {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    /// Append an `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    /// Append an `i16`.
    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    /// Append a length-prefixed byte string.
    pub fn write_str(&mut self, s: &[u8]) {
        assert!(s.len() <= i32::MAX as usize, "checkpoint string longer than i32::MAX");
        self.write_i32(s.len() as i32);
        self.buf.put_slice(s);
    }

    /// Finish writing.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Checkpoint input cursor.
#[derive(Debug, Clone)]
pub struct KvIn {
    buf: Bytes,
}

impl KvIn {
    /// Read from `buf`.
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, what: &'static str, needed: usize) -> Result<()> {
        let available = self.remaining();
        if available < needed {
            error!(what, needed, available, "truncated checkpoint input");
            return Err(RowError::Corrupt { what, needed, available });
        }
        Ok(())
    }

    /// Read a `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.need("u64", 8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Read an `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.need("i32", 4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Read an `i16`.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.need("i16", 2)?;
        Ok(self.buf.get_i16_le())
    }

    /// Check that `n` more bytes are available for `what`.
    pub fn ensure(&self, what: &'static str, n: usize) -> Result<()> {
        self.need(what, n)
    }

    /// Fill `dst` from the input.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.need("bytes", dst.len())?;
        self.buf.copy_to_slice(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_layout() {
        let mut out = KvOut::new();
        out.write_u64(42);
        out.write_i16(3);
        out.write_str(b"ab");
        let bytes = out.freeze();
        assert_eq!(bytes.len(), 8 + 2 + 4 + 2);
        assert_eq!(&bytes[..8], &42u64.to_le_bytes());
        assert_eq!(&bytes[10..14], &2i32.to_le_bytes());

        let mut input = KvIn::new(bytes);
        assert_eq!(input.read_u64().unwrap(), 42);
        assert_eq!(input.read_i16().unwrap(), 3);
        assert_eq!(input.read_i32().unwrap(), 2);
        let mut s = [0u8; 2];
        input.read_into(&mut s).unwrap();
        assert_eq!(&s, b"ab");
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn short_reads_are_corrupt() {
        let mut input = KvIn::new(vec![1u8, 2, 3]);
        match input.read_i32() {
            Err(RowError::Corrupt { what, needed, available }) => {
                assert_eq!((what, needed, available), ("i32", 4, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
        // Nothing consumed on failure.
        assert_eq!(input.read_i16().unwrap(), i16::from_le_bytes([1, 2]));
    }
}
