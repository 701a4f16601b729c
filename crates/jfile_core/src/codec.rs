//! Little-endian primitives shared by the header and object decoders.

use crate::error::FormatError;
use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

/// Objects are laid out on 8-byte boundaries.
pub const ALIGNMENT: u64 = 8;

/// Number of zero bytes that follow an object of `size` bytes.
#[must_use]
pub const fn padding_for(size: u64) -> u64 {
    (ALIGNMENT - size % ALIGNMENT) % ALIGNMENT
}

/// Rounds `size` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` on overflow.
#[must_use]
pub const fn align8(size: u64) -> Option<u64> {
    size.checked_add(padding_for(size))
}

/// A bounds-checked read cursor over a byte slice.
///
/// `base` is the absolute file offset of `buf[0]`, so every error carries the
/// offset in the file rather than the position in the slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor over `buf`, whose first byte lives at file offset `base`.
    #[must_use]
    pub fn new(buf: &'a [u8], base: u64) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the next byte.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consumes `n` bytes and returns them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::Truncated {
                offset: self.offset(),
                wanted: n as u64,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Consumes and discards `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.take(n).map(|_| ())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Reads a fixed-size byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a 128-bit identifier, bytes kept in stored order.
    pub fn read_id128(&mut self) -> Result<Uuid, FormatError> {
        Ok(Uuid::from_bytes(self.read_array::<16>()?))
    }
}

/// Appends a little-endian `u32`.
pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

/// Appends a little-endian `u64`.
pub fn put_u64(buf: &mut Vec<u8>, value: u64) {
    let mut bytes = [0u8; 8];
    LittleEndian::write_u64(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

/// Appends a 128-bit identifier in stored order.
pub fn put_id128(buf: &mut Vec<u8>, id: &Uuid) {
    buf.extend_from_slice(id.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_values() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(16), 0);
        assert_eq!(padding_for(17), 7);
        assert_eq!(padding_for(23), 1);
        assert_eq!(padding_for(63), 1);
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(64), Some(64));
        assert_eq!(align8(65), Some(72));
        assert_eq!(align8(u64::MAX), None);
    }

    #[test]
    fn cursor_reads_little_endian() {
        let mut buf = Vec::new();
        buf.push(7);
        put_u32(&mut buf, 0xDEAD_BEEF);
        put_u64(&mut buf, 0x0102_0304_0506_0708);

        let mut cursor = ByteCursor::new(&buf, 100);
        assert_eq!(cursor.read_u8().unwrap(), 7);
        assert_eq!(cursor.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(cursor.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.offset(), 113);
    }

    #[test]
    fn cursor_short_read_reports_absolute_offset() {
        let buf = [0u8; 6];
        let mut cursor = ByteCursor::new(&buf, 240);
        cursor.skip(4).unwrap();

        let err = cursor.read_u64().unwrap_err();
        assert_eq!(
            err,
            FormatError::Truncated {
                offset: 244,
                wanted: 8
            }
        );
        // A failed read consumes nothing.
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn id128_keeps_byte_order() {
        let raw: [u8; 16] = core::array::from_fn(|i| i as u8);
        let mut buf = Vec::new();
        put_id128(&mut buf, &Uuid::from_bytes(raw));
        assert_eq!(buf, raw);

        let mut cursor = ByteCursor::new(&buf, 0);
        assert_eq!(cursor.read_id128().unwrap().as_bytes(), &raw);
    }
}
