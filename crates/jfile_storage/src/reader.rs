//! Sequential [`Read`] adapter over a byte source.

use crate::backend::ByteSource;
use crate::error::StorageError;
use std::io::{self, Read};

/// Reads a [`ByteSource`] sequentially from a starting offset.
///
/// Stream-oriented decoders (such as the journal header decoder) take any
/// [`Read`]; this adapter lets them run over a random-access source. Reads
/// near the end of the source return the bytes that remain, then `Ok(0)`.
#[derive(Debug)]
pub struct SourceReader<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    position: u64,
    size: u64,
}

impl<'a, S: ByteSource + ?Sized> SourceReader<'a, S> {
    /// Creates a reader positioned at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source size cannot be determined.
    pub fn new(source: &'a S, start: u64) -> Result<Self, StorageError> {
        let size = source.size()?;
        Ok(Self {
            source,
            position: start,
            size,
        })
    }

    /// Returns the absolute offset of the next byte to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<S: ByteSource + ?Sized> Read for SourceReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.position);
        let len = (buf.len() as u64).min(remaining) as usize;
        if len == 0 {
            return Ok(0);
        }

        let bytes = self
            .source
            .read_at(self.position, len)
            .map_err(|e| match e {
                StorageError::Io(io) => io,
                other => io::Error::new(io::ErrorKind::UnexpectedEof, other.to_string()),
            })?;
        buf[..len].copy_from_slice(&bytes);
        self.position += len as u64;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemorySource;

    #[test]
    fn reader_reads_sequentially() {
        let source = InMemorySource::new(b"abcdefgh".to_vec());
        let mut reader = SourceReader::new(&source, 2).unwrap();

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cde");
        assert_eq!(reader.position(), 5);

        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"fgh");
    }

    #[test]
    fn reader_short_at_end() {
        let source = InMemorySource::new(b"abc".to_vec());
        let mut reader = SourceReader::new(&source, 0).unwrap();

        let mut buf = [0u8; 8];
        let err = reader.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
