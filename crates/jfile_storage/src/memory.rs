//! In-memory byte source.

use crate::backend::ByteSource;
use crate::error::{StorageError, StorageResult};

/// A byte source over a buffer already held in memory.
///
/// This source is suitable for:
/// - Unit and scenario tests built with synthetic journal bytes
/// - Small journal files that were read or mapped up front
///
/// The buffer is immutable, so concurrent reads need no locking.
///
/// # Example
///
/// ```rust
/// use jfile_storage::{ByteSource, InMemorySource};
///
/// let source = InMemorySource::new(b"test data".to_vec());
/// assert_eq!(source.size().unwrap(), 9);
/// assert_eq!(source.read_at(5, 4).unwrap(), b"data");
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    data: Vec<u8>,
}

impl InMemorySource {
    /// Creates a source over `data`.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for InMemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ByteSource for InMemorySource {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }
}
