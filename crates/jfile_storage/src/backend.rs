//! Byte source trait definition.

use crate::error::StorageResult;

/// A read-only, random-access view of a journal file.
///
/// Byte sources are **opaque**. The journal reader asks for byte ranges by
/// absolute file offset and decodes them itself; a source never needs to know
/// what a header, an object or a hash table is.
///
/// # Invariants
///
/// - `read_at` returns exactly `len` bytes or an error, never a short buffer
/// - `size` is stable for the lifetime of the source (journal files handed to
///   the reader are not written concurrently)
/// - Sources must be `Send + Sync`; concurrent `read_at` calls at different
///   offsets are allowed
///
/// # Implementors
///
/// - [`super::InMemorySource`] - For testing
/// - [`super::FileSource`] - For files on disk
pub trait ByteSource: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The offset is beyond the end of the source
    /// - The read would extend beyond the end of the source
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Returns the size of the source in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }
}

impl<T: ByteSource + ?Sized> ByteSource for std::sync::Arc<T> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }
}
