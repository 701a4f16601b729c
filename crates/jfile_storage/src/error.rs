//! Error types for byte source operations.

use std::io;
use thiserror::Error;

/// Result type for byte source operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading from a byte source.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the source.
    #[error("read beyond end of source: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The size of the source.
        size: u64,
    },
}
