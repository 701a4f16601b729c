//! Error types for journal decoding.
//!
//! Two families are kept apart:
//!
//! - [`FormatError`]: the byte stream is not a valid or consistent journal.
//!   The current decode operation is aborted.
//! - [`IntegrityError`]: one specific record is suspect. By default these are
//!   reported alongside the decoded value; under
//!   [`IntegrityPolicy::Strict`](crate::IntegrityPolicy::Strict) they abort.

use crate::config::IntegrityPolicy;
use crate::object::ObjectType;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by the journal reader.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The bytes do not form a valid journal.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// An integrity problem escalated by strict mode.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The byte source failed while reading at `offset`.
    #[error("storage error at offset {offset}: {source}")]
    Storage {
        /// Offset being read.
        offset: u64,
        /// Underlying source error.
        #[source]
        source: jfile_storage::StorageError,
    },

    /// A stream read failed at `offset`.
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        /// Offset being read.
        offset: u64,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The traversal observed a cancellation request.
    #[error("decode cancelled")]
    Cancelled,
}

impl CoreError {
    /// Wraps a byte source error with the offset that was being read.
    ///
    /// Reads past the end of the source are structural problems of the
    /// journal, so they become [`FormatError::Truncated`].
    pub fn storage(offset: u64, source: jfile_storage::StorageError) -> Self {
        match source {
            jfile_storage::StorageError::ReadPastEnd { len, .. } => {
                Self::Format(FormatError::Truncated {
                    offset,
                    wanted: len as u64,
                })
            }
            source => Self::Storage { offset, source },
        }
    }

    /// Wraps a stream error with the offset that was being read.
    ///
    /// `UnexpectedEof` becomes [`FormatError::Truncated`].
    pub fn io(offset: u64, wanted: u64, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            Self::Format(FormatError::Truncated { offset, wanted })
        } else {
            Self::Io { offset, source }
        }
    }

    /// Returns the format error, if this is one.
    #[must_use]
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Self::Format(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the integrity error, if this is one.
    #[must_use]
    pub fn as_integrity(&self) -> Option<&IntegrityError> {
        match self {
            Self::Integrity(e) => Some(e),
            _ => None,
        }
    }
}

/// The byte stream is not a valid or consistent journal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The first eight bytes are not the journal signature.
    #[error("bad signature: {found:02x?}")]
    BadSignature {
        /// The bytes found at offset 0.
        found: [u8; 8],
    },

    /// The source ended inside a structure.
    #[error("truncated: needed {wanted} bytes at offset {offset}")]
    Truncated {
        /// Offset of the short read.
        offset: u64,
        /// Bytes that were requested.
        wanted: u64,
    },

    /// The declared header size is smaller than the fixed prefix.
    #[error("header size {header_size} is smaller than the fixed prefix")]
    HeaderTooSmall {
        /// Declared header size.
        header_size: u64,
    },

    /// The file uses incompatible features this reader does not understand.
    #[error("unsupported incompatible flags {flags:#x}")]
    UnsupportedFeatures {
        /// The unknown incompatible flag bits.
        flags: u32,
    },

    /// An object's declared size is smaller than its type requires.
    #[error("object at {offset} too small: size {size}, type {object_type:?}")]
    ObjectTooSmall {
        /// Offset of the object.
        offset: u64,
        /// Raw type tag.
        object_type: u8,
        /// Declared object size.
        size: u64,
    },

    /// The object type tag is not one of the eight known kinds.
    #[error("unknown object type {tag} at offset {offset}")]
    UnknownObjectType {
        /// Offset of the object.
        offset: u64,
        /// The unrecognized tag.
        tag: u8,
    },

    /// A variable-length array tail is not a whole number of items.
    #[error("object at {offset} ({object_type}) has invalid payload length {len}")]
    InvalidPayloadLength {
        /// Offset of the object.
        offset: u64,
        /// Object type.
        object_type: ObjectType,
        /// Length of the variable tail.
        len: u64,
    },

    /// A linked traversal exceeded the bound given by the header counters.
    #[error("cyclic link detected at offset {offset} after {limit} steps")]
    CyclicLink {
        /// Offset at which the bound was exceeded.
        offset: u64,
        /// The traversal bound.
        limit: u64,
    },

    /// An offset points outside the arena.
    #[error("offset {offset} outside arena [{arena_start}, {arena_end})")]
    OffsetOutOfBounds {
        /// The offending offset.
        offset: u64,
        /// First valid offset.
        arena_start: u64,
        /// One past the last valid offset.
        arena_end: u64,
    },

    /// An offset is not 8-byte aligned.
    #[error("misaligned offset {offset}")]
    MisalignedOffset {
        /// The offending offset.
        offset: u64,
    },

    /// An object extends past the end of the arena.
    #[error("object at {offset} with size {size} overruns arena end {arena_end}")]
    ObjectOverrun {
        /// Offset of the object.
        offset: u64,
        /// Declared size.
        size: u64,
        /// End of the arena.
        arena_end: u64,
    },

    /// A link resolved to an object of the wrong type.
    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedObjectType {
        /// Offset of the object.
        offset: u64,
        /// Type the link should point to.
        expected: ObjectType,
        /// Type actually found.
        found: ObjectType,
    },
}

/// A single record is suspect; the rest of the journal may still be readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// An entry item's stored hash differs from the DATA object it points to.
    #[error("entry {entry_offset}: item hash {expected:#018x} != data {data_offset} hash {found:#018x}")]
    HashMismatch {
        /// Offset of the entry.
        entry_offset: u64,
        /// Offset of the DATA object.
        data_offset: u64,
        /// Hash stored in the entry item.
        expected: u64,
        /// Hash stored in the DATA object.
        found: u64,
    },

    /// XOR of the entry's data hashes differs from its stored `xor_hash`.
    #[error("entry {entry_offset}: xor hash {stored:#018x} != computed {computed:#018x}")]
    EntryXorMismatch {
        /// Offset of the entry.
        entry_offset: u64,
        /// Value stored in the entry.
        stored: u64,
        /// Value computed from the resolved data.
        computed: u64,
    },

    /// A TAG object did not verify against the sealed range.
    #[error("tag at {offset} (seqnum {seqnum}, epoch {epoch}) failed verification")]
    TagVerificationFailed {
        /// Offset of the TAG object.
        offset: u64,
        /// Tag sequence number.
        seqnum: u64,
        /// Tag epoch.
        epoch: u64,
    },

    /// An entry item does not resolve to a DATA object.
    #[error("entry {entry_offset}: item {data_offset} unresolved: {cause}")]
    UnresolvedItem {
        /// Offset of the entry.
        entry_offset: u64,
        /// Offset stored in the item.
        data_offset: u64,
        /// Why resolution failed.
        cause: FormatError,
    },

    /// A DATA payload is not of the form `NAME=value`.
    #[error("data {data_offset}: payload is not NAME=value")]
    MalformedField {
        /// Offset of the DATA object.
        data_offset: u64,
    },

    /// The payload transform could not produce raw bytes.
    #[error("data {data_offset}: payload transform failed: {reason}")]
    PayloadTransform {
        /// Offset of the DATA object.
        data_offset: u64,
        /// Transform failure description.
        reason: String,
    },
}

impl IntegrityError {
    /// Applies `policy` to this issue.
    ///
    /// Strict mode returns it as an error; report mode logs it and appends it
    /// to `issues`.
    pub fn report(self, policy: IntegrityPolicy, issues: &mut Vec<Self>) -> CoreResult<()> {
        match policy {
            IntegrityPolicy::Strict => Err(self.into()),
            IntegrityPolicy::Report => {
                warn!(issue = %self, "integrity issue");
                issues.push(self);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_maps_to_truncated() {
        let err = CoreError::storage(
            64,
            jfile_storage::StorageError::ReadPastEnd {
                offset: 64,
                len: 16,
                size: 70,
            },
        );
        assert_eq!(
            err.as_format(),
            Some(&FormatError::Truncated {
                offset: 64,
                wanted: 16
            })
        );
    }

    #[test]
    fn unexpected_eof_maps_to_truncated() {
        let err = CoreError::io(8, 4, io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(
            err,
            CoreError::Format(FormatError::Truncated { offset: 8, wanted: 4 })
        ));
    }

    #[test]
    fn other_io_errors_keep_offset() {
        let err = CoreError::io(24, 8, io::Error::from(io::ErrorKind::PermissionDenied));
        match err {
            CoreError::Io { offset, source } => {
                assert_eq!(offset, 24);
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_mentions_offsets() {
        let err = FormatError::UnknownObjectType { offset: 272, tag: 9 };
        assert_eq!(err.to_string(), "unknown object type 9 at offset 272");
    }

    #[test]
    fn report_policy() {
        let issue = IntegrityError::MalformedField { data_offset: 240 };

        let mut issues = Vec::new();
        issue
            .clone()
            .report(IntegrityPolicy::Report, &mut issues)
            .unwrap();
        assert_eq!(issues, vec![issue.clone()]);

        let mut issues = Vec::new();
        let err = issue
            .clone()
            .report(IntegrityPolicy::Strict, &mut issues)
            .unwrap_err();
        assert_eq!(err.as_integrity(), Some(&issue));
        assert!(issues.is_empty());
    }
}
