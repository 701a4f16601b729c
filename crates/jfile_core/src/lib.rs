//! # jfile Core
//!
//! Decoder for append-only journal arena files.
//!
//! A journal file is a versioned header followed by an arena of typed,
//! offset-linked, 8-byte-aligned objects. This crate reconstructs the logical
//! stream of entries (sets of `FIELD=value` pairs) from it without reading
//! the whole file into memory and without following an offset it has not
//! validated.
//!
//! ## Layers
//!
//! - [`codec`]: little-endian primitives and alignment arithmetic
//! - [`header`]: the file header and its size-gated optional fields
//! - [`object`]: the eight object kinds and their decoder
//! - [`Journal`]: validated random access by offset, with an object cache
//! - navigation: entry-array chains, hash buckets, field and entry links
//! - assembly: [`LogRecord`]s built from resolved entries
//!
//! ## Example
//!
//! ```rust,ignore
//! use jfile_core::{Journal, ReaderConfig};
//! use jfile_storage::FileSource;
//!
//! let journal = Journal::open(FileSource::open("system.journal")?, ReaderConfig::default())?;
//! for record in journal.records() {
//!     let record = record?;
//!     println!("{} {:?}", record.seqnum, record.message());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assembler;
mod cache;
mod cancel;
pub mod codec;
mod config;
mod error;
pub mod header;
mod journal;
mod navigator;
pub mod object;
mod scan;
mod seal;

pub use assembler::{
    EntryAssembler, LogField, LogRecord, NoTransform, PayloadTransform, Records, TransformError,
};
pub use cache::ObjectCache;
pub use cancel::CancellationToken;
pub use config::{IntegrityPolicy, ReaderConfig, UnknownObjectPolicy};
pub use error::{CoreError, CoreResult, FormatError, IntegrityError};
pub use header::{CompatibleFlags, IncompatibleFlags, JournalHeader, JournalState};
pub use journal::{DataRef, Journal};
pub use navigator::{EntryOffsets, FieldData, HashChain, ResolvedEntry};
pub use object::{Compression, DecodedObject, Object, ObjectFlags, ObjectType};
pub use scan::{JournalStats, ObjectScanner};
pub use seal::{SealReport, TagVerifier};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
