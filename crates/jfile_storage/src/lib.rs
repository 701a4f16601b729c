//! # jfile Storage
//!
//! Read-only byte sources for the jfile journal reader.
//!
//! A byte source is an **opaque, random-access view** of a journal file. It
//! does not interpret the bytes it serves: header validation, object decoding
//! and link traversal all live in `jfile_core`.
//!
//! ## Design Principles
//!
//! - Sources only answer `read_at` and `size`
//! - Sources never write, truncate or lock the underlying file
//! - Must be `Send + Sync` so independent offsets can be read concurrently
//!
//! ## Available Sources
//!
//! - [`InMemorySource`] - For tests and files already loaded in memory
//! - [`FileSource`] - For journal files on disk, read with positioned reads
//!
//! ## Example
//!
//! ```rust
//! use jfile_storage::{ByteSource, InMemorySource};
//!
//! let source = InMemorySource::new(b"LPKSHHRH".to_vec());
//! let magic = source.read_at(0, 8).unwrap();
//! assert_eq!(&magic, b"LPKSHHRH");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod reader;

pub use backend::ByteSource;
pub use error::{StorageError, StorageResult};
pub use file::FileSource;
pub use memory::InMemorySource;
pub use reader::SourceReader;
