//! # jfile Testkit
//!
//! Test utilities for the jfile journal reader.
//!
//! This crate provides:
//! - A journal builder that lays out consistent files in memory
//! - Byte-level corruption helpers
//! - Fixtures on temp files and canned journals
//! - Property-based test generators using proptest
//! - Fuzz testing harnesses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jfile_testkit::prelude::*;
//!
//! #[test]
//! fn reads_back() {
//!     let built = JournalBuilder::new()
//!         .entry(EntrySpec::new(1, &[("MESSAGE", "hi")]))
//!         .build();
//!     let journal = open_memory(built.bytes, ReaderConfig::default()).unwrap();
//!     assert_eq!(journal.records().count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod corrupt;
pub mod fixtures;
pub mod fuzz;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::*;
    pub use crate::corrupt;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use jfile_core::{Journal, ReaderConfig};
}

pub use builder::*;
pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
