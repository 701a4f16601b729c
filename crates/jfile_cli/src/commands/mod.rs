//! CLI command implementations.

pub mod dump_entries;
pub mod dump_objects;
pub mod inspect;
pub mod verify;

use jfile_core::{Journal, ReaderConfig};
use jfile_storage::FileSource;
use std::path::Path;
use tracing::debug;

/// Opens the journal file at `path`.
pub fn open_journal(
    path: &Path,
    config: ReaderConfig,
) -> Result<Journal<FileSource>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal file at {}", path.display()).into());
    }
    debug!(path = %path.display(), "opening journal file");
    let source = FileSource::open(path)?;
    Ok(Journal::open(source, config)?)
}
