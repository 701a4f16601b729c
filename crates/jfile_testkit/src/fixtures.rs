//! Test fixtures: journals on temp files and a few canned journals.

use crate::builder::{BuiltJournal, EntrySpec, JournalBuilder};
use jfile_core::{Journal, ReaderConfig};
use jfile_storage::{FileSource, InMemorySource};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A journal file in a temporary directory, removed on drop.
pub struct TempJournal {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempJournal {
    /// Writes `bytes` to `test.journal` in a fresh temp directory.
    ///
    /// # Panics
    ///
    /// If the directory or file cannot be created.
    pub fn write(bytes: &[u8]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.journal");
        std::fs::write(&path, bytes).expect("Failed to write journal file");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file as a journal.
    ///
    /// # Panics
    ///
    /// If the file cannot be opened as a byte source.
    pub fn open(&self, config: ReaderConfig) -> jfile_core::CoreResult<Journal<FileSource>> {
        let source = FileSource::open(&self.path).expect("Failed to open journal file");
        Journal::open(source, config)
    }
}

/// Opens `bytes` as an in-memory journal.
pub fn open_memory(
    bytes: Vec<u8>,
    config: ReaderConfig,
) -> jfile_core::CoreResult<Journal<InMemorySource>> {
    Journal::open(InMemorySource::new(bytes), config)
}

/// Entries of a small service log: three units, repeated fields, a
/// priority on every entry.
#[must_use]
pub fn sample_entries() -> Vec<EntrySpec> {
    vec![
        EntrySpec::new(
            1_700_000_000_000_000,
            &[("MESSAGE", "Started Daemon"), ("PRIORITY", "6"), ("_SYSTEMD_UNIT", "a.service")],
        ),
        EntrySpec::new(
            1_700_000_000_100_000,
            &[("MESSAGE", "listening on :80"), ("PRIORITY", "6"), ("_SYSTEMD_UNIT", "a.service")],
        ),
        EntrySpec::new(
            1_700_000_000_200_000,
            &[("MESSAGE", "disk full"), ("PRIORITY", "3"), ("_SYSTEMD_UNIT", "b.service")],
        ),
        EntrySpec::new(
            1_700_000_000_300_000,
            &[("MESSAGE", "retrying"), ("PRIORITY", "4"), ("_SYSTEMD_UNIT", "b.service")],
        ),
        EntrySpec::new(
            1_700_000_000_400_000,
            &[("MESSAGE", "Stopped Daemon"), ("PRIORITY", "6"), ("_SYSTEMD_UNIT", "a.service")],
        ),
        EntrySpec::new(
            1_700_000_000_500_000,
            &[("MESSAGE=", "odd"), ("PRIORITY", "6"), ("CODE_LINE", "42"), ("_SYSTEMD_UNIT", "c.service")],
        ),
    ]
}

/// [`sample_entries`] laid out with small pages, so the root chain spans
/// several entry arrays and repeated values get their own chains.
#[must_use]
pub fn sample_journal() -> BuiltJournal {
    JournalBuilder::new()
        .entry_array_capacity(2)
        .data_buckets(4)
        .field_buckets(2)
        .entries(sample_entries())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_journal_roundtrip() {
        let built = sample_journal();
        let file = TempJournal::write(&built.bytes);
        assert!(file.path().exists());

        let journal = file.open(ReaderConfig::default()).unwrap();
        assert_eq!(journal.header(), &built.header);
        assert_eq!(journal.records().count(), sample_entries().len());
    }

    #[test]
    fn memory_fixture_opens() {
        let journal = open_memory(sample_journal().bytes, ReaderConfig::default()).unwrap();
        assert_eq!(journal.header().n_entries, 6);
    }
}
