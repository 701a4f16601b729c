//! File-based byte source for journal files on disk.

use crate::backend::ByteSource;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A read-only byte source backed by a file.
///
/// The file is opened read-only and its length is captured at open time.
/// Journal files handed to the reader are expected to be closed (OFFLINE or
/// ARCHIVED) or at least not growing while they are decoded.
///
/// # Thread Safety
///
/// The file handle sits behind a mutex because a positioned read is a seek
/// followed by a read. Concurrent callers serialize on the handle, never on
/// the decoded data.
///
/// # Example
///
/// ```no_run
/// use jfile_storage::{ByteSource, FileSource};
/// use std::path::Path;
///
/// let source = FileSource::open(Path::new("system.journal")).unwrap();
/// let signature = source.read_at(0, 8).unwrap();
/// ```
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    /// Opens the file at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);

        if offset > self.size || end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.journal");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        file.sync_all().unwrap();
        (dir, path)
    }

    #[test]
    fn file_open_reports_size() {
        let (_dir, path) = write_file(b"hello world");
        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.size().unwrap(), 11);
    }

    #[test]
    fn file_open_missing_fails() {
        let dir = tempdir().unwrap();
        let result = FileSource::open(&dir.path().join("missing.journal"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn file_read_partial() {
        let (_dir, path) = write_file(b"hello world");
        let source = FileSource::open(&path).unwrap();

        assert_eq!(source.read_at(0, 5).unwrap(), b"hello");
        assert_eq!(source.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn file_read_past_end_fails() {
        let (_dir, path) = write_file(b"hello");
        let source = FileSource::open(&path).unwrap();

        let result = source.read_at(3, 10);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));

        let result = source.read_at(10, 1);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn file_empty_read() {
        let (_dir, path) = write_file(b"hello");
        let source = FileSource::open(&path).unwrap();
        assert!(source.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn file_path() {
        let (_dir, path) = write_file(b"x");
        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.path(), path);
    }

    #[test]
    fn file_concurrent_reads() {
        let contents: Vec<u8> = (0..=255u8).collect();
        let (_dir, path) = write_file(&contents);
        let source = FileSource::open(&path).unwrap();

        std::thread::scope(|scope| {
            for start in [0u64, 64, 128, 192] {
                let source = &source;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let bytes = source.read_at(start, 8).unwrap();
                        assert_eq!(bytes[0] as u64, start);
                    }
                });
            }
        });
    }
}
