//! The journal reader facade.
//!
//! A [`Journal`] owns a byte source and the validated header. Every other
//! component reaches the file through it: objects are loaded by offset with
//! [`Journal::object_at`], which validates the offset before reading and
//! validates the object before handing it out.

use crate::assembler::{NoTransform, PayloadTransform};
use crate::cache::ObjectCache;
use crate::cancel::CancellationToken;
use crate::codec::ALIGNMENT;
use crate::config::ReaderConfig;
use crate::error::{CoreError, CoreResult, FormatError, IntegrityError};
use crate::header::JournalHeader;
use crate::object::{
    decode_object, Compression, DataObject, DecodedObject, EntryArrayObject, EntryObject,
    FieldObject, Object, ObjectHeader, ObjectType, OBJECT_HEADER_SIZE,
};
use jfile_storage::{ByteSource, SourceReader};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A DATA object together with where it lives and how it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRef {
    /// Offset of the DATA object.
    pub offset: u64,
    /// Compression of the payload, from the object flags.
    pub compression: Option<Compression>,
    /// The decoded object.
    pub data: DataObject,
}

/// A read-only journal file.
///
/// `Journal<S>` is `Sync`, so independent entries may be resolved from
/// several threads sharing one reader.
pub struct Journal<S: ByteSource> {
    source: S,
    source_size: u64,
    header: JournalHeader,
    config: ReaderConfig,
    cache: ObjectCache,
    cancel: CancellationToken,
    transform: Box<dyn PayloadTransform>,
}

impl<S: ByteSource> fmt::Debug for Journal<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("source_size", &self.source_size)
            .field("header", &self.header)
            .field("config", &self.config)
            .field("cached_objects", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<S: ByteSource> Journal<S> {
    /// Opens a journal: decodes and validates the header.
    ///
    /// # Errors
    ///
    /// - [`FormatError::BadSignature`] if the file is not a journal
    /// - [`FormatError::Truncated`] if the header is cut short
    /// - any error from [`JournalHeader::validate`]
    pub fn open(source: S, config: ReaderConfig) -> CoreResult<Self> {
        let source_size = source.size().map_err(|e| CoreError::storage(0, e))?;
        let mut reader = SourceReader::new(&source, 0).map_err(|e| CoreError::storage(0, e))?;
        let header = JournalHeader::read_from(&mut reader)?;
        header.validate()?;

        debug!(
            header_size = header.header_size,
            arena_size = header.arena_size,
            n_objects = header.n_objects,
            n_entries = header.n_entries,
            state = %header.state,
            sealed = header.is_sealed(),
            source_size,
            "opened journal"
        );
        if header.arena_end() > source_size {
            debug!(
                arena_end = header.arena_end(),
                source_size, "arena extends past end of file"
            );
        }

        Ok(Self {
            source,
            source_size,
            header,
            config,
            cache: ObjectCache::new(),
            cancel: CancellationToken::new(),
            transform: Box::new(NoTransform),
        })
    }

    /// Opens a journal with the default configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Journal::open`].
    pub fn open_default(source: S) -> CoreResult<Self> {
        Self::open(source, ReaderConfig::default())
    }

    /// Installs a cancellation token checked between object reads.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Installs the collaborator that turns compressed payloads into raw bytes.
    #[must_use]
    pub fn with_transform(mut self, transform: impl PayloadTransform + 'static) -> Self {
        self.transform = Box::new(transform);
        self
    }

    /// Returns the decoded header.
    #[must_use]
    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    /// Returns the reader configuration.
    #[must_use]
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Returns the underlying byte source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Size of the byte source.
    #[must_use]
    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the object cache.
    #[must_use]
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub(crate) fn transform(&self) -> &dyn PayloadTransform {
        self.transform.as_ref()
    }

    /// End of the region objects can be read from: the arena end, clipped to
    /// the source length.
    #[must_use]
    pub fn readable_end(&self) -> u64 {
        self.header.arena_end().min(self.source_size)
    }

    /// Checks that a link target may hold an object.
    pub(crate) fn check_link(&self, offset: u64) -> Result<(), FormatError> {
        if !self.header.contains_offset(offset) {
            return Err(FormatError::OffsetOutOfBounds {
                offset,
                arena_start: self.header.arena_start(),
                arena_end: self.header.arena_end(),
            });
        }
        if offset % ALIGNMENT != 0 {
            return Err(FormatError::MisalignedOffset { offset });
        }
        Ok(())
    }

    /// Reads `len` raw bytes at `offset`.
    pub(crate) fn read_bytes(&self, offset: u64, len: usize) -> CoreResult<Vec<u8>> {
        self.source
            .read_at(offset, len)
            .map_err(|e| CoreError::storage(offset, e))
    }

    /// Reads the common header of the object at `offset`.
    pub(crate) fn read_object_header(&self, offset: u64) -> CoreResult<ObjectHeader> {
        let bytes = self.read_bytes(offset, OBJECT_HEADER_SIZE as usize)?;
        let mut head = [0u8; 16];
        head.copy_from_slice(&bytes);
        Ok(ObjectHeader::decode(&head))
    }

    /// Footprint of an object whose header was read at `offset`, checked
    /// against the arena end.
    pub(crate) fn checked_footprint(
        &self,
        offset: u64,
        header: &ObjectHeader,
    ) -> Result<u64, FormatError> {
        let arena_end = self.header.arena_end();
        let overrun = FormatError::ObjectOverrun {
            offset,
            size: header.size,
            arena_end,
        };
        let footprint = header.footprint().ok_or(overrun.clone())?;
        match offset.checked_add(footprint) {
            Some(end) if end <= arena_end => Ok(footprint),
            _ => Err(overrun),
        }
    }

    /// Decodes the object at `offset` without consulting the cache.
    pub(crate) fn load_object(&self, offset: u64) -> CoreResult<DecodedObject> {
        self.cancel.check()?;

        let header = self.read_object_header(offset)?;
        header.check(offset)?;
        let footprint = self.checked_footprint(offset, &header)?;

        let len = usize::try_from(footprint).map_err(|_| FormatError::ObjectOverrun {
            offset,
            size: header.size,
            arena_end: self.header.arena_end(),
        })?;
        let bytes = self.read_bytes(offset, len)?;
        Ok(decode_object(offset, &bytes)?)
    }

    /// Returns the object at `offset`.
    ///
    /// The offset must lie inside the arena and be 8-byte aligned, and the
    /// whole object must fit inside the arena.
    ///
    /// # Errors
    ///
    /// - [`FormatError::OffsetOutOfBounds`] / [`FormatError::MisalignedOffset`]
    ///   for a bad offset
    /// - [`FormatError::ObjectOverrun`] if the object leaves the arena
    /// - any decode error from [`decode_object`]
    /// - [`CoreError::Cancelled`] if cancellation was requested
    pub fn object_at(&self, offset: u64) -> CoreResult<Arc<DecodedObject>> {
        // Cache hits must observe cancellation too.
        self.cancel.check()?;
        self.check_link(offset)?;

        if self.config.cache_objects {
            if let Some(object) = self.cache.get(offset) {
                return Ok(object);
            }
            let object = self.load_object(offset)?;
            return Ok(self.cache.insert(object));
        }

        Ok(Arc::new(self.load_object(offset)?))
    }

    fn typed<T>(
        &self,
        offset: u64,
        expected: ObjectType,
        pick: impl FnOnce(DecodedObject) -> Result<T, ObjectType>,
    ) -> CoreResult<T> {
        let decoded = Arc::unwrap_or_clone(self.object_at(offset)?);
        pick(decoded).map_err(|found| {
            FormatError::UnexpectedObjectType {
                offset,
                expected,
                found,
            }
            .into()
        })
    }

    /// Returns the DATA object at `offset`.
    ///
    /// # Errors
    ///
    /// As [`Journal::object_at`], plus [`FormatError::UnexpectedObjectType`].
    pub fn data_at(&self, offset: u64) -> CoreResult<DataRef> {
        self.typed(offset, ObjectType::Data, |decoded| match decoded.object {
            Object::Data(data) => Ok(DataRef {
                offset,
                compression: decoded.header.flags.compression(),
                data,
            }),
            other => Err(other.object_type()),
        })
    }

    /// Returns the FIELD object at `offset`.
    ///
    /// # Errors
    ///
    /// As [`Journal::data_at`].
    pub fn field_at(&self, offset: u64) -> CoreResult<FieldObject> {
        self.typed(offset, ObjectType::Field, |decoded| match decoded.object {
            Object::Field(field) => Ok(field),
            other => Err(other.object_type()),
        })
    }

    /// Returns the ENTRY object at `offset`.
    ///
    /// # Errors
    ///
    /// As [`Journal::data_at`].
    pub fn entry_at(&self, offset: u64) -> CoreResult<EntryObject> {
        self.typed(offset, ObjectType::Entry, |decoded| match decoded.object {
            Object::Entry(entry) => Ok(entry),
            other => Err(other.object_type()),
        })
    }

    /// Returns the ENTRY_ARRAY object at `offset`.
    ///
    /// # Errors
    ///
    /// As [`Journal::data_at`].
    pub fn entry_array_at(&self, offset: u64) -> CoreResult<EntryArrayObject> {
        self.typed(offset, ObjectType::EntryArray, |decoded| match decoded.object {
            Object::EntryArray(array) => Ok(array),
            other => Err(other.object_type()),
        })
    }

    /// Records an integrity issue according to the configured policy.
    pub(crate) fn report(
        &self,
        issue: IntegrityError,
        issues: &mut Vec<IntegrityError>,
    ) -> CoreResult<()> {
        issue.report(self.config.integrity, issues)
    }

    /// Decodes every object into the cache with one linear scan.
    ///
    /// Returns the number of objects cached. Later [`Journal::object_at`]
    /// calls are served from memory.
    ///
    /// # Errors
    ///
    /// Any error from the scan; objects decoded before it stay cached.
    pub fn preload(&self) -> CoreResult<usize> {
        let mut scanner = self.objects();
        for object in &mut scanner {
            self.cache.insert(object?);
        }
        debug!(
            cached = self.cache.len(),
            skipped = scanner.skipped(),
            "preloaded objects"
        );
        Ok(self.cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::tests::sample_header;
    use crate::object::{EntryArrayObject, ObjectFlags};
    use jfile_storage::InMemorySource;

    /// A header of 240 bytes followed by one ENTRY_ARRAY at 240 and one
    /// UNUSED at 296.
    fn small_file() -> Vec<u8> {
        let array = Object::EntryArray(EntryArrayObject {
            next_entry_array_offset: 0,
            items: vec![0; 4],
        })
        .encode(ObjectFlags::NONE);
        let unused = Object::Unused {
            payload: vec![0; 48],
        }
        .encode(ObjectFlags::NONE);

        let mut header = sample_header(240);
        header.arena_size = (array.len() + unused.len()) as u64;
        header.incompatible_flags = crate::header::IncompatibleFlags::from_bits(0);

        let mut file = header.encode();
        file.extend(array);
        file.extend(unused);
        file
    }

    #[test]
    fn open_reads_header() {
        let journal = Journal::open_default(InMemorySource::new(small_file())).unwrap();
        assert_eq!(journal.header().header_size, 240);
        assert_eq!(journal.header().arena_end(), 240 + 56 + 64);
        assert_eq!(journal.readable_end(), 360);
    }

    #[test]
    fn open_rejects_bad_signature() {
        let mut file = small_file();
        file[..8].copy_from_slice(b"XXXXXXXX");
        let err = Journal::open_default(InMemorySource::new(file)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Format(FormatError::BadSignature { .. })
        ));
    }

    #[test]
    fn open_rejects_unknown_incompatible_flags() {
        let mut file = small_file();
        file[12..16].copy_from_slice(&0x80u32.to_le_bytes());
        let err = Journal::open_default(InMemorySource::new(file)).unwrap_err();
        assert_eq!(
            err.as_format(),
            Some(&FormatError::UnsupportedFeatures { flags: 0x80 })
        );
    }

    #[test]
    fn object_at_validates_offsets() {
        let journal = Journal::open_default(InMemorySource::new(small_file())).unwrap();

        assert!(matches!(
            journal.object_at(16).unwrap_err().as_format(),
            Some(FormatError::OffsetOutOfBounds { offset: 16, .. })
        ));
        assert!(matches!(
            journal.object_at(244).unwrap_err().as_format(),
            Some(FormatError::MisalignedOffset { offset: 244 })
        ));
        assert!(matches!(
            journal.object_at(4096).unwrap_err().as_format(),
            Some(FormatError::OffsetOutOfBounds { .. })
        ));

        let array = journal.entry_array_at(240).unwrap();
        assert_eq!(array.items, vec![0; 4]);
    }

    #[test]
    fn object_at_detects_overrun() {
        let mut file = small_file();
        // Grow the UNUSED object past the arena end.
        file[296 + 8..296 + 16].copy_from_slice(&128u64.to_le_bytes());
        let journal = Journal::open_default(InMemorySource::new(file)).unwrap();
        assert_eq!(
            journal.object_at(296).unwrap_err().as_format(),
            Some(&FormatError::ObjectOverrun {
                offset: 296,
                size: 128,
                arena_end: 360,
            })
        );
    }

    #[test]
    fn typed_access_checks_type() {
        let journal = Journal::open_default(InMemorySource::new(small_file())).unwrap();
        assert_eq!(
            journal.entry_at(240).unwrap_err().as_format(),
            Some(&FormatError::UnexpectedObjectType {
                offset: 240,
                expected: ObjectType::Entry,
                found: ObjectType::EntryArray,
            })
        );
    }

    #[test]
    fn cache_serves_repeat_reads() {
        let journal = Journal::open_default(InMemorySource::new(small_file())).unwrap();
        let first = journal.object_at(240).unwrap();
        let second = journal.object_at(240).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let uncached = Journal::open(
            InMemorySource::new(small_file()),
            ReaderConfig::new().cache_objects(false),
        )
        .unwrap();
        uncached.object_at(240).unwrap();
        assert!(uncached.cache().is_empty());
    }

    #[test]
    fn preload_fills_cache() {
        let journal = Journal::open_default(InMemorySource::new(small_file())).unwrap();
        assert_eq!(journal.preload().unwrap(), 2);
        assert!(journal.cache().get(296).is_some());
    }

    #[test]
    fn cancellation_stops_reads() {
        let token = CancellationToken::new();
        let journal = Journal::open_default(InMemorySource::new(small_file()))
            .unwrap()
            .with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(journal.object_at(240), Err(CoreError::Cancelled)));
    }

    #[test]
    fn report_respects_policy() {
        let issue = IntegrityError::MalformedField { data_offset: 240 };

        let lenient = Journal::open_default(InMemorySource::new(small_file())).unwrap();
        let mut issues = Vec::new();
        lenient.report(issue.clone(), &mut issues).unwrap();
        assert_eq!(issues, vec![issue.clone()]);

        let strict = Journal::open(InMemorySource::new(small_file()), ReaderConfig::new().strict())
            .unwrap();
        let mut issues = Vec::new();
        let err = strict.report(issue.clone(), &mut issues).unwrap_err();
        assert_eq!(err.as_integrity(), Some(&issue));
        assert!(issues.is_empty());
    }

    #[test]
    fn journal_is_sync() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<Journal<InMemorySource>>();
    }
}
