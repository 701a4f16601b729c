//! Linear walk over every physical object in the arena.

use crate::config::UnknownObjectPolicy;
use crate::error::{CoreResult, FormatError};
use crate::journal::Journal;
use crate::object::{DecodedObject, ObjectType, OBJECT_HEADER_SIZE};
use jfile_storage::ByteSource;
use tracing::{debug, warn};

/// A streaming iterator over the objects of a journal, in file order.
///
/// The walk starts at `header_size` and steps by each object's footprint.
/// It ends at the arena end (clipped to the source length), or after the
/// object at `tail_object_offset` when the header records one. Objects are
/// decoded one at a time; nothing is cached.
///
/// After the first error the iterator is fused.
pub struct ObjectScanner<'j, S: ByteSource> {
    journal: &'j Journal<S>,
    offset: u64,
    end: u64,
    skipped: u64,
    finished: bool,
}

impl<'j, S: ByteSource> ObjectScanner<'j, S> {
    pub(crate) fn new(journal: &'j Journal<S>) -> Self {
        let header = journal.header();
        let finished = header.n_objects == 0 && header.tail_object_offset == 0;
        Self {
            journal,
            offset: header.arena_start(),
            end: journal.readable_end(),
            skipped: 0,
            finished,
        }
    }

    /// Offset of the next object to be decoded.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Objects stepped over because of an unknown type.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn past_tail(&self) -> bool {
        let tail = self.journal.header().tail_object_offset;
        tail != 0 && self.offset > tail
    }

    fn read_next(&mut self) -> CoreResult<Option<DecodedObject>> {
        loop {
            if self.offset >= self.end || self.past_tail() {
                return Ok(None);
            }
            if self.end - self.offset < OBJECT_HEADER_SIZE {
                return Err(FormatError::Truncated {
                    offset: self.offset,
                    wanted: OBJECT_HEADER_SIZE,
                }
                .into());
            }

            match self.journal.load_object(self.offset) {
                Ok(object) => {
                    self.offset = object.next_offset();
                    return Ok(Some(object));
                }
                Err(e) => {
                    let unknown = match e.as_format() {
                        Some(FormatError::UnknownObjectType { tag, .. }) => Some(*tag),
                        _ => None,
                    };
                    match unknown {
                        Some(tag)
                            if self.journal.config().unknown_objects
                                == UnknownObjectPolicy::Skip =>
                        {
                            self.skip_unknown(tag)?;
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    /// Steps over an object of unknown type using its declared size.
    fn skip_unknown(&mut self, tag: u8) -> CoreResult<()> {
        let header = self.journal.read_object_header(self.offset)?;
        if header.size < OBJECT_HEADER_SIZE {
            return Err(FormatError::ObjectTooSmall {
                offset: self.offset,
                object_type: tag,
                size: header.size,
            }
            .into());
        }
        let footprint = self.journal.checked_footprint(self.offset, &header)?;

        warn!(
            offset = self.offset,
            tag,
            size = header.size,
            "skipping object of unknown type"
        );
        self.skipped += 1;
        self.offset += footprint;
        Ok(())
    }
}

impl<S: ByteSource> Iterator for ObjectScanner<'_, S> {
    type Item = CoreResult<DecodedObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(object)) => Some(Ok(object)),
            Ok(None) => {
                self.finished = true;
                debug!(end = self.offset, skipped = self.skipped, "object scan complete");
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Object counts gathered by a full scan, next to the header's own counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalStats {
    /// Objects found, indexed by type tag.
    pub by_type: [u64; 8],
    /// Objects stepped over because of an unknown type.
    pub skipped_unknown: u64,
    /// Bytes covered by the scanned objects, padding included.
    pub bytes_used: u64,
    /// Offset at which the scan stopped.
    pub scan_end: u64,
    /// `n_objects` from the header.
    pub header_objects: u64,
    /// `n_entries` from the header.
    pub header_entries: u64,
}

impl JournalStats {
    /// Number of objects of `object_type`.
    #[must_use]
    pub fn count(&self, object_type: ObjectType) -> u64 {
        self.by_type[object_type.as_byte() as usize]
    }

    /// Total objects decoded by the scan.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_type.iter().sum()
    }

    /// Checks the scan against the header counters.
    #[must_use]
    pub fn matches_header(&self) -> bool {
        self.total() + self.skipped_unknown == self.header_objects
            && self.count(ObjectType::Entry) == self.header_entries
    }
}

impl<S: ByteSource> Journal<S> {
    /// Returns a lazy iterator over every physical object.
    #[must_use]
    pub fn objects(&self) -> ObjectScanner<'_, S> {
        ObjectScanner::new(self)
    }

    /// Counts objects per type with one linear scan.
    ///
    /// # Errors
    ///
    /// Any error from the scan.
    pub fn stats(&self) -> CoreResult<JournalStats> {
        let mut stats = JournalStats {
            header_objects: self.header().n_objects,
            header_entries: self.header().n_entries,
            ..JournalStats::default()
        };

        let mut scanner = self.objects();
        for object in &mut scanner {
            let object = object?;
            stats.by_type[object.object.object_type().as_byte() as usize] += 1;
            stats.bytes_used += object.footprint();
        }
        stats.skipped_unknown = scanner.skipped();
        stats.scan_end = scanner.offset();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::error::CoreError;
    use crate::header::tests::sample_header;
    use crate::header::IncompatibleFlags;
    use crate::object::{Object, ObjectFlags, TagObject, TAG_LENGTH};
    use jfile_storage::InMemorySource;

    fn unused() -> Vec<u8> {
        Object::Unused {
            payload: vec![0; 48],
        }
        .encode(ObjectFlags::NONE)
    }

    fn tag(seqnum: u64) -> Vec<u8> {
        Object::Tag(TagObject {
            seqnum,
            epoch: 0,
            tag: [7; TAG_LENGTH],
        })
        .encode(ObjectFlags::NONE)
    }

    /// Lays out `objects` after a 240-byte header; the tail points at the
    /// last object.
    fn file_with(objects: &[Vec<u8>], trailing_zeros: usize) -> Vec<u8> {
        let mut header = sample_header(240);
        header.incompatible_flags = IncompatibleFlags::from_bits(0);
        header.n_objects = objects.len() as u64;
        header.n_entries = 0;
        let body: usize = objects.iter().map(Vec::len).sum();
        header.arena_size = (body + trailing_zeros) as u64;
        header.tail_object_offset = 240 + (body - objects.last().map_or(0, Vec::len)) as u64;

        let mut file = header.encode();
        for object in objects {
            file.extend_from_slice(object);
        }
        file.resize(file.len() + trailing_zeros, 0);
        file
    }

    fn open(file: Vec<u8>, config: ReaderConfig) -> Journal<InMemorySource> {
        Journal::open(InMemorySource::new(file), config).unwrap()
    }

    #[test]
    fn scans_in_file_order_and_stops_at_tail() {
        let file = file_with(&[unused(), tag(1), unused()], 256);
        let journal = open(file, ReaderConfig::default());

        let offsets: Vec<u64> = journal
            .objects()
            .map(|o| o.unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![240, 304, 368]);

        let stats = journal.stats().unwrap();
        assert_eq!(stats.count(ObjectType::Unused), 2);
        assert_eq!(stats.count(ObjectType::Tag), 1);
        assert_eq!(stats.bytes_used, 64 * 3);
        assert_eq!(stats.scan_end, 432);
        assert!(stats.matches_header());
    }

    #[test]
    fn unknown_type_aborts_by_default() {
        let mut odd = unused();
        odd[0] = 99;
        let file = file_with(&[unused(), odd, tag(1)], 0);
        let journal = open(file, ReaderConfig::default());

        let results: Vec<_> = journal.objects().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].as_ref().unwrap_err().as_format(),
            Some(FormatError::UnknownObjectType { offset: 304, tag: 99 })
        ));
    }

    #[test]
    fn unknown_type_skipped_by_size() {
        let mut odd = unused();
        odd[0] = 99;
        let file = file_with(&[unused(), odd, tag(1)], 0);
        let journal = open(
            file,
            ReaderConfig::new().unknown_objects(UnknownObjectPolicy::Skip),
        );

        let mut scanner = journal.objects();
        let offsets: Vec<u64> = (&mut scanner).map(|o| o.unwrap().offset).collect();
        assert_eq!(offsets, vec![240, 368]);
        assert_eq!(scanner.skipped(), 1);

        let stats = journal.stats().unwrap();
        assert_eq!(stats.skipped_unknown, 1);
        assert!(stats.matches_header());
    }

    #[test]
    fn truncated_file_reports_offset() {
        let mut file = file_with(&[unused(), tag(1)], 0);
        file.truncate(file.len() - 20);
        let journal = open(file, ReaderConfig::default());

        let results: Vec<_> = journal.objects().collect();
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].as_ref().unwrap_err(),
            CoreError::Format(FormatError::Truncated { offset: 304, .. })
        ));
    }

    #[test]
    fn empty_arena_yields_nothing() {
        let mut header = sample_header(224);
        header.incompatible_flags = IncompatibleFlags::from_bits(0);
        header.arena_size = 0;
        header.n_objects = 0;
        header.tail_object_offset = 0;
        let journal = open(header.encode(), ReaderConfig::default());
        assert_eq!(journal.objects().count(), 0);
    }
}
