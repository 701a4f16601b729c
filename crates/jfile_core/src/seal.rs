//! Forward-secure seal verification.
//!
//! A sealed journal interleaves TAG objects with ordinary objects. Each TAG
//! authenticates every byte from the end of the previous TAG (or the start
//! of the file) up to the TAG itself. The cryptography is delegated to a
//! [`TagVerifier`], which reads the sealed range as a stream so that a
//! range is never buffered whole by the journal.

use crate::error::{CoreError, CoreResult, IntegrityError};
use crate::journal::Journal;
use crate::object::{Object, TAG_LENGTH};
use jfile_storage::{ByteSource, SourceReader};
use std::io::{self, Read};
use tracing::debug;

/// Checks one TAG against the bytes it seals.
pub trait TagVerifier: Send + Sync {
    /// Returns `true` if `tag` authenticates the bytes of `sealed` under
    /// `key` at `epoch`.
    ///
    /// `sealed` yields exactly the sealed range, read from the source on
    /// demand.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading `sealed`.
    fn verify(
        &self,
        key: &[u8],
        epoch: u64,
        sealed: &mut dyn Read,
        tag: &[u8; TAG_LENGTH],
    ) -> io::Result<bool>;
}

/// Closures over a contiguous slice. The sealed range is collected into
/// memory before the call, so its size bounds the memory used.
impl<F> TagVerifier for F
where
    F: Fn(&[u8], u64, &[u8], &[u8; TAG_LENGTH]) -> bool + Send + Sync,
{
    fn verify(
        &self,
        key: &[u8],
        epoch: u64,
        sealed: &mut dyn Read,
        tag: &[u8; TAG_LENGTH],
    ) -> io::Result<bool> {
        let mut bytes = Vec::new();
        sealed.read_to_end(&mut bytes)?;
        Ok(self(key, epoch, &bytes, tag))
    }
}

/// Outcome of [`Journal::verify_seals`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealReport {
    /// TAG objects found.
    pub tags: u64,
    /// TAG objects that verified.
    pub verified: u64,
    /// One issue per failed TAG (report mode).
    pub issues: Vec<IntegrityError>,
}

impl SealReport {
    /// Checks if every TAG verified.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl<S: ByteSource> Journal<S> {
    /// Verifies every TAG object of a sealed journal.
    ///
    /// Unsealed journals yield an empty report without scanning.
    ///
    /// # Errors
    ///
    /// - any error from the object scan
    /// - a read error raised while the verifier streams a sealed range
    /// - [`CoreError::Integrity`] for the first
    ///   failed TAG in strict mode
    pub fn verify_seals(&self, verifier: &dyn TagVerifier, key: &[u8]) -> CoreResult<SealReport> {
        let mut report = SealReport::default();
        if !self.header().is_sealed() {
            debug!("journal is not sealed");
            return Ok(report);
        }

        let mut range_start = 0u64;
        for object in self.objects() {
            let object = object?;
            let Object::Tag(tag) = &object.object else {
                continue;
            };

            report.tags += 1;
            let len = object.offset - range_start;
            let mut sealed = SourceReader::new(self.source(), range_start)
                .map_err(|e| CoreError::storage(range_start, e))?
                .take(len);
            let verified = verifier
                .verify(key, tag.epoch, &mut sealed, &tag.tag)
                .map_err(|e| CoreError::io(range_start, len, e))?;
            if verified {
                report.verified += 1;
            } else {
                IntegrityError::TagVerificationFailed {
                    offset: object.offset,
                    seqnum: tag.seqnum,
                    epoch: tag.epoch,
                }
                .report(self.config().integrity, &mut report.issues)?;
            }
            range_start = object.next_offset();
        }

        debug!(
            tags = report.tags,
            verified = report.verified,
            "seal verification complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::header::tests::sample_header;
    use crate::header::{CompatibleFlags, IncompatibleFlags};
    use crate::object::{ObjectFlags, TagObject};
    use jfile_storage::InMemorySource;

    /// Test "MAC": the sealed length and the first key byte.
    fn toy_tag(key: &[u8], sealed_len: usize) -> [u8; TAG_LENGTH] {
        let mut tag = [0u8; TAG_LENGTH];
        tag[..8].copy_from_slice(&(sealed_len as u64).to_le_bytes());
        tag[8] = key[0];
        tag
    }

    fn toy_verifier(key: &[u8], _epoch: u64, sealed: &[u8], tag: &[u8; TAG_LENGTH]) -> bool {
        *tag == toy_tag(key, sealed.len())
    }

    /// Reads the range in small chunks and never holds more than one.
    struct ChunkedVerifier;

    impl TagVerifier for ChunkedVerifier {
        fn verify(
            &self,
            key: &[u8],
            _epoch: u64,
            sealed: &mut dyn Read,
            tag: &[u8; TAG_LENGTH],
        ) -> io::Result<bool> {
            let mut chunk = [0u8; 16];
            let mut total = 0;
            loop {
                match sealed.read(&mut chunk)? {
                    0 => break,
                    n => total += n,
                }
            }
            Ok(*tag == toy_tag(key, total))
        }
    }

    fn unused() -> Vec<u8> {
        Object::Unused {
            payload: vec![0; 48],
        }
        .encode(ObjectFlags::NONE)
    }

    fn tag_object(seqnum: u64, tag: [u8; TAG_LENGTH]) -> Vec<u8> {
        Object::Tag(TagObject {
            seqnum,
            epoch: 0,
            tag,
        })
        .encode(ObjectFlags::NONE)
    }

    /// header | UNUSED @240 | TAG @304 | UNUSED @368 | UNUSED @432 | TAG @496
    fn sealed_file(second_tag_len: usize, sealed: bool) -> Vec<u8> {
        let mut header = sample_header(240);
        header.incompatible_flags = IncompatibleFlags::from_bits(0);
        if !sealed {
            header.compatible_flags = CompatibleFlags::from_bits(0);
        }
        header.arena_size = 5 * 64;
        header.n_objects = 5;
        header.tail_object_offset = 496;

        let mut file = header.encode();
        file.extend(unused());
        file.extend(tag_object(1, toy_tag(b"k", 304)));
        file.extend(unused());
        file.extend(unused());
        file.extend(tag_object(2, toy_tag(b"k", second_tag_len)));
        file
    }

    #[test]
    fn verifies_each_sealed_range() {
        let journal = Journal::open_default(InMemorySource::new(sealed_file(128, true))).unwrap();
        let report = journal.verify_seals(&toy_verifier, b"k").unwrap();
        assert_eq!(report.tags, 2);
        assert_eq!(report.verified, 2);
        assert!(report.is_clean());
    }

    #[test]
    fn failed_tag_is_reported() {
        let journal = Journal::open_default(InMemorySource::new(sealed_file(64, true))).unwrap();
        let report = journal.verify_seals(&toy_verifier, b"k").unwrap();
        assert_eq!(report.verified, 1);
        assert_eq!(
            report.issues,
            vec![IntegrityError::TagVerificationFailed {
                offset: 496,
                seqnum: 2,
                epoch: 0
            }]
        );

        let strict = Journal::open(
            InMemorySource::new(sealed_file(64, true)),
            ReaderConfig::new().strict(),
        )
        .unwrap();
        assert!(strict.verify_seals(&toy_verifier, b"k").is_err());
    }

    #[test]
    fn wrong_key_fails_every_tag() {
        let journal = Journal::open_default(InMemorySource::new(sealed_file(128, true))).unwrap();
        let report = journal.verify_seals(&toy_verifier, b"x").unwrap();
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn unsealed_journal_has_empty_report() {
        let journal = Journal::open_default(InMemorySource::new(sealed_file(128, false))).unwrap();
        let report = journal.verify_seals(&toy_verifier, b"k").unwrap();
        assert_eq!(report, SealReport::default());
    }

    #[test]
    fn streaming_verifier_sees_every_byte() {
        let journal = Journal::open_default(InMemorySource::new(sealed_file(128, true))).unwrap();
        let report = journal.verify_seals(&ChunkedVerifier, b"k").unwrap();
        assert_eq!(report.verified, 2);

        let journal = Journal::open_default(InMemorySource::new(sealed_file(64, true))).unwrap();
        let report = journal.verify_seals(&ChunkedVerifier, b"k").unwrap();
        assert_eq!(report.verified, 1);
    }

    #[test]
    fn boxed_verifier_is_shared_across_threads() {
        let verifier: Box<dyn TagVerifier> = Box::new(ChunkedVerifier);
        let journal = Journal::open_default(InMemorySource::new(sealed_file(128, true))).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| journal.verify_seals(verifier.as_ref(), b"k").unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().verified, 2);
            }
        });
    }
}
