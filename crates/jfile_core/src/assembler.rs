//! Turning resolved entries into `FIELD=value` records.

use crate::config::IntegrityPolicy;
use crate::error::{CoreError, CoreResult, IntegrityError};
use crate::journal::{DataRef, Journal};
use crate::navigator::{EntryOffsets, ResolvedEntry};
use crate::object::Compression;
use jfile_storage::ByteSource;
use std::borrow::Cow;
use std::error::Error as StdError;
use uuid::Uuid;

/// Error type returned by a [`PayloadTransform`].
pub type TransformError = Box<dyn StdError + Send + Sync>;

/// Turns a compressed DATA payload into raw bytes.
///
/// The reader never decompresses on its own; callers that want compressed
/// journals install a transform with [`Journal::with_transform`].
pub trait PayloadTransform: Send + Sync {
    /// Returns the raw payload for `payload` compressed with `compression`.
    ///
    /// # Errors
    ///
    /// Any failure to produce the raw bytes.
    fn transform(&self, compression: Compression, payload: &[u8])
        -> Result<Vec<u8>, TransformError>;
}

impl<F> PayloadTransform for F
where
    F: Fn(Compression, &[u8]) -> Result<Vec<u8>, TransformError> + Send + Sync,
{
    fn transform(
        &self,
        compression: Compression,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransformError> {
        self(compression, payload)
    }
}

/// The default transform: refuses every compressed payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransform;

impl PayloadTransform for NoTransform {
    fn transform(
        &self,
        compression: Compression,
        _payload: &[u8],
    ) -> Result<Vec<u8>, TransformError> {
        Err(format!("no transform installed for {compression} payloads").into())
    }
}

/// One `FIELD=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogField {
    /// Field name, the bytes before the first `=`.
    pub name: String,
    /// Field value, the bytes after the first `=`. May be binary.
    pub value: Vec<u8>,
}

impl LogField {
    /// Returns the value as text, replacing invalid UTF-8.
    #[must_use]
    pub fn value_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// A decoded log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Offset of the ENTRY object.
    pub offset: u64,
    /// Sequence number.
    pub seqnum: u64,
    /// Wallclock timestamp, microseconds.
    pub realtime: u64,
    /// Monotonic timestamp, microseconds.
    pub monotonic: u64,
    /// Boot the monotonic timestamp belongs to.
    pub boot_id: Uuid,
    /// Fields in item order.
    pub fields: Vec<LogField>,
    /// Integrity issues found while resolving and assembling.
    pub issues: Vec<IntegrityError>,
}

impl LogRecord {
    /// Returns the first field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&LogField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the `MESSAGE` field as text.
    #[must_use]
    pub fn message(&self) -> Option<Cow<'_, str>> {
        self.field("MESSAGE").map(LogField::value_lossy)
    }

    /// Checks if any integrity issue was reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Builds [`LogRecord`]s from [`ResolvedEntry`] values.
pub struct EntryAssembler<'a> {
    transform: &'a dyn PayloadTransform,
    policy: IntegrityPolicy,
    verify_xor: bool,
}

impl<'a> EntryAssembler<'a> {
    /// Creates an assembler in report mode with XOR verification on.
    #[must_use]
    pub fn new(transform: &'a dyn PayloadTransform) -> Self {
        Self {
            transform,
            policy: IntegrityPolicy::Report,
            verify_xor: true,
        }
    }

    /// Sets the integrity policy.
    #[must_use]
    pub fn policy(mut self, policy: IntegrityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets whether the entry XOR hash is checked.
    #[must_use]
    pub fn verify_xor(mut self, value: bool) -> Self {
        self.verify_xor = value;
        self
    }

    /// Assembles one entry.
    ///
    /// Issues already attached to `resolved` are carried over. Fields whose
    /// payload cannot be made raw, or is not `NAME=value`, are excluded and
    /// reported. An XOR mismatch is reported but the fields are kept.
    ///
    /// # Errors
    ///
    /// [`CoreError::Integrity`] for the first issue in strict mode.
    pub fn assemble(&self, resolved: ResolvedEntry) -> CoreResult<LogRecord> {
        let computed = resolved.computed_xor();
        let ResolvedEntry {
            offset,
            entry,
            data,
            mut issues,
        } = resolved;

        if self.verify_xor && computed != entry.xor_hash {
            IntegrityError::EntryXorMismatch {
                entry_offset: offset,
                stored: entry.xor_hash,
                computed,
            }
            .report(self.policy, &mut issues)?;
        }

        let mut fields = Vec::with_capacity(data.len());
        for data in &data {
            match self.field_of(data) {
                Ok(field) => fields.push(field),
                Err(issue) => issue.report(self.policy, &mut issues)?,
            }
        }

        Ok(LogRecord {
            offset,
            seqnum: entry.seqnum,
            realtime: entry.realtime,
            monotonic: entry.monotonic,
            boot_id: entry.boot_id,
            fields,
            issues,
        })
    }

    fn field_of(&self, data: &DataRef) -> Result<LogField, IntegrityError> {
        let payload: Cow<'_, [u8]> = match data.compression {
            None => Cow::Borrowed(data.data.payload.as_slice()),
            Some(compression) => Cow::Owned(
                self.transform
                    .transform(compression, &data.data.payload)
                    .map_err(|e| IntegrityError::PayloadTransform {
                        data_offset: data.offset,
                        reason: e.to_string(),
                    })?,
            ),
        };

        split_field(&payload).ok_or(IntegrityError::MalformedField {
            data_offset: data.offset,
        })
    }
}

/// Splits `NAME=value` at the first `=`. The name must be non-empty UTF-8.
fn split_field(payload: &[u8]) -> Option<LogField> {
    let eq = payload.iter().position(|&b| b == b'=')?;
    if eq == 0 {
        return None;
    }
    let name = std::str::from_utf8(&payload[..eq]).ok()?;
    Some(LogField {
        name: name.to_owned(),
        value: payload[eq + 1..].to_vec(),
    })
}

/// Streams [`LogRecord`]s in entry-array order.
///
/// An entry that fails to decode is yielded as an error and the walk moves
/// on; a broken entry-array chain or a cancellation ends it.
pub struct Records<'j, S: ByteSource> {
    journal: &'j Journal<S>,
    offsets: EntryOffsets<'j, S>,
    finished: bool,
}

impl<S: ByteSource> Iterator for Records<'_, S> {
    type Item = CoreResult<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let record = match self.offsets.next()? {
            Ok(offset) => self.journal.read_entry(offset),
            Err(e) => Err(e),
        };
        if matches!(record, Err(CoreError::Cancelled)) {
            self.finished = true;
        }
        Some(record)
    }
}

impl<S: ByteSource> Journal<S> {
    /// Returns an assembler configured from this journal.
    #[must_use]
    pub fn assembler(&self) -> EntryAssembler<'_> {
        EntryAssembler::new(self.transform())
            .policy(self.config().integrity)
            .verify_xor(self.config().verify_xor)
    }

    /// Resolves and assembles the entry at `offset`.
    ///
    /// # Errors
    ///
    /// Any error from [`Journal::resolve_entry`] or
    /// [`EntryAssembler::assemble`].
    pub fn read_entry(&self, offset: u64) -> CoreResult<LogRecord> {
        let resolved = self.resolve_entry(offset)?;
        self.assembler().assemble(resolved)
    }

    /// Returns a lazy iterator over every entry, in entry-array order.
    #[must_use]
    pub fn records(&self) -> Records<'_, S> {
        Records {
            journal: self,
            offsets: self.entries_in_order(),
            finished: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{DataObject, EntryObject};

    fn data_ref(offset: u64, hash: u64, payload: &[u8], compression: Option<Compression>) -> DataRef {
        DataRef {
            offset,
            compression,
            data: DataObject {
                hash,
                next_hash_offset: 0,
                next_field_offset: 0,
                entry_offset: 0,
                entry_array_offset: 0,
                n_entries: 1,
                payload: payload.to_vec(),
            },
        }
    }

    fn resolved(data: Vec<DataRef>, xor_hash: u64) -> ResolvedEntry {
        ResolvedEntry {
            offset: 1000,
            entry: EntryObject {
                seqnum: 4,
                realtime: 5,
                monotonic: 6,
                boot_id: Uuid::from_bytes([3; 16]),
                xor_hash,
                items: vec![],
            },
            data,
            issues: vec![],
        }
    }

    #[test]
    fn splits_on_first_equals() {
        let entry = resolved(
            vec![
                data_ref(240, 1, b"MESSAGE=a=b", None),
                data_ref(320, 2, b"EMPTY=", None),
            ],
            1 ^ 2,
        );
        let record = EntryAssembler::new(&NoTransform).assemble(entry).unwrap();

        assert!(record.is_clean());
        assert_eq!(record.seqnum, 4);
        assert_eq!(record.message().as_deref(), Some("a=b"));
        assert_eq!(record.field("EMPTY").unwrap().value, b"");
        assert_eq!(record.fields.len(), 2);
    }

    #[test]
    fn malformed_payloads_are_excluded() {
        let entry = resolved(
            vec![
                data_ref(240, 1, b"NOEQUALS", None),
                data_ref(320, 2, b"=value", None),
                data_ref(400, 4, b"OK=1", None),
            ],
            1 ^ 2 ^ 4,
        );
        let record = EntryAssembler::new(&NoTransform).assemble(entry).unwrap();

        assert_eq!(record.fields.len(), 1);
        assert_eq!(
            record.issues,
            vec![
                IntegrityError::MalformedField { data_offset: 240 },
                IntegrityError::MalformedField { data_offset: 320 },
            ]
        );
    }

    #[test]
    fn xor_mismatch_keeps_fields() {
        let entry = resolved(vec![data_ref(240, 1, b"A=1", None)], 0xFF);
        let record = EntryAssembler::new(&NoTransform).assemble(entry).unwrap();

        assert_eq!(record.fields.len(), 1);
        assert_eq!(
            record.issues,
            vec![IntegrityError::EntryXorMismatch {
                entry_offset: 1000,
                stored: 0xFF,
                computed: 1,
            }]
        );

        let entry = resolved(vec![data_ref(240, 1, b"A=1", None)], 0xFF);
        let record = EntryAssembler::new(&NoTransform)
            .verify_xor(false)
            .assemble(entry)
            .unwrap();
        assert!(record.is_clean());
    }

    #[test]
    fn strict_mode_fails_on_xor_mismatch() {
        let entry = resolved(vec![data_ref(240, 1, b"A=1", None)], 0xFF);
        let err = EntryAssembler::new(&NoTransform)
            .policy(IntegrityPolicy::Strict)
            .assemble(entry)
            .unwrap_err();
        assert!(matches!(
            err.as_integrity(),
            Some(IntegrityError::EntryXorMismatch { .. })
        ));
    }

    #[test]
    fn compressed_payload_goes_through_transform() {
        let upper = |compression: Compression, payload: &[u8]| -> Result<Vec<u8>, TransformError> {
            assert_eq!(compression, Compression::Lz4);
            Ok(payload.to_ascii_uppercase())
        };
        let entry = resolved(vec![data_ref(240, 1, b"unit=x", Some(Compression::Lz4))], 1);
        let record = EntryAssembler::new(&upper).assemble(entry).unwrap();
        assert_eq!(record.field("UNIT").unwrap().value, b"X");

        let entry = resolved(vec![data_ref(240, 1, b"unit=x", Some(Compression::Xz))], 1);
        let record = EntryAssembler::new(&NoTransform).assemble(entry).unwrap();
        assert!(record.fields.is_empty());
        assert!(matches!(
            &record.issues[..],
            [IntegrityError::PayloadTransform { data_offset: 240, reason }] if reason.contains("XZ")
        ));
    }

    #[test]
    fn resolution_issues_are_carried_over() {
        let mut entry = resolved(vec![], 0);
        entry.issues.push(IntegrityError::MalformedField { data_offset: 8 });
        let record = EntryAssembler::new(&NoTransform).assemble(entry).unwrap();
        assert_eq!(record.issues.len(), 1);
    }
}
