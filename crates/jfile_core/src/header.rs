//! Journal file header.
//!
//! ## Layout
//!
//! ```text
//! |   0 | signature "LPKSHHRH"          (8)  |
//! |   8 | compatible_flags              (4)  |
//! |  12 | incompatible_flags            (4)  |
//! |  16 | state                         (1)  |
//! |  17 | reserved                      (7)  |
//! |  24 | file/machine/boot/seqnum ids  (4 x 16) |
//! |  88 | header_size ... tail_entry_monotonic (15 x 8) |
//! | 208 | n_data, n_fields              (present if header_size > 208) |
//! | 224 | n_tags, n_entry_arrays        (present if header_size > 224) |
//! ```
//!
//! Fields past the fixed prefix are gated on the declared `header_size`; a
//! field that is not declared is reported as zero and never read.

use crate::codec::{put_id128, put_u32, put_u64};
use crate::error::{CoreError, CoreResult, FormatError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;
use uuid::Uuid;

/// Magic bytes at offset 0 of every journal file.
pub const HEADER_SIGNATURE: [u8; 8] = *b"LPKSHHRH";

/// Size of the unconditionally present header prefix.
pub const HEADER_PREFIX_SIZE: u64 = 208;

/// Largest header this reader knows every field of.
pub const HEADER_KNOWN_SIZE: u64 = 240;

/// Compatible feature flags. Unknown bits are tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompatibleFlags(u32);

impl CompatibleFlags {
    /// The file carries TAG objects.
    pub const SEALED: Self = Self(1 << 0);

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Checks if the sealed flag is set.
    #[must_use]
    pub const fn is_sealed(self) -> bool {
        self.0 & Self::SEALED.0 != 0
    }
}

/// Incompatible feature flags. A reader must refuse bits it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IncompatibleFlags(u32);

impl IncompatibleFlags {
    /// DATA payloads may be XZ compressed.
    pub const COMPRESSED_XZ: Self = Self(1 << 0);
    /// DATA payloads may be LZ4 compressed.
    pub const COMPRESSED_LZ4: Self = Self(1 << 1);

    const KNOWN: u32 = Self::COMPRESSED_XZ.0 | Self::COMPRESSED_LZ4.0;

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Bits this reader does not understand.
    #[must_use]
    pub const fn unknown_bits(self) -> u32 {
        self.0 & !Self::KNOWN
    }

    /// Checks if XZ compression may be used.
    #[must_use]
    pub const fn has_xz(self) -> bool {
        self.0 & Self::COMPRESSED_XZ.0 != 0
    }

    /// Checks if LZ4 compression may be used.
    #[must_use]
    pub const fn has_lz4(self) -> bool {
        self.0 & Self::COMPRESSED_LZ4.0 != 0
    }
}

/// Lifecycle state recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    /// Closed cleanly.
    Offline,
    /// Open for writing, or the writer did not close it.
    Online,
    /// Rotated away; no further writes.
    Archived,
    /// A state byte this reader does not know.
    Unknown(u8),
}

impl JournalState {
    /// Converts a byte to a state.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Offline,
            1 => Self::Online,
            2 => Self::Archived,
            other => Self::Unknown(other),
        }
    }

    /// Converts the state to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Offline => 0,
            Self::Online => 1,
            Self::Archived => 2,
            Self::Unknown(b) => b,
        }
    }
}

impl std::fmt::Display for JournalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "OFFLINE"),
            Self::Online => write!(f, "ONLINE"),
            Self::Archived => write!(f, "ARCHIVED"),
            Self::Unknown(b) => write!(f, "UNKNOWN({b})"),
        }
    }
}

/// Decoded journal header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalHeader {
    /// Compatible feature flags.
    pub compatible_flags: CompatibleFlags,
    /// Incompatible feature flags.
    pub incompatible_flags: IncompatibleFlags,
    /// Lifecycle state.
    pub state: JournalState,
    /// Reserved bytes 17..24, kept for re-encoding.
    pub reserved: [u8; 7],
    /// Identifier of this file.
    pub file_id: Uuid,
    /// Machine that wrote the file.
    pub machine_id: Uuid,
    /// Boot during which the file was last written.
    pub boot_id: Uuid,
    /// Namespace of the sequence numbers.
    pub seqnum_id: Uuid,
    /// Declared header size; objects start here.
    pub header_size: u64,
    /// Size of the object arena following the header.
    pub arena_size: u64,
    /// Offset of the DATA hash table items.
    pub data_hash_table_offset: u64,
    /// Size in bytes of the DATA hash table items.
    pub data_hash_table_size: u64,
    /// Offset of the FIELD hash table items.
    pub field_hash_table_offset: u64,
    /// Size in bytes of the FIELD hash table items.
    pub field_hash_table_size: u64,
    /// Offset of the last object written.
    pub tail_object_offset: u64,
    /// Number of objects.
    pub n_objects: u64,
    /// Number of ENTRY objects.
    pub n_entries: u64,
    /// Sequence number of the last entry.
    pub tail_entry_seqnum: u64,
    /// Sequence number of the first entry.
    pub head_entry_seqnum: u64,
    /// Offset of the first ENTRY_ARRAY page.
    pub entry_array_offset: u64,
    /// Realtime timestamp of the first entry.
    pub head_entry_realtime: u64,
    /// Realtime timestamp of the last entry.
    pub tail_entry_realtime: u64,
    /// Monotonic timestamp of the last entry.
    pub tail_entry_monotonic: u64,
    /// Number of DATA objects (zero if `header_size <= 208`).
    pub n_data: u64,
    /// Number of FIELD objects (zero if `header_size <= 208`).
    pub n_fields: u64,
    /// Number of TAG objects (zero if `header_size <= 224`).
    pub n_tags: u64,
    /// Number of ENTRY_ARRAY objects (zero if `header_size <= 224`).
    pub n_entry_arrays: u64,
}

/// Header fields past the fixed prefix, in increasing offset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionalField {
    NData,
    NFields,
    NTags,
    NEntryArrays,
}

impl OptionalField {
    const ALL: [Self; 4] = [Self::NData, Self::NFields, Self::NTags, Self::NEntryArrays];

    const fn offset(self) -> u64 {
        match self {
            Self::NData => 208,
            Self::NFields => 216,
            Self::NTags => 224,
            Self::NEntryArrays => 232,
        }
    }

    /// The field exists when `header_size` is strictly greater than this.
    const fn present_above(self) -> u64 {
        match self {
            Self::NData | Self::NFields => 208,
            Self::NTags | Self::NEntryArrays => 224,
        }
    }

    const fn is_present(self, header_size: u64) -> bool {
        header_size > self.present_above()
    }

    fn get(self, header: &JournalHeader) -> u64 {
        match self {
            Self::NData => header.n_data,
            Self::NFields => header.n_fields,
            Self::NTags => header.n_tags,
            Self::NEntryArrays => header.n_entry_arrays,
        }
    }

    fn slot(self, header: &mut JournalHeader) -> &mut u64 {
        match self {
            Self::NData => &mut header.n_data,
            Self::NFields => &mut header.n_fields,
            Self::NTags => &mut header.n_tags,
            Self::NEntryArrays => &mut header.n_entry_arrays,
        }
    }
}

/// Reads header fields from a stream, tracking the absolute offset for errors.
struct FieldReader<'r, R: Read> {
    inner: &'r mut R,
    pos: u64,
}

impl<R: Read> FieldReader<'_, R> {
    fn bytes<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        self.inner
            .read_exact(&mut out)
            .map_err(|e| CoreError::io(self.pos, N as u64, e))?;
        self.pos += N as u64;
        Ok(out)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        let v = self
            .inner
            .read_u8()
            .map_err(|e| CoreError::io(self.pos, 1, e))?;
        self.pos += 1;
        Ok(v)
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let v = self
            .inner
            .read_u32::<LittleEndian>()
            .map_err(|e| CoreError::io(self.pos, 4, e))?;
        self.pos += 4;
        Ok(v)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let v = self
            .inner
            .read_u64::<LittleEndian>()
            .map_err(|e| CoreError::io(self.pos, 8, e))?;
        self.pos += 8;
        Ok(v)
    }

    fn id128(&mut self) -> CoreResult<Uuid> {
        Ok(Uuid::from_bytes(self.bytes::<16>()?))
    }
}

impl JournalHeader {
    /// Decodes a header from a stream positioned at the start of the file.
    ///
    /// The signature is checked before any further byte is read. The fixed
    /// prefix is always read; optional fields only if `header_size` declares
    /// them. Bytes between the last known field and `header_size` are left
    /// unread.
    ///
    /// # Errors
    ///
    /// - [`FormatError::BadSignature`] if the magic does not match
    /// - [`FormatError::Truncated`] on a short read
    /// - [`CoreError::Io`] on any other stream error
    pub fn read_from<R: Read>(reader: &mut R) -> CoreResult<Self> {
        let mut r = FieldReader {
            inner: reader,
            pos: 0,
        };

        let signature = r.bytes::<8>()?;
        if signature != HEADER_SIGNATURE {
            return Err(FormatError::BadSignature { found: signature }.into());
        }

        let mut header = Self {
            compatible_flags: CompatibleFlags::from_bits(r.u32()?),
            incompatible_flags: IncompatibleFlags::from_bits(r.u32()?),
            state: JournalState::from_byte(r.u8()?),
            reserved: r.bytes::<7>()?,
            file_id: r.id128()?,
            machine_id: r.id128()?,
            boot_id: r.id128()?,
            seqnum_id: r.id128()?,
            header_size: r.u64()?,
            arena_size: r.u64()?,
            data_hash_table_offset: r.u64()?,
            data_hash_table_size: r.u64()?,
            field_hash_table_offset: r.u64()?,
            field_hash_table_size: r.u64()?,
            tail_object_offset: r.u64()?,
            n_objects: r.u64()?,
            n_entries: r.u64()?,
            tail_entry_seqnum: r.u64()?,
            head_entry_seqnum: r.u64()?,
            entry_array_offset: r.u64()?,
            head_entry_realtime: r.u64()?,
            tail_entry_realtime: r.u64()?,
            tail_entry_monotonic: r.u64()?,
            n_data: 0,
            n_fields: 0,
            n_tags: 0,
            n_entry_arrays: 0,
        };
        debug_assert_eq!(r.pos, HEADER_PREFIX_SIZE);

        for field in OptionalField::ALL {
            if !field.is_present(header.header_size) {
                break;
            }
            debug_assert_eq!(r.pos, field.offset());
            *field.slot(&mut header) = r.u64()?;
        }

        Ok(header)
    }

    /// Decodes a header from a byte slice starting at file offset 0.
    ///
    /// # Errors
    ///
    /// Same as [`JournalHeader::read_from`].
    pub fn from_bytes(mut bytes: &[u8]) -> CoreResult<Self> {
        Self::read_from(&mut bytes)
    }

    /// Number of bytes [`JournalHeader::read_from`] consumes for this header.
    #[must_use]
    pub fn decoded_len(&self) -> u64 {
        OptionalField::ALL
            .iter()
            .take_while(|f| f.is_present(self.header_size))
            .fold(HEADER_PREFIX_SIZE, |len, _| len + 8)
    }

    /// Encodes the header back to bytes.
    ///
    /// Produces exactly the bytes the decoder consumes for the same
    /// `header_size`: the fixed prefix plus every declared optional field.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_KNOWN_SIZE as usize);

        buf.extend_from_slice(&HEADER_SIGNATURE);
        put_u32(&mut buf, self.compatible_flags.bits());
        put_u32(&mut buf, self.incompatible_flags.bits());
        buf.push(self.state.as_byte());
        buf.extend_from_slice(&self.reserved);
        put_id128(&mut buf, &self.file_id);
        put_id128(&mut buf, &self.machine_id);
        put_id128(&mut buf, &self.boot_id);
        put_id128(&mut buf, &self.seqnum_id);
        for value in [
            self.header_size,
            self.arena_size,
            self.data_hash_table_offset,
            self.data_hash_table_size,
            self.field_hash_table_offset,
            self.field_hash_table_size,
            self.tail_object_offset,
            self.n_objects,
            self.n_entries,
            self.tail_entry_seqnum,
            self.head_entry_seqnum,
            self.entry_array_offset,
            self.head_entry_realtime,
            self.tail_entry_realtime,
            self.tail_entry_monotonic,
        ] {
            put_u64(&mut buf, value);
        }

        for field in OptionalField::ALL {
            if !field.is_present(self.header_size) {
                break;
            }
            put_u64(&mut buf, field.get(self));
        }

        buf
    }

    /// Checks the header for values no valid journal can carry.
    ///
    /// # Errors
    ///
    /// - [`FormatError::HeaderTooSmall`] if `header_size` is below the prefix
    /// - [`FormatError::UnsupportedFeatures`] for unknown incompatible flags
    /// - [`FormatError::OffsetOutOfBounds`] if the arena end overflows
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.header_size < HEADER_PREFIX_SIZE {
            return Err(FormatError::HeaderTooSmall {
                header_size: self.header_size,
            });
        }

        let unknown = self.incompatible_flags.unknown_bits();
        if unknown != 0 {
            return Err(FormatError::UnsupportedFeatures { flags: unknown });
        }

        if self.header_size.checked_add(self.arena_size).is_none() {
            return Err(FormatError::OffsetOutOfBounds {
                offset: self.arena_size,
                arena_start: self.header_size,
                arena_end: u64::MAX,
            });
        }

        Ok(())
    }

    /// First offset at which objects may live.
    #[must_use]
    pub const fn arena_start(&self) -> u64 {
        self.header_size
    }

    /// One past the last offset covered by the arena.
    #[must_use]
    pub const fn arena_end(&self) -> u64 {
        self.header_size.saturating_add(self.arena_size)
    }

    /// Checks `offset` against `[header_size, header_size + arena_size)`.
    #[must_use]
    pub const fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.arena_start() && offset < self.arena_end()
    }

    /// Checks if the file carries TAG objects.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.compatible_flags.is_sealed()
    }

    /// Bound for entry-array traversals.
    ///
    /// Files whose header predates `n_entry_arrays` (224 bytes or less) fall
    /// back to `n_objects`. When the counter is present it is used as is,
    /// zero included.
    #[must_use]
    pub const fn entry_array_limit(&self) -> u64 {
        if self.header_size > 224 {
            self.n_entry_arrays
        } else {
            self.n_objects
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_header(header_size: u64) -> JournalHeader {
        JournalHeader {
            compatible_flags: CompatibleFlags::SEALED,
            incompatible_flags: IncompatibleFlags::COMPRESSED_LZ4,
            state: JournalState::Archived,
            reserved: [0; 7],
            file_id: Uuid::from_bytes([1; 16]),
            machine_id: Uuid::from_bytes([2; 16]),
            boot_id: Uuid::from_bytes([3; 16]),
            seqnum_id: Uuid::from_bytes([4; 16]),
            header_size,
            arena_size: 4096,
            data_hash_table_offset: 256,
            data_hash_table_size: 512,
            field_hash_table_offset: 784,
            field_hash_table_size: 128,
            tail_object_offset: 2048,
            n_objects: 20,
            n_entries: 5,
            tail_entry_seqnum: 9,
            head_entry_seqnum: 5,
            entry_array_offset: 1024,
            head_entry_realtime: 1_600_000_000_000_000,
            tail_entry_realtime: 1_600_000_000_500_000,
            tail_entry_monotonic: 42_000,
            n_data: if header_size > 208 { 7 } else { 0 },
            n_fields: if header_size > 208 { 3 } else { 0 },
            n_tags: if header_size > 224 { 1 } else { 0 },
            n_entry_arrays: if header_size > 224 { 2 } else { 0 },
        }
    }

    #[test]
    fn header_roundtrip_per_size() {
        for (size, len) in [(208, 208), (224, 224), (240, 240), (256, 240)] {
            let header = sample_header(size);
            let bytes = header.encode();
            assert_eq!(bytes.len(), len, "header_size {size}");
            assert_eq!(header.decoded_len(), len as u64);

            let decoded = JournalHeader::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, header);
            assert_eq!(decoded.encode(), bytes);
        }
    }

    #[test]
    fn minimal_header_reports_optional_fields_as_zero() {
        let mut bytes = sample_header(208).encode();
        // Bytes after the prefix must never be interpreted.
        bytes.extend_from_slice(&[0xFF; 32]);

        let decoded = JournalHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.n_data, 0);
        assert_eq!(decoded.n_fields, 0);
        assert_eq!(decoded.n_tags, 0);
        assert_eq!(decoded.n_entry_arrays, 0);
    }

    #[test]
    fn minimal_header_reads_nothing_past_prefix() {
        let bytes = sample_header(208).encode();
        let mut reader = &bytes[..];
        JournalHeader::read_from(&mut reader).unwrap();
        assert!(reader.is_empty());

        let mut with_tail = bytes.clone();
        with_tail.extend_from_slice(b"trailing");
        let mut reader = &with_tail[..];
        JournalHeader::read_from(&mut reader).unwrap();
        assert_eq!(reader, b"trailing");
    }

    #[test]
    fn mid_sized_header_reads_first_group_only() {
        let mut bytes = sample_header(224).encode();
        bytes.extend_from_slice(&[0xAA; 16]);

        let decoded = JournalHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.n_data, 7);
        assert_eq!(decoded.n_fields, 3);
        assert_eq!(decoded.n_tags, 0);
        assert_eq!(decoded.n_entry_arrays, 0);
    }

    #[test]
    fn bad_signature_consumes_only_magic() {
        let mut bytes = b"XXXXXXXX".to_vec();
        bytes.extend_from_slice(&[0u8; 232]);

        let mut reader = &bytes[..];
        let err = JournalHeader::read_from(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Format(FormatError::BadSignature { found }) if &found == b"XXXXXXXX"
        ));
        assert_eq!(reader.len(), bytes.len() - 8);
    }

    #[test]
    fn truncated_prefix() {
        let bytes = sample_header(240).encode();
        let err = JournalHeader::from_bytes(&bytes[..100]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Format(FormatError::Truncated { offset: 96, wanted: 8 })
        ));
    }

    #[test]
    fn truncated_optional_group() {
        let bytes = sample_header(240).encode();
        let err = JournalHeader::from_bytes(&bytes[..230]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Format(FormatError::Truncated { offset: 224, .. })
        ));
    }

    #[test]
    fn validate_rejects_small_header() {
        let header = sample_header(200);
        assert_eq!(
            header.validate(),
            Err(FormatError::HeaderTooSmall { header_size: 200 })
        );
    }

    #[test]
    fn validate_rejects_unknown_incompatible_flags() {
        let mut header = sample_header(240);
        header.incompatible_flags = IncompatibleFlags::from_bits(0b1_0010);
        assert_eq!(
            header.validate(),
            Err(FormatError::UnsupportedFeatures { flags: 0b1_0000 })
        );
    }

    #[test]
    fn arena_bounds() {
        let header = sample_header(240);
        assert!(!header.contains_offset(239));
        assert!(header.contains_offset(240));
        assert!(header.contains_offset(240 + 4095));
        assert!(!header.contains_offset(240 + 4096));
    }

    #[test]
    fn state_bytes() {
        for b in 0..=3u8 {
            assert_eq!(JournalState::from_byte(b).as_byte(), b);
        }
        assert_eq!(JournalState::from_byte(1), JournalState::Online);
        assert_eq!(JournalState::from_byte(9).to_string(), "UNKNOWN(9)");
    }

    #[test]
    fn entry_array_limit_falls_back_to_objects() {
        assert_eq!(sample_header(240).entry_array_limit(), 2);
        assert_eq!(sample_header(224).entry_array_limit(), 20);
    }

    #[test]
    fn present_zero_entry_array_count_is_the_limit() {
        let mut header = sample_header(240);
        header.n_entry_arrays = 0;
        assert_eq!(header.entry_array_limit(), 0);
    }
}
