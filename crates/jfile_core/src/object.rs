//! Journal objects and their decoder.
//!
//! ## Object Format
//!
//! ```text
//! | type (1) | flags (1) | reserved (6) | size (8) | payload (size - 16) | zero padding |
//! ```
//!
//! `size` counts the common header and the payload but not the padding; the
//! next object starts at `offset + align8(size)`.

use crate::codec::{align8, padding_for, put_u64, ByteCursor, ALIGNMENT};
use crate::error::{CoreError, CoreResult, FormatError};
use std::fmt;
use std::io::Read;
use uuid::Uuid;

/// Size of the header common to every object.
pub const OBJECT_HEADER_SIZE: u64 = 16;

/// Length of the HMAC carried by TAG objects (SHA-256).
pub const TAG_LENGTH: usize = 32;

/// Size of one entry item: data offset + hash.
pub const ENTRY_ITEM_SIZE: u64 = 16;

/// Size of one hash table bucket: head offset + tail offset.
pub const HASH_ITEM_SIZE: u64 = 16;

/// Type tag of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    /// Freed or reserved slot.
    Unused = 0,
    /// A `FIELD=value` payload.
    Data = 1,
    /// A field name.
    Field = 2,
    /// One log entry.
    Entry = 3,
    /// Buckets over DATA objects.
    DataHashTable = 4,
    /// Buckets over FIELD objects.
    FieldHashTable = 5,
    /// A page of entry offsets.
    EntryArray = 6,
    /// An HMAC seal.
    Tag = 7,
}

impl ObjectType {
    /// Every type, in tag order.
    pub const ALL: [Self; 8] = [
        Self::Unused,
        Self::Data,
        Self::Field,
        Self::Entry,
        Self::DataHashTable,
        Self::FieldHashTable,
        Self::EntryArray,
        Self::Tag,
    ];

    /// Converts a byte to an object type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }

    /// Converts the object type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Size of the fixed sub-fields that precede the variable tail.
    #[must_use]
    pub const fn min_payload_size(self) -> u64 {
        match self {
            Self::Unused => 48,
            Self::Data => 6 * 8,
            Self::Field => 3 * 8,
            Self::Entry => 3 * 8 + 16 + 8,
            Self::DataHashTable | Self::FieldHashTable => 0,
            Self::EntryArray => 8,
            Self::Tag => 8 + 8 + TAG_LENGTH as u64,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unused => "UNUSED",
            Self::Data => "DATA",
            Self::Field => "FIELD",
            Self::Entry => "ENTRY",
            Self::DataHashTable => "DATA_HASH_TABLE",
            Self::FieldHashTable => "FIELD_HASH_TABLE",
            Self::EntryArray => "ENTRY_ARRAY",
            Self::Tag => "TAG",
        };
        f.write_str(name)
    }
}

/// Compression applied to a DATA payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// XZ / LZMA2.
    Xz,
    /// LZ4 block with a little-endian 64-bit decompressed size prefix.
    Lz4,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xz => f.write_str("XZ"),
            Self::Lz4 => f.write_str("LZ4"),
        }
    }
}

/// Per-object flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags(u8);

impl ObjectFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Payload is XZ compressed.
    pub const COMPRESSED_XZ: Self = Self(1 << 0);
    /// Payload is LZ4 compressed.
    pub const COMPRESSED_LZ4: Self = Self(1 << 1);

    /// Creates new flags from raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if any compression bit is set.
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        self.0 & (Self::COMPRESSED_XZ.0 | Self::COMPRESSED_LZ4.0) != 0
    }

    /// Returns the compression codec, XZ taking precedence if both are set.
    #[must_use]
    pub const fn compression(self) -> Option<Compression> {
        if self.0 & Self::COMPRESSED_XZ.0 != 0 {
            Some(Compression::Xz)
        } else if self.0 & Self::COMPRESSED_LZ4.0 != 0 {
            Some(Compression::Lz4)
        } else {
            None
        }
    }
}

impl From<Compression> for ObjectFlags {
    fn from(c: Compression) -> Self {
        match c {
            Compression::Xz => Self::COMPRESSED_XZ,
            Compression::Lz4 => Self::COMPRESSED_LZ4,
        }
    }
}

/// The 16-byte header common to every object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Raw type tag (may be unknown).
    pub type_tag: u8,
    /// Object flags.
    pub flags: ObjectFlags,
    /// Reserved bytes.
    pub reserved: [u8; 6],
    /// Size of header plus payload, excluding padding.
    pub size: u64,
}

impl ObjectHeader {
    /// Decodes the common header from its 16 bytes.
    #[must_use]
    pub fn decode(bytes: &[u8; 16]) -> Self {
        let mut reserved = [0u8; 6];
        reserved.copy_from_slice(&bytes[2..8]);
        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[8..16]);
        Self {
            type_tag: bytes[0],
            flags: ObjectFlags::from_byte(bytes[1]),
            reserved,
            size: u64::from_le_bytes(size),
        }
    }

    /// Returns the known object type, if any.
    #[must_use]
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_byte(self.type_tag)
    }

    /// Validates the type tag and declared size of the object at `offset`.
    ///
    /// # Errors
    ///
    /// - [`FormatError::UnknownObjectType`] for an unknown tag
    /// - [`FormatError::ObjectTooSmall`] if `size` cannot hold the fixed fields
    pub fn check(&self, offset: u64) -> Result<ObjectType, FormatError> {
        let object_type = self
            .object_type()
            .ok_or(FormatError::UnknownObjectType {
                offset,
                tag: self.type_tag,
            })?;

        if self.size < OBJECT_HEADER_SIZE + object_type.min_payload_size() {
            return Err(FormatError::ObjectTooSmall {
                offset,
                object_type: self.type_tag,
                size: self.size,
            });
        }

        Ok(object_type)
    }

    /// Bytes the object occupies on disk, `align8(size)`.
    #[must_use]
    pub fn footprint(&self) -> Option<u64> {
        align8(self.size)
    }
}

/// A DATA object: one deduplicated `FIELD=value` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    /// Hash of the (uncompressed) payload.
    pub hash: u64,
    /// Next DATA object in the same hash bucket.
    pub next_hash_offset: u64,
    /// Next DATA object of the same field.
    pub next_field_offset: u64,
    /// First entry referencing this data.
    pub entry_offset: u64,
    /// Entry-array chain listing further referencing entries.
    pub entry_array_offset: u64,
    /// Number of entries referencing this data.
    pub n_entries: u64,
    /// Raw payload, possibly compressed.
    pub payload: Vec<u8>,
}

/// A FIELD object: one field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldObject {
    /// Hash of the field name.
    pub hash: u64,
    /// Next FIELD object in the same hash bucket.
    pub next_hash_offset: u64,
    /// Head of the list of DATA objects with this field.
    pub head_data_offset: u64,
    /// Field name.
    pub payload: Vec<u8>,
}

/// One field reference inside an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryItem {
    /// Offset of the DATA object.
    pub object_offset: u64,
    /// Hash of the DATA object, as recorded when the entry was written.
    pub hash: u64,
}

/// An ENTRY object: one log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryObject {
    /// Sequence number.
    pub seqnum: u64,
    /// Wallclock timestamp, microseconds.
    pub realtime: u64,
    /// Monotonic timestamp, microseconds.
    pub monotonic: u64,
    /// Boot the monotonic timestamp belongs to.
    pub boot_id: Uuid,
    /// XOR of the hashes of all referenced DATA objects.
    pub xor_hash: u64,
    /// Field references.
    pub items: Vec<EntryItem>,
}

/// One hash table bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashItem {
    /// First object in the bucket chain.
    pub head_hash_offset: u64,
    /// Last object in the bucket chain.
    pub tail_hash_offset: u64,
}

/// A DATA or FIELD hash table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTableObject {
    /// Buckets.
    pub items: Vec<HashItem>,
}

/// One page of an entry-array chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryArrayObject {
    /// Next page, or 0.
    pub next_entry_array_offset: u64,
    /// Entry offsets; unused trailing slots are 0.
    pub items: Vec<u64>,
}

/// A TAG object sealing everything written since the previous tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObject {
    /// Tag sequence number.
    pub seqnum: u64,
    /// Sealing key epoch.
    pub epoch: u64,
    /// HMAC-SHA256 tag.
    pub tag: [u8; TAG_LENGTH],
}

/// A decoded object payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// Inert slot.
    Unused {
        /// Payload bytes, kept verbatim.
        payload: Vec<u8>,
    },
    /// DATA object.
    Data(DataObject),
    /// FIELD object.
    Field(FieldObject),
    /// ENTRY object.
    Entry(EntryObject),
    /// DATA hash table.
    DataHashTable(HashTableObject),
    /// FIELD hash table.
    FieldHashTable(HashTableObject),
    /// ENTRY_ARRAY page.
    EntryArray(EntryArrayObject),
    /// TAG object.
    Tag(TagObject),
}

impl Object {
    /// Returns the object type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Unused { .. } => ObjectType::Unused,
            Self::Data(_) => ObjectType::Data,
            Self::Field(_) => ObjectType::Field,
            Self::Entry(_) => ObjectType::Entry,
            Self::DataHashTable(_) => ObjectType::DataHashTable,
            Self::FieldHashTable(_) => ObjectType::FieldHashTable,
            Self::EntryArray(_) => ObjectType::EntryArray,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// Hash and hash-chain link, for objects that live in a hash table.
    #[must_use]
    pub fn hash_link(&self) -> Option<(u64, u64)> {
        match self {
            Self::Data(d) => Some((d.hash, d.next_hash_offset)),
            Self::Field(f) => Some((f.hash, f.next_hash_offset)),
            _ => None,
        }
    }

    /// Decodes a payload of `object_type` for the object at `offset`.
    ///
    /// `payload` is exactly `size - 16` bytes: fixed sub-fields followed by
    /// the variable tail. Padding is not part of it.
    ///
    /// # Errors
    ///
    /// - [`FormatError::Truncated`] if the fixed sub-fields do not fit
    /// - [`FormatError::InvalidPayloadLength`] if an array tail is ragged, or
    ///   a TAG payload is not exactly its fixed size
    pub fn decode_payload(
        offset: u64,
        object_type: ObjectType,
        payload: &[u8],
    ) -> Result<Self, FormatError> {
        let mut c = ByteCursor::new(payload, offset + OBJECT_HEADER_SIZE);

        let ragged = |len: usize, item: u64| -> Result<usize, FormatError> {
            if len as u64 % item != 0 {
                return Err(FormatError::InvalidPayloadLength {
                    offset,
                    object_type,
                    len: len as u64,
                });
            }
            Ok(len / item as usize)
        };

        let object = match object_type {
            ObjectType::Unused => {
                c.skip(ObjectType::Unused.min_payload_size() as usize)?;
                Self::Unused {
                    payload: payload.to_vec(),
                }
            }

            ObjectType::Data => {
                let hash = c.read_u64()?;
                let next_hash_offset = c.read_u64()?;
                let next_field_offset = c.read_u64()?;
                let entry_offset = c.read_u64()?;
                let entry_array_offset = c.read_u64()?;
                let n_entries = c.read_u64()?;
                let payload = c.take(c.remaining())?.to_vec();
                Self::Data(DataObject {
                    hash,
                    next_hash_offset,
                    next_field_offset,
                    entry_offset,
                    entry_array_offset,
                    n_entries,
                    payload,
                })
            }

            ObjectType::Field => {
                let hash = c.read_u64()?;
                let next_hash_offset = c.read_u64()?;
                let head_data_offset = c.read_u64()?;
                let payload = c.take(c.remaining())?.to_vec();
                Self::Field(FieldObject {
                    hash,
                    next_hash_offset,
                    head_data_offset,
                    payload,
                })
            }

            ObjectType::Entry => {
                let seqnum = c.read_u64()?;
                let realtime = c.read_u64()?;
                let monotonic = c.read_u64()?;
                let boot_id = c.read_id128()?;
                let xor_hash = c.read_u64()?;
                let count = ragged(c.remaining(), ENTRY_ITEM_SIZE)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(EntryItem {
                        object_offset: c.read_u64()?,
                        hash: c.read_u64()?,
                    });
                }
                Self::Entry(EntryObject {
                    seqnum,
                    realtime,
                    monotonic,
                    boot_id,
                    xor_hash,
                    items,
                })
            }

            ObjectType::DataHashTable | ObjectType::FieldHashTable => {
                let count = ragged(c.remaining(), HASH_ITEM_SIZE)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(HashItem {
                        head_hash_offset: c.read_u64()?,
                        tail_hash_offset: c.read_u64()?,
                    });
                }
                let table = HashTableObject { items };
                if object_type == ObjectType::DataHashTable {
                    Self::DataHashTable(table)
                } else {
                    Self::FieldHashTable(table)
                }
            }

            ObjectType::EntryArray => {
                let next_entry_array_offset = c.read_u64()?;
                let count = ragged(c.remaining(), 8)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(c.read_u64()?);
                }
                Self::EntryArray(EntryArrayObject {
                    next_entry_array_offset,
                    items,
                })
            }

            ObjectType::Tag => {
                let seqnum = c.read_u64()?;
                let epoch = c.read_u64()?;
                let tag = c.read_array::<TAG_LENGTH>()?;
                if c.remaining() != 0 {
                    return Err(FormatError::InvalidPayloadLength {
                        offset,
                        object_type,
                        len: payload.len() as u64,
                    });
                }
                Self::Tag(TagObject { seqnum, epoch, tag })
            }
        };

        Ok(object)
    }

    /// Serializes the payload (fixed sub-fields and variable tail).
    #[must_use]
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Unused { payload } => buf.extend_from_slice(payload),

            Self::Data(d) => {
                for v in [
                    d.hash,
                    d.next_hash_offset,
                    d.next_field_offset,
                    d.entry_offset,
                    d.entry_array_offset,
                    d.n_entries,
                ] {
                    put_u64(&mut buf, v);
                }
                buf.extend_from_slice(&d.payload);
            }

            Self::Field(f) => {
                put_u64(&mut buf, f.hash);
                put_u64(&mut buf, f.next_hash_offset);
                put_u64(&mut buf, f.head_data_offset);
                buf.extend_from_slice(&f.payload);
            }

            Self::Entry(e) => {
                put_u64(&mut buf, e.seqnum);
                put_u64(&mut buf, e.realtime);
                put_u64(&mut buf, e.monotonic);
                buf.extend_from_slice(e.boot_id.as_bytes());
                put_u64(&mut buf, e.xor_hash);
                for item in &e.items {
                    put_u64(&mut buf, item.object_offset);
                    put_u64(&mut buf, item.hash);
                }
            }

            Self::DataHashTable(t) | Self::FieldHashTable(t) => {
                for item in &t.items {
                    put_u64(&mut buf, item.head_hash_offset);
                    put_u64(&mut buf, item.tail_hash_offset);
                }
            }

            Self::EntryArray(a) => {
                put_u64(&mut buf, a.next_entry_array_offset);
                for item in &a.items {
                    put_u64(&mut buf, *item);
                }
            }

            Self::Tag(t) => {
                put_u64(&mut buf, t.seqnum);
                put_u64(&mut buf, t.epoch);
                buf.extend_from_slice(&t.tag);
            }
        }

        buf
    }

    /// Serializes the whole object: common header, payload and padding.
    #[must_use]
    pub fn encode(&self, flags: ObjectFlags) -> Vec<u8> {
        let payload = self.encode_payload();
        let size = OBJECT_HEADER_SIZE + payload.len() as u64;

        let mut buf = Vec::with_capacity((size + padding_for(size)) as usize);
        buf.push(self.object_type().as_byte());
        buf.push(flags.as_byte());
        buf.extend_from_slice(&[0u8; 6]);
        put_u64(&mut buf, size);
        buf.extend_from_slice(&payload);
        buf.resize(buf.len() + padding_for(size) as usize, 0);
        buf
    }
}

/// An object decoded at a known offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedObject {
    /// File offset of the object header.
    pub offset: u64,
    /// Common header.
    pub header: ObjectHeader,
    /// Decoded payload.
    pub object: Object,
    /// Padding bytes consumed after the payload.
    pub padding: u64,
}

impl DecodedObject {
    /// Payload length, `size - 16`.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.header.size - OBJECT_HEADER_SIZE
    }

    /// Bytes consumed on disk: `size + padding`, a multiple of 8.
    #[must_use]
    pub fn footprint(&self) -> u64 {
        self.header.size + self.padding
    }

    /// Offset of the object that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.offset + self.footprint()
    }
}

/// Decodes the object whose bytes (header, payload and padding) are `bytes`.
///
/// # Errors
///
/// - [`FormatError::UnknownObjectType`] / [`FormatError::ObjectTooSmall`]
///   from the common header
/// - [`FormatError::Truncated`] if `bytes` is shorter than `align8(size)`
/// - any payload error from [`Object::decode_payload`]
pub fn decode_object(offset: u64, bytes: &[u8]) -> Result<DecodedObject, FormatError> {
    let mut c = ByteCursor::new(bytes, offset);
    let header = ObjectHeader::decode(&c.read_array::<16>()?);
    let object_type = header.check(offset)?;

    let payload_len = usize::try_from(header.size - OBJECT_HEADER_SIZE).map_err(|_| {
        FormatError::Truncated {
            offset,
            wanted: header.size,
        }
    })?;
    let payload = c.take(payload_len)?;
    let padding = padding_for(header.size);
    c.skip(padding as usize)?;

    let object = Object::decode_payload(offset, object_type, payload)?;
    debug_assert_eq!((header.size + padding) % ALIGNMENT, 0);

    Ok(DecodedObject {
        offset,
        header,
        object,
        padding,
    })
}

/// Reads and decodes one object from a stream positioned at `offset`.
///
/// Returns `Ok(None)` when the stream ends exactly at the object boundary.
///
/// # Errors
///
/// - [`FormatError::Truncated`] if the stream ends inside the object
/// - any error from [`decode_object`]
/// - [`CoreError::Io`] for other stream failures
pub fn read_object<R: Read>(reader: &mut R, offset: u64) -> CoreResult<Option<DecodedObject>> {
    let mut head = [0u8; 16];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CoreError::io(offset + filled as u64, 16, e)),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < head.len() {
        return Err(FormatError::Truncated {
            offset,
            wanted: OBJECT_HEADER_SIZE,
        }
        .into());
    }

    let header = ObjectHeader::decode(&head);
    header.check(offset)?;
    let footprint = header.footprint().ok_or(FormatError::ObjectOverrun {
        offset,
        size: header.size,
        arena_end: u64::MAX,
    })?;

    // Grow with the bytes actually present instead of trusting `size` for
    // the allocation.
    let rest = footprint - OBJECT_HEADER_SIZE;
    let mut bytes = head.to_vec();
    reader
        .take(rest)
        .read_to_end(&mut bytes)
        .map_err(|e| CoreError::io(offset + OBJECT_HEADER_SIZE, rest, e))?;
    if (bytes.len() as u64) < footprint {
        return Err(FormatError::Truncated {
            offset: offset + bytes.len() as u64,
            wanted: footprint - bytes.len() as u64,
        }
        .into());
    }

    Ok(Some(decode_object(offset, &bytes)?))
}
