//! Synthetic journal files.
//!
//! [`JournalBuilder`] lays out a complete, internally consistent journal:
//! deduplicated DATA objects, FIELD objects, hash tables with chained
//! buckets, per-field data lists, ENTRY objects, the root entry-array chain,
//! per-data entry arrays and, optionally, a closing TAG. The resulting
//! [`Layout`] records where everything went so tests can corrupt specific
//! bytes.

use jfile_core::header::HEADER_KNOWN_SIZE;
use jfile_core::object::{
    DataObject, EntryArrayObject, EntryItem, EntryObject, FieldObject, HashItem,
    HashTableObject, TagObject, OBJECT_HEADER_SIZE, TAG_LENGTH,
};
use jfile_core::{
    CompatibleFlags, Compression, IncompatibleFlags, JournalHeader, JournalState, Object,
    ObjectFlags,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Deterministic 64-bit FNV-1a hash used for every hash the builder stores.
#[must_use]
pub fn hash64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

/// Keyed test MAC over a sealed range: FNV over key, epoch and bytes, spread
/// over 32 bytes.
#[must_use]
pub fn toy_mac(key: &[u8], epoch: u64, sealed: &[u8]) -> [u8; TAG_LENGTH] {
    let mut input = key.to_vec();
    input.extend_from_slice(&epoch.to_le_bytes());
    input.extend_from_slice(sealed);
    let mut tag = [0u8; TAG_LENGTH];
    for (i, chunk) in tag.chunks_mut(8).enumerate() {
        input.push(i as u8);
        chunk.copy_from_slice(&hash64(&input).to_le_bytes());
        input.pop();
    }
    tag
}

/// [`TagVerifier`](jfile_core::TagVerifier) matching [`toy_mac`].
#[must_use]
pub fn toy_verifier(key: &[u8], epoch: u64, sealed: &[u8], tag: &[u8; TAG_LENGTH]) -> bool {
    toy_mac(key, epoch, sealed) == *tag
}

/// Test "compression": byte reversal. Its inverse is itself.
#[must_use]
pub fn reverse_bytes(payload: &[u8]) -> Vec<u8> {
    payload.iter().rev().copied().collect()
}

/// [`PayloadTransform`](jfile_core::PayloadTransform) undoing [`reverse_bytes`].
///
/// # Errors
///
/// Never fails.
pub fn reverse_transform(
    _compression: Compression,
    payload: &[u8],
) -> Result<Vec<u8>, jfile_core::TransformError> {
    Ok(reverse_bytes(payload))
}

/// One entry to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    /// Wallclock timestamp.
    pub realtime: u64,
    /// Monotonic timestamp.
    pub monotonic: u64,
    /// Raw `NAME=value` payloads, in item order.
    pub payloads: Vec<Vec<u8>>,
}

impl EntrySpec {
    /// Creates an entry from `(name, value)` pairs.
    #[must_use]
    pub fn new(realtime: u64, fields: &[(&str, &str)]) -> Self {
        Self {
            realtime,
            monotonic: realtime / 2,
            payloads: fields
                .iter()
                .map(|(name, value)| format!("{name}={value}").into_bytes())
                .collect(),
        }
    }

    /// Creates an entry from raw payloads, which need not contain `=`.
    #[must_use]
    pub fn raw(realtime: u64, payloads: Vec<Vec<u8>>) -> Self {
        Self {
            realtime,
            monotonic: realtime / 2,
            payloads,
        }
    }
}

/// Where the builder placed each structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    /// Declared header size.
    pub header_size: u64,
    /// Offset of the DATA hash table object.
    pub data_hash_table: u64,
    /// Offset of the FIELD hash table object.
    pub field_hash_table: u64,
    /// FIELD offsets by name.
    pub fields: HashMap<String, u64>,
    /// DATA offsets by raw payload.
    pub data: HashMap<Vec<u8>, u64>,
    /// ENTRY offsets, in entry order.
    pub entries: Vec<u64>,
    /// Pages of the root entry-array chain.
    pub entry_arrays: Vec<u64>,
    /// First page of each DATA object's own entry-array chain.
    pub data_entry_arrays: HashMap<u64, u64>,
    /// TAG offset when sealed.
    pub tag: Option<u64>,
    /// Every object offset, in file order.
    pub objects: Vec<u64>,
}

impl Layout {
    /// Offset of the DATA object holding `payload`.
    ///
    /// # Panics
    ///
    /// If no entry carried `payload`.
    #[must_use]
    pub fn data_offset(&self, payload: &str) -> u64 {
        self.data[payload.as_bytes()]
    }
}

/// A built journal: file bytes plus the layout.
#[derive(Debug, Clone)]
pub struct BuiltJournal {
    /// Whole file.
    pub bytes: Vec<u8>,
    /// The header that was written.
    pub header: JournalHeader,
    /// Object placement.
    pub layout: Layout,
}

/// Lays out a journal file in memory.
#[derive(Debug, Clone)]
pub struct JournalBuilder {
    header_size: u64,
    data_buckets: u64,
    field_buckets: u64,
    entry_array_capacity: usize,
    boot_id: Uuid,
    seal_key: Option<Vec<u8>>,
    compressed: Option<Compression>,
    first_seqnum: u64,
    entries: Vec<EntrySpec>,
}

impl Default for JournalBuilder {
    fn default() -> Self {
        Self {
            header_size: HEADER_KNOWN_SIZE,
            data_buckets: 16,
            field_buckets: 8,
            entry_array_capacity: 4,
            boot_id: Uuid::from_bytes([0xB0; 16]),
            seal_key: None,
            compressed: None,
            first_seqnum: 1,
            entries: Vec::new(),
        }
    }
}

struct DataSlot {
    raw: Vec<u8>,
    field: usize,
    entries: Vec<usize>,
}

impl JournalBuilder {
    /// Creates a builder with a 240-byte header, 16 data buckets, 8 field
    /// buckets and 4 items per entry-array page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the declared header size, at least 208.
    #[must_use]
    pub fn header_size(mut self, size: u64) -> Self {
        self.header_size = size;
        self
    }

    /// Sets the bucket count of the DATA hash table.
    #[must_use]
    pub fn data_buckets(mut self, buckets: u64) -> Self {
        self.data_buckets = buckets;
        self
    }

    /// Sets the bucket count of the FIELD hash table.
    #[must_use]
    pub fn field_buckets(mut self, buckets: u64) -> Self {
        self.field_buckets = buckets;
        self
    }

    /// Sets the number of items per entry-array page.
    #[must_use]
    pub fn entry_array_capacity(mut self, capacity: usize) -> Self {
        self.entry_array_capacity = capacity.max(1);
        self
    }

    /// Seals the file with one closing TAG computed by [`toy_mac`].
    #[must_use]
    pub fn sealed(mut self, key: &[u8]) -> Self {
        self.seal_key = Some(key.to_vec());
        self
    }

    /// Stores every DATA payload "compressed" with [`reverse_bytes`].
    #[must_use]
    pub fn compressed(mut self, compression: Compression) -> Self {
        self.compressed = Some(compression);
        self
    }

    /// Sets the sequence number of the first entry.
    #[must_use]
    pub fn first_seqnum(mut self, seqnum: u64) -> Self {
        self.first_seqnum = seqnum;
        self
    }

    /// Appends an entry.
    #[must_use]
    pub fn entry(mut self, entry: EntrySpec) -> Self {
        self.entries.push(entry);
        self
    }

    /// Appends entries.
    #[must_use]
    pub fn entries(mut self, entries: impl IntoIterator<Item = EntrySpec>) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Lays out the file.
    #[must_use]
    pub fn build(&self) -> BuiltJournal {
        // Dedup fields and data in first-appearance order.
        let mut field_names: Vec<Vec<u8>> = Vec::new();
        let mut field_index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut slots: Vec<DataSlot> = Vec::new();
        let mut data_index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut entry_items: Vec<Vec<usize>> = Vec::new();

        for (e, entry) in self.entries.iter().enumerate() {
            let mut items = Vec::new();
            for payload in &entry.payloads {
                let d = *data_index.entry(payload.clone()).or_insert_with(|| {
                    let name = payload
                        .iter()
                        .position(|&b| b == b'=')
                        .map_or(payload.as_slice(), |eq| &payload[..eq])
                        .to_vec();
                    let next = field_names.len();
                    let field = *field_index.entry(name.clone()).or_insert_with(|| {
                        field_names.push(name);
                        next
                    });
                    slots.push(DataSlot {
                        raw: payload.clone(),
                        field,
                        entries: Vec::new(),
                    });
                    slots.len() - 1
                });
                if slots[d].entries.last() != Some(&e) {
                    slots[d].entries.push(e);
                }
                items.push(d);
            }
            entry_items.push(items);
        }

        let cap = self.entry_array_capacity;
        let root_pages = self.entries.len().div_ceil(cap);
        let data_pages: Vec<usize> = slots
            .iter()
            .map(|s| s.entries.len().saturating_sub(1).div_ceil(cap))
            .collect();

        // Pass 1: offsets from sizes.
        let stored = |raw: &[u8]| match self.compressed {
            Some(_) => reverse_bytes(raw),
            None => raw.to_vec(),
        };
        let mut cursor = self.header_size;
        let mut place = |payload_len: u64| {
            let at = cursor;
            cursor += align8(OBJECT_HEADER_SIZE + payload_len);
            at
        };

        let data_table = place(self.data_buckets * 16);
        let field_table = place(self.field_buckets * 16);
        let field_offsets: Vec<u64> = field_names
            .iter()
            .map(|n| place(24 + n.len() as u64))
            .collect();
        let data_offsets: Vec<u64> = slots
            .iter()
            .map(|s| place(48 + stored(&s.raw).len() as u64))
            .collect();
        let entry_offsets: Vec<u64> = entry_items
            .iter()
            .map(|items| place(48 + 16 * items.len() as u64))
            .collect();
        let page_payload = 8 + 8 * cap as u64;
        let root_offsets: Vec<u64> = (0..root_pages).map(|_| place(page_payload)).collect();
        let data_page_offsets: Vec<Vec<u64>> = data_pages
            .iter()
            .map(|&n| (0..n).map(|_| place(page_payload)).collect())
            .collect();
        let tag_offset = self.seal_key.as_ref().map(|_| place(16 + TAG_LENGTH as u64));
        let arena_end = cursor;

        // Pass 2: objects with links.
        let mut objects: Vec<(u64, Object, ObjectFlags)> = Vec::new();
        let flags = self.compressed.map_or(ObjectFlags::NONE, ObjectFlags::from);

        let (data_buckets, data_next) = chain_buckets(
            self.data_buckets,
            slots.iter().map(|s| hash64(&s.raw)).zip(data_offsets.iter().copied()),
        );
        let (field_buckets, field_next) = chain_buckets(
            self.field_buckets,
            field_names.iter().map(|n| hash64(n)).zip(field_offsets.iter().copied()),
        );
        objects.push((
            data_table,
            Object::DataHashTable(HashTableObject {
                items: data_buckets,
            }),
            ObjectFlags::NONE,
        ));
        objects.push((
            field_table,
            Object::FieldHashTable(HashTableObject {
                items: field_buckets,
            }),
            ObjectFlags::NONE,
        ));

        for (f, name) in field_names.iter().enumerate() {
            let head = slots
                .iter()
                .position(|s| s.field == f)
                .map_or(0, |d| data_offsets[d]);
            objects.push((
                field_offsets[f],
                Object::Field(FieldObject {
                    hash: hash64(name),
                    next_hash_offset: field_next[f],
                    head_data_offset: head,
                    payload: name.clone(),
                }),
                ObjectFlags::NONE,
            ));
        }

        for (d, slot) in slots.iter().enumerate() {
            let next_field = slots
                .iter()
                .enumerate()
                .skip(d + 1)
                .find(|(_, s)| s.field == slot.field)
                .map_or(0, |(i, _)| data_offsets[i]);
            objects.push((
                data_offsets[d],
                Object::Data(DataObject {
                    hash: hash64(&slot.raw),
                    next_hash_offset: data_next[d],
                    next_field_offset: next_field,
                    entry_offset: slot.entries.first().map_or(0, |&e| entry_offsets[e]),
                    entry_array_offset: data_page_offsets[d].first().copied().unwrap_or(0),
                    n_entries: slot.entries.len() as u64,
                    payload: stored(&slot.raw),
                }),
                flags,
            ));
        }

        let seqnum = |e: usize| self.first_seqnum + e as u64;
        for (e, items) in entry_items.iter().enumerate() {
            let spec = &self.entries[e];
            let items: Vec<EntryItem> = items
                .iter()
                .map(|&d| EntryItem {
                    object_offset: data_offsets[d],
                    hash: hash64(&slots[d].raw),
                })
                .collect();
            objects.push((
                entry_offsets[e],
                Object::Entry(EntryObject {
                    seqnum: seqnum(e),
                    realtime: spec.realtime,
                    monotonic: spec.monotonic,
                    boot_id: self.boot_id,
                    xor_hash: items.iter().fold(0, |acc, i| acc ^ i.hash),
                    items,
                }),
                ObjectFlags::NONE,
            ));
        }

        objects.extend(entry_array_chain(&root_offsets, &entry_offsets, cap));
        for (d, slot) in slots.iter().enumerate() {
            let rest: Vec<u64> = slot.entries.iter().skip(1).map(|&e| entry_offsets[e]).collect();
            objects.extend(entry_array_chain(&data_page_offsets[d], &rest, cap));
        }
        objects.sort_by_key(|(offset, _, _)| *offset);

        let data_arrays: usize = data_page_offsets.iter().map(Vec::len).sum();
        let n_entry_arrays = (root_offsets.len() + data_arrays) as u64;
        let n_objects = objects.len() as u64 + u64::from(tag_offset.is_some());
        let last = self.entries.len().checked_sub(1);
        let header = JournalHeader {
            compatible_flags: if self.seal_key.is_some() {
                CompatibleFlags::SEALED
            } else {
                CompatibleFlags::from_bits(0)
            },
            incompatible_flags: match self.compressed {
                Some(Compression::Xz) => IncompatibleFlags::COMPRESSED_XZ,
                Some(Compression::Lz4) => IncompatibleFlags::COMPRESSED_LZ4,
                None => IncompatibleFlags::from_bits(0),
            },
            state: JournalState::Archived,
            reserved: [0; 7],
            file_id: Uuid::from_bytes([0xF1; 16]),
            machine_id: Uuid::from_bytes([0xAC; 16]),
            boot_id: self.boot_id,
            seqnum_id: Uuid::from_bytes([0x5E; 16]),
            header_size: self.header_size,
            arena_size: arena_end - self.header_size,
            data_hash_table_offset: data_table + OBJECT_HEADER_SIZE,
            data_hash_table_size: self.data_buckets * 16,
            field_hash_table_offset: field_table + OBJECT_HEADER_SIZE,
            field_hash_table_size: self.field_buckets * 16,
            tail_object_offset: tag_offset
                .or_else(|| objects.last().map(|(offset, _, _)| *offset))
                .unwrap_or(0),
            n_objects,
            n_entries: self.entries.len() as u64,
            tail_entry_seqnum: last.map_or(0, seqnum),
            head_entry_seqnum: if last.is_some() { self.first_seqnum } else { 0 },
            entry_array_offset: root_offsets.first().copied().unwrap_or(0),
            head_entry_realtime: self.entries.first().map_or(0, |e| e.realtime),
            tail_entry_realtime: self.entries.last().map_or(0, |e| e.realtime),
            tail_entry_monotonic: self.entries.last().map_or(0, |e| e.monotonic),
            n_data: slots.len() as u64,
            n_fields: field_names.len() as u64,
            n_tags: u64::from(tag_offset.is_some()),
            n_entry_arrays,
        };

        let mut bytes = header.encode();
        bytes.resize(self.header_size as usize, 0);
        for (offset, object, flags) in &objects {
            debug_assert_eq!(bytes.len() as u64, *offset);
            bytes.extend(object.encode(*flags));
        }

        if let (Some(offset), Some(key)) = (tag_offset, &self.seal_key) {
            let tag = toy_mac(key, 0, &bytes[..offset as usize]);
            bytes.extend(
                Object::Tag(TagObject {
                    seqnum: 1,
                    epoch: 0,
                    tag,
                })
                .encode(ObjectFlags::NONE),
            );
        }
        debug_assert_eq!(bytes.len() as u64, arena_end);

        let mut all_offsets: Vec<u64> = objects.iter().map(|(o, _, _)| *o).collect();
        all_offsets.extend(tag_offset);

        let layout = Layout {
            header_size: self.header_size,
            data_hash_table: data_table,
            field_hash_table: field_table,
            fields: field_names
                .iter()
                .zip(&field_offsets)
                .map(|(n, &o)| (String::from_utf8_lossy(n).into_owned(), o))
                .collect(),
            data: slots
                .iter()
                .zip(&data_offsets)
                .map(|(s, &o)| (s.raw.clone(), o))
                .collect(),
            entries: entry_offsets,
            entry_arrays: root_offsets,
            data_entry_arrays: data_offsets
                .iter()
                .zip(&data_page_offsets)
                .filter_map(|(&d, pages)| pages.first().map(|&p| (d, p)))
                .collect(),
            tag: tag_offset,
            objects: all_offsets,
        };

        BuiltJournal {
            bytes,
            header,
            layout,
        }
    }
}

fn align8(size: u64) -> u64 {
    size.div_ceil(8) * 8
}

/// Buckets `(hash, offset)` pairs in insertion order. Returns the bucket
/// items and each object's `next_hash_offset`.
fn chain_buckets(
    buckets: u64,
    objects: impl Iterator<Item = (u64, u64)>,
) -> (Vec<HashItem>, Vec<u64>) {
    let mut items = vec![HashItem::default(); buckets as usize];
    let mut last_in_bucket: HashMap<usize, usize> = HashMap::new();
    let mut next = Vec::new();

    for (i, (hash, offset)) in objects.enumerate() {
        next.push(0);
        if buckets == 0 {
            continue;
        }
        let b = (hash % buckets) as usize;
        match last_in_bucket.insert(b, i) {
            Some(prev) => next[prev] = offset,
            None => items[b].head_hash_offset = offset,
        }
        items[b].tail_hash_offset = offset;
    }

    (items, next)
}

/// Pages listing `entries`, `cap` per page, chained in order.
fn entry_array_chain(
    pages: &[u64],
    entries: &[u64],
    cap: usize,
) -> Vec<(u64, Object, ObjectFlags)> {
    pages
        .iter()
        .enumerate()
        .map(|(p, &offset)| {
            let mut items: Vec<u64> = entries.iter().skip(p * cap).take(cap).copied().collect();
            items.resize(cap, 0);
            (
                offset,
                Object::EntryArray(EntryArrayObject {
                    next_entry_array_offset: pages.get(p + 1).copied().unwrap_or(0),
                    items,
                }),
                ObjectFlags::NONE,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jfile_core::{Journal, ReaderConfig};
    use jfile_storage::InMemorySource;

    fn open(built: &BuiltJournal) -> Journal<InMemorySource> {
        Journal::open(InMemorySource::new(built.bytes.clone()), ReaderConfig::default())
            .expect("built journal opens")
    }

    #[test]
    fn hash64_known_values() {
        assert_eq!(hash64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(hash64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn empty_journal() {
        let built = JournalBuilder::new().build();
        assert_eq!(built.header.n_entries, 0);
        assert_eq!(built.header.entry_array_offset, 0);
        assert_eq!(built.layout.objects.len(), 2);

        let journal = open(&built);
        assert_eq!(journal.records().count(), 0);
        assert!(journal.stats().unwrap().matches_header());
    }

    #[test]
    fn data_is_deduplicated() {
        let built = JournalBuilder::new()
            .entry(EntrySpec::new(10, &[("MESSAGE", "a"), ("UNIT", "x")]))
            .entry(EntrySpec::new(20, &[("MESSAGE", "b"), ("UNIT", "x")]))
            .build();
        assert_eq!(built.header.n_data, 3);
        assert_eq!(built.header.n_fields, 2);
        assert_eq!(built.layout.data.len(), 3);
    }

    #[test]
    fn every_object_is_aligned_and_counted() {
        let built = JournalBuilder::new()
            .header_size(256)
            .entry_array_capacity(2)
            .entries((0..5).map(|i| EntrySpec::new(i, &[("N", i.to_string().as_str())])))
            .build();

        let journal = open(&built);
        let offsets: Vec<u64> = journal.objects().map(|o| o.unwrap().offset).collect();
        assert_eq!(offsets, built.layout.objects);
        assert!(offsets.iter().all(|o| o % 8 == 0));
        assert_eq!(built.layout.entry_arrays.len(), 3);
        assert!(journal.stats().unwrap().matches_header());
    }

    #[test]
    fn sealed_journal_ends_with_tag() {
        let built = JournalBuilder::new()
            .sealed(b"key")
            .entry(EntrySpec::new(1, &[("A", "1")]))
            .build();
        let tag = built.layout.tag.unwrap();
        assert_eq!(built.header.tail_object_offset, tag);
        assert_eq!(built.bytes.len() as u64, tag + 64);
        assert!(built.header.is_sealed());
    }
}
