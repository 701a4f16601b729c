//! Traversal of the offset graph.
//!
//! Objects refer to each other by absolute file offset. Every link is
//! resolved through [`Journal::object_at`], which checks bounds, alignment
//! and type before the target is used, and every chain walk is bounded by a
//! header counter so a corrupted link cannot loop forever.

use crate::error::{CoreError, CoreResult, FormatError, IntegrityError};
use crate::journal::{DataRef, Journal};
use crate::object::{DecodedObject, EntryObject, ObjectType, HASH_ITEM_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use jfile_storage::ByteSource;
use std::sync::Arc;
use tracing::debug;

/// Streams entry offsets from an entry-array chain.
///
/// Zero items are unused slots and are skipped. Page visits are bounded by
/// [`JournalHeader::entry_array_limit`](crate::JournalHeader::entry_array_limit).
pub struct EntryOffsets<'j, S: ByteSource> {
    journal: &'j Journal<S>,
    next_array: u64,
    page: std::vec::IntoIter<u64>,
    pages_visited: u64,
    page_limit: u64,
    remaining_items: Option<u64>,
    finished: bool,
}

impl<'j, S: ByteSource> EntryOffsets<'j, S> {
    fn new(journal: &'j Journal<S>, start: u64, max_items: Option<u64>) -> Self {
        Self {
            journal,
            next_array: start,
            page: Vec::new().into_iter(),
            pages_visited: 0,
            page_limit: journal.header().entry_array_limit(),
            remaining_items: max_items,
            finished: false,
        }
    }

    /// Number of entry-array pages read so far.
    #[must_use]
    pub fn pages_visited(&self) -> u64 {
        self.pages_visited
    }

    fn read_next(&mut self) -> CoreResult<Option<u64>> {
        if self.remaining_items == Some(0) {
            return Ok(None);
        }

        loop {
            if let Some(item) = self.page.by_ref().find(|&item| item != 0) {
                if let Some(remaining) = self.remaining_items.as_mut() {
                    *remaining -= 1;
                }
                return Ok(Some(item));
            }

            if self.next_array == 0 {
                return Ok(None);
            }
            if self.pages_visited >= self.page_limit {
                return Err(FormatError::CyclicLink {
                    offset: self.next_array,
                    limit: self.page_limit,
                }
                .into());
            }

            let array = self.journal.entry_array_at(self.next_array)?;
            self.pages_visited += 1;
            self.next_array = array.next_entry_array_offset;
            self.page = array.items.into_iter();
        }
    }
}

impl<S: ByteSource> Iterator for EntryOffsets<'_, S> {
    type Item = CoreResult<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(offset)) => Some(Ok(offset)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Walks one hash bucket, yielding the objects whose stored hash matches.
///
/// Steps are bounded by `n_objects`.
pub struct HashChain<'j, S: ByteSource> {
    journal: &'j Journal<S>,
    hash: u64,
    kind: Option<ObjectType>,
    next: u64,
    steps: u64,
    limit: u64,
    finished: bool,
}

impl<'j, S: ByteSource> HashChain<'j, S> {
    /// Number of chain links followed so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn read_next(&mut self) -> CoreResult<Option<Arc<DecodedObject>>> {
        loop {
            if self.next == 0 {
                return Ok(None);
            }
            if self.steps >= self.limit {
                return Err(FormatError::CyclicLink {
                    offset: self.next,
                    limit: self.limit,
                }
                .into());
            }

            let offset = self.next;
            let object = self.journal.object_at(offset)?;
            self.steps += 1;

            let found = object.object.object_type();
            if let Some(expected) = self.kind {
                if found != expected {
                    return Err(FormatError::UnexpectedObjectType {
                        offset,
                        expected,
                        found,
                    }
                    .into());
                }
            }
            let (hash, next) = object.object.hash_link().ok_or(
                FormatError::UnexpectedObjectType {
                    offset,
                    expected: ObjectType::Data,
                    found,
                },
            )?;

            self.next = next;
            if hash == self.hash {
                return Ok(Some(object));
            }
        }
    }
}

impl<S: ByteSource> Iterator for HashChain<'_, S> {
    type Item = CoreResult<Arc<DecodedObject>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(object)) => Some(Ok(object)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Walks the DATA objects of one field through `next_field_offset`.
///
/// Steps are bounded by `n_objects`.
pub struct FieldData<'j, S: ByteSource> {
    journal: &'j Journal<S>,
    next: u64,
    steps: u64,
    limit: u64,
    finished: bool,
}

impl<S: ByteSource> FieldData<'_, S> {
    fn read_next(&mut self) -> CoreResult<Option<DataRef>> {
        if self.next == 0 {
            return Ok(None);
        }
        if self.steps >= self.limit {
            return Err(FormatError::CyclicLink {
                offset: self.next,
                limit: self.limit,
            }
            .into());
        }
        let data = self.journal.data_at(self.next)?;
        self.steps += 1;
        self.next = data.data.next_field_offset;
        Ok(Some(data))
    }
}

impl<S: ByteSource> Iterator for FieldData<'_, S> {
    type Item = CoreResult<DataRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(data)) => Some(Ok(data)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// An ENTRY object with its items resolved to DATA objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    /// Offset of the ENTRY object.
    pub offset: u64,
    /// The decoded entry.
    pub entry: EntryObject,
    /// Resolved DATA objects, in item order. Corrupt items are excluded.
    pub data: Vec<DataRef>,
    /// Integrity issues found while resolving (report mode only).
    pub issues: Vec<IntegrityError>,
}

impl ResolvedEntry {
    /// XOR of the hashes of the resolved DATA objects.
    #[must_use]
    pub fn computed_xor(&self) -> u64 {
        self.data.iter().fold(0, |acc, d| acc ^ d.data.hash)
    }
}

impl<S: ByteSource> Journal<S> {
    /// Returns the offsets of every entry in file order, following the root
    /// entry-array chain from `entry_array_offset`.
    #[must_use]
    pub fn entries_in_order(&self) -> EntryOffsets<'_, S> {
        EntryOffsets::new(self, self.header().entry_array_offset, None)
    }

    /// Decodes the ENTRY at `offset` and resolves each item to its DATA object.
    ///
    /// An item whose stored hash differs from the DATA object's hash
    /// ([`IntegrityError::HashMismatch`]) or whose offset does not lead to a
    /// DATA object ([`IntegrityError::UnresolvedItem`]) is excluded and
    /// reported.
    ///
    /// # Errors
    ///
    /// - any error from [`Journal::entry_at`]
    /// - [`CoreError::Integrity`] for a corrupt item in strict mode
    /// - storage errors and cancellation while resolving items
    pub fn resolve_entry(&self, offset: u64) -> CoreResult<ResolvedEntry> {
        let entry = self.entry_at(offset)?;
        let mut data = Vec::with_capacity(entry.items.len());
        let mut issues = Vec::new();

        for item in &entry.items {
            match self.data_at(item.object_offset) {
                Ok(resolved) if resolved.data.hash == item.hash => data.push(resolved),
                Ok(resolved) => self.report(
                    IntegrityError::HashMismatch {
                        entry_offset: offset,
                        data_offset: item.object_offset,
                        expected: item.hash,
                        found: resolved.data.hash,
                    },
                    &mut issues,
                )?,
                Err(CoreError::Format(cause)) => self.report(
                    IntegrityError::UnresolvedItem {
                        entry_offset: offset,
                        data_offset: item.object_offset,
                        cause,
                    },
                    &mut issues,
                )?,
                Err(e) => return Err(e),
            }
        }

        Ok(ResolvedEntry {
            offset,
            entry,
            data,
            issues,
        })
    }

    /// Looks up `hash` in the hash table whose items start at `table_offset`
    /// and span `table_size` bytes.
    ///
    /// Only the bucket `hash % (table_size / 16)` is read; the returned
    /// iterator walks its chain lazily and yields DATA or FIELD objects whose
    /// stored hash equals `hash`.
    ///
    /// # Errors
    ///
    /// - [`FormatError::OffsetOutOfBounds`] / [`FormatError::MisalignedOffset`]
    ///   if the table does not lie inside the arena
    /// - storage errors reading the bucket
    pub fn lookup_by_hash(
        &self,
        hash: u64,
        table_offset: u64,
        table_size: u64,
    ) -> CoreResult<HashChain<'_, S>> {
        self.hash_chain(hash, table_offset, table_size, None)
    }

    /// Looks up DATA objects by hash in the header's data hash table.
    ///
    /// # Errors
    ///
    /// As [`Journal::lookup_by_hash`].
    pub fn find_data(&self, hash: u64) -> CoreResult<HashChain<'_, S>> {
        let h = self.header();
        self.hash_chain(
            hash,
            h.data_hash_table_offset,
            h.data_hash_table_size,
            Some(ObjectType::Data),
        )
    }

    /// Looks up FIELD objects by hash in the header's field hash table.
    ///
    /// # Errors
    ///
    /// As [`Journal::lookup_by_hash`].
    pub fn find_field(&self, hash: u64) -> CoreResult<HashChain<'_, S>> {
        let h = self.header();
        self.hash_chain(
            hash,
            h.field_hash_table_offset,
            h.field_hash_table_size,
            Some(ObjectType::Field),
        )
    }

    fn hash_chain(
        &self,
        hash: u64,
        table_offset: u64,
        table_size: u64,
        kind: Option<ObjectType>,
    ) -> CoreResult<HashChain<'_, S>> {
        let buckets = table_size / HASH_ITEM_SIZE;
        let head = if buckets == 0 {
            0
        } else {
            self.check_link(table_offset)?;
            let table_end = table_offset.checked_add(table_size);
            if table_end.map_or(true, |end| end > self.header().arena_end()) {
                return Err(FormatError::ObjectOverrun {
                    offset: table_offset,
                    size: table_size,
                    arena_end: self.header().arena_end(),
                }
                .into());
            }

            let bucket = hash % buckets;
            let bucket_offset = table_offset + bucket * HASH_ITEM_SIZE;
            self.cancellation().check()?;
            let item = self.read_bytes(bucket_offset, HASH_ITEM_SIZE as usize)?;
            debug!(hash, bucket, bucket_offset, "hash table lookup");
            LittleEndian::read_u64(&item[..8])
        };

        Ok(HashChain {
            journal: self,
            hash,
            kind,
            next: head,
            steps: 0,
            limit: self.header().n_objects,
            finished: false,
        })
    }

    /// Walks the DATA objects that share the FIELD at `field_offset`.
    ///
    /// # Errors
    ///
    /// Any error from [`Journal::field_at`].
    pub fn field_data(&self, field_offset: u64) -> CoreResult<FieldData<'_, S>> {
        let field = self.field_at(field_offset)?;
        Ok(FieldData {
            journal: self,
            next: field.head_data_offset,
            steps: 0,
            limit: self.header().n_objects,
            finished: false,
        })
    }

    /// Returns the offsets of the entries referencing the DATA at
    /// `data_offset`: its `entry_offset`, then its own entry-array chain,
    /// `n_entries` offsets in total.
    ///
    /// # Errors
    ///
    /// Any error from [`Journal::data_at`]; errors along the chain are
    /// yielded by the iterator.
    pub fn entries_for_data(
        &self,
        data_offset: u64,
    ) -> CoreResult<impl Iterator<Item = CoreResult<u64>> + '_> {
        let data = self.data_at(data_offset)?.data;

        let first = (data.entry_offset != 0 && data.n_entries > 0).then_some(data.entry_offset);
        let rest = data.n_entries - u64::from(first.is_some());
        let chain = EntryOffsets::new(self, data.entry_array_offset, Some(rest));

        Ok(first.into_iter().map(Ok).chain(chain))
    }
}
