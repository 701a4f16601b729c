//! Property-based test generators using proptest.
//!
//! Strategies for entries and whole journals that keep the format's
//! invariants, plus a few for deliberately hostile input.

use crate::builder::{EntrySpec, JournalBuilder};
use jfile_core::object::{DataObject, EntryArrayObject, EntryItem, EntryObject, HashItem};
use jfile_core::object::{FieldObject, HashTableObject, TagObject, TAG_LENGTH};
use jfile_core::Object;
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for field names: upper-case, digits and underscores.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z_][A-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for field values, including `=` and non-UTF-8 bytes.
pub fn field_value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for well-formed entries with 1 to 6 fields.
pub fn entry_strategy() -> impl Strategy<Value = EntrySpec> {
    (
        any::<u32>(),
        prop::collection::vec((field_name_strategy(), field_value_strategy()), 1..6),
    )
        .prop_map(|(realtime, fields)| {
            let payloads = fields
                .into_iter()
                .map(|(name, value)| {
                    let mut payload = name.into_bytes();
                    payload.push(b'=');
                    payload.extend(value);
                    payload
                })
                .collect();
            EntrySpec::raw(u64::from(realtime), payloads)
        })
}

/// Strategy for header sizes covering every optional-field group.
pub fn header_size_strategy() -> impl Strategy<Value = u64> {
    prop::sample::select(vec![208u64, 224, 240, 256])
}

/// Strategy for consistent journals with up to 24 entries.
pub fn journal_strategy() -> impl Strategy<Value = JournalBuilder> {
    (
        header_size_strategy(),
        1u64..32,
        1u64..8,
        1usize..6,
        prop::collection::vec(entry_strategy(), 0..24),
    )
        .prop_map(|(header_size, data_buckets, field_buckets, capacity, entries)| {
            JournalBuilder::new()
                .header_size(header_size)
                .data_buckets(data_buckets)
                .field_buckets(field_buckets)
                .entry_array_capacity(capacity)
                .entries(entries)
        })
}

/// Strategy for a single object of any kind.
pub fn object_strategy() -> impl Strategy<Value = Object> {
    let offset = || (0u64..1 << 20).prop_map(|o| o * 8);
    prop_oneof![
        prop::collection::vec(any::<u8>(), 48..80).prop_map(|payload| Object::Unused { payload }),
        (any::<u64>(), offset(), offset(), field_value_strategy()).prop_map(
            |(hash, next, entry, payload)| Object::Data(DataObject {
                hash,
                next_hash_offset: next,
                next_field_offset: 0,
                entry_offset: entry,
                entry_array_offset: 0,
                n_entries: 1,
                payload,
            })
        ),
        (any::<u64>(), offset(), field_name_strategy()).prop_map(|(hash, head, name)| {
            Object::Field(FieldObject {
                hash,
                next_hash_offset: 0,
                head_data_offset: head,
                payload: name.into_bytes(),
            })
        }),
        (
            any::<u64>(),
            any::<[u8; 16]>(),
            prop::collection::vec((offset(), any::<u64>()), 0..8)
        )
            .prop_map(|(seqnum, boot, items)| {
                let items: Vec<EntryItem> = items
                    .into_iter()
                    .map(|(object_offset, hash)| EntryItem {
                        object_offset,
                        hash,
                    })
                    .collect();
                Object::Entry(EntryObject {
                    seqnum,
                    realtime: seqnum / 3,
                    monotonic: seqnum / 5,
                    boot_id: Uuid::from_bytes(boot),
                    xor_hash: items.iter().fold(0, |acc, i| acc ^ i.hash),
                    items,
                })
            }),
        prop::collection::vec((offset(), offset()), 0..16).prop_map(|items| {
            Object::DataHashTable(HashTableObject {
                items: items
                    .into_iter()
                    .map(|(head, tail)| HashItem {
                        head_hash_offset: head,
                        tail_hash_offset: tail,
                    })
                    .collect(),
            })
        }),
        (offset(), prop::collection::vec(offset(), 0..16)).prop_map(|(next, items)| {
            Object::EntryArray(EntryArrayObject {
                next_entry_array_offset: next,
                items,
            })
        }),
        (any::<u64>(), any::<u64>(), any::<[u8; TAG_LENGTH]>())
            .prop_map(|(seqnum, epoch, tag)| Object::Tag(TagObject { seqnum, epoch, tag })),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::open_memory;
    use jfile_core::object::decode_object;
    use jfile_core::{JournalHeader, ObjectFlags, ReaderConfig};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn entries_have_a_field_separator(entry in entry_strategy()) {
            for payload in &entry.payloads {
                prop_assert!(payload.contains(&b'='));
            }
        }

        #[test]
        fn object_footprint_is_aligned(object in object_strategy(), offset in 0u64..1024) {
            let bytes = object.encode(ObjectFlags::NONE);
            let decoded = decode_object(offset * 8, &bytes).unwrap();
            prop_assert_eq!(decoded.footprint() % 8, 0);
            prop_assert_eq!(decoded.payload_len() + decoded.padding, decoded.footprint() - 16);
            prop_assert_eq!(decoded.footprint(), bytes.len() as u64);
            prop_assert_eq!(decoded.object, object);
        }

        #[test]
        fn header_reencodes_exactly(builder in journal_strategy()) {
            let built = builder.build();
            let header = JournalHeader::from_bytes(&built.bytes).unwrap();
            let encoded = header.encode();
            prop_assert_eq!(&encoded[..], &built.bytes[..encoded.len()]);
        }

        #[test]
        fn built_journals_read_back(builder in journal_strategy()) {
            let built = builder.build();
            let journal = open_memory(built.bytes, ReaderConfig::new().strict()).unwrap();
            let mut n = 0;
            for record in journal.records() {
                let record = record.unwrap();
                prop_assert!(record.is_clean());
                n += 1;
            }
            prop_assert_eq!(n, built.header.n_entries);
            prop_assert!(journal.stats().unwrap().matches_header());
        }
    }
}
