//! Offset-keyed cache of decoded objects.

use crate::object::DecodedObject;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Insert-once map from file offset to decoded object.
///
/// The file never changes under the reader, so an entry is never replaced:
/// the first decode of an offset wins and later inserts return it.
#[derive(Debug, Default)]
pub struct ObjectCache {
    objects: RwLock<HashMap<u64, Arc<DecodedObject>>>,
}

impl ObjectCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object cached at `offset`.
    #[must_use]
    pub fn get(&self, offset: u64) -> Option<Arc<DecodedObject>> {
        self.objects.read().get(&offset).cloned()
    }

    /// Inserts `object` unless the offset is already cached; returns the
    /// cached value either way.
    pub fn insert(&self, object: DecodedObject) -> Arc<DecodedObject> {
        let mut objects = self.objects.write();
        objects
            .entry(object.offset)
            .or_insert_with(|| Arc::new(object))
            .clone()
    }

    /// Number of cached objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Checks if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Drops every cached object.
    pub fn clear(&self) {
        self.objects.write().clear();
    }
}
