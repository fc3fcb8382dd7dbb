//! Field metadata cache.
//!
//! Concurrent map from field name to [`FieldMetadata`], filled by backend
//! field introspection and read by the presentation layer to list fields and
//! show which ones occur in the current results.
//!
//! Records are stored as `Arc<FieldMetadata>` and never mutated in place: an
//! update swaps in a new record, so a reader holding a record never sees a
//! half-written one.

use crate::domain::FieldMetadata;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded, concurrent field metadata store.
#[derive(Debug)]
pub struct FieldCache {
    entries: DashMap<String, Arc<FieldMetadata>>,
    /// Slots reserved by distinct names; never exceeds `capacity`.
    reserved: AtomicUsize,
    /// Shared by inserts, exclusive for `clear`, so a reset never races a
    /// reservation.
    gate: RwLock<()>,
    capacity: usize,
}

impl FieldCache {
    /// Creates an empty cache holding at most `capacity` distinct fields.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            reserved: AtomicUsize::new(0),
            gate: RwLock::new(()),
            capacity,
        }
    }

    /// Returns the record for `name`, if known.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<FieldMetadata>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Inserts or replaces the record for `name`.
    ///
    /// Replacing an existing field always succeeds. A new field is rejected
    /// once the cache is at capacity.
    ///
    /// # Returns
    ///
    /// `true` if the record was stored.
    pub fn insert(&self, name: impl Into<String>, metadata: FieldMetadata) -> bool {
        let _gate = self.gate.read();
        match self.entries.entry(name.into()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(Arc::new(metadata));
                true
            }
            Entry::Vacant(vacant) => {
                let reserved = self
                    .reserved
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < self.capacity).then_some(n + 1)
                    });
                if reserved.is_err() {
                    tracing::warn!(field = %vacant.key(), capacity = self.capacity, "field cache full, dropping field");
                    return false;
                }
                vacant.insert(Arc::new(metadata));
                true
            }
        }
    }

    /// Stores a batch of introspection results.
    ///
    /// The `active` flag of already known fields is carried over so that a
    /// metadata refresh does not hide columns of the current result set.
    ///
    /// # Returns
    ///
    /// Number of records stored.
    pub fn insert_all<I>(&self, fields: I) -> usize
    where
        I: IntoIterator<Item = (String, FieldMetadata)>,
    {
        let mut stored = 0;
        for (name, metadata) in fields {
            let active = self.get(&name).is_some_and(|m| m.active);
            if self.insert(name, metadata.with_active(active)) {
                stored += 1;
            }
        }
        tracing::debug!(stored, total = self.entries.len(), "field metadata cached");
        stored
    }

    /// Marks exactly the given fields as present in the current results.
    ///
    /// Every other known field is marked inactive. Unknown names are ignored.
    pub fn mark_active<S: AsRef<str>>(&self, present: &[S]) {
        let present: HashSet<&str> = present.iter().map(AsRef::as_ref).collect();
        for mut entry in self.entries.iter_mut() {
            let active = present.contains(entry.key().as_str());
            if entry.value().active != active {
                let replaced = Arc::new(entry.value().with_active(active));
                *entry.value_mut() = replaced;
            }
        }
    }

    /// All known field names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Names of fields present in the current results, sorted.
    #[must_use]
    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().active)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of known fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no field is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every record.
    pub fn clear(&self) {
        let _gate = self.gate.write();
        self.entries.clear();
        self.reserved.store(0, Ordering::Release);
    }
}
