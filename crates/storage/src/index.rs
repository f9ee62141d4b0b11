//! Secondary indices for equality queries
//!
//! An [`AttributeIndex`] maps one attribute's value (or, for a compound
//! index, the tuple of several attributes' values) to the set of records
//! currently holding it. Lookups are O(1) in the number of records.
//!
//! Buckets are pruned as soon as their last record leaves, so the number of
//! buckets always equals the number of distinct live keys.

use rustc_hash::{FxHashMap, FxHashSet};
use setdex_core::{read_attribute, IndexSpec, Record, RecordId, RegistryError, Result, Value};

/// Secondary index: key value → RecordIds
#[derive(Debug, Clone)]
pub struct AttributeIndex {
    spec: IndexSpec,
    buckets: FxHashMap<Value, FxHashSet<RecordId>>,
}

impl AttributeIndex {
    /// Create a new empty index for `spec`
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            buckets: FxHashMap::default(),
        }
    }

    /// The attributes this index is keyed by
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Compute the key `record` belongs under
    ///
    /// A simple index uses the attribute value as is; a compound index uses
    /// the tuple of its attribute values in declaration order.
    ///
    /// # Errors
    /// Returns `MissingAttribute` naming the first attribute `record` cannot
    /// provide. `operation` is the past-tense verb used in the message.
    pub fn key_of<R: Record + ?Sized>(&self, record: &R, operation: &'static str) -> Result<Value> {
        let attributes = self.spec.attributes();
        let read = |name: &String| {
            read_attribute(record, name).ok_or_else(|| {
                RegistryError::missing_attribute(record.record_id(), name.clone(), operation)
            })
        };
        if attributes.len() == 1 {
            read(&attributes[0])
        } else {
            attributes
                .iter()
                .map(read)
                .collect::<Result<Vec<Value>>>()
                .map(Value::Tuple)
        }
    }

    /// Add record to key's bucket
    ///
    /// Creates the bucket if this is the first record with that key.
    pub fn insert(&mut self, key: Value, id: RecordId) {
        self.buckets.entry(key).or_default().insert(id);
    }

    /// Remove record from key's bucket
    ///
    /// If the bucket becomes empty, removes it entirely to avoid
    /// accumulating empty sets. Returns whether the record was present.
    pub fn remove(&mut self, key: &Value, id: RecordId) -> bool {
        let Some(ids) = self.buckets.get_mut(key) else {
            return false;
        };
        let removed = ids.remove(&id);
        if ids.is_empty() {
            self.buckets.remove(key);
        }
        removed
    }

    /// Move a record from one bucket to another
    ///
    /// No-op when the keys are equal.
    pub fn relocate(&mut self, id: RecordId, from: &Value, to: Value) {
        if from == &to {
            return;
        }
        self.remove(from, id);
        self.insert(to, id);
    }

    /// Get all records for a key
    ///
    /// Returns None if no record currently holds that key.
    pub fn get(&self, key: &Value) -> Option<&FxHashSet<RecordId>> {
        self.buckets.get(key)
    }

    /// Whether `id` sits in the bucket for `key`
    pub fn contains(&self, key: &Value, id: RecordId) -> bool {
        self.buckets.get(key).is_some_and(|ids| ids.contains(&id))
    }

    /// Iterate over `(key, records)` buckets in arbitrary order
    pub fn buckets(&self) -> impl Iterator<Item = (&Value, &FxHashSet<RecordId>)> {
        self.buckets.iter()
    }

    /// Remove every bucket
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Get the number of distinct keys in the index
    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}
