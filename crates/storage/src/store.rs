//! Index storage
//!
//! [`IndexStore`] owns every [`AttributeIndex`] of one registry and keeps
//! them in lockstep with its members:
//!
//! - the identity index always exists and is always first
//! - every member sits in exactly one bucket of every index
//! - every mutating call is all-or-nothing: keys are computed for every
//!   index before any bucket is touched, so a missing attribute leaves
//!   the store exactly as it was
//!
//! The store also records, per member, the key it currently sits under in
//! each index. Removal and relocation use that recorded key instead of
//! re-reading the record, so a record that changed in the meantime can
//! never be left behind in a stale bucket.

use rustc_hash::{FxHashMap, FxHashSet};
use setdex_core::{read_attribute, IndexSpec, Record, RecordId, RegistryError, Result, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::index::AttributeIndex;

/// Bucket contents of every index, ordered for inspection
pub type IndexSnapshot = BTreeMap<IndexSpec, BTreeMap<Value, Vec<RecordId>>>;

/// The set of indexes of one registry
#[derive(Debug, Clone)]
pub struct IndexStore {
    /// Identity index first, then declaration order
    indexes: Vec<AttributeIndex>,
    /// Member → current key in each index (parallel to `indexes`)
    memberships: FxHashMap<RecordId, Vec<Value>>,
}

impl IndexStore {
    /// Create a store holding only the identity index
    pub fn new() -> Self {
        Self {
            indexes: vec![AttributeIndex::new(IndexSpec::identity())],
            memberships: FxHashMap::default(),
        }
    }

    /// Create an empty store with `specs` declared
    ///
    /// Duplicate specs and the identity spec are ignored.
    pub fn with_indexes(specs: &[IndexSpec]) -> Self {
        let mut store = Self::new();
        for spec in specs {
            if store.position(spec).is_none() {
                store.indexes.push(AttributeIndex::new(spec.clone()));
            }
        }
        store
    }

    fn position(&self, spec: &IndexSpec) -> Option<usize> {
        self.indexes.iter().position(|i| i.spec() == spec)
    }

    fn keys_of<R: Record + ?Sized>(&self, record: &R, operation: &'static str) -> Result<Vec<Value>> {
        self.indexes
            .iter()
            .map(|index| index.key_of(record, operation))
            .collect()
    }

    // ========================================================================
    // Declaration
    // ========================================================================

    /// Build an index for `spec` over `records`
    ///
    /// `records` must be exactly the current members. Returns `false` if the
    /// index already existed (the identity index always does).
    ///
    /// # Errors
    /// Returns `MissingAttribute` if any record lacks an attribute of `spec`,
    /// and `InvalidIndex` if `records` repeats, skips or adds a member. The
    /// store is left unchanged either way.
    pub fn declare_index<'a, R, I>(&mut self, spec: IndexSpec, records: I) -> Result<bool>
    where
        R: Record + ?Sized + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        if self.position(&spec).is_some() {
            if !spec.is_identity() {
                warn!(target: "setdex::index", index = %spec, "Index already exists");
            }
            return Ok(false);
        }

        let mut index = AttributeIndex::new(spec);
        let mut keys: FxHashMap<RecordId, Value> = FxHashMap::default();
        for record in records {
            let id = record.record_id();
            let key = index.key_of(record, "indexed")?;
            if !self.memberships.contains_key(&id) {
                return Err(RegistryError::InvalidIndex(format!(
                    "{} was built over record {id}, which is not a member",
                    index.spec()
                )));
            }
            if keys.insert(id, key).is_some() {
                return Err(RegistryError::InvalidIndex(format!(
                    "{} was built over record {id} more than once",
                    index.spec()
                )));
            }
        }
        if keys.len() != self.memberships.len() {
            return Err(RegistryError::InvalidIndex(format!(
                "{} was built over {} of {} members",
                index.spec(),
                keys.len(),
                self.memberships.len()
            )));
        }

        for (id, key) in keys {
            index.insert(key.clone(), id);
            if let Some(current) = self.memberships.get_mut(&id) {
                current.push(key);
            }
        }
        debug!(
            target: "setdex::index",
            index = %index.spec(),
            buckets = index.len(),
            records = self.memberships.len(),
            "Index declared"
        );
        self.indexes.push(index);
        Ok(true)
    }

    /// Drop every index and rebuild identity plus `specs` in one scan
    ///
    /// Duplicate specs and the identity spec are ignored.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if any record lacks a declared attribute;
    /// the store is left unchanged.
    pub fn reindex_all<'a, R, I>(&mut self, specs: &[IndexSpec], records: I) -> Result<()>
    where
        R: Record + ?Sized + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut fresh = IndexStore::with_indexes(specs);
        for record in records {
            fresh.insert_keys(record.record_id(), fresh.keys_of(record, "indexed")?);
        }
        debug!(
            target: "setdex::index",
            indexes = fresh.indexes.len(),
            records = fresh.memberships.len(),
            "Indexes rebuilt"
        );
        *self = fresh;
        Ok(())
    }

    // ========================================================================
    // Membership
    // ========================================================================

    fn insert_keys(&mut self, id: RecordId, keys: Vec<Value>) {
        for (index, key) in self.indexes.iter_mut().zip(keys.iter()) {
            index.insert(key.clone(), id);
        }
        self.memberships.insert(id, keys);
    }

    /// Put `record` into its bucket in every index
    ///
    /// Re-inserting a member moves it to the buckets matching its current
    /// values and returns `false`.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if any declared attribute is unreadable;
    /// no index is touched.
    pub fn insert<R: Record + ?Sized>(&mut self, record: &R) -> Result<bool> {
        let keys = self.keys_of(record, "added")?;
        let id = record.record_id();

        if let Some(current) = self.memberships.get_mut(&id) {
            for ((index, old), new) in self.indexes.iter_mut().zip(current.iter()).zip(keys.iter()) {
                index.relocate(id, old, new.clone());
            }
            *current = keys;
            return Ok(false);
        }

        self.insert_keys(id, keys);
        Ok(true)
    }

    /// Take `record` out of every index
    ///
    /// Returns `false` if it was not a member.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if any declared attribute is unreadable;
    /// no index is touched.
    pub fn remove<R: Record + ?Sized>(&mut self, record: &R) -> Result<bool> {
        self.keys_of(record, "deleted")?;
        let id = record.record_id();
        let Some(keys) = self.memberships.remove(&id) else {
            return Ok(false);
        };
        for (index, key) in self.indexes.iter_mut().zip(keys.iter()) {
            index.remove(key, id);
        }
        Ok(true)
    }

    /// Move `record` to the buckets matching its current `attribute` value
    ///
    /// Every index covering `attribute` is updated, compound ones included.
    /// The record leaves the bucket it is recorded under, which need not be
    /// the `old` value reported by the caller. Returns whether any bucket
    /// changed; `old == new` and non-members are no-ops.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if a covering index's attribute is
    /// unreadable; no index is touched.
    pub fn relocate<R: Record + ?Sized>(
        &mut self,
        attribute: &str,
        record: &R,
        old: &Value,
        new: &Value,
    ) -> Result<bool> {
        if old == new {
            return Ok(false);
        }
        let id = record.record_id();
        let Some(current) = self.memberships.get_mut(&id) else {
            return Ok(false);
        };

        let mut targets = Vec::new();
        for (pos, index) in self.indexes.iter().enumerate() {
            if !index.spec().is_identity() && index.spec().covers(attribute) {
                targets.push((pos, index.key_of(record, "updated")?));
            }
        }

        let mut moved = false;
        for (pos, key) in targets {
            if current[pos] != key {
                self.indexes[pos].relocate(id, &current[pos], key.clone());
                current[pos] = key;
                moved = true;
            }
        }
        Ok(moved)
    }

    /// Check that `record` could be relocated once `attribute` is assigned
    ///
    /// Every other attribute of each index covering `attribute` must be
    /// readable. Non-members always pass.
    ///
    /// # Errors
    /// Returns `MissingAttribute` naming the first unreadable attribute.
    pub fn check_relocatable<R: Record + ?Sized>(&self, attribute: &str, record: &R) -> Result<()> {
        let id = record.record_id();
        if !self.memberships.contains_key(&id) {
            return Ok(());
        }
        let covering = self
            .indexes
            .iter()
            .map(AttributeIndex::spec)
            .filter(|spec| !spec.is_identity() && spec.covers(attribute));
        for spec in covering {
            for name in spec.attributes().iter().filter(|a| *a != attribute) {
                if read_attribute(record, name).is_none() {
                    return Err(RegistryError::missing_attribute(id, name.clone(), "updated"));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Records whose `attribute` equals `value`
    ///
    /// A value nobody holds yields `None`.
    ///
    /// # Errors
    /// Returns `IndexNotFound` if `attribute` has no simple index.
    pub fn lookup(&self, attribute: &str, value: &Value) -> Result<Option<&FxHashSet<RecordId>>> {
        self.simple_index(attribute)
            .map(|index| index.get(value))
            .ok_or_else(|| RegistryError::index_not_found(attribute, self.available()))
    }

    /// The simple index on `attribute`, if declared
    pub fn simple_index(&self, attribute: &str) -> Option<&AttributeIndex> {
        self.indexes
            .iter()
            .find(|i| !i.spec().is_compound() && i.spec().covers(attribute))
    }

    /// The compound index keyed by exactly `attributes`, if declared
    pub fn compound_index<'a, I>(&self, attributes: I) -> Option<&AttributeIndex>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.indexes
            .iter()
            .find(|i| i.spec().is_compound() && i.spec().matches_exactly(attributes.clone()))
    }

    /// The index for exactly `spec`, if declared
    pub fn index(&self, spec: &IndexSpec) -> Option<&AttributeIndex> {
        self.position(spec).map(|pos| &self.indexes[pos])
    }

    /// Key `id` is recorded under in `spec`'s index
    pub fn recorded_key(&self, id: RecordId, spec: &IndexSpec) -> Option<&Value> {
        let pos = self.position(spec)?;
        self.memberships.get(&id).map(|keys| &keys[pos])
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Declared specs, identity excluded, in declaration order
    pub fn specs(&self) -> Vec<IndexSpec> {
        self.indexes
            .iter()
            .filter(|i| !i.spec().is_identity())
            .map(|i| i.spec().clone())
            .collect()
    }

    /// Declared specs rendered for error messages
    pub fn available(&self) -> Vec<String> {
        self.specs().iter().map(ToString::to_string).collect()
    }

    /// Whether any index besides identity exists
    pub fn has_secondary(&self) -> bool {
        self.indexes.len() > 1
    }

    /// Whether `spec` is declared
    pub fn is_declared(&self, spec: &IndexSpec) -> bool {
        spec.is_identity() || self.position(spec).is_some()
    }

    /// Whether `id` is a member
    pub fn contains(&self, id: RecordId) -> bool {
        self.memberships.contains_key(&id)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.memberships.len()
    }

    /// Whether there are no members
    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty()
    }

    /// Ordered copy of every bucket of every index
    pub fn snapshot(&self) -> IndexSnapshot {
        self.indexes
            .iter()
            .map(|index| {
                let buckets = index
                    .buckets()
                    .map(|(key, ids)| {
                        let mut ids: Vec<RecordId> = ids.iter().copied().collect();
                        ids.sort();
                        (key.clone(), ids)
                    })
                    .collect();
                (index.spec().clone(), buckets)
            })
            .collect()
    }
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}
