//! The registry façade
//!
//! A [`Registry`] is a set of shared records (`Arc<T>`, unique by
//! [`RecordId`]) with secondary indexes for equality queries. All mutable
//! state lives behind one [`ConcurrencyGuard`]; every public operation
//! enters it exactly once.
//!
//! ## Keeping indexes current
//!
//! While at least one secondary index is declared, the registry subscribes
//! to the [`Watchers`] of each member. A record reporting a change is
//! relocated to the buckets matching its current values and the query
//! cache is cleared. [`Registry::set`] does the same for records that can
//! be assigned by name but report nothing themselves.
//!
//! ## Queries
//!
//! `filter`, `count_where` and `find` go through the query cache;
//! `exists` never does. Empty criteria match nothing.
//!
//! [`Watchers`]: setdex_core::Watchers

use parking_lot::MutexGuard;
use setdex_concurrency::{ConcurrencyGuard, GuardMode};
use setdex_core::{
    read_attribute, ChangeListener, Criteria, IndexSpec, Record, RecordId, RegistryError, Result,
    Value, IDENTITY_ATTRIBUTE,
};
use setdex_storage::{IndexSnapshot, IndexStore};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::cache::{CacheStats, QueryCache};
use crate::config::RegistryConfig;
use crate::notifier::ChangeNotifier;
use crate::query;

/// Everything the guard protects
struct State<T: Record + 'static> {
    items: BTreeMap<RecordId, Arc<T>>,
    store: IndexStore,
    notifier: ChangeNotifier,
    cache: QueryCache,
}

impl<T: Record + 'static> State<T> {
    /// Ids matching `criteria`, paginated, through the cache
    fn matching_ids(&mut self, criteria: &Criteria) -> Result<Vec<RecordId>> {
        let State { store, cache, .. } = self;
        let key = criteria.key();
        if let Some(ids) = cache.lookup(&key) {
            return Ok(ids);
        }
        let plan = query::plan(store, criteria)?;
        let ids = criteria.paginate(query::resolve(&plan));
        cache.store(key, &ids);
        Ok(ids)
    }

    fn records(&self, ids: &[RecordId]) -> Vec<Arc<T>> {
        ids.iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect()
    }

    fn attach_all(&mut self) {
        for item in self.items.values() {
            self.notifier.attach(&**item);
        }
    }

    fn detach_all(&mut self) {
        self.notifier
            .detach_all(self.items.values().map(|item| &**item));
    }
}

struct Shared<T: Record + 'static> {
    guard: ConcurrencyGuard<State<T>>,
    cache_capacity: usize,
}

impl<T: Record + 'static> ChangeListener for Shared<T> {
    fn attribute_changed(&self, record: RecordId, attribute: &str, old: &Value, new: &Value) {
        let mut guard = match self.guard.enter("update") {
            Ok(guard) => guard,
            Err(e) => {
                warn!(target: "setdex::registry", %record, attribute, error = %e, "Change notification dropped");
                return;
            }
        };
        let state = &mut *guard;
        let Some(item) = state.items.get(&record).cloned() else {
            return;
        };
        if let Err(e) = state.notifier.on_attribute_changed(
            &mut state.store,
            &mut state.cache,
            &*item,
            attribute,
            old,
            new,
        ) {
            warn!(target: "setdex::registry", %record, attribute, error = %e, "Record could not be relocated");
        }
    }
}

impl<T: Record + 'static> Drop for Shared<T> {
    fn drop(&mut self) {
        self.guard.get_mut().detach_all();
    }
}

/// An indexed set of records
///
/// ```
/// use setdex_core::{Criteria, Document};
/// use setdex_engine::Registry;
/// use std::sync::Arc;
///
/// let registry = Registry::new();
/// registry.index("name").unwrap();
///
/// let dale = Arc::new(Document::new().field("name", "Dale"));
/// registry.add(dale.clone()).unwrap();
///
/// let found = registry.filter(&Criteria::new().with("name", "Dale")).unwrap();
/// assert_eq!(found.len(), 1);
///
/// dale.set("name", "Bob");
/// assert_eq!(registry.count_where(&Criteria::new().with("name", "Dale")).unwrap(), 0);
/// ```
pub struct Registry<T: Record + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Record + 'static> Registry<T> {
    /// Create an empty registry with the default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry from `config`
    pub fn with_config(config: RegistryConfig) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<T>>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            let state = State {
                items: BTreeMap::new(),
                store: IndexStore::with_indexes(&config.indexes),
                notifier: ChangeNotifier::new(listener),
                cache: QueryCache::new(config.cache_capacity),
            };
            Shared {
                guard: ConcurrencyGuard::new(state, GuardMode::from_flag(config.thread_safe)),
                cache_capacity: config.cache_capacity,
            }
        });
        Self { shared }
    }

    /// Create a registry from `config` holding `items`
    ///
    /// Items sharing an id collapse to one membership.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if an item lacks a declared attribute.
    pub fn from_items<I>(items: I, config: RegistryConfig) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let registry = Self::with_config(config);
        for item in items {
            registry.add(item)?;
        }
        Ok(registry)
    }

    fn enter(&self, operation: &'static str) -> Result<MutexGuard<'_, State<T>>> {
        self.shared.guard.enter(operation)
    }

    /// Config reproducing this registry's indexes and settings
    pub fn config(&self) -> RegistryConfig {
        RegistryConfig {
            thread_safe: self.is_thread_safe(),
            cache_capacity: self.shared.cache_capacity,
            indexes: self.indexes(),
        }
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Add `item`
    ///
    /// Returns `false` if it was already a member; its buckets are then
    /// refreshed from its current values.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if `item` lacks a declared attribute; the
    /// registry is left unchanged.
    pub fn add(&self, item: Arc<T>) -> Result<bool> {
        let mut guard = self.enter("add")?;
        let state = &mut *guard;
        let id = item.record_id();

        // Subscribe before reading keys so a concurrent change is not lost
        let attached = state.store.has_secondary() && state.notifier.attach(&*item);
        let inserted = match state.store.insert(&*item) {
            Ok(inserted) => inserted,
            Err(e) => {
                if attached {
                    state.notifier.detach(&*item);
                }
                return Err(e);
            }
        };
        state.items.insert(id, item);
        state.cache.invalidate_all();

        debug!(target: "setdex::registry", record = %id, inserted, "Record added");
        Ok(inserted)
    }

    /// Add every item in `items`
    ///
    /// Stops at the first failure; items before it stay added.
    pub fn extend<I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut added = 0;
        for item in items {
            if self.add(item)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove `item`
    ///
    /// Returns `false` if it was not a member. The item stops being tracked
    /// and can be mutated freely afterwards.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if `item` lacks a declared attribute; the
    /// registry is left unchanged.
    pub fn delete(&self, item: &T) -> Result<bool> {
        let mut guard = self.enter("delete")?;
        let state = &mut *guard;
        let id = item.record_id();

        let removed = state.store.remove(item)?;
        state.notifier.detach(item);
        state.items.remove(&id);
        state.cache.invalidate_all();

        debug!(target: "setdex::registry", record = %id, removed, "Record deleted");
        Ok(removed)
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Declare an index
    ///
    /// Returns `false` if it already existed. Declaring the identity
    /// attribute is a no-op.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if a member lacks one of the attributes;
    /// no index is added.
    pub fn index(&self, spec: impl Into<IndexSpec>) -> Result<bool> {
        let spec = spec.into();
        let mut guard = self.enter("index")?;
        let state = &mut *guard;

        let declared = state
            .store
            .declare_index(spec, state.items.values().map(|item| &**item))?;
        if declared {
            state.attach_all();
        }
        Ok(declared)
    }

    /// Drop every index and declare `specs` instead
    ///
    /// # Errors
    /// Returns `MissingAttribute` if a member lacks a declared attribute;
    /// the previous indexes stay in place.
    pub fn reindex(&self, specs: &[IndexSpec]) -> Result<()> {
        let mut guard = self.enter("reindex")?;
        let state = &mut *guard;

        state
            .store
            .reindex_all(specs, state.items.values().map(|item| &**item))?;
        if state.store.has_secondary() {
            state.attach_all();
        } else {
            state.detach_all();
        }
        state.cache.invalidate_all();
        Ok(())
    }

    /// Declared indexes, identity excluded, in declaration order
    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.shared.guard.read().store.specs()
    }

    /// Bucket contents of every index, identity included
    pub fn index_snapshot(&self) -> IndexSnapshot {
        self.shared.guard.read().store.snapshot()
    }

    /// Stop tracking changes of every member
    ///
    /// Members keep the buckets they are in now.
    pub fn release_watchers(&self) -> Result<()> {
        let mut guard = self.enter("release_watchers")?;
        guard.detach_all();
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Records matching `criteria`, as a new registry
    ///
    /// The result has the same indexes and settings as `self` and its own
    /// cache. Empty criteria give an empty registry.
    ///
    /// # Errors
    /// Returns `IndexNotFound` if an attribute is not indexed.
    pub fn filter(&self, criteria: &Criteria) -> Result<Registry<T>> {
        if criteria.is_empty() {
            return Ok(Registry::with_config(self.config()));
        }
        let (items, config) = {
            let mut guard = self.enter("where")?;
            let ids = guard.matching_ids(criteria)?;
            let config = RegistryConfig {
                thread_safe: self.is_thread_safe(),
                cache_capacity: self.shared.cache_capacity,
                indexes: guard.store.specs(),
            };
            (guard.records(&ids), config)
        };
        Registry::from_items(items, config)
    }

    /// Whether any record matches `criteria`
    ///
    /// Bypasses the query cache. Empty criteria match nothing.
    ///
    /// # Errors
    /// Returns `IndexNotFound` if an attribute is not indexed.
    pub fn exists(&self, criteria: &Criteria) -> Result<bool> {
        if criteria.is_empty() {
            return Ok(false);
        }
        let guard = self.enter("exists")?;
        let plan = query::plan(&guard.store, criteria)?;
        Ok(query::any_match(&plan))
    }

    /// Number of records matching `criteria`
    ///
    /// # Errors
    /// Returns `IndexNotFound` if an attribute is not indexed.
    pub fn count_where(&self, criteria: &Criteria) -> Result<usize> {
        if criteria.is_empty() {
            return Ok(0);
        }
        let mut guard = self.enter("count")?;
        Ok(guard.matching_ids(criteria)?.len())
    }

    /// Records matching `criteria`, ordered by id
    ///
    /// # Errors
    /// Returns `IndexNotFound` if an attribute is not indexed.
    pub fn select(&self, criteria: &Criteria) -> Result<Vec<Arc<T>>> {
        if criteria.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.enter("where")?;
        let ids = guard.matching_ids(criteria)?;
        Ok(guard.records(&ids))
    }

    /// First record matching `criteria`
    ///
    /// Logs a warning if more than one record matched.
    ///
    /// # Errors
    /// Returns `IndexNotFound` if an attribute is not indexed.
    pub fn find(&self, criteria: &Criteria) -> Result<Option<Arc<T>>> {
        let found = self.select(criteria)?;
        if found.len() > 1 {
            warn!(
                target: "setdex::registry",
                count = found.len(),
                "There were {} records found, returning the first",
                found.len()
            );
        }
        Ok(found.into_iter().next())
    }

    /// The only record matching `criteria`
    ///
    /// # Errors
    /// Returns `MoreThanOneRecordFound` if several records matched, or
    /// `IndexNotFound` if an attribute is not indexed.
    pub fn find_strict(&self, criteria: &Criteria) -> Result<Option<Arc<T>>> {
        let found = self.select(criteria)?;
        if found.len() > 1 {
            return Err(RegistryError::MoreThanOneRecordFound { count: found.len() });
        }
        Ok(found.into_iter().next())
    }

    // ========================================================================
    // Mutation through the registry
    // ========================================================================

    /// Assign `attribute` of `item` and relocate it in one step
    ///
    /// Watchers of `item` are notified afterwards, so other registries
    /// holding it follow. Returns the previous value.
    ///
    /// # Errors
    /// Returns `AttributeNotWritable` if `item` cannot be assigned by name
    /// or `attribute` is the identity attribute, and `MissingAttribute` if
    /// relocation cannot read a covering attribute. `item` is left
    /// unassigned in both cases.
    pub fn set(
        &self,
        item: &T,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        let value = value.into();
        let id = item.record_id();
        let not_writable = || RegistryError::AttributeNotWritable {
            record: id,
            attribute: attribute.to_string(),
        };
        if attribute == IDENTITY_ATTRIBUTE {
            return Err(not_writable());
        }

        let previous = {
            let mut guard = self.enter("set")?;
            let state = &mut *guard;
            let previous = read_attribute(item, attribute);
            state.store.check_relocatable(attribute, item)?;
            if !item.assign_attribute(attribute, value.clone()) {
                return Err(not_writable());
            }
            if state.items.contains_key(&id) {
                let old = previous.clone().unwrap_or(Value::Null);
                match state.store.relocate(attribute, item, &old, &value) {
                    Ok(true) => state.cache.invalidate_all(),
                    Ok(false) => {}
                    Err(e) => {
                        if let Some(old) = previous {
                            item.assign_attribute(attribute, old);
                        }
                        return Err(e);
                    }
                }
            }
            previous
        };

        if let Some(watchers) = item.watchers() {
            let old = previous.clone().unwrap_or(Value::Null);
            watchers.notify(id, attribute, &old, &value);
        }
        Ok(previous)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of members
    pub fn len(&self) -> usize {
        self.shared.guard.read().items.len()
    }

    /// Whether there are no members
    pub fn is_empty(&self) -> bool {
        self.shared.guard.read().items.is_empty()
    }

    /// Whether a record with `id` is a member
    pub fn contains(&self, id: RecordId) -> bool {
        self.shared.guard.read().items.contains_key(&id)
    }

    /// The member with `id`
    pub fn get(&self, id: RecordId) -> Option<Arc<T>> {
        self.shared.guard.read().items.get(&id).cloned()
    }

    /// Every member, ordered by id
    pub fn items(&self) -> Vec<Arc<T>> {
        self.shared.guard.read().items.values().cloned().collect()
    }

    /// The member with the lowest id
    pub fn first(&self) -> Option<Arc<T>> {
        self.shared
            .guard
            .read()
            .items
            .values()
            .next()
            .cloned()
    }

    /// Query cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.guard.read().cache.stats()
    }

    /// Whether operations block on contention
    pub fn is_thread_safe(&self) -> bool {
        self.shared.guard.is_thread_safe()
    }
}

impl<T: Record + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record + fmt::Debug + 'static> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.guard.read();
        f.debug_struct("Registry")
            .field("items", &state.items.values().collect::<Vec<_>>())
            .field("indexes", &state.store.specs())
            .field("thread_safe", &self.shared.guard.is_thread_safe())
            .finish()
    }
}
