//! Change tracking for registry members
//!
//! The [`ChangeNotifier`] subscribes its registry to the [`Watchers`] of
//! every member while at least one secondary index exists, and turns each
//! reported change into an index relocation plus a cache invalidation.
//!
//! Only records that carry watchers are tracked. Others stay indexed under
//! the values they had when they were added.
//!
//! [`Watchers`]: setdex_core::Watchers

use rustc_hash::FxHashSet;
use setdex_core::{ChangeListener, ListenerId, Record, RecordId, Result, Value};
use setdex_storage::IndexStore;
use std::sync::Weak;

use crate::cache::QueryCache;

/// Subscription bookkeeping of one registry
pub struct ChangeNotifier {
    listener_id: ListenerId,
    listener: Weak<dyn ChangeListener>,
    attached: FxHashSet<RecordId>,
}

impl ChangeNotifier {
    /// Create a notifier that subscribes `listener` to attached records
    pub fn new(listener: Weak<dyn ChangeListener>) -> Self {
        Self {
            listener_id: ListenerId::next(),
            listener,
            attached: FxHashSet::default(),
        }
    }

    /// Identity under which this notifier subscribes
    pub fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// Start tracking `record`
    ///
    /// Returns `false` if it was already tracked or has no watchers.
    pub fn attach<R: Record + ?Sized>(&mut self, record: &R) -> bool {
        let Some(watchers) = record.watchers() else {
            return false;
        };
        watchers.subscribe(self.listener_id, self.listener.clone());
        self.attached.insert(record.record_id())
    }

    /// Stop tracking `record`
    ///
    /// Returns `false` if it was not tracked.
    pub fn detach<R: Record + ?Sized>(&mut self, record: &R) -> bool {
        if let Some(watchers) = record.watchers() {
            watchers.unsubscribe(self.listener_id);
        }
        self.attached.remove(&record.record_id())
    }

    /// Stop tracking every record in `records`
    pub fn detach_all<'a, R, I>(&mut self, records: I)
    where
        R: Record + ?Sized + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        for record in records {
            self.detach(record);
        }
        self.attached.clear();
    }

    /// Whether `id` is tracked
    pub fn is_attached(&self, id: RecordId) -> bool {
        self.attached.contains(&id)
    }

    /// Number of tracked records
    pub fn len(&self) -> usize {
        self.attached.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    /// Apply a reported change of `attribute` on `record`
    ///
    /// Relocates the record in every index covering `attribute` and clears
    /// the cache if any bucket changed. Untracked records and `old == new`
    /// are no-ops. Returns whether anything moved.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if a covering index can no longer read
    /// the record; the indexes are left as they were.
    pub fn on_attribute_changed<R: Record + ?Sized>(
        &self,
        store: &mut IndexStore,
        cache: &mut QueryCache,
        record: &R,
        attribute: &str,
        old: &Value,
        new: &Value,
    ) -> Result<bool> {
        if old == new || !self.is_attached(record.record_id()) {
            return Ok(false);
        }
        let moved = store.relocate(attribute, record, old, new)?;
        if moved {
            cache.invalidate_all();
        }
        Ok(moved)
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listener_id", &self.listener_id)
            .field("attached", &self.attached.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use setdex_core::{Criteria, Document, IndexSpec};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter {
        calls: Mutex<usize>,
    }

    impl ChangeListener for Counter {
        fn attribute_changed(&self, _: RecordId, _: &str, _: &Value, _: &Value) {
            *self.calls.lock() += 1;
        }
    }

    fn notifier_for(counter: &Arc<Counter>) -> ChangeNotifier {
        let listener: Arc<dyn ChangeListener> = counter.clone();
        ChangeNotifier::new(Arc::downgrade(&listener))
    }

    /// A plain record without change reporting
    struct Fixed(RecordId);

    impl Record for Fixed {
        fn record_id(&self) -> RecordId {
            self.0
        }
        fn attribute(&self, _: &str) -> Option<Value> {
            None
        }
    }

    #[test]
    fn test_attach_is_idempotent() {
        let counter = Arc::new(Counter::default());
        let mut notifier = notifier_for(&counter);
        let doc = Document::new().field("name", "Dale");

        assert!(notifier.attach(&doc));
        assert!(!notifier.attach(&doc));
        assert_eq!(doc.watchers().unwrap().len(), 1);

        doc.set("name", "Bob");
        assert_eq!(*counter.calls.lock(), 1);
    }

    #[test]
    fn test_detach_releases_subscription() {
        let counter = Arc::new(Counter::default());
        let mut notifier = notifier_for(&counter);
        let doc = Document::new().field("name", "Dale");

        notifier.attach(&doc);
        assert!(notifier.detach(&doc));
        assert!(!notifier.detach(&doc));
        assert!(doc.watchers().unwrap().is_empty());

        doc.set("name", "Bob");
        assert_eq!(*counter.calls.lock(), 0);
    }

    #[test]
    fn test_record_without_watchers_is_not_tracked() {
        let counter = Arc::new(Counter::default());
        let mut notifier = notifier_for(&counter);
        let fixed = Fixed(RecordId::next());

        assert!(!notifier.attach(&fixed));
        assert!(!notifier.is_attached(fixed.0));
    }

    #[test]
    fn test_detach_all() {
        let counter = Arc::new(Counter::default());
        let mut notifier = notifier_for(&counter);
        let a = Document::new();
        let b = Document::new();
        notifier.attach(&a);
        notifier.attach(&b);

        notifier.detach_all([&a, &b]);
        assert!(notifier.is_empty());
        assert!(a.watchers().unwrap().is_empty());
        assert!(b.watchers().unwrap().is_empty());
    }

    #[test]
    fn test_change_relocates_and_invalidates() {
        let counter = Arc::new(Counter::default());
        let mut notifier = notifier_for(&counter);
        let doc = Document::new().field("name", "Dale");
        let mut store = IndexStore::with_indexes(&[IndexSpec::single("name")]);
        let mut cache = QueryCache::default();
        store.insert(&doc).unwrap();
        notifier.attach(&doc);
        cache.store(Criteria::new().with("name", "Dale").key(), &[doc.record_id()]);

        doc.assign_attribute("name", Value::from("Bob"));
        let moved = notifier
            .on_attribute_changed(
                &mut store,
                &mut cache,
                &doc,
                "name",
                &Value::from("Dale"),
                &Value::from("Bob"),
            )
            .unwrap();

        assert!(moved);
        assert!(cache.is_empty());
        assert!(store.lookup("name", &Value::from("Bob")).unwrap().is_some());
    }

    #[test]
    fn test_change_on_detached_record_is_ignored() {
        let counter = Arc::new(Counter::default());
        let notifier = notifier_for(&counter);
        let doc = Document::new().field("name", "Dale");
        let mut store = IndexStore::with_indexes(&[IndexSpec::single("name")]);
        let mut cache = QueryCache::default();
        store.insert(&doc).unwrap();

        doc.assign_attribute("name", Value::from("Bob"));
        let moved = notifier
            .on_attribute_changed(
                &mut store,
                &mut cache,
                &doc,
                "name",
                &Value::from("Dale"),
                &Value::from("Bob"),
            )
            .unwrap();

        assert!(!moved);
        assert!(store.lookup("name", &Value::from("Dale")).unwrap().is_some());
    }
}
