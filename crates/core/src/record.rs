//! The record contract
//!
//! A registry never owns or copies records. It needs three things from them:
//!
//! - a stable identity ([`Record::record_id`])
//! - the current value of an attribute by name ([`Record::attribute`])
//! - optionally, a way to learn about mutations as they happen
//!   ([`Record::watchers`])
//!
//! ## Change reporting
//!
//! A record that wants its indexed attributes to stay indexed after it was
//! added embeds a [`Watchers`] list and calls [`Watchers::notify`] from every
//! setter, after the new value is stored. Registries subscribe through the
//! list while the record is a member and unsubscribe when it leaves.
//! Subscriptions hold only a `Weak` reference, so neither side keeps the
//! other alive.
//!
//! Records without watchers can still be added and queried, but a mutation
//! of an indexed attribute after insertion leaves the record in its old
//! bucket until it is deleted and re-added.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::types::{RecordId, IDENTITY_ATTRIBUTE};
use crate::value::Value;

/// A record that can be stored in a registry
pub trait Record: Send + Sync {
    /// Stable identity of this record
    fn record_id(&self) -> RecordId;

    /// Current value of the named attribute, `None` if it has none
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Store `value` under `name` without notifying watchers
    ///
    /// Returns `false` if the record does not support assignment by name.
    fn assign_attribute(&self, _name: &str, _value: Value) -> bool {
        false
    }

    /// Change-reporting hook, if the record has one
    fn watchers(&self) -> Option<&Watchers> {
        None
    }
}

/// Read an index key component, resolving the identity attribute
pub fn read_attribute<R: Record + ?Sized>(record: &R, name: &str) -> Option<Value> {
    if name == IDENTITY_ATTRIBUTE {
        Some(Value::Int(record.record_id().as_u64() as i64))
    } else {
        record.attribute(name)
    }
}

/// Receiver of attribute change notifications
pub trait ChangeListener: Send + Sync {
    /// Called synchronously after `attribute` of `record` went from `old` to `new`
    fn attribute_changed(&self, record: RecordId, attribute: &str, old: &Value, new: &Value);
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscribed listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a fresh listener id
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Subscription list embedded in a record
#[derive(Default)]
pub struct Watchers {
    subscribers: Mutex<Vec<(ListenerId, Weak<dyn ChangeListener>)>>,
}

impl Watchers {
    /// Create an empty subscription list
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` under `id`
    ///
    /// Returns `false` if `id` was already subscribed.
    pub fn subscribe(&self, id: ListenerId, listener: Weak<dyn ChangeListener>) -> bool {
        let mut subs = self.subscribers.lock();
        if subs.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        subs.push((id, listener));
        true
    }

    /// Remove the subscription for `id`
    ///
    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(existing, _)| *existing != id);
        subs.len() != before
    }

    /// Whether `id` is subscribed
    pub fn is_subscribed(&self, id: ListenerId) -> bool {
        self.subscribers.lock().iter().any(|(existing, _)| *existing == id)
    }

    /// Number of live subscriptions
    ///
    /// Subscriptions whose listener was dropped are pruned first.
    pub fn len(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|(_, l)| l.strong_count() > 0);
        subs.len()
    }

    /// Whether there are no live subscriptions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell every subscriber that `attribute` changed from `old` to `new`
    ///
    /// Does nothing when `old == new`. The subscriber list is not locked
    /// while listeners run, so a listener may subscribe or unsubscribe.
    pub fn notify(&self, record: RecordId, attribute: &str, old: &Value, new: &Value) {
        if old == new {
            return;
        }
        let live: Vec<Arc<dyn ChangeListener>> = {
            let mut subs = self.subscribers.lock();
            subs.retain(|(_, l)| l.strong_count() > 0);
            subs.iter().filter_map(|(_, l)| l.upgrade()).collect()
        };
        for listener in live {
            listener.attribute_changed(record, attribute, old, new);
        }
    }
}

impl fmt::Debug for Watchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<ListenerId> = self.subscribers.lock().iter().map(|(id, _)| *id).collect();
        f.debug_struct("Watchers").field("subscribers", &ids).finish()
    }
}

/// A schemaless record: named fields plus change reporting
///
/// Fields live behind a lock so a `Document` shared as `Arc<Document>` can
/// be mutated while it sits in one or more registries.
///
/// ```
/// use setdex_core::{Document, Record, Value};
///
/// let doc = Document::new().field("name", "Dale").field("age", 30);
/// assert_eq!(doc.attribute("name"), Some(Value::from("Dale")));
/// ```
pub struct Document {
    id: RecordId,
    fields: RwLock<BTreeMap<String, Value>>,
    watchers: Watchers,
}

impl Document {
    /// Create an empty document with a fresh id
    pub fn new() -> Self {
        Self {
            id: RecordId::next(),
            fields: RwLock::new(BTreeMap::new()),
            watchers: Watchers::new(),
        }
    }

    /// Builder: add a field
    pub fn field(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.write().insert(name.into(), value.into());
        self
    }

    /// Current value of a field
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    /// Set a field and notify watchers
    ///
    /// Returns the previous value. A field that did not exist is reported to
    /// watchers as changing from `Null`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Option<Value> {
        let new = value.into();
        let old = self.fields.write().insert(name.to_string(), new.clone());
        let reported_old = old.clone().unwrap_or(Value::Null);
        self.watchers.notify(self.id, name, &reported_old, &new);
        old
    }

    /// Snapshot of all fields
    pub fn fields(&self) -> BTreeMap<String, Value> {
        self.fields.read().clone()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for Document {
    fn record_id(&self) -> RecordId {
        self.id
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn assign_attribute(&self, name: &str, value: Value) -> bool {
        self.fields.write().insert(name.to_string(), value);
        true
    }

    fn watchers(&self) -> Option<&Watchers> {
        Some(&self.watchers)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("fields", &*self.fields.read())
            .finish()
    }
}
