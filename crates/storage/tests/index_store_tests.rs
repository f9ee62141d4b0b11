//! Integration tests for IndexStore
//!
//! Drives the store directly with `Document` records:
//! 1. **Bucket invariants** - random insert/remove/relocate sequences
//! 2. **Atomicity** - failed operations leave every index untouched

use proptest::prelude::*;
use setdex_core::{Document, IndexSpec, Record, RecordId, Value};
use setdex_storage::IndexStore;
use std::collections::BTreeMap;

const POOL: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Insert(usize),
    Remove(usize),
    Change(usize, i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..POOL).prop_map(Op::Insert),
        (0..POOL).prop_map(Op::Remove),
        (0..POOL, 0i64..4).prop_map(|(i, v)| Op::Change(i, v)),
    ]
}

// ============================================================================
// SECTION 1: Bucket invariants
// ============================================================================

proptest! {
    /// Every member sits in the bucket of its current value and nowhere else
    #[test]
    fn buckets_match_current_values(ops in prop::collection::vec(op(), 1..80)) {
        let docs: Vec<Document> = (0..POOL).map(|_| Document::new().field("level", 0)).collect();
        let spec = IndexSpec::single("level");
        let mut store = IndexStore::with_indexes(&[spec.clone()]);
        let mut members = [false; POOL];

        for op in ops {
            match op {
                Op::Insert(i) => {
                    prop_assert_eq!(store.insert(&docs[i]).unwrap(), !members[i]);
                    members[i] = true;
                }
                Op::Remove(i) => {
                    prop_assert_eq!(store.remove(&docs[i]).unwrap(), members[i]);
                    members[i] = false;
                }
                Op::Change(i, v) => {
                    let old = docs[i].get("level").unwrap_or(Value::Null);
                    docs[i].assign_attribute("level", Value::Int(v));
                    store.relocate("level", &docs[i], &old, &Value::Int(v)).unwrap();
                }
            }

            let mut expected: BTreeMap<Value, Vec<RecordId>> = BTreeMap::new();
            for (doc, _) in docs.iter().zip(members.iter()).filter(|(_, m)| **m) {
                expected
                    .entry(doc.get("level").unwrap_or(Value::Null))
                    .or_default()
                    .push(doc.record_id());
            }
            for ids in expected.values_mut() {
                ids.sort();
            }

            let snapshot = store.snapshot();
            prop_assert_eq!(&snapshot[&spec], &expected);
            prop_assert_eq!(snapshot[&IndexSpec::identity()].len(), store.len());
        }
    }
}

// ============================================================================
// SECTION 2: Atomicity
// ============================================================================

#[test]
fn test_compound_insert_failure_touches_nothing() {
    let complete = Document::new().field("type", "car").field("color", "blue");
    let mut store = IndexStore::with_indexes(&[
        IndexSpec::single("type"),
        IndexSpec::compound(["type", "color"]).unwrap(),
    ]);
    store.insert(&complete).unwrap();
    let before = store.snapshot();

    let partial = Document::new().field("type", "truck");
    assert!(store.insert(&partial).unwrap_err().is_missing_attribute());
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_relocate_failure_touches_nothing() {
    let car = Document::new().field("type", "car").field("color", "blue");
    let mut store = IndexStore::with_indexes(&[
        IndexSpec::single("type"),
        IndexSpec::compound(["type", "color"]).unwrap(),
    ]);
    store.insert(&car).unwrap();
    let before = store.snapshot();

    // A record that lost a compound component cannot be relocated
    struct Broken(RecordId);
    impl Record for Broken {
        fn record_id(&self) -> RecordId {
            self.0
        }
        fn attribute(&self, name: &str) -> Option<Value> {
            (name == "type").then(|| Value::from("truck"))
        }
    }

    let err = store
        .relocate(
            "type",
            &Broken(car.record_id()),
            &Value::from("car"),
            &Value::from("truck"),
        )
        .unwrap_err();
    assert!(err.is_missing_attribute());
    assert_eq!(store.snapshot(), before);
}
