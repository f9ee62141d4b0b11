//! Property tests for registry invariants
//!
//! Random sequences of add, delete, change and query operations are applied
//! to a registry and checked against a plain model after every step:
//!
//! - every member sits in exactly the bucket of its current value
//! - buckets hold no non-members and no empty buckets exist
//! - `exists` agrees with `count_where`
//! - cached answers equal freshly computed ones

use proptest::prelude::*;
use setdex_core::{Criteria, Document, IndexSpec, Record, RecordId, Value};
use setdex_engine::{Registry, RegistryConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

const POOL: usize = 6;
const NAMES: [&str; 4] = ["Dale", "Bob", "Alice", "Eve"];

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Delete(usize),
    Rename(usize, usize),
    Recolor(usize, bool),
    Query(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..POOL).prop_map(Op::Add),
        (0..POOL).prop_map(Op::Delete),
        (0..POOL, 0..NAMES.len()).prop_map(|(i, n)| Op::Rename(i, n)),
        (0..POOL, any::<bool>()).prop_map(|(i, c)| Op::Recolor(i, c)),
        (0..NAMES.len()).prop_map(Op::Query),
    ]
}

fn color(red: bool) -> &'static str {
    if red {
        "red"
    } else {
        "blue"
    }
}

/// Expected buckets of `spec` for the current members
fn expected_buckets(
    docs: &[Arc<Document>],
    members: &[bool],
    spec: &IndexSpec,
) -> BTreeMap<Value, Vec<RecordId>> {
    let mut buckets: BTreeMap<Value, Vec<RecordId>> = BTreeMap::new();
    for (doc, _) in docs.iter().zip(members).filter(|(_, m)| **m) {
        let key = if spec.is_compound() {
            Value::Tuple(
                spec.attributes()
                    .iter()
                    .map(|a| doc.get(a).unwrap_or(Value::Null))
                    .collect(),
            )
        } else {
            doc.get(&spec.attributes()[0]).unwrap_or(Value::Null)
        };
        buckets.entry(key).or_default().push(doc.record_id());
    }
    for ids in buckets.values_mut() {
        ids.sort();
    }
    buckets
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn buckets_follow_current_values(ops in prop::collection::vec(op(), 1..60)) {
        let docs: Vec<Arc<Document>> = (0..POOL)
            .map(|_| Arc::new(Document::new().field("name", "Dale").field("color", "blue")))
            .collect();
        let compound = IndexSpec::compound(["name", "color"]).unwrap();
        let config = RegistryConfig::default()
            .with_index("name")
            .with_index("color")
            .with_index(compound.clone());
        let registry = Registry::with_config(config);
        let mut members = vec![false; POOL];

        for op in ops {
            match op {
                Op::Add(i) => {
                    let inserted = registry.add(docs[i].clone()).unwrap();
                    prop_assert_eq!(inserted, !members[i]);
                    members[i] = true;
                }
                Op::Delete(i) => {
                    let removed = registry.delete(&docs[i]).unwrap();
                    prop_assert_eq!(removed, members[i]);
                    members[i] = false;
                }
                Op::Rename(i, n) => {
                    docs[i].set("name", NAMES[n]);
                }
                Op::Recolor(i, red) => {
                    registry.set(&docs[i], "color", color(red)).unwrap();
                }
                Op::Query(n) => {
                    let criteria = Criteria::new().with("name", NAMES[n]);
                    let first = registry.count_where(&criteria).unwrap();
                    let second = registry.count_where(&criteria).unwrap();
                    prop_assert_eq!(first, second);
                    prop_assert_eq!(registry.exists(&criteria).unwrap(), first > 0);
                }
            }

            let snapshot = registry.index_snapshot();
            for spec in [IndexSpec::single("name"), IndexSpec::single("color"), compound.clone()] {
                prop_assert_eq!(
                    &snapshot[&spec],
                    &expected_buckets(&docs, &members, &spec)
                );
            }
            prop_assert_eq!(registry.len(), members.iter().filter(|m| **m).count());
        }
    }

    #[test]
    fn exists_agrees_with_count(
        names in prop::collection::vec(0..NAMES.len(), 0..12),
        reds in prop::collection::vec(any::<bool>(), 12),
        query_name in 0..NAMES.len(),
        query_red in any::<bool>(),
    ) {
        let registry = Registry::with_config(
            RegistryConfig::default().with_index("name").with_index("color"),
        );
        for (n, red) in names.iter().zip(&reds) {
            let doc = Document::new().field("name", NAMES[*n]).field("color", color(*red));
            registry.add(Arc::new(doc)).unwrap();
        }

        let criteria = Criteria::new()
            .with("name", NAMES[query_name])
            .with("color", color(query_red));
        let count = registry.count_where(&criteria).unwrap();
        let expected = names
            .iter()
            .zip(&reds)
            .filter(|(n, r)| **n == query_name && **r == query_red)
            .count();

        prop_assert_eq!(count, expected);
        prop_assert_eq!(registry.exists(&criteria).unwrap(), count > 0);
        prop_assert_eq!(registry.filter(&criteria).unwrap().len(), count);
    }
}
