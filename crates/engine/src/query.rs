//! Query planning and evaluation
//!
//! A query is planned against the declared indexes before any bucket is
//! read:
//!
//! 1. If the criteria attributes are exactly the attributes of a compound
//!    index, the query is one composite lookup.
//! 2. Otherwise every attribute must have its own simple index. The first
//!    attribute (in caller order) without one fails the whole query with
//!    `IndexNotFound`, whether or not an earlier bucket was empty.
//!
//! Simple plans intersect buckets in caller order and stop as soon as the
//! running intersection is empty. Results are ordered by `RecordId`.

use rustc_hash::FxHashSet;
use setdex_core::{Criteria, RecordId, RegistryError, Result, Value};
use setdex_storage::{AttributeIndex, IndexStore};

/// How a query will be answered
#[derive(Debug)]
pub enum Plan<'a> {
    /// One lookup in a compound index
    Compound {
        /// The matching compound index
        index: &'a AttributeIndex,
        /// Tuple key in the index's declaration order
        key: Value,
    },
    /// Intersection of simple-index buckets, in caller order
    Simple(Vec<(&'a AttributeIndex, &'a Value)>),
}

/// Choose the indexes that answer `criteria`
///
/// # Errors
/// Returns `IndexNotFound` naming the first attribute that neither an exact
/// compound index nor a simple index covers.
pub fn plan<'a>(store: &'a IndexStore, criteria: &'a Criteria) -> Result<Plan<'a>> {
    if criteria.len() > 1 {
        let attributes = criteria.terms().iter().map(|(a, _)| a.as_str());
        if let Some(index) = store.compound_index(attributes) {
            let key = index
                .spec()
                .attributes()
                .iter()
                .map(|attribute| {
                    criteria
                        .terms()
                        .iter()
                        .find(|(a, _)| a == attribute)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null)
                })
                .collect();
            return Ok(Plan::Compound {
                index,
                key: Value::Tuple(key),
            });
        }
    }

    criteria
        .terms()
        .iter()
        .map(|(attribute, value)| {
            store
                .simple_index(attribute)
                .map(|index| (index, value))
                .ok_or_else(|| RegistryError::index_not_found(attribute.as_str(), store.available()))
        })
        .collect::<Result<Vec<_>>>()
        .map(Plan::Simple)
}

/// Every record matching `plan`, ordered by id
pub fn resolve(plan: &Plan<'_>) -> Vec<RecordId> {
    let mut ids: Vec<RecordId> = match plan {
        Plan::Compound { index, key } => index
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default(),
        Plan::Simple(terms) => {
            let mut running: Option<FxHashSet<RecordId>> = None;
            for (index, value) in terms {
                let Some(bucket) = index.get(value) else {
                    return Vec::new();
                };
                let next = match running {
                    None => bucket.clone(),
                    Some(current) => current.intersection(bucket).copied().collect(),
                };
                if next.is_empty() {
                    return Vec::new();
                }
                running = Some(next);
            }
            running.map(|ids| ids.into_iter().collect()).unwrap_or_default()
        }
    };
    ids.sort();
    ids
}

/// Whether at least one record matches `plan`
///
/// Checks the members of the smallest bucket against the others without
/// building the full intersection.
pub fn any_match(plan: &Plan<'_>) -> bool {
    match plan {
        Plan::Compound { index, key } => index.get(key).is_some(),
        Plan::Simple(terms) => {
            let mut buckets = Vec::with_capacity(terms.len());
            for (index, value) in terms {
                match index.get(value) {
                    Some(bucket) => buckets.push(bucket),
                    None => return false,
                }
            }
            buckets.sort_by_key(|bucket| bucket.len());
            match buckets.split_first() {
                Some((smallest, rest)) => smallest
                    .iter()
                    .any(|id| rest.iter().all(|bucket| bucket.contains(id))),
                None => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setdex_core::{Document, IndexSpec, Record};

    fn vehicles() -> (IndexStore, Vec<Document>) {
        let docs = vec![
            Document::new().field("type", "car").field("color", "blue"),
            Document::new().field("type", "car").field("color", "red"),
            Document::new().field("type", "truck").field("color", "red"),
        ];
        let mut store = IndexStore::with_indexes(&[
            IndexSpec::single("type"),
            IndexSpec::single("color"),
        ]);
        for doc in &docs {
            store.insert(doc).unwrap();
        }
        (store, docs)
    }

    #[test]
    fn test_single_attribute() {
        let (store, docs) = vehicles();
        let criteria = Criteria::new().with("type", "car");
        let ids = resolve(&plan(&store, &criteria).unwrap());
        assert_eq!(ids, vec![docs[0].record_id(), docs[1].record_id()]);
    }

    #[test]
    fn test_intersection() {
        let (store, docs) = vehicles();
        let criteria = Criteria::new().with("type", "car").with("color", "blue");
        let plan = plan(&store, &criteria).unwrap();
        assert_eq!(resolve(&plan), vec![docs[0].record_id()]);
        assert!(any_match(&plan));
    }

    #[test]
    fn test_disjoint_buckets() {
        let (store, _) = vehicles();
        let criteria = Criteria::new().with("type", "truck").with("color", "blue");
        let plan = plan(&store, &criteria).unwrap();
        assert!(resolve(&plan).is_empty());
        assert!(!any_match(&plan));
    }

    #[test]
    fn test_unknown_value_is_empty() {
        let (store, _) = vehicles();
        let criteria = Criteria::new().with("type", "bicycle");
        let plan = plan(&store, &criteria).unwrap();
        assert!(resolve(&plan).is_empty());
        assert!(!any_match(&plan));
    }

    #[test]
    fn test_unknown_attribute_fails_even_after_empty_bucket() {
        let (store, _) = vehicles();
        let criteria = Criteria::new().with("type", "bicycle").with("wheels", 2);
        match plan(&store, &criteria).unwrap_err() {
            RegistryError::IndexNotFound { attribute, .. } => assert_eq!(attribute, "wheels"),
            other => panic!("Wrong error variant: {:?}", other),
        }
    }

    #[test]
    fn test_first_unknown_attribute_is_reported() {
        let (store, _) = vehicles();
        let criteria = Criteria::new().with("wheels", 2).with("doors", 4);
        match plan(&store, &criteria).unwrap_err() {
            RegistryError::IndexNotFound { attribute, .. } => assert_eq!(attribute, "wheels"),
            other => panic!("Wrong error variant: {:?}", other),
        }
    }

    #[test]
    fn test_exact_compound_match() {
        let docs = [
            Document::new().field("type", "car").field("color", "blue"),
            Document::new().field("type", "car").field("color", "red"),
        ];
        let mut store =
            IndexStore::with_indexes(&[IndexSpec::compound(["type", "color"]).unwrap()]);
        for doc in &docs {
            store.insert(doc).unwrap();
        }

        // Caller order differs from declaration order
        let criteria = Criteria::new().with("color", "red").with("type", "car");
        let plan = plan(&store, &criteria).unwrap();
        assert!(matches!(plan, Plan::Compound { .. }));
        assert_eq!(resolve(&plan), vec![docs[1].record_id()]);
        assert!(any_match(&plan));
    }

    #[test]
    fn test_compound_subset_does_not_match() {
        let mut store =
            IndexStore::with_indexes(&[IndexSpec::compound(["type", "color"]).unwrap()]);
        store
            .insert(&Document::new().field("type", "car").field("color", "red"))
            .unwrap();

        let criteria = Criteria::new().with("type", "car");
        assert!(plan(&store, &criteria).unwrap_err().is_index_not_found());
    }

    #[test]
    fn test_identity_attribute_is_queryable() {
        let (store, docs) = vehicles();
        let id = docs[2].record_id();
        let criteria = Criteria::new().with(setdex_core::IDENTITY_ATTRIBUTE, id.as_u64() as i64);
        assert_eq!(resolve(&plan(&store, &criteria).unwrap()), vec![id]);
    }
}
