//! Query criteria
//!
//! A [`Criteria`] is a conjunction of `attribute == value` terms plus
//! optional pagination. Terms keep the caller's order, which is the order
//! buckets are intersected in. [`QueryKey`] is the normalised form used as
//! the query cache key: terms sorted, pagination included.

use crate::value::Value;

/// Conjunctive equality filter with optional pagination
///
/// ```
/// use setdex_core::Criteria;
///
/// let criteria = Criteria::new().with("name", "Dale").with("age", 30).with_limit(1);
/// assert_eq!(criteria.len(), 2);
/// assert_eq!(criteria.limit(), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    terms: Vec<(String, Value)>,
    limit: Option<usize>,
    offset: usize,
}

impl Criteria {
    /// Empty criteria
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an `attribute == value` term
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((attribute.into(), value.into()));
        self
    }

    /// Return at most `limit` records
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` records
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Terms in caller order
    pub fn terms(&self) -> &[(String, Value)] {
        &self.terms
    }

    /// Attribute names in caller order
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(a, _)| a.as_str())
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether there are no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Pagination limit
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Pagination offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Normalised cache key
    pub fn key(&self) -> QueryKey {
        let mut terms = self.terms.clone();
        terms.sort();
        QueryKey {
            terms,
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Apply `offset` then `limit` to an ordered result
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Criteria
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Criteria::new(), |criteria, (k, v)| criteria.with(k, v))
    }
}

/// Normalised criteria: sorted terms plus pagination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    terms: Vec<(String, Value)>,
    limit: Option<usize>,
    offset: usize,
}

impl QueryKey {
    /// Sorted terms
    pub fn terms(&self) -> &[(String, Value)] {
        &self.terms
    }
}
