//! Core types for setdex
//!
//! This module defines the foundational types:
//! - RecordId: Process-unique identity of a record
//! - IndexSpec: The attribute (or attribute tuple) an index is keyed by

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RegistryError, Result};

/// Attribute name of the built-in identity index
///
/// Every registry indexes its members by [`RecordId`] under this name. The
/// value is read from [`crate::Record::record_id`], never from
/// [`crate::Record::attribute`].
pub const IDENTITY_ATTRIBUTE: &str = "record_id";

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a record
///
/// Allocated from a process-wide counter, so ids are never reused while the
/// process lives and sort in allocation order. Membership in a registry is
/// decided by this id, not by attribute equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The attribute list an index is keyed by
///
/// A single attribute makes a simple index; several make a compound index
/// whose key is the [`crate::Value::Tuple`] of the attribute values, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IndexSpecRepr", into = "IndexSpecRepr")]
pub struct IndexSpec {
    attributes: Vec<String>,
}

impl IndexSpec {
    /// Index on one attribute
    pub fn single(attribute: impl Into<String>) -> Self {
        Self {
            attributes: vec![attribute.into()],
        }
    }

    /// Index on a tuple of attributes
    ///
    /// # Errors
    /// Returns `InvalidIndex` if the list is empty or names an attribute twice.
    pub fn compound<I, S>(attributes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        if attributes.is_empty() {
            return Err(RegistryError::InvalidIndex(
                "an index needs at least one attribute".to_string(),
            ));
        }
        for (i, a) in attributes.iter().enumerate() {
            if attributes[..i].contains(a) {
                return Err(RegistryError::InvalidIndex(format!(
                    "attribute '{}' appears twice in compound index",
                    a
                )));
            }
        }
        Ok(Self { attributes })
    }

    /// The built-in identity index
    pub fn identity() -> Self {
        Self::single(IDENTITY_ATTRIBUTE)
    }

    /// Whether this is the identity index
    pub fn is_identity(&self) -> bool {
        self.attributes.len() == 1 && self.attributes[0] == IDENTITY_ATTRIBUTE
    }

    /// Whether this index is keyed by more than one attribute
    pub fn is_compound(&self) -> bool {
        self.attributes.len() > 1
    }

    /// Attribute names in declaration order
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Whether `attribute` is one of this index's key components
    pub fn covers(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    /// Whether this index is keyed by exactly the given attribute set
    pub fn matches_exactly<'a, I>(&self, attributes: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let given: Vec<&str> = attributes.into_iter().collect();
        given.len() == self.attributes.len()
            && self.attributes.iter().all(|a| given.contains(&a.as_str()))
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attributes.len() == 1 {
            write!(f, "{}", self.attributes[0])
        } else {
            write!(f, "({})", self.attributes.join(", "))
        }
    }
}

impl From<&str> for IndexSpec {
    fn from(attribute: &str) -> Self {
        Self::single(attribute)
    }
}

impl From<String> for IndexSpec {
    fn from(attribute: String) -> Self {
        Self::single(attribute)
    }
}

/// Serialized form: a bare string for a simple index, a list for a compound one
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IndexSpecRepr {
    Single(String),
    Compound(Vec<String>),
}

impl TryFrom<IndexSpecRepr> for IndexSpec {
    type Error = RegistryError;

    fn try_from(repr: IndexSpecRepr) -> Result<Self> {
        match repr {
            IndexSpecRepr::Single(a) => Ok(IndexSpec::single(a)),
            IndexSpecRepr::Compound(attrs) => IndexSpec::compound(attrs),
        }
    }
}

impl From<IndexSpec> for IndexSpecRepr {
    fn from(spec: IndexSpec) -> Self {
        let mut attributes = spec.attributes;
        if attributes.len() == 1 {
            IndexSpecRepr::Single(attributes.remove(0))
        } else {
            IndexSpecRepr::Compound(attributes)
        }
    }
}
