//! Error types for setdex
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every failure is a variant of the one [`RegistryError`] enum, so callers
//! can match on the whole family or on a single kind.

use crate::types::RecordId;
use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error types for the registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Criteria reference an attribute that was never indexed
    #[error("Index '{attribute}' not found. Available indexes: {available:?}. Add it with .index(\"{attribute}\")")]
    IndexNotFound {
        /// Attribute named by the query
        attribute: String,
        /// Declared indexes, identity excluded
        available: Vec<String>,
    },

    /// A record has no readable value for a declared attribute
    #[error("Record {record} cannot be {operation} because indexable attribute '{attribute}' is missing or not accessible")]
    MissingAttribute {
        /// Offending record
        record: RecordId,
        /// Attribute that could not be read
        attribute: String,
        /// Past-tense operation name ("added", "deleted", "indexed", "updated")
        operation: &'static str,
    },

    /// `find_strict` matched more than one record
    #[error("There were {count} records found, expected at most 1")]
    MoreThanOneRecordFound {
        /// Number of matching records
        count: usize,
    },

    /// A registry without thread safety was entered from two threads at once
    #[error("Concurrent {operation} on a registry created without thread safety")]
    ConcurrentAccess {
        /// Operation that found the registry busy
        operation: &'static str,
    },

    /// The record does not support assignment through the registry
    #[error("Record {record} does not allow attribute '{attribute}' to be assigned")]
    AttributeNotWritable {
        /// Offending record
        record: RecordId,
        /// Attribute that was to be assigned
        attribute: String,
    },

    /// An index declaration is malformed
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Build an `IndexNotFound` error
    pub fn index_not_found(attribute: impl Into<String>, available: Vec<String>) -> Self {
        RegistryError::IndexNotFound {
            attribute: attribute.into(),
            available,
        }
    }

    /// Build a `MissingAttribute` error
    pub fn missing_attribute(
        record: RecordId,
        attribute: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        RegistryError::MissingAttribute {
            record,
            attribute: attribute.into(),
            operation,
        }
    }

    /// Whether this is an `IndexNotFound` error
    pub fn is_index_not_found(&self) -> bool {
        matches!(self, RegistryError::IndexNotFound { .. })
    }

    /// Whether this is a `MissingAttribute` error
    pub fn is_missing_attribute(&self) -> bool {
        matches!(self, RegistryError::MissingAttribute { .. })
    }

    /// Whether this is a `MoreThanOneRecordFound` error
    pub fn is_more_than_one(&self) -> bool {
        matches!(self, RegistryError::MoreThanOneRecordFound { .. })
    }

    /// Whether this is a `ConcurrentAccess` error
    pub fn is_concurrent_access(&self) -> bool {
        matches!(self, RegistryError::ConcurrentAccess { .. })
    }
}
