//! Core types and traits for setdex
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId: Process-unique identity of a record
//! - IndexSpec: Attribute (or attribute tuple) an index is keyed by
//! - Value: Hashable attribute value used as an index key
//! - Criteria: Conjunctive equality filter with pagination
//! - Record: The contract a stored record fulfils
//! - Watchers / ChangeListener: Change reporting from records to registries
//! - RegistryError: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod criteria;
pub mod error;
pub mod record;
pub mod types;
pub mod value;

pub use criteria::{Criteria, QueryKey};
pub use error::{RegistryError, Result};
pub use record::{read_attribute, ChangeListener, Document, ListenerId, Record, Watchers};
pub use types::{IndexSpec, RecordId, IDENTITY_ATTRIBUTE};
pub use value::Value;
