//! Storage layer for setdex
//!
//! This crate implements the index structures of a registry:
//! - AttributeIndex: Value → Set<RecordId> buckets for one attribute or tuple
//! - IndexStore: Every index of one registry, kept in lockstep with its members
//!
//! # Performance
//!
//! - FxHashMap / FxHashSet: O(1) bucket lookups, fast non-crypto hash
//! - Empty buckets are pruned immediately

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod store;

pub use index::AttributeIndex;
pub use store::{IndexSnapshot, IndexStore};
