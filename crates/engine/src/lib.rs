//! Registry engine for setdex
//!
//! This crate composes the lower layers into the [`Registry`] façade:
//! - IndexStore (setdex-storage): secondary indexes kept in lockstep with members
//! - ChangeNotifier: routes record change reports to index relocation
//! - QueryCache: memoized query results, cleared on every mutation
//! - ConcurrencyGuard (setdex-concurrency): one lock around each operation
//! - RegistryConfig: construction parameters, loadable from TOML
//!
//! The engine is the only component that knows about:
//! - Query planning across simple and compound indexes
//! - When the cache must be invalidated
//! - Which members are subscribed for change reports

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod notifier;
pub mod query;
pub mod registry;

pub use cache::{CacheStats, QueryCache, DEFAULT_CACHE_CAPACITY};
pub use config::RegistryConfig;
pub use notifier::ChangeNotifier;
pub use query::Plan;
pub use registry::Registry;
