//! setdex - In-memory indexed record collections
//!
//! setdex keeps a set of shared records with secondary indexes on their
//! attributes and answers conjunctive equality queries from those indexes,
//! with SQL-like `WHERE a = x AND b = y` semantics over an in-process set.
//!
//! # Quick Start
//!
//! ```
//! use setdex::{Criteria, Document, Registry};
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! registry.index("name")?;
//!
//! let dale = Arc::new(Document::new().field("name", "Dale").field("age", 30));
//! registry.add(dale.clone())?;
//!
//! assert!(registry.exists(&Criteria::new().with("name", "Dale"))?);
//!
//! // Changes reported by the record move it between buckets
//! dale.set("name", "Bob");
//! assert_eq!(registry.count_where(&Criteria::new().with("name", "Bob"))?, 1);
//! # Ok::<(), setdex::RegistryError>(())
//! ```
//!
//! # Architecture
//!
//! - `setdex-core`: values, record contract, criteria, errors
//! - `setdex-storage`: attribute indexes and the index store
//! - `setdex-concurrency`: the operation guard
//! - `setdex-engine`: query cache, change notifier, registry façade

pub use setdex_core::{
    read_attribute, ChangeListener, Criteria, Document, IndexSpec, ListenerId, QueryKey, Record,
    RecordId, RegistryError, Result, Value, Watchers, IDENTITY_ATTRIBUTE,
};
pub use setdex_engine::{CacheStats, Registry, RegistryConfig, DEFAULT_CACHE_CAPACITY};
