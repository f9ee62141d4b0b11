//! Concurrency layer for setdex
//!
//! This crate implements the registry's locking discipline:
//! - ConcurrencyGuard: One coarse lock around all registry state
//! - GuardMode: Block on contention, or report it as an error

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod guard;

pub use guard::{ConcurrencyGuard, GuardMode};
