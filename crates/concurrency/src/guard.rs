//! Coarse-grained operation guard
//!
//! A registry keeps all of its mutable state (members, indexes, cache)
//! behind one [`ConcurrencyGuard`]. Every public operation enters the guard
//! once and holds it until the operation is complete, so:
//!
//! - no two mutating operations interleave
//! - no reader observes an index that is half way through an update
//!
//! ## Modes
//!
//! - [`GuardMode::ThreadSafe`]: entering blocks until the guard is free
//! - [`GuardMode::SingleThreaded`]: entering never blocks; if the guard is
//!   already held the operation fails with `ConcurrentAccess`
//!
//! Both modes are memory safe. Single-threaded mode turns overlapping use,
//! which the caller promised not to do, into an error instead of a wait.
//!
//! The guard is not reentrant: an operation must not enter the same guard
//! again while holding it.

use parking_lot::{Mutex, MutexGuard};
use setdex_core::{RegistryError, Result};
use std::fmt;

/// How a [`ConcurrencyGuard`] reacts to contention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Block until the guard is free
    ThreadSafe,
    /// Fail with `ConcurrentAccess` if the guard is held
    SingleThreaded,
}

impl GuardMode {
    /// Mode for a `thread_safe` flag
    pub fn from_flag(thread_safe: bool) -> Self {
        if thread_safe {
            GuardMode::ThreadSafe
        } else {
            GuardMode::SingleThreaded
        }
    }
}

/// Mutual exclusion around a registry's state
pub struct ConcurrencyGuard<T> {
    mode: GuardMode,
    state: Mutex<T>,
}

impl<T> ConcurrencyGuard<T> {
    /// Wrap `state`
    pub fn new(state: T, mode: GuardMode) -> Self {
        Self {
            mode,
            state: Mutex::new(state),
        }
    }

    /// The contention policy
    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Whether entering blocks on contention
    pub fn is_thread_safe(&self) -> bool {
        self.mode == GuardMode::ThreadSafe
    }

    /// Enter the guard for the duration of `operation`
    ///
    /// # Errors
    /// In single-threaded mode, returns `ConcurrentAccess` if the guard is
    /// already held.
    pub fn enter(&self, operation: &'static str) -> Result<MutexGuard<'_, T>> {
        match self.mode {
            GuardMode::ThreadSafe => Ok(self.state.lock()),
            GuardMode::SingleThreaded => self
                .state
                .try_lock()
                .ok_or(RegistryError::ConcurrentAccess { operation }),
        }
    }

    /// Enter the guard, waiting for it in either mode
    ///
    /// Used for introspection, which has no error channel.
    pub fn read(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Direct access when the caller holds the guard exclusively
    pub fn get_mut(&mut self) -> &mut T {
        self.state.get_mut()
    }

    /// Unwrap the state
    pub fn into_inner(self) -> T {
        self.state.into_inner()
    }
}

impl<T> fmt::Debug for ConcurrencyGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("mode", &self.mode)
            .field("held", &self.state.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(GuardMode::from_flag(true), GuardMode::ThreadSafe);
        assert_eq!(GuardMode::from_flag(false), GuardMode::SingleThreaded);
    }

    #[test]
    fn test_enter_gives_access_to_state() {
        let guard = ConcurrencyGuard::new(vec![1, 2], GuardMode::ThreadSafe);
        guard.enter("push").unwrap().push(3);
        assert_eq!(*guard.enter("read").unwrap(), vec![1, 2, 3]);
        assert!(guard.is_thread_safe());
    }

    #[test]
    fn test_single_threaded_reports_overlap() {
        let guard = ConcurrencyGuard::new(0u32, GuardMode::SingleThreaded);
        let held = guard.enter("add").unwrap();

        thread::scope(|s| {
            let result = s.spawn(|| guard.enter("where").map(|_| ())).join().unwrap();
            assert_eq!(
                result,
                Err(RegistryError::ConcurrentAccess { operation: "where" })
            );
        });

        drop(held);
        assert!(guard.enter("where").is_ok());
    }

    #[test]
    fn test_single_threaded_reentry_is_an_error() {
        let guard = ConcurrencyGuard::new((), GuardMode::SingleThreaded);
        let _held = guard.enter("add").unwrap();
        assert!(guard.enter("add").unwrap_err().is_concurrent_access());
    }

    #[test]
    fn test_read_waits_in_single_threaded_mode() {
        let guard = ConcurrencyGuard::new(1u32, GuardMode::SingleThreaded);
        assert_eq!(*guard.read(), 1);
        *guard.enter("add").unwrap() += 1;
        assert_eq!(*guard.read(), 2);
    }

    #[test]
    fn test_get_mut_and_into_inner() {
        let mut guard = ConcurrencyGuard::new(String::from("a"), GuardMode::SingleThreaded);
        guard.get_mut().push('b');
        assert_eq!(guard.into_inner(), "ab");
    }

    #[test]
    fn test_debug_shows_mode() {
        let guard = ConcurrencyGuard::new((), GuardMode::ThreadSafe);
        let text = format!("{:?}", guard);
        assert!(text.contains("ThreadSafe"));
        assert!(text.contains("held: false"));
    }
}
