//! Signaled flag with a queue of waiting threads.
//!
//! The flag is meant for strictly ordered producer/consumer use: whoever
//! starts work that will eventually call [`WaitQ::set`] first calls
//! [`WaitQ::clear`]. For example, submitting a GPU job clears a "jobs in
//! flight" queue, and the completion path sets it again.
//!
//! The flag itself is an atomic with release/acquire pairing, so the ordering
//! no longer depends on some external barrier in the caller's pipeline:
//!
//! - `clear` and `set` store with `Release`;
//! - `wait` and `is_set` load with `Acquire`, so anything written before a
//!   `set` is visible to the thread it wakes.
//!
//! Sleeping is done on a condition variable guarded by a generation counter.
//! `set` bumps the generation, and a waiter returns when it sees either the
//! flag or a new generation. A waiter present at a `set` is therefore woken
//! even if a `clear` lands before it gets to run again.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// A signaled flag that threads can sleep on.
///
/// Starts not signaled. See the module docs for the clear-before-set contract.
pub struct WaitQ {
    signaled: AtomicBool,
    generation: Mutex<u64>,
    wake: Condvar,
}

impl Default for WaitQ {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQ {
    /// A new queue, not signaled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
            generation: Mutex::new(0),
            wake: Condvar::new(),
        }
    }

    /// Marks the queue signaled and wakes all waiters.
    pub fn set(&self) {
        self.signaled.store(true, Ordering::Release);
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.wake.notify_all();
    }

    /// Marks the queue not signaled. Does not affect threads already woken.
    pub fn clear(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Blocks until the queue is signaled.
    ///
    /// Returns immediately if it already is. There is no timeout.
    pub fn wait(&self) {
        if self.is_set() {
            return;
        }

        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entered = *generation;
        // Re-check under the lock: a `set` between the fast-path load and here
        // has already bumped the generation or is about to, either way we see it.
        while !self.is_set() && *generation == entered {
            generation = self
                .wake
                .wait(generation)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl fmt::Debug for WaitQ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQ")
            .field("signaled", &self.is_set())
            .finish_non_exhaustive()
    }
}
