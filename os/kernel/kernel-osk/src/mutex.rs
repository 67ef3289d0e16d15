use crate::lock_order::{self, LockOrder};
use core::fmt;
use core::ops::{Deref, DerefMut};
use std::sync::{self, PoisonError, TryLockError};

/// Sleeping mutual-exclusion lock.
///
/// Non-reentrant: locking a mutex the thread already holds deadlocks (and
/// trips the lock-order check in debug builds). Unlike `std`, the lock does
/// not poison; a panic while held leaves the data reachable.
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
    order: LockOrder,
}

impl<T> Mutex<T> {
    #[must_use]
    pub const fn new(value: T, order: LockOrder) -> Self {
        Self {
            inner: sync::Mutex::new(value),
            order,
        }
    }

    #[must_use]
    pub const fn order(&self) -> LockOrder {
        self.order
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        lock_order::acquire(self.order);
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        MutexGuard {
            guard,
            order: self.order,
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let guard = match self.inner.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        lock_order::acquire(self.order);
        Some(MutexGuard {
            guard,
            order: self.order,
        })
    }

    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock();
        f(&mut g)
    }

    #[must_use]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        d.field("order", &self.order);
        match self.inner.try_lock() {
            Ok(g) => d.field("data", &&*g),
            Err(TryLockError::Poisoned(p)) => d.field("data", &&*p.into_inner()),
            Err(TryLockError::WouldBlock) => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

#[must_use = "dropping the guard releases the lock immediately"]
pub struct MutexGuard<'a, T> {
    guard: sync::MutexGuard<'a, T>,
    order: LockOrder,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        lock_order::release(self.order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn survives_panic_while_held() {
        let m = Mutex::new(1u32, LockOrder::LEAF);
        let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            m.with_lock(|v| {
                *v = 2;
                panic!("boom");
            })
        }));
        assert!(res.is_err());
        assert_eq!(*m.lock(), 2);
    }

    #[test]
    fn try_lock_while_held_fails() {
        let m = Mutex::new((), LockOrder::LEAF);
        let g = m.lock();
        assert!(m.try_lock().is_none());
        drop(g);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn debug_shows_order_and_data() {
        let m = Mutex::new(3u8, LockOrder(7));
        assert_eq!(
            format!("{m:?}"),
            "Mutex { order: LockOrder(7), data: 3 }"
        );
    }
}
