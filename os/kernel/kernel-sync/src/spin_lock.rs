use crate::{RawLock, RawSpin};
use core::{
    cell::UnsafeCell,
    fmt,
    ops::{Deref, DerefMut},
};

/// Busy-waiting lock around a `T`.
///
/// Never sleeps, so it is usable from any context. Hold times must be short.
pub struct SpinLock<T, R: RawLock = RawSpin> {
    raw: R,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send, R: RawLock + Sync> Sync for SpinLock<T, R> {}
unsafe impl<T: Send, R: RawLock + Send> Send for SpinLock<T, R> {}

impl<T> SpinLock<T> {
    #[must_use]
    pub const fn new(inner: T) -> Self {
        Self::with_raw(inner)
    }
}

impl<T, R: RawLock> SpinLock<T, R> {
    /// Creates a lock using the raw strategy `R`.
    #[must_use]
    pub const fn with_raw(inner: T) -> Self {
        Self {
            raw: R::INIT,
            inner: UnsafeCell::new(inner),
        }
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T, R>> {
        if self.raw.raw_try_lock() {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Spin until acquired.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T, R> {
        self.raw.raw_lock();
        SpinLockGuard { lock: self }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock();
        f(&mut g)
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug, R: RawLock> fmt::Debug for SpinLock<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(g) => f.debug_struct("SpinLock").field("data", &&*g).finish(),
            None => f.write_str("SpinLock { <locked> }"),
        }
    }
}

#[must_use = "dropping the guard releases the lock immediately"]
pub struct SpinLockGuard<'a, T, R: RawLock = RawSpin> {
    lock: &'a SpinLock<T, R>,
}

impl<T, R: RawLock> Deref for SpinLockGuard<'_, T, R> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard proves we hold the lock.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T, R: RawLock> DerefMut for SpinLockGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves we hold the lock exclusively.
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T, R: RawLock> Drop for SpinLockGuard<'_, T, R> {
    fn drop(&mut self) {
        // SAFETY: constructed only after a successful acquire.
        unsafe { self.lock.raw.raw_unlock() }
    }
}
