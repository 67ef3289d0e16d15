//! Sleeping reader-writer lock.
//!
//! Many readers or one writer. Waiting writers block new readers so a steady
//! stream of readers cannot starve a writer. A write guard can be downgraded
//! to a read guard without letting another writer in between.

use crate::lock_order::{self, LockOrder};
use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// Sleeping reader-writer lock carrying a [`LockOrder`].
///
/// Any number of readers or a single writer. Like [`Mutex`](crate::Mutex), it
/// never poisons.
pub struct RwLock<T> {
    state: Mutex<State>,
    changed: Condvar,
    order: LockOrder,
    data: UnsafeCell<T>,
}

// SAFETY: readers share `&T` (needs `T: Sync`), a writer gets `&mut T`
// (needs `T: Send`).
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    #[must_use]
    pub const fn new(value: T, order: LockOrder) -> Self {
        Self {
            state: Mutex::new(State {
                readers: 0,
                writer: false,
                waiting_writers: 0,
            }),
            changed: Condvar::new(),
            order,
            data: UnsafeCell::new(value),
        }
    }

    #[must_use]
    pub const fn order(&self) -> LockOrder {
        self.order
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until no writer holds or waits for the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        lock_order::acquire(self.order);
        let mut st = self.state();
        while st.writer || st.waiting_writers > 0 {
            st = self.wait(st);
        }
        st.readers += 1;
        RwLockReadGuard::new(self)
    }

    /// Blocks until the lock is free.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        lock_order::acquire(self.order);
        let mut st = self.state();
        st.waiting_writers += 1;
        while st.writer || st.readers > 0 {
            st = self.wait(st);
        }
        st.waiting_writers -= 1;
        st.writer = true;
        RwLockWriteGuard::new(self)
    }

    /// Single attempt at a read lock.
    ///
    /// The order check runs first, so an inversion panics before the lock
    /// state is touched.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        lock_order::acquire(self.order);
        let mut st = self.state();
        if st.writer || st.waiting_writers > 0 {
            drop(st);
            lock_order::release(self.order);
            return None;
        }
        st.readers += 1;
        Some(RwLockReadGuard::new(self))
    }

    /// Single attempt at the write lock.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        lock_order::acquire(self.order);
        let mut st = self.state();
        if st.writer || st.readers > 0 {
            drop(st);
            lock_order::release(self.order);
            return None;
        }
        st.writer = true;
        Some(RwLockWriteGuard::new(self))
    }

    #[must_use]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn read_unlock(&self) {
        let mut st = self.state();
        st.readers -= 1;
        if st.readers == 0 {
            drop(st);
            self.changed.notify_all();
        }
        lock_order::release(self.order);
    }

    fn write_unlock(&self) {
        self.state().writer = false;
        self.changed.notify_all();
        lock_order::release(self.order);
    }
}

impl<T> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state();
        f.debug_struct("RwLock")
            .field("order", &self.order)
            .field("readers", &st.readers)
            .field("writer", &st.writer)
            .field("waiting_writers", &st.waiting_writers)
            .finish_non_exhaustive()
    }
}

/// Shared access to an [`RwLock`].
///
/// The lock order is tracked per thread, so the guard must be dropped on the
/// thread that took it:
///
/// ```compile_fail
/// use kernel_osk::{LockOrder, RwLock};
///
/// fn assert_send<T: Send>(_: &T) {}
///
/// let lock = RwLock::new(0, LockOrder::LEAF);
/// let guard = lock.read();
/// assert_send(&guard);
/// ```
#[must_use = "dropping the guard releases the lock immediately"]
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: a shared guard only hands out `&T`.
unsafe impl<T: Sync> Sync for RwLockReadGuard<'_, T> {}

impl<'a, T> RwLockReadGuard<'a, T> {
    const fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: read lock held, no writer exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

/// Exclusive access to an [`RwLock`]. Not `Send`, like the read guard.
///
/// ```compile_fail
/// use kernel_osk::{LockOrder, RwLock};
///
/// fn assert_send<T: Send>(_: &T) {}
///
/// let lock = RwLock::new(0, LockOrder::LEAF);
/// let guard = lock.write();
/// assert_send(&guard);
/// ```
#[must_use = "dropping the guard releases the lock immediately"]
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: `&RwLockWriteGuard` only hands out `&T`.
unsafe impl<T: Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<'a, T> RwLockWriteGuard<'a, T> {
    const fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Atomically turns the write lock into a read lock.
    ///
    /// Readers blocked only on this writer may proceed; no writer can slip in
    /// between.
    pub fn downgrade(self) -> RwLockReadGuard<'a, T> {
        let this = ManuallyDrop::new(self);
        let lock = this.lock;
        {
            let mut st = lock.state();
            st.writer = false;
            st.readers += 1;
        }
        lock.changed.notify_all();
        RwLockReadGuard::new(lock)
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: write lock held, no other reader or writer exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: write lock held, no other reader or writer exists.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn multiple_readers() {
        let lock = RwLock::new(42, LockOrder::LEAF);
        let g1 = lock.read();
        thread::scope(|s| {
            s.spawn(|| {
                let g2 = lock.try_read().unwrap();
                assert_eq!(*g2, 42);
                drop(g2);
                assert!(lock.try_write().is_none());
            });
        });
        assert_eq!(*g1, 42);
    }

    #[test]
    fn writer_excludes_everyone() {
        let lock = RwLock::new(0, LockOrder::LEAF);
        {
            let mut w = lock.write();
            *w = 99;
            thread::scope(|s| {
                s.spawn(|| {
                    assert!(lock.try_read().is_none());
                    assert!(lock.try_write().is_none());
                });
            });
        }
        assert_eq!(*lock.read(), 99);
    }

    #[test]
    fn downgrade_keeps_writers_out() {
        let lock = RwLock::new(1, LockOrder::LEAF);
        let mut w = lock.write();
        *w = 2;
        let r = w.downgrade();
        assert_eq!(*r, 2);
        thread::scope(|s| {
            s.spawn(|| {
                assert_eq!(*lock.try_read().unwrap(), 2);
                assert!(lock.try_write().is_none());
            });
        });
        drop(r);
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn failed_try_leaves_no_order_behind() {
        let lock = RwLock::new((), LockOrder::LEAF);
        let _w = lock.write();
        thread::scope(|s| {
            s.spawn(|| {
                assert!(lock.try_write().is_none());
                assert!(lock.try_read().is_none());
                assert!(lock_order::held_orders().is_empty());
            });
        });
    }

    #[cfg(debug_assertions)]
    #[test]
    fn inverted_try_lock_leaves_the_lock_free() {
        use crate::Mutex;
        use std::panic::{self, AssertUnwindSafe};

        let outer = Mutex::new((), LockOrder::MMU);
        let inner = RwLock::new(0, LockOrder::CONTEXT);

        let held = outer.lock();
        let try_write = panic::catch_unwind(AssertUnwindSafe(|| inner.try_write().map(drop)));
        assert!(try_write.is_err());
        let try_read = panic::catch_unwind(AssertUnwindSafe(|| inner.try_read().map(drop)));
        assert!(try_read.is_err());
        assert_eq!(lock_order::held_orders(), vec![LockOrder::MMU]);
        drop(held);

        let st = inner.state();
        assert_eq!((st.readers, st.writer), (0, false));
        drop(st);
        assert!(inner.try_write().is_some());
    }

    #[test]
    fn guard_dropped_on_its_own_thread_releases_the_order() {
        let lock = RwLock::new(0, LockOrder::MMU);
        let after = crate::Mutex::new((), LockOrder::CONTEXT);
        thread::scope(|s| {
            s.spawn(|| {
                *lock.write() += 1;
                assert!(lock_order::held_orders().is_empty());
            });
        });
        // Nothing stale on this thread either.
        drop(after.lock());
        assert_eq!(*lock.read(), 1);
    }
}
