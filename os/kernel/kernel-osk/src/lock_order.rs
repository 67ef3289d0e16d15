//! Lock ordering.
//!
//! Every sleeping lock is created with a [`LockOrder`]. A thread must acquire
//! locks in strictly increasing order; taking a lock whose order is not above
//! the most recently acquired one is an inversion and, in builds with
//! `debug_assertions`, panics at the acquisition site. Release builds do no
//! tracking.
//!
//! Releasing out of order is fine: the held set shrinks, and the check keeps
//! comparing against the most recent acquisition still held.

use core::fmt;

/// Rank of a lock in the global acquisition order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LockOrder(pub u32);

impl LockOrder {
    /// Outermost locks: whole-device state.
    pub const DEVICE: Self = Self(100);
    /// Per-context (per-client) state.
    pub const CONTEXT: Self = Self(200);
    /// Job scheduling state.
    pub const JOB_SCHEDULER: Self = Self(300);
    /// Power management.
    pub const POWER: Self = Self(400);
    /// GPU memory regions of a context.
    pub const MEM_REGIONS: Self = Self(500);
    /// Page-table updates.
    pub const MMU: Self = Self(600);
    /// Leaf locks that never nest anything.
    pub const LEAF: Self = Self(u32::MAX);

    #[must_use]
    pub const fn rank(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LockOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {}", self.0)
    }
}

#[cfg(debug_assertions)]
mod tracking {
    use super::LockOrder;
    use std::cell::RefCell;

    thread_local! {
        static HELD: RefCell<Vec<LockOrder>> = const { RefCell::new(Vec::new()) };
    }

    pub fn acquire(order: LockOrder) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(&last) = held.last() {
                assert!(
                    order > last,
                    "lock order violation: acquiring {order} while holding {last}"
                );
            }
            held.push(order);
        });
    }

    pub fn release(order: LockOrder) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&o| o == order) {
                held.remove(pos);
            }
        });
    }

    pub fn held() -> Vec<LockOrder> {
        HELD.with(|held| held.borrow().clone())
    }
}

/// Records that the current thread is about to block on a lock of `order`.
#[inline]
pub(crate) fn acquire(order: LockOrder) {
    #[cfg(debug_assertions)]
    tracking::acquire(order);
    #[cfg(not(debug_assertions))]
    let _ = order;
}

#[inline]
pub(crate) fn release(order: LockOrder) {
    #[cfg(debug_assertions)]
    tracking::release(order);
    #[cfg(not(debug_assertions))]
    let _ = order;
}

/// Orders of the locks the current thread holds, oldest first.
///
/// Always empty in release builds.
#[must_use]
pub fn held_orders() -> Vec<LockOrder> {
    #[cfg(debug_assertions)]
    {
        tracking::held()
    }
    #[cfg(not(debug_assertions))]
    {
        Vec::new()
    }
}
