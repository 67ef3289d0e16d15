use core::sync::atomic::{AtomicU32, Ordering};

/// Atomic 32-bit counter.
///
/// Every read-modify-write is fully ordered, like the host kernel's
/// value-returning atomics. Arithmetic wraps.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Atomic(AtomicU32);

impl Atomic {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }

    /// Returns the new value.
    #[inline]
    pub fn inc(&self) -> u32 {
        self.add(1)
    }

    /// Returns the new value.
    #[inline]
    pub fn dec(&self) -> u32 {
        self.sub(1)
    }

    /// Returns the new value.
    #[inline]
    pub fn add(&self, value: u32) -> u32 {
        self.0.fetch_add(value, Ordering::SeqCst).wrapping_add(value)
    }

    /// Returns the new value.
    #[inline]
    pub fn sub(&self, value: u32) -> u32 {
        self.0.fetch_sub(value, Ordering::SeqCst).wrapping_sub(value)
    }

    /// Stores `new` if the current value is `old`.
    ///
    /// Returns the value observed before the operation; the swap happened iff
    /// that equals `old`.
    #[inline]
    pub fn compare_and_swap(&self, old: u32, new: u32) -> u32 {
        match self
            .0
            .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(prev) | Err(prev) => prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn arithmetic_returns_new_value() {
        let a = Atomic::new(5);
        assert_eq!(a.inc(), 6);
        assert_eq!(a.add(4), 10);
        assert_eq!(a.sub(3), 7);
        assert_eq!(a.dec(), 6);
        assert_eq!(a.get(), 6);
        a.set(0);
        assert_eq!(a.dec(), u32::MAX);
        assert_eq!(a.inc(), 0);
    }

    #[test]
    fn compare_and_swap_reports_previous() {
        let a = Atomic::new(1);
        assert_eq!(a.compare_and_swap(2, 9), 1);
        assert_eq!(a.get(), 1);
        assert_eq!(a.compare_and_swap(1, 9), 1);
        assert_eq!(a.get(), 9);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let a = Arc::new(Atomic::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let a = Arc::clone(&a);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        a.inc();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(a.get(), 40_000);
    }
}
