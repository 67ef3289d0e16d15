//! # Kernel spin-lock primitives
//!
//! The no_std half of the OSK lock vocabulary:
//!
//! | OSK name | Type |
//! |----------|------|
//! | spinlock | [`SpinLock`] |
//! | IRQ-safe spinlock | [`IrqSpinLock`] (spinlock + saved [`IrqFlags`]) |
//!
//! Both locks are generic over a [`RawLock`] so the acquisition strategy can
//! be swapped without touching the guard types. The IRQ-safe variant is
//! additionally generic over an [`InterruptControl`] that knows how to save,
//! disable and restore the local interrupt state.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod raw_spin;
mod spin_lock;

pub use irq::{InterruptControl, IrqFlags, IrqSpinLock, IrqSpinLockGuard};
pub use raw_spin::RawSpin;
pub use spin_lock::{SpinLock, SpinLockGuard};

#[cfg(target_arch = "x86_64")]
pub use irq::CpuInterrupts;

/// A raw, data-less lock.
///
/// # Safety
///
/// Implementors must guarantee mutual exclusion: between a successful
/// [`raw_lock`](Self::raw_lock)/[`raw_try_lock`](Self::raw_try_lock) and the
/// matching [`raw_unlock`](Self::raw_unlock), no other caller may acquire the
/// lock. Acquisition must have `Acquire` and release `Release` semantics.
pub unsafe trait RawLock {
    /// The unlocked state, usable in `const` contexts.
    const INIT: Self;

    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;

    /// # Safety
    ///
    /// The caller must hold the lock.
    unsafe fn raw_unlock(&self);

    /// Whether the lock is currently held by anyone. Racy; diagnostics only.
    fn is_locked(&self) -> bool;
}
