//! Interrupt-state save/restore and the IRQ-safe spin lock.
//!
//! An [`IrqSpinLock`] disables interrupts on the local core before spinning
//! and restores the saved state after the lock is released. This keeps an
//! interrupt handler on the same core from spinning forever on a lock its own
//! interrupted context holds.
//!
//! What "the local core" and "interrupts" are is left to an
//! [`InterruptControl`] implementation: [`CpuInterrupts`] drives the real
//! x86-64 `IF` flag, hosted builds supply a software model.

use crate::{RawLock, RawSpin, SpinLock, SpinLockGuard};
use bitfield_struct::bitfield;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// Saved interrupt state.
///
/// Laid out like the x86-64 `RFLAGS` register so that [`CpuInterrupts`] can
/// store the raw register value; only the `IF` bit is interpreted.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct IrqFlags {
    #[bits(9)]
    __: u16,

    /// Bit 9: Interrupt Enable Flag (`IF`).
    pub interrupts_enabled: bool,

    #[bits(54)]
    __: u64,
}

impl IrqFlags {
    /// Flags describing the given interrupt-enable state.
    #[must_use]
    pub const fn from_enabled(enabled: bool) -> Self {
        Self::new().with_interrupts_enabled(enabled)
    }
}

/// Access to the local core's interrupt-enable state.
pub trait InterruptControl {
    /// Returns the current state and disables interrupts.
    fn save_and_disable() -> IrqFlags;

    /// Re-enables interrupts if `flags` says they were enabled.
    fn restore(flags: IrqFlags);

    fn are_enabled() -> bool;
}

/// The x86-64 `IF` flag, driven with `pushfq`/`cli`/`sti`.
///
/// # Safety & Privilege
///
/// Must only be used where `cli`/`sti` are legal (ring 0). Calling from user
/// space faults.
#[cfg(target_arch = "x86_64")]
pub struct CpuInterrupts;

#[cfg(target_arch = "x86_64")]
impl CpuInterrupts {
    #[inline]
    #[must_use]
    fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(preserves_flags)) }
        r
    }
}

#[cfg(target_arch = "x86_64")]
impl InterruptControl for CpuInterrupts {
    #[inline]
    fn save_and_disable() -> IrqFlags {
        let flags = IrqFlags::from_bits(Self::rflags());
        if flags.interrupts_enabled() {
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
        flags
    }

    #[inline]
    fn restore(flags: IrqFlags) {
        if flags.interrupts_enabled() {
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }

    #[inline]
    fn are_enabled() -> bool {
        IrqFlags::from_bits(Self::rflags()).interrupts_enabled()
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Nested guards compose: the inner guard sees interrupts already disabled
/// and leaves them disabled when it goes away.
pub struct IrqGuard<I: InterruptControl> {
    saved: IrqFlags,
    _irq: PhantomData<fn() -> I>,
}

impl<I: InterruptControl> IrqGuard<I> {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            saved: I::save_and_disable(),
            _irq: PhantomData,
        }
    }

    /// The state that will be restored on drop.
    #[inline]
    #[must_use]
    pub const fn saved(&self) -> IrqFlags {
        self.saved
    }
}

impl<I: InterruptControl> Default for IrqGuard<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: InterruptControl> Drop for IrqGuard<I> {
    fn drop(&mut self) {
        I::restore(self.saved);
    }
}

/// Spin lock that also keeps local interrupts disabled while held.
pub struct IrqSpinLock<T, I: InterruptControl, R: RawLock = RawSpin> {
    lock: SpinLock<T, R>,
    _irq: PhantomData<fn() -> I>,
}

impl<T, I: InterruptControl, R: RawLock> IrqSpinLock<T, I, R> {
    #[must_use]
    pub const fn new(inner: T) -> Self {
        Self {
            lock: SpinLock::with_raw(inner),
            _irq: PhantomData,
        }
    }

    /// Saves and disables interrupts, then spins for the lock.
    #[inline]
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T, I, R> {
        let irq = IrqGuard::new();
        let guard = self.lock.lock();
        IrqSpinLockGuard { guard, irq }
    }

    /// Single attempt. Interrupt state is untouched on failure.
    #[inline]
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T, I, R>> {
        let irq = IrqGuard::new();
        let guard = self.lock.try_lock()?;
        Some(IrqSpinLockGuard { guard, irq })
    }

    #[inline]
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock();
        f(&mut g)
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.lock.get_mut()
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.lock.into_inner()
    }
}

/// Guard of an [`IrqSpinLock`].
///
/// Field order matters: the lock is released before interrupts are restored.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct IrqSpinLockGuard<'a, T, I: InterruptControl, R: RawLock = RawSpin> {
    guard: SpinLockGuard<'a, T, R>,
    irq: IrqGuard<I>,
}

impl<T, I: InterruptControl, R: RawLock> IrqSpinLockGuard<'_, T, I, R> {
    /// Interrupt state saved when the lock was taken.
    #[must_use]
    pub const fn saved_flags(&self) -> IrqFlags {
        self.irq.saved()
    }
}

impl<T, I: InterruptControl, R: RawLock> Deref for IrqSpinLockGuard<'_, T, I, R> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, I: InterruptControl, R: RawLock> DerefMut for IrqSpinLockGuard<'_, T, I, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
