//! Hosted interrupt model for the IRQ-safe spin lock.
//!
//! On the host each thread plays the role of a core, and its interrupt-enable
//! flag is a thread-local bit. Threads start with interrupts enabled. Code that
//! simulates interrupt context (e.g. a timer callback) can check
//! [`HostInterrupts::are_enabled`] to assert it is not running under an
//! IRQ-safe lock.

pub use kernel_sync::{InterruptControl, IrqFlags};
use std::cell::Cell;

thread_local! {
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Per-thread emulated interrupt-enable flag.
pub struct HostInterrupts;

impl InterruptControl for HostInterrupts {
    #[inline]
    fn save_and_disable() -> IrqFlags {
        IrqFlags::from_enabled(IRQ_ENABLED.with(|f| f.replace(false)))
    }

    #[inline]
    fn restore(flags: IrqFlags) {
        if flags.interrupts_enabled() {
            IRQ_ENABLED.with(|f| f.set(true));
        }
    }

    #[inline]
    fn are_enabled() -> bool {
        IRQ_ENABLED.with(Cell::get)
    }
}

/// Plain spin lock.
pub type SpinLock<T> = kernel_sync::SpinLock<T>;
pub type SpinLockGuard<'a, T> = kernel_sync::SpinLockGuard<'a, T>;

/// Spin lock that saves and disables (emulated) local interrupts while held.
pub type IrqSpinLock<T> = kernel_sync::IrqSpinLock<T, HostInterrupts>;
pub type IrqSpinLockGuard<'a, T> = kernel_sync::IrqSpinLockGuard<'a, T, HostInterrupts>;
