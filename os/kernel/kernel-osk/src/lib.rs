//! # OSK: OS abstraction layer for the GPU kernel driver
//!
//! The driver core is written against the vocabulary in this crate instead of
//! the host's primitives directly. Each item maps onto one host facility and
//! adds no policy of its own:
//!
//! | OSK concept | Type | Host facility |
//! |-------------|------|---------------|
//! | spinlock | [`SpinLock`] | busy-wait lock ([`kernel_sync`]) |
//! | IRQ-safe spinlock | [`IrqSpinLock`] | spinlock + saved interrupt flags |
//! | mutex | [`Mutex`] | sleeping lock |
//! | rwlock | [`RwLock`] | sleeping reader-writer semaphore |
//! | atomic | [`Atomic`] | 32-bit atomic |
//! | waitq | [`WaitQ`] | signaled flag + wait queue |
//! | timer | [`Timer`] | one-shot high-resolution timer |
//! | workq | [`WorkQueue`], [`Work`] | worker threads |
//! | phys addr / page / vma | [`PhysAddr`], [`Page`], [`Vma`] | memory handles |
//! | ticks / timeval | [`Ticks`], [`TimeVal`] | clocks |
//!
//! In this hosted build the "host" is the process: sleeping primitives block
//! the calling thread, timers and work queues run on dedicated threads, and
//! each thread has its own emulated interrupt-enable flag.
//!
//! ## Lock ordering
//!
//! [`Mutex`] and [`RwLock`] take a [`LockOrder`]. Debug builds panic when a
//! thread acquires them out of order; see [`lock_order`].
//!
//! ## Features
//!
//! - `debug`: timers track whether they are armed and warn about misuse.

pub mod addr;
pub mod atomic;
pub mod config;
pub mod error;
pub mod irq;
pub mod lock_order;
pub mod logger;
pub mod mutex;
pub mod rwlock;
pub mod time;
pub mod timer;
pub mod waitq;
pub mod workq;

pub use addr::{Page, PhysAddr, Vma, VmaFlags};
pub use atomic::Atomic;
pub use error::{OskError, Result};
pub use irq::{
    HostInterrupts, InterruptControl, IrqFlags, IrqSpinLock, IrqSpinLockGuard, SpinLock,
    SpinLockGuard,
};
pub use lock_order::LockOrder;
pub use mutex::{Mutex, MutexGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use time::{Ticks, TimeVal};
pub use timer::Timer;
pub use waitq::WaitQ;
pub use workq::{SubmitResult, Work, WorkQueue, WorkQueueFlags};
