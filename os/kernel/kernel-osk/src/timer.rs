//! One-shot high-resolution timers.
//!
//! Each [`Timer`] owns a host dispatch thread that sleeps until the armed
//! deadline and then runs the callback. The callback stands in for the
//! host's timer-interrupt context: it must not block for long and must not
//! take sleeping locks that the arming thread may hold while calling
//! [`Timer::stop`].
//!
//! A timer fires at most once per [`start`](Timer::start). Re-arming a timer
//! that has not fired yet moves its deadline.
//!
//! With the `debug` feature the timer also tracks whether it is armed and
//! complains when it is re-configured or dropped while armed.

use crate::error::{OskError, Result};
use log::{error, trace};
#[cfg(feature = "debug")]
use log::warn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
#[cfg(feature = "debug")]
use std::sync::atomic::{AtomicBool, Ordering};

type Callback = Box<dyn FnMut() + Send>;

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    running: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    changed: Condvar,
    callback: Mutex<Callback>,
    #[cfg(feature = "debug")]
    active: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, st: MutexGuard<'a, TimerState>) -> MutexGuard<'a, TimerState> {
        self.changed.wait(st).unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self) {
        let mut st = self.state();
        loop {
            if st.shutdown {
                return;
            }
            let Some(deadline) = st.deadline else {
                st = self.wait(st);
                continue;
            };
            let now = Instant::now();
            if now < deadline {
                st = self
                    .changed
                    .wait_timeout(st, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }

            st.deadline = None;
            st.running = true;
            // Cleared under the state lock so a concurrent `start` is not lost.
            #[cfg(feature = "debug")]
            self.active.store(false, Ordering::Release);
            drop(st);

            trace!("timer fired");
            {
                let mut guard = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
                let callback = &mut *guard;
                if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                    error!("timer callback panicked");
                }
            }

            st = self.state();
            st.running = false;
            self.changed.notify_all();
        }
    }
}

/// A one-shot timer with a callback.
///
/// User data travels inside the callback closure.
pub struct Timer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Timer {
    /// Creates a stopped timer.
    ///
    /// # Errors
    ///
    /// [`OskError::ThreadSpawn`] if the host refuses to create the dispatch
    /// thread.
    pub fn new(callback: impl FnMut() + Send + 'static) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState::default()),
            changed: Condvar::new(),
            callback: Mutex::new(Box::new(callback)),
            #[cfg(feature = "debug")]
            active: AtomicBool::new(false),
        });

        let name = String::from("osk-timer");
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.dispatch())
            .map_err(|source| OskError::ThreadSpawn { name, source })?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Arms the timer to fire after `delay_ms` milliseconds.
    pub fn start(&self, delay_ms: u32) {
        self.arm(Duration::from_millis(u64::from(delay_ms)));
    }

    /// Arms the timer to fire after `delay_ns` nanoseconds.
    pub fn start_ns(&self, delay_ns: u64) {
        self.arm(Duration::from_nanos(delay_ns));
    }

    fn arm(&self, delay: Duration) {
        trace!("timer armed for {delay:?}");
        let mut st = self.shared.state();
        st.deadline = Some(Instant::now() + delay);
        #[cfg(feature = "debug")]
        self.shared.active.store(true, Ordering::Release);
        drop(st);
        self.shared.changed.notify_all();
    }

    /// Disarms the timer.
    ///
    /// If the callback is running, waits for it to return, unless called from
    /// the callback itself.
    pub fn stop(&self) {
        let mut st = self.shared.state();
        st.deadline = None;
        #[cfg(feature = "debug")]
        self.shared.active.store(false, Ordering::Release);
        self.shared.changed.notify_all();

        if self.on_dispatch_thread() {
            return;
        }
        while st.running {
            st = self.shared.wait(st);
        }
    }

    /// Replaces the callback. The timer should be stopped.
    ///
    /// Must not be called from the callback itself.
    pub fn set_callback(&self, callback: impl FnMut() + Send + 'static) {
        #[cfg(feature = "debug")]
        {
            if self.is_active() {
                warn!("timer callback replaced while the timer is armed");
            }
        }
        *self
            .shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Box::new(callback);
    }

    /// Whether a deadline is armed and has not fired yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.state().deadline.is_some()
    }

    /// Debug-build armed flag: set by `start`, cleared by `stop` and when the
    /// callback is dispatched.
    #[cfg(feature = "debug")]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    fn dispatch_thread(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    fn on_dispatch_thread(&self) -> bool {
        self.dispatch_thread() == Some(thread::current().id())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        #[cfg(feature = "debug")]
        {
            if self.is_active() {
                warn!("timer dropped while armed");
            }
        }
        self.stop();
        self.shared.state().shutdown = true;
        self.shared.changed.notify_all();

        if self.on_dispatch_thread() {
            // Dropped from its own callback; the thread exits on its own.
            return;
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl core::fmt::Debug for Timer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Timer")
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}
