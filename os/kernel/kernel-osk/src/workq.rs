//! Work queues.
//!
//! A [`WorkQueue`] is a named set of host worker threads pulling [`Work`]
//! items off a shared FIFO. Items start in submission order; with more than
//! one worker they may finish out of order, and nothing is ordered across
//! different queues.
//!
//! A work item is pending from the moment it is submitted until a worker
//! picks it up. Submitting a pending item again is a no-op, so an item runs
//! once no matter how many times it was submitted while waiting. The pending
//! flag is cleared *before* the callback runs, which lets a callback submit
//! its own item again.
//!
//! There is no cancellation: once submitted, an item runs. Backpressure, if
//! needed, is the caller's business.

use crate::config;
use crate::error::{OskError, Result};
use bitfield_struct::bitfield;
use log::{debug, error, warn};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

/// Creation flags of a [`WorkQueue`].
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct WorkQueueFlags {
    /// A single worker: items never run concurrently and finish in FIFO order.
    pub non_reentrant: bool,
    /// Latency-sensitive queue. Host threads carry no priority, so this only
    /// tags the worker names.
    pub high_priority: bool,
    /// The queue must make progress under memory pressure. Workers are
    /// spawned up front, which already guarantees that on the host.
    pub rescuer: bool,
    #[bits(29)]
    __: u32,
}

/// Outcome of [`WorkQueue::submit`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubmitResult {
    /// The item was added to the queue.
    Enqueued,
    /// The item was already waiting to run; nothing was added.
    AlreadyPending,
}

impl SubmitResult {
    #[must_use]
    pub const fn enqueued(self) -> bool {
        matches!(self, Self::Enqueued)
    }
}

/// A deferred-work item: a callback plus its pending flag.
///
/// User data travels inside the callback closure.
pub struct Work {
    pending: AtomicBool,
    func: Box<dyn Fn() + Send + Sync>,
}

impl Work {
    #[must_use]
    pub fn new(func: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            pending: AtomicBool::new(false),
            func: Box::new(func),
        })
    }

    /// Whether the item sits in some queue waiting for a worker.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn run(&self) {
        if panic::catch_unwind(AssertUnwindSafe(|| (self.func)())).is_err() {
            error!("work item panicked");
        }
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<(u64, Arc<Work>)>,
    /// Sequence numbers of items submitted but not finished.
    in_flight: BTreeSet<u64>,
    next_seq: u64,
    closed: bool,
}

struct Shared {
    name: String,
    state: Mutex<QueueState>,
    work_available: Condvar,
    work_done: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn worker_loop(&self) {
        loop {
            let (seq, work) = {
                let mut st = self.state();
                loop {
                    if let Some(item) = st.queue.pop_front() {
                        break item;
                    }
                    if st.closed {
                        return;
                    }
                    st = self
                        .work_available
                        .wait(st)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };

            work.pending.store(false, Ordering::Release);
            work.run();

            self.state().in_flight.remove(&seq);
            self.work_done.notify_all();
        }
    }
}

/// A named queue of deferred work with its own worker threads.
pub struct WorkQueue {
    shared: Arc<Shared>,
    flags: WorkQueueFlags,
    workers: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    /// Creates the queue and starts its workers.
    ///
    /// Non-reentrant queues get one worker, others one per host CPU.
    ///
    /// # Errors
    ///
    /// [`OskError::ThreadSpawn`] if a worker thread cannot be created. Workers
    /// started before the failure are shut down again.
    pub fn new(name: &str, flags: WorkQueueFlags) -> Result<Self> {
        let shared = Arc::new(Shared {
            name: name.to_owned(),
            state: Mutex::new(QueueState::default()),
            work_available: Condvar::new(),
            work_done: Condvar::new(),
        });

        let count = if flags.non_reentrant() {
            1
        } else {
            config::num_cpus()
        };

        let mut wq = Self {
            shared,
            flags,
            workers: Vec::with_capacity(count),
        };

        for i in 0..count {
            let thread_name = if flags.high_priority() {
                format!("{name}/{i}H")
            } else {
                format!("{name}/{i}")
            };
            let shared = Arc::clone(&wq.shared);
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || shared.worker_loop())
                .map_err(|source| OskError::ThreadSpawn {
                    name: thread_name,
                    source,
                })?;
            wq.workers.push(handle);
        }

        debug!("work queue `{name}` started with {count} worker(s), flags {flags:?}");
        Ok(wq)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub const fn flags(&self) -> WorkQueueFlags {
        self.flags
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues `work` unless it is already pending.
    ///
    /// # Errors
    ///
    /// [`OskError::QueueClosed`] after [`shutdown`](Self::shutdown).
    pub fn submit(&self, work: &Arc<Work>) -> Result<SubmitResult> {
        if work.pending.swap(true, Ordering::AcqRel) {
            return Ok(SubmitResult::AlreadyPending);
        }

        let mut st = self.shared.state();
        if st.closed {
            work.pending.store(false, Ordering::Release);
            return Err(OskError::QueueClosed(self.shared.name.clone()));
        }
        let seq = st.next_seq;
        st.next_seq += 1;
        st.in_flight.insert(seq);
        st.queue.push_back((seq, Arc::clone(work)));
        drop(st);

        self.shared.work_available.notify_one();
        Ok(SubmitResult::Enqueued)
    }

    /// Blocks until every item submitted before this call has finished.
    ///
    /// Calling it from one of the queue's own workers would wait on itself;
    /// that is reported and ignored.
    pub fn flush(&self) {
        if self.is_worker(thread::current().id()) {
            warn!(
                "work queue `{}` flushed from its own worker, ignoring",
                self.shared.name
            );
            return;
        }

        let mut st = self.shared.state();
        let target = st.next_seq;
        while st.in_flight.first().is_some_and(|&oldest| oldest < target) {
            st = self
                .shared
                .work_done
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Runs everything already queued, then stops and joins the workers.
    ///
    /// Further submissions fail with [`OskError::QueueClosed`]. Idempotent.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.flush();
        self.shared.state().closed = true;
        self.shared.work_available.notify_all();

        let me = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == me {
                continue;
            }
            if worker.join().is_err() {
                error!("work queue `{}` worker died", self.shared.name);
            }
        }
        debug!("work queue `{}` shut down", self.shared.name);
    }

    fn is_worker(&self, id: ThreadId) -> bool {
        self.workers.iter().any(|w| w.thread().id() == id)
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state();
        f.debug_struct("WorkQueue")
            .field("name", &self.shared.name)
            .field("flags", &self.flags)
            .field("workers", &self.workers.len())
            .field("queued", &st.queue.len())
            .field("in_flight", &st.in_flight.len())
            .finish()
    }
}
