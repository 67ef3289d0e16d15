use kernel_osk::{OskError, SubmitResult, WaitQ, Work, WorkQueue, WorkQueueFlags};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

fn serial() -> WorkQueueFlags {
    WorkQueueFlags::new().with_non_reentrant(true)
}

#[test]
fn runs_submitted_work_and_flush_waits() {
    let wq = WorkQueue::new("osk-test", WorkQueueFlags::new()).unwrap();
    assert!(wq.worker_count() >= 1);

    let ran = Arc::new(AtomicU32::new(0));
    let items: Vec<_> = (0..16)
        .map(|_| {
            let ran = Arc::clone(&ran);
            Work::new(move || {
                thread::sleep(Duration::from_millis(2));
                ran.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for w in &items {
        assert_eq!(wq.submit(w).unwrap(), SubmitResult::Enqueued);
    }
    wq.flush();
    assert_eq!(ran.load(Ordering::SeqCst), 16);
    assert!(items.iter().all(|w| !w.is_pending()));
}

#[test]
fn non_reentrant_queue_is_fifo() {
    let wq = WorkQueue::new("osk-fifo", serial()).unwrap();
    assert_eq!(wq.worker_count(), 1);

    let order = Arc::new(Mutex::new(Vec::new()));
    let items: Vec<_> = (0..10)
        .map(|i| {
            let order = Arc::clone(&order);
            Work::new(move || order.lock().unwrap().push(i))
        })
        .collect();
    for w in &items {
        wq.submit(w).unwrap();
    }
    wq.flush();
    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn pending_item_is_not_queued_twice() {
    let wq = WorkQueue::new("osk-dup", serial()).unwrap();
    let gate = Arc::new(WaitQ::new());
    let blocker = {
        let gate = Arc::clone(&gate);
        Work::new(move || gate.wait())
    };
    let ran = Arc::new(AtomicU32::new(0));
    let item = {
        let ran = Arc::clone(&ran);
        Work::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
    };

    // Park the only worker so `item` stays pending.
    wq.submit(&blocker).unwrap();
    assert_eq!(wq.submit(&item).unwrap(), SubmitResult::Enqueued);
    assert!(item.is_pending());
    assert_eq!(wq.submit(&item).unwrap(), SubmitResult::AlreadyPending);
    assert!(!SubmitResult::AlreadyPending.enqueued());

    gate.set();
    wq.flush();
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    // Once it has run it can be queued again.
    assert!(wq.submit(&item).unwrap().enqueued());
    wq.flush();
    assert_eq!(ran.load(Ordering::SeqCst), 2);
}

#[test]
fn work_can_resubmit_itself() {
    let wq = Arc::new(WorkQueue::new("osk-resubmit", serial()).unwrap());
    let runs = Arc::new(AtomicU32::new(0));
    let done = Arc::new(WaitQ::new());
    let me: Arc<OnceLock<Weak<Work>>> = Arc::new(OnceLock::new());

    let work = {
        let wq = Arc::downgrade(&wq);
        let runs = Arc::clone(&runs);
        let done = Arc::clone(&done);
        let me = Arc::clone(&me);
        Work::new(move || {
            if runs.fetch_add(1, Ordering::SeqCst) + 1 < 5 {
                let (Some(wq), Some(work)) = (wq.upgrade(), me.get().and_then(Weak::upgrade))
                else {
                    return;
                };
                wq.submit(&work).unwrap();
            } else {
                done.set();
            }
        })
    };
    me.set(Arc::downgrade(&work)).unwrap();

    wq.submit(&work).unwrap();
    done.wait();
    assert_eq!(runs.load(Ordering::SeqCst), 5);
}

#[test]
fn submit_after_shutdown_fails() {
    let mut wq = WorkQueue::new("osk-closed", serial()).unwrap();
    let ran = Arc::new(AtomicU32::new(0));
    let item = {
        let ran = Arc::clone(&ran);
        Work::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
    };

    wq.submit(&item).unwrap();
    wq.shutdown();
    assert_eq!(ran.load(Ordering::SeqCst), 1, "shutdown drains the queue");

    let err = wq.submit(&item).unwrap_err();
    assert!(matches!(err, OskError::QueueClosed(ref name) if name == "osk-closed"));
    assert!(!item.is_pending());
    wq.shutdown();
}

#[test]
fn panicking_work_does_not_kill_the_worker() {
    let wq = WorkQueue::new("osk-panic", serial()).unwrap();
    let bad = Work::new(|| panic!("work failed"));
    let ran = Arc::new(AtomicU32::new(0));
    let good = {
        let ran = Arc::clone(&ran);
        Work::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
    };

    wq.submit(&bad).unwrap();
    wq.submit(&good).unwrap();
    wq.flush();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn flags_are_recorded() {
    let flags = WorkQueueFlags::new()
        .with_high_priority(true)
        .with_rescuer(true);
    let wq = WorkQueue::new("osk-flags", flags).unwrap();
    assert_eq!(wq.name(), "osk-flags");
    assert!(wq.flags().high_priority());
    assert!(wq.flags().rescuer());
    assert!(!wq.flags().non_reentrant());
}
