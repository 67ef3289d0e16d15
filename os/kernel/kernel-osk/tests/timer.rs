use kernel_osk::{Timer, WaitQ};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

fn counting_timer() -> (Timer, Arc<AtomicU32>) {
    let fired = Arc::new(AtomicU32::new(0));
    let timer = {
        let fired = Arc::clone(&fired);
        Timer::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
    };
    (timer, fired)
}

#[test]
fn fires_once_per_arm() {
    let (timer, fired) = counting_timer();
    timer.start(10);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!timer.is_pending());

    timer.start_ns(1_000_000);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn fires_no_earlier_than_the_delay() {
    let (tx, rx) = mpsc::channel();
    let timer = Timer::new(move || tx.send(Instant::now()).unwrap()).unwrap();

    let armed = Instant::now();
    timer.start(30);
    let fired_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(fired_at.duration_since(armed) >= Duration::from_millis(30));
}

#[test]
fn stop_prevents_pending_fire() {
    let (timer, fired) = counting_timer();
    timer.start(100);
    assert!(timer.is_pending());
    timer.stop();
    assert!(!timer.is_pending());
    thread::sleep(Duration::from_millis(250));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn rearm_moves_the_deadline() {
    let (timer, fired) = counting_timer();
    timer.start(50);
    timer.start(400);
    thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    thread::sleep(Duration::from_millis(500));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_waits_for_running_callback() {
    let entered = Arc::new(WaitQ::new());
    let finished = Arc::new(AtomicU32::new(0));
    let timer = {
        let entered = Arc::clone(&entered);
        let finished = Arc::clone(&finished);
        Timer::new(move || {
            entered.set();
            thread::sleep(Duration::from_millis(100));
            finished.store(1, Ordering::SeqCst);
        })
        .unwrap()
    };

    timer.start(0);
    entered.wait();
    timer.stop();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_can_be_replaced() {
    let (timer, first) = counting_timer();
    let second = Arc::new(AtomicU32::new(0));
    {
        let second = Arc::clone(&second);
        timer.set_callback(move || {
            second.fetch_add(1, Ordering::SeqCst);
        });
    }
    timer.start(5);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_callback_does_not_kill_the_timer() {
    let (tx, rx) = mpsc::channel();
    let calls = Arc::new(AtomicU32::new(0));
    let timer = {
        let calls = Arc::clone(&calls);
        Timer::new(move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first call fails");
            }
            tx.send(()).unwrap();
        })
        .unwrap()
    };

    timer.start(0);
    thread::sleep(Duration::from_millis(100));
    timer.start(0);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn dropping_an_armed_timer_cancels_it() {
    let (timer, fired) = counting_timer();
    timer.start(100);
    drop(timer);
    thread::sleep(Duration::from_millis(250));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[cfg(feature = "debug")]
#[test]
fn active_flag_tracks_arming() {
    let (timer, _fired) = counting_timer();
    assert!(!timer.is_active());
    timer.start(1_000);
    assert!(timer.is_active());
    timer.stop();
    assert!(!timer.is_active());

    timer.start(0);
    thread::sleep(Duration::from_millis(200));
    assert!(!timer.is_active());
}

#[cfg(feature = "debug")]
#[test]
fn rearming_from_the_callback_stays_active() {
    use std::sync::{OnceLock, Weak};

    let me: Arc<OnceLock<Weak<Timer>>> = Arc::new(OnceLock::new());
    let fired = Arc::new(AtomicU32::new(0));
    let timer = {
        let me = Arc::clone(&me);
        let fired = Arc::clone(&fired);
        Arc::new(
            Timer::new(move || {
                if fired.fetch_add(1, Ordering::SeqCst) == 0
                    && let Some(timer) = me.get().and_then(Weak::upgrade)
                {
                    timer.start(10_000);
                }
            })
            .unwrap(),
        )
    };
    me.set(Arc::downgrade(&timer)).unwrap();

    timer.start(0);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(timer.is_pending());
    assert!(timer.is_active());
    timer.stop();
    assert!(!timer.is_active());
}
