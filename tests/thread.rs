//! Thread isolation and the portability shim.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use throw_this::shim::{self, Condvar, Mutex, RecursiveMutex, ShimError, TimedMutex};
use throw_this::{defer_thread, exception, guard, throw};

exception! { static WORKER_FAILED; }

#[test]
fn exceptions_stay_on_their_thread() {
    let mut workers = Vec::new();
    for worker in 0..8 {
        workers.push(std::thread::spawn(move || {
            for round in 0..50 {
                let mut caught = false;
                guard! {
                    try { throw!(WORKER_FAILED, "worker {} round {}", worker, round); }
                    catch WORKER_FAILED { caught = true; }
                }
                assert!(caught);
            }
        }));
    }
    for worker in workers {
        worker.join().expect("worker should not panic");
    }
}

#[test]
fn defer_thread_runs_at_thread_exit() {
    let (sender, receiver) = mpsc::channel::<&'static str>();
    let handle = std::thread::spawn(move || {
        defer_thread(move || {
            let _ = sender.send("cleanup");
        });
    });
    handle.join().expect("thread should exit cleanly");
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok("cleanup"));
}

#[test]
fn defer_thread_hooks_run_lifo() {
    let (sender, receiver) = mpsc::channel::<u32>();
    let first = sender.clone();
    let handle = std::thread::spawn(move || {
        defer_thread(move || {
            let _ = first.send(1);
        });
        defer_thread(move || {
            let _ = sender.send(2);
        });
    });
    handle.join().expect("thread should exit cleanly");
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(2));
    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(1));
}

#[test]
fn shim_exit_unwinds_protected_regions() {
    let finalized = Arc::new(AtomicBool::new(false));
    let reached_end = Arc::new(AtomicBool::new(false));
    let flag = finalized.clone();
    let end = reached_end.clone();
    let stop = true;

    let thread = shim::Thread::spawn(move || {
        guard! {
            try {
                throw_this::protect(move || flag.store(true, Ordering::SeqCst));
                if stop {
                    shim::exit();
                }
            }
        }
        end.store(true, Ordering::SeqCst);
    })
    .expect("spawn should succeed");
    thread.join().expect("exit() is a clean shutdown");

    assert!(finalized.load(Ordering::SeqCst));
    assert!(!reached_end.load(Ordering::SeqCst));
}

#[test]
fn mutex_try_lock_reports_busy() {
    let lock = Arc::new(Mutex::new(0u32));
    let guard = lock.lock();
    let remote = lock.clone();
    let status = std::thread::spawn(move || remote.try_lock().map(|_| ()))
        .join()
        .expect("prober should not panic");
    drop(guard);
    assert_eq!(status, Err(ShimError::Busy));
    assert!(lock.try_lock().is_ok());
}

#[test]
fn timed_mutex_lock_deadline_times_out() {
    let lock = Arc::new(TimedMutex::new(()));
    let guard = lock.lock();
    let remote = lock.clone();
    let status = std::thread::spawn(move || {
        let deadline = shim::deadline_after(Duration::from_millis(50));
        remote.lock_deadline(deadline).map(|_| ())
    })
    .join()
    .expect("prober should not panic");
    drop(guard);
    assert_eq!(status, Err(ShimError::Timeout));
    assert!(lock.lock_deadline(shim::deadline_after(Duration::from_millis(50))).is_ok());
}

#[test]
fn recursive_mutex_reenters_on_the_owning_thread() {
    let lock = RecursiveMutex::new(5u32);
    let outer = lock.lock();
    let inner = lock.lock();
    assert_eq!(*outer, 5);
    assert_eq!(*inner, 5);
    drop(inner);
    drop(outer);
    assert!(lock.try_lock().is_ok());
}

#[test]
fn recursive_mutex_excludes_other_threads() {
    let lock = Arc::new(RecursiveMutex::new(()));
    let guard = lock.lock();
    let remote = lock.clone();
    let status = std::thread::spawn(move || remote.try_lock().map(|_| ()))
        .join()
        .expect("prober should not panic");
    drop(guard);
    assert_eq!(status, Err(ShimError::Busy));
}

#[test]
fn condvar_wait_deadline_reports_timeout() {
    let lock = Mutex::new(false);
    let cv = Condvar::new();
    let guard = lock.lock();
    let deadline = shim::deadline_after(Duration::from_millis(30));
    let (_guard, status) = cv.wait_deadline(guard, deadline);
    assert_eq!(status, Err(ShimError::Timeout));
}

#[test]
fn condvar_handoff() {
    let shared = Arc::new((Mutex::new(false), Condvar::new()));
    let remote = shared.clone();
    let producer = std::thread::spawn(move || {
        let (lock, cv) = &*remote;
        *lock.lock() = true;
        cv.broadcast();
    });

    let (lock, cv) = &*shared;
    let mut ready = lock.lock();
    let deadline = shim::deadline_after(Duration::from_secs(5));
    while !*ready {
        let (guard, status) = cv.wait_deadline(ready, deadline);
        ready = guard;
        assert_ne!(status, Err(ShimError::Timeout), "producer never signalled");
    }
    drop(ready);
    producer.join().expect("producer should not panic");
}

#[test]
fn tss_value_roundtrip() {
    let key = shim::tss_create();
    key.set(Box::new(41u32));
    let value = key.with(|slot| slot.and_then(|any| any.downcast_ref::<u32>().copied()));
    assert_eq!(value, Some(41));
    assert!(key.take().is_some());
    key.with(|slot| assert!(slot.is_none()));
    shim::tss_delete(key);
}

#[test]
fn tss_destructor_runs_at_thread_exit() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let key = shim::tss_create_with(move |value| {
        if let Ok(number) = value.downcast::<u32>() {
            sink.lock().unwrap().push(*number);
        }
    });

    let handle = std::thread::spawn(move || {
        key.set(Box::new(99u32));
    });
    handle.join().expect("thread should exit cleanly");
    assert_eq!(*seen.lock().unwrap(), [99]);
    shim::tss_delete(key);
}

#[test]
fn call_once_runs_once() {
    use std::sync::atomic::AtomicU32;

    static ONCE: shim::Once = shim::Once::new();
    static COUNT: AtomicU32 = AtomicU32::new(0);

    let mut threads = Vec::new();
    for _ in 0..4 {
        threads.push(std::thread::spawn(|| {
            shim::call_once(&ONCE, || {
                COUNT.fetch_add(1, Ordering::SeqCst);
            });
        }));
    }
    for thread in threads {
        thread.join().expect("thread should not panic");
    }
    assert_eq!(COUNT.load(Ordering::SeqCst), 1);
}

#[test]
fn clocks_advance() {
    let wall = shim::now();
    assert!(wall > Duration::ZERO);
    let a = shim::monotonic_now();
    let deadline = shim::deadline_after(Duration::from_millis(1));
    assert!(deadline > a);
}
