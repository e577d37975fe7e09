//! Portable thread, lock, condition, TLS, and clock shim.
//!
//! The exception engine sits on this narrow surface instead of using the
//! platform directly. Operations report distinct status values
//! ([`ShimError`]) rather than throwing: the shim sits *below* the engine,
//! and callers decide whether a timeout is worth an exception.
//!
//! Locks come in three flavors: [`Mutex`] (plain), [`TimedMutex`]
//! (deadline-aware acquisition), and [`RecursiveMutex`] (re-entrant on the
//! owning thread). [`Condvar`] pairs with the plain [`Mutex`].

use core::marker::PhantomData;
use std::any::Any;
use std::cell::{RefCell, UnsafeCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{self, Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub use std::sync::Once;

// ============================================================
// Status codes
// ============================================================

/// Distinct failure statuses reported by shim operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimError {
    /// The resource is currently held elsewhere.
    Busy,
    /// The deadline passed before the operation completed.
    Timeout,
    /// The system refused to allocate.
    OutOfMemory,
    /// Any other platform failure.
    Other,
}

impl fmt::Display for ShimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShimError::Busy => "resource busy",
            ShimError::Timeout => "timed out",
            ShimError::OutOfMemory => "out of memory",
            ShimError::Other => "operation failed",
        };
        f.write_str(text)
    }
}

impl std::error::Error for ShimError {}

/// Result alias for shim operations.
pub type ShimResult<T> = Result<T, ShimError>;

// ============================================================
// Threads
// ============================================================

/// Panic payload used by [`exit`] to unwind a thread to its entry point.
pub(crate) struct ThreadExit;

/// A joinable thread started through the shim.
pub struct Thread {
    handle: thread::JoinHandle<()>,
}

impl Thread {
    /// Spawn a thread running `f`.
    ///
    /// [`exit`] called anywhere in `f` ends the thread normally; protected
    /// regions and their finalizers unwind on the way out.
    pub fn spawn(f: impl FnOnce() + Send + 'static) -> ShimResult<Thread> {
        let handle = thread::Builder::new()
            .spawn(move || match catch_unwind(AssertUnwindSafe(f)) {
                Ok(()) => {}
                Err(payload) if payload.is::<ThreadExit>() => {}
                Err(payload) => resume_unwind(payload),
            })
            .map_err(|_| ShimError::OutOfMemory)?;
        Ok(Thread { handle })
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> ShimResult<()> {
        self.handle.join().map_err(|_| ShimError::Other)
    }

    /// Let the thread run to completion unobserved.
    pub fn detach(self) {}

    /// The spawned thread's identifier.
    pub fn id(&self) -> ThreadId {
        self.handle.thread().id()
    }
}

/// The calling thread's identifier.
pub fn current() -> ThreadId {
    thread::current().id()
}

/// End the calling thread, unwinding through any protected regions so their
/// finalizers run. Only meaningful on threads started with [`Thread::spawn`];
/// on other threads the unwind surfaces as a panic.
pub fn exit() -> ! {
    crate::throw::quiet_throw_panics();
    std::panic::panic_any(ThreadExit)
}

/// Put the calling thread to sleep.
pub fn sleep(duration: Duration) {
    thread::sleep(duration)
}

/// Yield the calling thread's timeslice.
pub fn yield_now() {
    thread::yield_now()
}

// ============================================================
// Plain mutex
// ============================================================

/// Plain mutual exclusion. Poisoning is absorbed: the data is handed over
/// regardless, matching a lock layer that has no panic concept of its own.
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: sync::Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        MutexGuard(self.inner.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// [`ShimError::Busy`] when the lock is held elsewhere.
    pub fn try_lock(&self) -> ShimResult<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(MutexGuard(guard)),
            Err(sync::TryLockError::WouldBlock) => Err(ShimError::Busy),
            Err(sync::TryLockError::Poisoned(p)) => Ok(MutexGuard(p.into_inner())),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct MutexGuard<'a, T>(sync::MutexGuard<'a, T>);

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

// ============================================================
// Condition variable
// ============================================================

/// Condition variable paired with [`Mutex`].
pub struct Condvar {
    inner: sync::Condvar,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            inner: sync::Condvar::new(),
        }
    }

    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        MutexGuard(self.inner.wait(guard.0).unwrap_or_else(|p| p.into_inner()))
    }

    /// Wait until signalled or `deadline` passes. The guard is always handed
    /// back; the status tells whether the deadline fired.
    pub fn wait_deadline<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        deadline: Instant,
    ) -> (MutexGuard<'a, T>, ShimResult<()>) {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (guard, result) = self
            .inner
            .wait_timeout(guard.0, timeout)
            .unwrap_or_else(|p| p.into_inner());
        let status = if result.timed_out() {
            Err(ShimError::Timeout)
        } else {
            Ok(())
        };
        (MutexGuard(guard), status)
    }

    pub fn signal(&self) {
        self.inner.notify_one()
    }

    pub fn broadcast(&self) {
        self.inner.notify_all()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Timed mutex
// ============================================================

/// Mutex whose acquisition accepts an absolute deadline.
pub struct TimedMutex<T> {
    state: sync::Mutex<bool>,
    cv: sync::Condvar,
    value: UnsafeCell<T>,
}

// SAFETY: the boolean + condvar pair guarantees at most one live guard, and
// a guard is the only path to the value.
unsafe impl<T: Send> Send for TimedMutex<T> {}
unsafe impl<T: Send> Sync for TimedMutex<T> {}

impl<T> TimedMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: sync::Mutex::new(false),
            cv: sync::Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> TimedMutexGuard<'_, T> {
        let mut locked = self.state.lock().unwrap_or_else(|p| p.into_inner());
        while *locked {
            locked = self.cv.wait(locked).unwrap_or_else(|p| p.into_inner());
        }
        *locked = true;
        TimedMutexGuard { lock: self }
    }

    pub fn try_lock(&self) -> ShimResult<TimedMutexGuard<'_, T>> {
        let mut locked = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *locked {
            return Err(ShimError::Busy);
        }
        *locked = true;
        Ok(TimedMutexGuard { lock: self })
    }

    /// Acquire, giving up when `deadline` passes.
    pub fn lock_deadline(&self, deadline: Instant) -> ShimResult<TimedMutexGuard<'_, T>> {
        let mut locked = self.state.lock().unwrap_or_else(|p| p.into_inner());
        while *locked {
            let Some(timeout) = deadline.checked_duration_since(Instant::now()) else {
                return Err(ShimError::Timeout);
            };
            let (guard, result) = self
                .cv
                .wait_timeout(locked, timeout)
                .unwrap_or_else(|p| p.into_inner());
            locked = guard;
            if result.timed_out() && *locked {
                return Err(ShimError::Timeout);
            }
        }
        *locked = true;
        Ok(TimedMutexGuard { lock: self })
    }
}

pub struct TimedMutexGuard<'a, T> {
    lock: &'a TimedMutex<T>,
}

impl<T> Deref for TimedMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard means the flag is ours until drop.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for TimedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, plus the guard is borrowed uniquely.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for TimedMutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut locked = self.lock.state.lock().unwrap_or_else(|p| p.into_inner());
        *locked = false;
        self.lock.cv.notify_one();
    }
}

// ============================================================
// Recursive mutex
// ============================================================

struct RecState {
    owner: Option<ThreadId>,
    count: usize,
}

/// Mutex the owning thread may re-acquire. Guards expose `&T` only, so
/// nested guards cannot alias mutable state.
pub struct RecursiveMutex<T> {
    state: sync::Mutex<RecState>,
    cv: sync::Condvar,
    value: UnsafeCell<T>,
}

// SAFETY: exclusivity across threads is enforced by owner tracking; within
// the owning thread only shared references are handed out.
unsafe impl<T: Send> Send for RecursiveMutex<T> {}
unsafe impl<T: Send> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: sync::Mutex::new(RecState {
                owner: None,
                count: 0,
            }),
            cv: sync::Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> RecursiveMutexGuard<'_, T> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.count = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.count += 1;
                    break;
                }
                Some(_) => {
                    state = self.cv.wait(state).unwrap_or_else(|p| p.into_inner());
                }
            }
        }
        RecursiveMutexGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> ShimResult<RecursiveMutexGuard<'_, T>> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.owner {
            None => {
                state.owner = Some(me);
                state.count = 1;
            }
            Some(owner) if owner == me => state.count += 1,
            Some(_) => return Err(ShimError::Busy),
        }
        Ok(RecursiveMutexGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Acquire, giving up when `deadline` passes.
    pub fn lock_deadline(&self, deadline: Instant) -> ShimResult<RecursiveMutexGuard<'_, T>> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.count = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.count += 1;
                    break;
                }
                Some(_) => {
                    let Some(timeout) = deadline.checked_duration_since(Instant::now()) else {
                        return Err(ShimError::Timeout);
                    };
                    let (guard, result) = self
                        .cv
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(|p| p.into_inner());
                    state = guard;
                    if result.timed_out() && state.owner.is_some() && state.owner != Some(me) {
                        return Err(ShimError::Timeout);
                    }
                }
            }
        }
        Ok(RecursiveMutexGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }
}

pub struct RecursiveMutexGuard<'a, T> {
    lock: &'a RecursiveMutex<T>,
    /// A guard unlocks on the thread that locked; it must not migrate.
    _not_send: PhantomData<*mut ()>,
}

impl<T> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the owner thread holds at least one guard until drop.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap_or_else(|p| p.into_inner());
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.lock.cv.notify_one();
        }
    }
}

// ============================================================
// Thread-specific storage
// ============================================================

type TssDtor = Arc<dyn Fn(Box<dyn Any>) + Send + Sync>;

struct TssSlot {
    dtor: Option<TssDtor>,
}

fn tss_table() -> &'static sync::Mutex<Vec<Option<TssSlot>>> {
    static TABLE: OnceLock<sync::Mutex<Vec<Option<TssSlot>>>> = OnceLock::new();
    TABLE.get_or_init(|| sync::Mutex::new(Vec::new()))
}

/// A dynamically created thread-specific storage key.
///
/// Each thread sees its own value under the key. The destructor given at
/// creation runs for a thread's value when that thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TssKey(usize);

/// Create a key with no destructor.
pub fn tss_create() -> TssKey {
    register_slot(None)
}

/// Create a key whose per-thread values are passed to `dtor` at thread exit.
pub fn tss_create_with(dtor: impl Fn(Box<dyn Any>) + Send + Sync + 'static) -> TssKey {
    register_slot(Some(Arc::new(dtor)))
}

fn register_slot(dtor: Option<TssDtor>) -> TssKey {
    let mut table = tss_table().lock().unwrap_or_else(|p| p.into_inner());
    if let Some(index) = table.iter().position(Option::is_none) {
        table[index] = Some(TssSlot { dtor });
        TssKey(index)
    } else {
        table.push(Some(TssSlot { dtor }));
        TssKey(table.len() - 1)
    }
}

/// Retire a key. Values already stored on other threads stay until those
/// threads exit, but their destructor no longer runs.
pub fn tss_delete(key: TssKey) {
    let mut table = tss_table().lock().unwrap_or_else(|p| p.into_inner());
    if let Some(slot) = table.get_mut(key.0) {
        *slot = None;
    }
}

struct TssValues {
    map: HashMap<usize, Box<dyn Any>>,
}

impl Drop for TssValues {
    fn drop(&mut self) {
        for (key, value) in self.map.drain() {
            let dtor = {
                let table = tss_table().lock().unwrap_or_else(|p| p.into_inner());
                table
                    .get(key)
                    .and_then(|slot| slot.as_ref())
                    .and_then(|slot| slot.dtor.clone())
            };
            if let Some(dtor) = dtor {
                // Destructors must not unwind out of thread teardown.
                let _ = catch_unwind(AssertUnwindSafe(|| dtor(value)));
            }
        }
    }
}

thread_local! {
    static TSS_VALUES: RefCell<TssValues> = RefCell::new(TssValues {
        map: HashMap::new(),
    });
}

impl TssKey {
    /// Store this thread's value under the key, replacing any previous one.
    /// Replacement does not run the destructor, matching the usual TSS
    /// contract.
    pub fn set(self, value: Box<dyn Any>) {
        TSS_VALUES.with(|values| {
            values.borrow_mut().map.insert(self.0, value);
        });
    }

    /// Observe this thread's value under the key.
    pub fn with<R>(self, f: impl FnOnce(Option<&dyn Any>) -> R) -> R {
        TSS_VALUES.with(|values| {
            let values = values.borrow();
            f(values.map.get(&self.0).map(|boxed| boxed.as_ref()))
        })
    }

    /// Remove and return this thread's value without running the destructor.
    pub fn take(self) -> Option<Box<dyn Any>> {
        TSS_VALUES.with(|values| values.borrow_mut().map.remove(&self.0))
    }
}

// ============================================================
// Once and clocks
// ============================================================

/// Run `f` exactly once across all callers sharing `once`.
pub fn call_once(once: &Once, f: impl FnOnce()) {
    once.call_once(f)
}

/// Wall-clock time as a duration since the Unix epoch.
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Monotonic timestamp for deadline arithmetic.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Absolute deadline `timeout` from now, for the `*_deadline` operations.
pub fn deadline_after(timeout: Duration) -> Instant {
    Instant::now()
        .checked_add(timeout)
        .unwrap_or_else(Instant::now)
}
