//! Per-thread engine state.
//!
//! Every thread that touches the engine lazily materializes one
//! [`ThreadState`]: the stack of active frames, the raised-record slot, and
//! the list of thread-exit deferrals. Nothing in here is ever shared across
//! threads; an exception raised on one thread is invisible to every other.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::except::Raised;
use crate::frame::FrameRecord;

pub(crate) struct ThreadState {
    /// Active frames, outermost first. The top is the innermost live region.
    pub(crate) frames: Vec<FrameRecord>,
    /// The record currently propagating (or just caught) on this thread.
    pub(crate) raised: Option<Raised>,
    /// Non-zero while a frame's protection list is being drained. Throws
    /// raised by finalizers are absorbed by the drain loop, so they always
    /// have somewhere to land even when no frame body is live.
    pub(crate) draining: u32,
    /// LIFO deferrals run when the thread exits.
    exit_hooks: Vec<Box<dyn FnOnce()>>,
    pub(crate) next_protect_id: u64,
}

impl ThreadState {
    fn new() -> Self {
        Self {
            frames: Vec::new(),
            raised: None,
            draining: 0,
            exit_hooks: Vec::new(),
            next_protect_id: 1,
        }
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        // A frame can only still be here if its guard was leaked; treat its
        // exception (if any) as uncaught and at least run the finalizers.
        while let Some(mut frame) = self.frames.pop() {
            log::warn!(
                "protected region entered at {}:{} was never exited; running its finalizers",
                frame.file,
                frame.line
            );
            for finalizer in frame.take_finalizers() {
                let _ = catch_unwind(AssertUnwindSafe(finalizer));
            }
        }

        let hooks = std::mem::take(&mut self.exit_hooks);
        for hook in hooks.into_iter().rev() {
            // Exit hooks may not throw: there is no frame left to catch.
            let _ = catch_unwind(AssertUnwindSafe(hook));
        }
    }
}

thread_local! {
    static STATE: RefCell<ThreadState> = RefCell::new(ThreadState::new());
}

/// Run `f` with the calling thread's engine state.
///
/// `f` must not call back into user code: finalizers, handlers, and bodies
/// all run with the state borrow released.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut ThreadState) -> R) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

/// Register a closure to run when the current thread exits.
///
/// Hooks run LIFO during thread teardown, after every protected region on the
/// thread has been left. They must not throw or enter new protected regions.
///
/// ```
/// throw_this::defer_thread(|| println!("worker done"));
/// ```
pub fn defer_thread(f: impl FnOnce() + 'static) {
    with_state(|s| s.exit_hooks.push(Box::new(f)));
}
