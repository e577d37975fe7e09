//! TRY-frames, protection lists, and the dispatch runtime behind `guard!`.
//!
//! A `guard!` block expands to calls on [`FrameGuard`]: enter a frame, run
//! the body under an unwind boundary, select a clause, run clause bodies at
//! the expansion site, and let the guard's drop glue drain finalizers and pop
//! the frame. Running clause bodies outside the closure keeps normal control
//! flow (`return`, `break`, `?`) available in handlers; the selection itself
//! is computed as data.

use core::marker::PhantomData;
use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use smallvec::SmallVec;

use crate::arena::Arena;
use crate::except::{Exception, RaisedInfo};
use crate::state::with_state;
use crate::throw::{fatal, propagate, terminate_uncaught, ThrowSignal};

// ============================================================
// Frame records
// ============================================================

/// Dispatch progress of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameState {
    /// Body running; a throw landing here is catchable.
    Trying,
    /// A throw reached this frame and awaits clause selection.
    Thrown,
    /// A clause matched; its body is running (or has run).
    Handled,
    /// Finalizers draining.
    Finalizing,
    /// Torn down; kept only for the instant before the pop.
    Done,
}

/// One entry on a frame's protection list.
///
/// The slot stays in place after the closure is taken so a stale
/// [`ProtectHandle`] can still be recognized as consumed.
struct Finalizer {
    id: u64,
    func: Option<Box<dyn FnOnce()>>,
}

pub(crate) struct FrameRecord {
    pub(crate) file: &'static str,
    pub(crate) line: u32,
    pub(crate) state: FrameState,
    /// True while the body closure is inside this frame's unwind boundary.
    pub(crate) body_active: bool,
    /// True for `try signal` frames; an uncaught signal record may not
    /// propagate past the region that produced it.
    pub(crate) signal_region: bool,
    protects: SmallVec<[Finalizer; 4]>,
    pub(crate) arena: Option<Arena>,
    /// Set while `with_frame_arena` has the arena out of the record. A
    /// signal jump can abandon the borrow mid-flight; the signal path
    /// clears the flag again (the borrowed arena itself is lost).
    pub(crate) arena_borrowed: bool,
}

impl FrameRecord {
    fn new(file: &'static str, line: u32) -> Self {
        Self {
            file,
            line,
            state: FrameState::Trying,
            body_active: false,
            signal_region: false,
            protects: SmallVec::new(),
            arena: None,
            arena_borrowed: false,
        }
    }

    /// Detach all remaining finalizers, most recently registered first.
    pub(crate) fn take_finalizers(&mut self) -> Vec<Box<dyn FnOnce()>> {
        self.protects
            .iter_mut()
            .rev()
            .filter_map(|p| p.func.take())
            .collect()
    }
}

// ============================================================
// Protection list surface
// ============================================================

/// Opaque handle to a registered finalizer, used by [`unprotect`].
#[derive(Debug, Clone, Copy)]
pub struct ProtectHandle {
    depth: usize,
    id: u64,
}

/// Register a finalizer with the innermost protected region.
///
/// The closure runs exactly once when the region is left, on every exit path:
/// normal completion, a throw, or an unwind already in progress. Finalizers
/// run LIFO, mirroring nested resource acquisition.
///
/// Calling this outside any `guard!` block is a programmer error and aborts.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use throw_this::{guard, protect};
///
/// let released = Rc::new(Cell::new(false));
/// let flag = released.clone();
/// guard! {
///     try { protect(move || flag.set(true)); }
/// }
/// assert!(released.get());
/// ```
pub fn protect(release: impl FnOnce() + 'static) -> ProtectHandle {
    with_state(|s| {
        let Some(depth) = s.frames.len().checked_sub(1) else {
            fatal("protect() called outside any protected region");
        };
        let id = s.next_protect_id;
        s.next_protect_id += 1;
        s.frames[depth].protects.push(Finalizer {
            id,
            func: Some(Box::new(release)),
        });
        ProtectHandle { depth, id }
    })
}

/// Detach a finalizer registered with [`protect`] without running it.
///
/// A handle whose finalizer already ran (or was already detached) is a no-op.
/// A handle that belongs to a different frame is a programmer error and
/// aborts.
pub fn unprotect(handle: ProtectHandle) {
    with_state(|s| {
        let Some(depth) = s.frames.len().checked_sub(1) else {
            fatal("unprotect() called outside any protected region");
        };
        if handle.depth != depth {
            fatal("unprotect() of a handle that does not belong to the current frame");
        }
        match s.frames[depth].protects.iter_mut().find(|p| p.id == handle.id) {
            Some(slot) => slot.func = None,
            None => fatal("unprotect() of a handle from a different frame"),
        }
    })
}

// ============================================================
// Frame-bound arena access
// ============================================================

/// Run `f` with the innermost frame's arena, creating it on first use.
///
/// The arena is released as a unit when its frame is left, after the frame's
/// finalizers have run. Inside a catch clause the innermost frame is the
/// catching one, so recovery allocations live as long as that region.
///
/// Aborts outside any `guard!` block, and on re-entrant use from the same
/// frame (the arena has a single owner).
pub fn with_frame_arena<R>(f: impl FnOnce(&Arena) -> R) -> R {
    struct PutBack {
        depth: usize,
        arena: Arena,
    }

    impl Drop for PutBack {
        fn drop(&mut self) {
            let arena = std::mem::take(&mut self.arena);
            with_state(|s| {
                if let Some(frame) = s.frames.get_mut(self.depth) {
                    frame.arena = Some(arena);
                    frame.arena_borrowed = false;
                }
            });
        }
    }

    let (depth, arena) = with_state(|s| {
        let Some(depth) = s.frames.len().checked_sub(1) else {
            fatal("frame arena requested outside any protected region");
        };
        let frame = &mut s.frames[depth];
        if frame.arena_borrowed {
            fatal("frame arena is already borrowed by an enclosing call");
        }
        frame.arena_borrowed = true;
        (depth, frame.arena.take().unwrap_or_default())
    });

    let slot = PutBack { depth, arena };
    f(&slot.arena)
}

// ============================================================
// Dispatch runtime
// ============================================================

/// Result of running a protected body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOutcome {
    /// The body ran to completion.
    Completed,
    /// A throw unwound the body; a clause may now be selected.
    Thrown,
}

/// One catch clause, as seen by [`FrameGuard::select`].
#[derive(Debug, Clone, Copy)]
pub enum Clause {
    /// `catch NAME`: matches by descriptor identity.
    Named(&'static Exception),
    /// `catch_any`: matches whatever record is propagating.
    Any,
}

/// RAII token for one active protected region.
///
/// Created by the expansion of `guard!`; not meant to be used directly. The
/// drop glue drains the protection list, releases the frame arena, pops the
/// frame, and re-emits an unhandled record to the enclosing frame.
pub struct FrameGuard {
    depth: usize,
    _not_send: PhantomData<*mut ()>,
}

impl FrameGuard {
    /// Push a frame for a region entered at `file:line`.
    pub fn enter(file: &'static str, line: u32) -> Self {
        crate::throw::quiet_throw_panics();
        let depth = with_state(|s| {
            s.frames.push(FrameRecord::new(file, line));
            s.frames.len() - 1
        });
        FrameGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    #[cfg_attr(not(unix), allow(dead_code))]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn set_body_active(&self, active: bool) {
        with_state(|s| s.frames[self.depth].body_active = active);
    }

    pub(crate) fn mark_thrown(&self) {
        with_state(|s| s.frames[self.depth].state = FrameState::Thrown);
    }

    /// Run the `try` body under this frame's unwind boundary.
    pub fn run_body<F: FnOnce()>(&self, body: F) -> BodyOutcome {
        self.set_body_active(true);
        let result = catch_unwind(AssertUnwindSafe(body));
        self.set_body_active(false);
        match result {
            Ok(()) => BodyOutcome::Completed,
            Err(payload) => self.absorb_unwind(payload),
        }
    }

    pub(crate) fn absorb_unwind(&self, payload: Box<dyn Any + Send>) -> BodyOutcome {
        if payload.is::<ThrowSignal>() {
            self.mark_thrown();
            BodyOutcome::Thrown
        } else {
            // Not a raised record. Keep it unwinding; the drop glue tears
            // this frame down on the way out.
            resume_unwind(payload)
        }
    }

    /// Pick the first clause matching the propagating record.
    ///
    /// A match transitions the frame to handled and marks the record caught.
    /// `None` leaves the record propagating; the drop glue re-emits it.
    pub fn select(&self, clauses: &[Clause]) -> Option<usize> {
        with_state(|s| {
            let raised = s.raised.as_mut()?;
            let index = clauses.iter().position(|clause| match *clause {
                Clause::Named(exception) => raised.is(exception),
                Clause::Any => true,
            })?;
            raised.caught = true;
            s.frames[self.depth].state = FrameState::Handled;
            Some(index)
        })
    }

    /// Snapshot of the record being handled, for clause bindings.
    pub fn raised_info(&self) -> RaisedInfo {
        match with_state(|s| s.raised.as_ref().map(|r| r.info())) {
            Some(info) => info,
            None => fatal("no exception is being handled on this thread"),
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let was_handled = with_state(|s| match s.frames.get_mut(self.depth) {
            Some(frame) => {
                let was_handled = frame.state == FrameState::Handled;
                frame.state = FrameState::Finalizing;
                was_handled
            }
            None => fatal("protected regions torn down out of order"),
        });
        let stray = drain_protects(self.depth);

        let (arena, signal_region) = with_state(|s| {
            if s.frames.len() != self.depth + 1 {
                fatal("protected regions torn down out of order");
            }
            let frame = &mut s.frames[self.depth];
            frame.state = FrameState::Done;
            let arena = frame.arena.take();
            let signal_region = frame.signal_region;
            s.frames.pop();
            (arena, signal_region)
        });
        // Recycling may take the free-list lock; do it outside the state borrow.
        drop(arena);

        let unwinding = std::thread::panicking();
        let pending_signal = with_state(|s| match s.raised.as_ref() {
            Some(r) if !r.caught => Some(r.from_signal),
            _ => None,
        });

        match (pending_signal, stray) {
            (Some(from_signal), stray) => {
                if stray.is_some() {
                    log::warn!("panic in finalizer discarded in favor of a pending exception");
                }
                // A signal record that was not handled inside its own region
                // is not recoverable anywhere else.
                if from_signal && signal_region {
                    terminate_uncaught();
                }
                if !unwinding {
                    propagate();
                }
            }
            (None, Some(payload)) => {
                if unwinding {
                    log::warn!("panic in finalizer discarded during another unwind");
                } else {
                    resume_unwind(payload);
                }
            }
            (None, None) => {
                // The record this frame caught is released once its region
                // is gone; an outer frame's caught record is left alone.
                if was_handled {
                    with_state(|s| {
                        if s.raised.as_ref().map(|r| r.caught).unwrap_or(false) {
                            s.raised = None;
                        }
                    });
                }
            }
        }
    }
}

/// Dismantle every frame above `depth`.
///
/// A signal jump discards the body's stack frames without running their drop
/// glue, so guards entered inside the body never pop their records. This
/// runs each abandoned frame's finalizers LIFO, releases its arena, and pops
/// it, innermost first.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn unwind_skipped_frames(depth: usize) {
    dismantle_frames_above(depth + 1);
}

/// Dismantle every frame on the thread, for a termination path.
///
/// A throw with no receptive frame left can still have live frames on the
/// stack (the throw came from a clause body); their finalizers must run
/// before the process goes down. The guards themselves never drop after
/// this — the caller exits.
pub(crate) fn dismantle_live_frames() {
    dismantle_frames_above(0);
}

/// Pop frames from the top until only `keep` remain, draining each one's
/// finalizers and releasing its arena on the way. A foreign panic from one
/// of those finalizers has no unwind to rejoin and is logged away.
fn dismantle_frames_above(keep: usize) {
    loop {
        let top = match with_state(|s| s.frames.len().checked_sub(1)) {
            Some(top) if top + 1 > keep => top,
            _ => break,
        };
        if drain_protects(top).is_some() {
            log::warn!("panic in finalizer discarded during frame teardown");
        }
        let arena = with_state(|s| {
            let frame = &mut s.frames[top];
            frame.state = FrameState::Done;
            frame.arena.take()
        });
        drop(arena);
        with_state(|s| {
            s.frames.pop();
        });
    }
}

/// Run a frame's finalizers LIFO.
///
/// A throw from a finalizer lands in the raised slot (the throw site already
/// superseded any pending record) and draining continues. A foreign panic is
/// captured and handed back so the caller can resume it once the frame is
/// gone; only one can survive.
fn drain_protects(depth: usize) -> Option<Box<dyn Any + Send>> {
    let mut stray: Option<Box<dyn Any + Send>> = None;
    loop {
        let finalizer = with_state(|s| {
            let next = s.frames[depth]
                .protects
                .iter_mut()
                .rev()
                .find_map(|p| p.func.take());
            if next.is_some() {
                s.draining += 1;
            }
            next
        });
        let Some(finalizer) = finalizer else { break };
        let result = catch_unwind(AssertUnwindSafe(finalizer));
        with_state(|s| s.draining -= 1);
        match result {
            Ok(()) => {}
            Err(payload) if payload.is::<ThrowSignal>() => {}
            Err(payload) => {
                if stray.replace(payload).is_some() {
                    log::warn!("multiple finalizer panics; keeping the most recent");
                }
            }
        }
    }
    stray
}
