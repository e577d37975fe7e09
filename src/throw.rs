//! The throw engine: raise, rethrow, propagate, terminate.
//!
//! A throw composes the raised record in per-thread state, then transfers
//! control with an unwind carrying a zero-sized [`ThrowSignal`] payload. The
//! record deliberately does not ride the unwind: it must outlive every frame
//! between the throw site and the catch, so it lives in thread state and the
//! payload is only a marker distinguishing our unwinds from foreign panics.

use std::any::Any;
use std::borrow::Cow;
use std::panic::panic_any;
use std::process;
use std::sync::Once;

use crate::except::{Exception, Raised};
use crate::state::with_state;

/// Panic payload marking an unwind as a raised exception.
///
/// Carries nothing: the record is in thread state.
pub(crate) struct ThrowSignal;

/// Raise `exception` from `file:line` with an optional message.
///
/// Control transfers to the innermost frame still running its body; every
/// frame left along the way drains its finalizers. With no such frame the
/// process terminates with a diagnostic on stderr.
///
/// The [`throw!`](crate::throw!) macro fills in the location.
pub fn throw(
    exception: &'static Exception,
    file: &'static str,
    line: u32,
    message: Option<Cow<'static, str>>,
) -> ! {
    raise(Raised::new(exception, file, line, message, None))
}

/// Raise `exception` carrying an opaque payload.
///
/// The payload is retrievable through [`with_raised`] inside a handler; it is
/// dropped with the record.
#[track_caller]
pub fn throw_carrying(exception: &'static Exception, data: Box<dyn Any + Send>) -> ! {
    let location = core::panic::Location::caller();
    raise(Raised::new(
        exception,
        location.file(),
        location.line(),
        None,
        Some(data),
    ))
}

/// Re-emit the record currently being handled to the enclosing frame.
///
/// The record is re-emitted as-is: same descriptor, throw site, and message.
/// Calling this with no record being handled is a programmer error and
/// aborts.
pub fn rethrow() -> ! {
    with_state(|s| match s.raised.as_mut() {
        Some(raised) => raised.caught = false,
        None => fatal("rethrow() with no active exception"),
    });
    propagate()
}

/// Observe the record currently live on this thread, if any.
///
/// Inside a catch clause this is the record being handled; elsewhere it is
/// usually `None`.
pub fn with_raised<R>(f: impl FnOnce(&Raised) -> R) -> Option<R> {
    // The closure runs under the state borrow: it must not throw or enter
    // new protected regions, which is fine for a read-only peek.
    with_state(|s| s.raised.as_ref().map(f))
}

pub(crate) fn raise(record: Raised) -> ! {
    store_record(record);
    propagate()
}

/// Put `record` in the thread's raised slot, superseding (and logging) any
/// record that was still propagating.
pub(crate) fn store_record(record: Raised) {
    with_state(|s| {
        if let Some(previous) = s.raised.take() {
            if !previous.caught {
                log::warn!(
                    "exception `{}` (from {}:{}) lost during cleanup, superseded by `{}`",
                    previous.name(),
                    previous.file(),
                    previous.line(),
                    record.name(),
                );
            }
        }
        s.raised = Some(record);
    });
}

/// Transfer control towards the innermost receptive frame.
///
/// Receptive means some frame's body is inside its unwind boundary, or a
/// finalizer drain is running (the drain loop absorbs the unwind itself).
/// With neither, the record is uncaught and the process terminates.
pub(crate) fn propagate() -> ! {
    let receptive =
        with_state(|s| s.draining > 0 || s.frames.iter().any(|frame| frame.body_active));
    if receptive {
        panic_any(ThrowSignal)
    } else {
        terminate_uncaught()
    }
}

/// Write the uncaught-exception diagnostic and exit non-zero.
///
/// Exiting skips drop glue, and the throw may have come from a clause body
/// whose frame (and enclosing frames) are still live. Their finalizers run
/// first; a finalizer that throws here supersedes the record and the
/// diagnostic reports the newer one.
pub(crate) fn terminate_uncaught() -> ! {
    crate::frame::dismantle_live_frames();
    let line = with_state(|s| {
        s.raised.as_ref().map(|raised| match raised.message() {
            Some(message) => format!(
                "Uncaught {} at {}:{}: {}",
                raised.name(),
                raised.file(),
                raised.line(),
                message
            ),
            None => format!("Uncaught {} at {}:{}", raised.name(), raised.file(), raised.line()),
        })
    });
    match line {
        Some(line) => eprintln!("{line}"),
        None => eprintln!("Uncaught exception with no record"),
    }
    process::exit(1)
}

/// Programmer-error exit: contract violations are not exceptions.
pub(crate) fn fatal(message: &str) -> ! {
    eprintln!("fatal: {message}");
    process::abort()
}

/// Keep the default panic hook quiet about the engine's own unwinds
/// ([`ThrowSignal`] and the shim's thread-exit token). Installed once, the
/// first time a frame is entered; everything else still reaches whichever
/// hook was set before.
pub(crate) fn quiet_throw_panics() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let payload = info.payload();
            if payload.downcast_ref::<ThrowSignal>().is_none()
                && payload.downcast_ref::<crate::shim::ThreadExit>().is_none()
            {
                previous(info);
            }
        }));
    });
}
