//! throw-this - structured exceptions with try/catch/finally syntax
//!
//! # Overview
//!
//! `throw-this` brings structured exception handling to code that wants
//! non-local error transfer with guaranteed cleanup: protected regions with
//! catch clauses, per-region finalizer lists that run on every exit path,
//! translation of synchronous hardware signals into catchable exceptions,
//! and a bump arena whose lifetime follows the region that owns it.
//!
//! # Quick Start
//!
//! ```
//! use throw_this::{exception, guard, throw};
//!
//! exception! { static DIVISION_BY_ZERO; }
//!
//! fn divide(a: i32, b: i32, out: &mut i32) {
//!     guard! {
//!         try {
//!             if b == 0 { throw!(DIVISION_BY_ZERO, "{} / 0", a); }
//!         }
//!         catch DIVISION_BY_ZERO (e) {
//!             eprintln!("recovering: {e}");
//!         }
//!     }
//!     *out = if b == 0 { 0 } else { a / b };
//! }
//!
//! let mut out = 0;
//! divide(10, 0, &mut out);
//! assert_eq!(out, 0);
//! ```
//!
//! # Pieces
//!
//! | Piece | Description |
//! |-------|-------------|
//! | [`guard!`] | `try { } catch NAME { } catch_any { } finally { }` regions |
//! | [`throw!`] / [`rethrow`] | Raise a descriptor; re-emit the one in hand |
//! | [`exception!`] | Declare descriptors (identity = address of the `static`) |
//! | [`protect`] / [`unprotect`] / [`defer!`] | Finalizers owned by the innermost region, run LIFO on exit |
//! | `try signal { }` | SIGSEGV/SIGFPE/… recovered as [`SIG_SEGV`]/[`SIG_FPE`]/… |
//! | [`Arena`] / [`with_frame_arena`] | Scoped bump allocation, released with the region |
//! | [`ensure!`] / [`OrThrow`] / [`try_alloc_bytes`] | Bridges from conditions, `Result`/`Option`, and heap allocation into throws |
//! | [`defer_thread`] | Cleanup at thread exit |
//! | [`shim`] | Thread/mutex/condvar/TSS/clock layer with distinct status codes |
//!
//! # Semantics
//!
//! Exceptions are thread-local: a throw is only visible to frames of the
//! throwing thread. Catch clauses match by descriptor identity, in source
//! order. An exception nobody catches terminates the process after writing
//! `Uncaught <name> at <file>:<line>: <message>` to stderr. Foreign panics
//! pass through protected regions untouched (finalizers still run); they are
//! never matched by `catch_any`.

// ============================================================
// Modules
// ============================================================

mod arena;
mod except;
mod ext;
mod frame;
mod macros;
mod signal;
mod state;
mod throw;

pub mod shim;

// ============================================================
// Re-exports
// ============================================================

pub use arena::{try_alloc_bytes, Arena};
pub use except::{Exception, Raised, RaisedInfo};
pub use except::{
    ASSERTION_FAILURE, INVALID_ARGUMENT, OUT_OF_MEMORY, SIG_ABRT, SIG_BUS, SIG_FPE, SIG_ILL,
    SIG_INT, SIG_SEGV, SIG_TERM,
};
pub use ext::OrThrow;
pub use frame::{protect, unprotect, with_frame_arena, ProtectHandle};
pub use state::defer_thread;
pub use throw::{rethrow, throw, throw_carrying, with_raised};

// Test-only introspection.
#[doc(hidden)]
pub use arena::__free_list_len;

// Runtime surface for macro-generated code.
#[doc(hidden)]
pub mod rt {
    pub use crate::frame::{BodyOutcome, Clause, FrameGuard};
}

// Re-export the proc-macro crate so `guard!` can reach it through `$crate`.
#[doc(hidden)]
pub use throw_this_macros;
