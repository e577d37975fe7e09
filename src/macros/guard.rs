//! The `guard!` macro - protected regions with catch clauses.
//!
//! This declarative macro distinguishes the two region kinds (which proc
//! macros cannot see past a single token) and routes to the unified proc
//! macro with a marker.

/// A protected region: `try` body, catch clauses, optional `finally`.
///
/// # Clauses
///
/// | Clause | Meaning |
/// |--------|---------|
/// | `try { }` | Protected body |
/// | `try signal { }` | Protected body; guarded hardware signals become catchable |
/// | `catch NAME { }` | Handle one named exception |
/// | `catch NAME (e) { }` | Same, binding a [`RaisedInfo`](crate::RaisedInfo) snapshot |
/// | `catch_any { }` / `catch_any (e) { }` | Handle whatever is propagating |
/// | `finally { }` | Runs last on every path; does not consume the exception |
///
/// Catch clauses are tried in source order; the first match wins. An
/// unmatched exception re-emits to the enclosing region after `finally` and
/// the frame's finalizers run. Handler and `finally` bodies are ordinary
/// statements (control flow works); the `try` body runs behind the unwind
/// boundary, so `return`/`break`/`?` cannot leave it.
///
/// # Examples
///
/// ```
/// use throw_this::{exception, guard, throw};
///
/// exception! { static DIVISION_BY_ZERO; }
///
/// let mut out = Vec::new();
/// guard! {
///     try { throw!(DIVISION_BY_ZERO); }
///     catch DIVISION_BY_ZERO { out.push("caught"); }
///     finally { out.push("finally"); }
/// }
/// assert_eq!(out, ["caught", "finally"]);
/// ```
///
/// Signal recovery:
///
/// ```no_run
/// use throw_this::{guard, SIG_FPE};
///
/// guard! {
///     try signal {
///         unsafe { libc::raise(libc::SIGFPE); }
///     }
///     catch SIG_FPE { eprintln!("recovered"); }
/// }
/// ```
#[macro_export]
macro_rules! guard {
    (try signal { $($body:tt)* } $($rest:tt)*) => {
        $crate::throw_this_macros::__guard_proc!(SIGNAL { $($body)* } $($rest)*)
    };

    (try { $($body:tt)* } $($rest:tt)*) => {
        $crate::throw_this_macros::__guard_proc!(SYNC { $($body)* } $($rest)*)
    };

    // Error routing - the proc macro produces the diagnostics so they carry
    // proper spans.
    ($first:tt $($rest:tt)*) => {
        $crate::throw_this_macros::__guard_proc!(ERROR $first $($rest)*)
    };

    () => {
        $crate::throw_this_macros::__guard_proc!(ERROR_EMPTY)
    };
}
