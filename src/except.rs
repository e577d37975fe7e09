//! Exception descriptors and raised records.

use core::fmt;
use std::any::Any;
use std::borrow::Cow;

// ============================================================
// Descriptors
// ============================================================

/// A named exception descriptor.
///
/// Descriptors are declared once at `static` scope (see [`exception!`]) and
/// matched by identity: two descriptors name the same exception iff they are
/// the same `static`. The name and default message only feed diagnostics.
///
/// ```
/// use throw_this::exception;
///
/// exception! {
///     /// Raised when the divisor is zero.
///     pub static DIVISION_BY_ZERO;
///     pub static PARSE_FAILURE = "unparseable input";
/// }
///
/// assert!(DIVISION_BY_ZERO.is(&DIVISION_BY_ZERO));
/// assert!(!DIVISION_BY_ZERO.is(&PARSE_FAILURE));
/// ```
///
/// [`exception!`]: crate::exception
pub struct Exception {
    name: &'static str,
    message: Option<&'static str>,
}

impl Exception {
    /// Create a descriptor. Prefer [`exception!`], which fills in the name.
    ///
    /// [`exception!`]: crate::exception
    #[inline]
    pub const fn new(name: &'static str, message: Option<&'static str>) -> Self {
        Self { name, message }
    }

    /// The descriptor's name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The message used when a throw site does not supply one.
    #[inline]
    pub fn default_message(&self) -> Option<&'static str> {
        self.message
    }

    /// Identity comparison: `true` iff both references point at the same
    /// descriptor `static`.
    #[inline]
    pub fn is(&self, other: &Exception) -> bool {
        core::ptr::eq(self, other)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================
// Built-in descriptors
// ============================================================

/// Raised when an allocation cannot be satisfied.
pub static OUT_OF_MEMORY: Exception = Exception::new("out_of_memory", Some("out of memory"));

/// Raised when a caller-supplied value is unusable (for example an
/// overflowing element-count multiplication).
pub static INVALID_ARGUMENT: Exception =
    Exception::new("invalid_argument", Some("invalid argument"));

/// Raised by [`ensure!`](crate::ensure) when a checked condition is false.
pub static ASSERTION_FAILURE: Exception =
    Exception::new("assertion_failure", Some("assertion failed"));

/// Segmentation fault, translated inside a `try signal` region.
pub static SIG_SEGV: Exception = Exception::new("sig_segv", Some("segmentation fault"));

/// Arithmetic fault (division by zero, overflow trap).
pub static SIG_FPE: Exception = Exception::new("sig_fpe", Some("arithmetic fault"));

/// Bus error (misaligned or nonexistent physical address).
pub static SIG_BUS: Exception = Exception::new("sig_bus", Some("bus error"));

/// Illegal instruction.
pub static SIG_ILL: Exception = Exception::new("sig_ill", Some("illegal instruction"));

/// Abort request.
pub static SIG_ABRT: Exception = Exception::new("sig_abrt", Some("abort"));

/// Interactive interrupt.
pub static SIG_INT: Exception = Exception::new("sig_int", Some("interrupt"));

/// Termination request.
pub static SIG_TERM: Exception = Exception::new("sig_term", Some("termination request"));

// ============================================================
// Raised records
// ============================================================

/// The live description of the exception currently propagating on a thread.
///
/// One record exists per thread at a time; it is composed at the throw site
/// and stays live until a matching catch clause finishes with it. Handlers
/// observe it through their clause binding ([`RaisedInfo`]) or through
/// [`with_raised`](crate::with_raised).
pub struct Raised {
    exception: &'static Exception,
    file: &'static str,
    line: u32,
    message: Option<Cow<'static, str>>,
    data: Option<Box<dyn Any + Send>>,
    /// Set by clause selection; a caught record is no longer propagating.
    pub(crate) caught: bool,
    /// Set when the record was translated from a hardware signal. Such
    /// records are only recoverable inside the region that produced them.
    pub(crate) from_signal: bool,
}

impl Raised {
    pub(crate) fn new(
        exception: &'static Exception,
        file: &'static str,
        line: u32,
        message: Option<Cow<'static, str>>,
        data: Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            exception,
            file,
            line,
            message,
            data,
            caught: false,
            from_signal: false,
        }
    }

    /// The descriptor this record was raised with.
    #[inline]
    pub fn exception(&self) -> &'static Exception {
        self.exception
    }

    /// Identity match against a descriptor.
    #[inline]
    pub fn is(&self, exception: &Exception) -> bool {
        self.exception.is(exception)
    }

    /// The descriptor name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.exception.name()
    }

    /// Source file of the throw site.
    #[inline]
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Source line of the throw site.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The throw-site message, falling back to the descriptor default.
    pub fn message(&self) -> Option<&str> {
        match &self.message {
            Some(m) => Some(m.as_ref()),
            None => self.exception.default_message(),
        }
    }

    /// Opaque payload attached with [`throw_carrying`](crate::throw_carrying).
    pub fn data(&self) -> Option<&(dyn Any + Send)> {
        self.data.as_deref()
    }

    pub(crate) fn info(&self) -> RaisedInfo {
        RaisedInfo {
            exception: self.exception,
            file: self.file,
            line: self.line,
            message: self.message().map(str::to_owned),
        }
    }
}

impl fmt::Debug for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raised")
            .field("exception", &self.name())
            .field("file", &self.file)
            .field("line", &self.line)
            .field("message", &self.message())
            .finish()
    }
}

/// An owned snapshot of a [`Raised`] record, bound by catch clauses.
///
/// ```
/// use throw_this::{exception, guard, throw};
///
/// exception! { static TOO_BIG; }
///
/// guard! {
///     try { throw!(TOO_BIG, "got {}", 512); }
///     catch TOO_BIG (e) {
///         assert_eq!(e.name(), "TOO_BIG");
///         assert_eq!(e.message(), Some("got 512"));
///     }
/// }
/// ```
#[derive(Clone)]
pub struct RaisedInfo {
    exception: &'static Exception,
    file: &'static str,
    line: u32,
    message: Option<String>,
}

impl RaisedInfo {
    /// The descriptor the record was raised with.
    #[inline]
    pub fn exception(&self) -> &'static Exception {
        self.exception
    }

    /// Identity match against a descriptor.
    #[inline]
    pub fn is(&self, exception: &Exception) -> bool {
        self.exception.is(exception)
    }

    /// The descriptor name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.exception.name()
    }

    /// Source file of the throw site.
    #[inline]
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Source line of the throw site.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The throw-site message, falling back to the descriptor default.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Debug for RaisedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaisedInfo")
            .field("exception", &self.name())
            .field("file", &self.file)
            .field("line", &self.line)
            .field("message", &self.message())
            .finish()
    }
}

impl fmt::Display for RaisedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.name(), self.file, self.line)?;
        if let Some(m) = self.message() {
            write!(f, ": {m}")?;
        }
        Ok(())
    }
}
