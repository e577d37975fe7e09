//! Declaration and raise macros: `exception!`, `throw!`, `ensure!`, `defer!`.

/// Declare exception descriptors at `static` scope.
///
/// Each declaration produces a `static` [`Exception`](crate::Exception)
/// whose name is the identifier and whose identity is its address. An
/// optional `= "message"` sets the default message used when a throw site
/// does not supply one. Reference a descriptor declared in another module or
/// crate with a plain `use`.
///
/// ```
/// use throw_this::exception;
///
/// exception! {
///     /// Raised when the input cannot be parsed.
///     pub static PARSE_FAILURE = "unparseable input";
///     static STACK_EMPTY;
/// }
///
/// assert_eq!(PARSE_FAILURE.default_message(), Some("unparseable input"));
/// assert_eq!(STACK_EMPTY.name(), "STACK_EMPTY");
/// ```
#[macro_export]
macro_rules! exception {
    ($($(#[$meta:meta])* $vis:vis static $name:ident $(= $msg:expr)? ;)+) => {
        $(
            $(#[$meta])*
            $vis static $name: $crate::Exception = $crate::Exception::new(
                ::core::stringify!($name),
                $crate::__exception_message!($($msg)?),
            );
        )+
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __exception_message {
    () => {
        ::core::option::Option::None
    };
    ($msg:expr) => {
        ::core::option::Option::Some($msg)
    };
}

/// Raise an exception from the current source location.
///
/// With just a descriptor the record carries the descriptor's default
/// message; extra arguments are formatted into a dynamic message.
///
/// ```
/// use throw_this::{exception, guard, throw};
///
/// exception! { static TOO_BIG; }
///
/// guard! {
///     try { throw!(TOO_BIG, "limit is {}", 100); }
///     catch TOO_BIG (e) { assert_eq!(e.message(), Some("limit is 100")); }
/// }
/// ```
#[macro_export]
macro_rules! throw {
    ($exception:path) => {
        $crate::throw(
            &$exception,
            ::core::file!(),
            ::core::line!(),
            ::core::option::Option::None,
        )
    };
    ($exception:path, $($arg:tt)+) => {
        $crate::throw(
            &$exception,
            ::core::file!(),
            ::core::line!(),
            ::core::option::Option::Some(::std::borrow::Cow::Owned(
                ::std::format!($($arg)+),
            )),
        )
    };
}

/// Throw when a condition does not hold.
///
/// The one-argument form raises the built-in assertion-failure descriptor
/// with the stringified condition as message; the two-argument form raises
/// the given descriptor instead.
///
/// ```
/// use throw_this::{ensure, exception, guard};
///
/// exception! { static EMPTY_INPUT; }
///
/// let items: Vec<u8> = Vec::new();
/// let mut rejected = false;
/// guard! {
///     try { ensure!(!items.is_empty(), EMPTY_INPUT); }
///     catch EMPTY_INPUT { rejected = true; }
/// }
/// assert!(rejected);
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr) => {
        if !$cond {
            $crate::throw(
                &$crate::ASSERTION_FAILURE,
                ::core::file!(),
                ::core::line!(),
                ::core::option::Option::Some(::std::borrow::Cow::Borrowed(
                    ::core::stringify!($cond),
                )),
            );
        }
    };
    ($cond:expr, $exception:path) => {
        if !$cond {
            $crate::throw(
                &$exception,
                ::core::file!(),
                ::core::line!(),
                ::core::option::Option::Some(::std::borrow::Cow::Borrowed(
                    ::core::stringify!($cond),
                )),
            );
        }
    };
}

/// Register cleanup with the innermost protected region.
///
/// Sugar for [`protect`](crate::protect) when the handle is not needed. The
/// body runs when the region is left, on every exit path.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use throw_this::{defer, guard};
///
/// let closed = Rc::new(Cell::new(false));
/// let flag = closed.clone();
/// guard! {
///     try { defer! { flag.set(true); } }
/// }
/// assert!(closed.get());
/// ```
#[macro_export]
macro_rules! defer {
    ($($body:tt)*) => {
        let _ = $crate::protect(move || { $($body)* });
    };
}
