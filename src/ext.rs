//! Extension trait bridging `Result` and `Option` into throws.

use core::fmt;
use std::borrow::Cow;

use crate::except::Exception;
use crate::throw::throw;

/// Turn fallible std-style values into throws.
///
/// ```
/// use throw_this::{exception, guard, OrThrow};
///
/// exception! { static CONFIG_MISSING; }
///
/// guard! {
///     try {
///         let text = std::fs::read_to_string("/no/such/file").or_throw(&CONFIG_MISSING);
///         let _ = text;
///     }
///     catch CONFIG_MISSING { /* fall back to defaults */ }
/// }
/// ```
pub trait OrThrow<T> {
    /// Unwrap the success value, throwing `exception` otherwise. The error's
    /// display output (when there is one) becomes the record message.
    fn or_throw(self, exception: &'static Exception) -> T;
}

impl<T, E: fmt::Display> OrThrow<T> for Result<T, E> {
    #[track_caller]
    fn or_throw(self, exception: &'static Exception) -> T {
        match self {
            Ok(value) => value,
            Err(error) => {
                let location = core::panic::Location::caller();
                throw(
                    exception,
                    location.file(),
                    location.line(),
                    Some(Cow::Owned(error.to_string())),
                )
            }
        }
    }
}

impl<T> OrThrow<T> for Option<T> {
    #[track_caller]
    fn or_throw(self, exception: &'static Exception) -> T {
        match self {
            Some(value) => value,
            None => {
                let location = core::panic::Location::caller();
                throw(exception, location.file(), location.line(), None)
            }
        }
    }
}
