//! Proc macros for the throw-this crate.
//!
//! This crate provides a single entry point. The declarative `guard!` macro
//! tags its input with a region marker (`SYNC` or `SIGNAL`) and forwards it
//! here; the keyword module parses the clause train and the codegen module
//! emits calls into the runtime.

use proc_macro::TokenStream;

mod codegen;
mod keywords;
mod router;

/// Single proc macro entry point for `guard!`.
///
/// The declarative macro converts the region kind to a marker:
/// - `try { }` -> `SYNC { }`
/// - `try signal { }` -> `SIGNAL { }`
#[proc_macro]
pub fn __guard_proc(input: TokenStream) -> TokenStream {
    router::route(input.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
