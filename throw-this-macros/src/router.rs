//! Marker router - identifies the region kind and drives parse + emit.

use proc_macro2::{Span, TokenStream, TokenTree};
use syn::{Error, Result};

use crate::codegen;
use crate::keywords::GuardBlock;

/// Route input to parsing and code generation based on the marker token.
pub fn route(input: TokenStream) -> Result<TokenStream> {
    let mut iter = input.into_iter();

    let marker = match iter.next() {
        Some(TokenTree::Ident(id)) => id,
        Some(other) => {
            return Err(Error::new_spanned(other, "expected region marker"));
        }
        None => {
            return Err(Error::new(Span::call_site(), "empty input to __guard_proc"));
        }
    };

    let rest: TokenStream = iter.collect();

    match marker.to_string().as_str() {
        "SYNC" => codegen::emit(GuardBlock::parse_tagged(false, rest)?),
        "SIGNAL" => codegen::emit(GuardBlock::parse_tagged(true, rest)?),
        // Unified error handling with proper spans.
        "ERROR" => {
            let first = rest.into_iter().next();
            let (span, token) = first
                .map(|t| (t.span(), t.to_string()))
                .unwrap_or_else(|| (Span::call_site(), "?".to_string()));

            if token == "try" {
                Err(Error::new(
                    span,
                    "`try` requires a body: `try { ... }` or `try signal { ... }`",
                ))
            } else {
                Err(Error::new(
                    span,
                    format!("guard! must start with `try`, found `{token}`"),
                ))
            }
        }
        "ERROR_EMPTY" => Err(Error::new(Span::call_site(), "empty guard! block")),
        other => Err(Error::new(
            marker.span(),
            format!("unknown region marker: {other}"),
        )),
    }
}
