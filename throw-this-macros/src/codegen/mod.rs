//! Code generation for `guard!` blocks.
//!
//! The emitted shape keeps clause selection as data and runs clause bodies
//! at the expansion site, so handlers keep normal control flow:
//!
//! ```text
//! {
//!     let __frame = FrameGuard::enter(file!(), line!());
//!     let __outcome = __frame.run_body(|| { body; });
//!     let __arm = match __outcome { Completed => None, Thrown => select(...) };
//!     match __arm { Some(0) => handler0, ..., _ => {} }
//!     { finally }
//! }   // <- frame drop: finalizers, arena, pop, re-emit if unhandled
//! ```

use proc_macro2::TokenStream;
use quote::quote;
use syn::{LitInt, Result};

use crate::keywords::{Clause, ClauseKind, GuardBlock};

pub fn emit(block: GuardBlock) -> Result<TokenStream> {
    let body = &block.body;
    let run = if block.signal {
        quote!(run_signal_body)
    } else {
        quote!(run_body)
    };

    let catches: Vec<&Clause> = block
        .clauses
        .iter()
        .filter(|clause| !matches!(clause.kind, ClauseKind::Finally))
        .collect();
    let finally = block
        .clauses
        .iter()
        .find(|clause| matches!(clause.kind, ClauseKind::Finally));

    let clause_exprs = catches.iter().map(|clause| match &clause.kind {
        ClauseKind::Catch(path) => quote!(::throw_this::rt::Clause::Named(&#path)),
        ClauseKind::CatchAny => quote!(::throw_this::rt::Clause::Any),
        ClauseKind::Finally => TokenStream::new(),
    });

    let arms = catches.iter().enumerate().map(|(index, clause)| {
        let index = LitInt::new(&format!("{index}usize"), clause.span);
        let handler = &clause.body;
        let binding = clause
            .binding
            .as_ref()
            .map(|ident| quote! { let #ident = __frame.raised_info(); });
        quote! {
            ::core::option::Option::Some(#index) => { #binding #handler }
        }
    });

    let finally_tokens = finally.map(|clause| {
        let body = &clause.body;
        quote! { { #body } }
    });

    Ok(quote! {{
        let __frame = ::throw_this::rt::FrameGuard::enter(::core::file!(), ::core::line!());
        let __outcome = __frame.#run(|| { #body; });
        let __arm = match __outcome {
            ::throw_this::rt::BodyOutcome::Completed => ::core::option::Option::None,
            ::throw_this::rt::BodyOutcome::Thrown => __frame.select(&[#(#clause_exprs),*]),
        };
        match __arm {
            #(#arms)*
            _ => {}
        }
        #finally_tokens
    }})
}
