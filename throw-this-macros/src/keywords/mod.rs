//! Clause parsing for `guard!` blocks.
//!
//! Grammar after the region marker:
//!
//! ```text
//! { try-body } clause*
//! clause := "catch" path binding? { body }
//!         | "catch_any" binding? { body }
//!         | "finally" { body }
//! binding := ( ident )
//! ```
//!
//! `catch`/`catch_any`/`finally` are contextual keywords, not Rust keywords,
//! so they are parsed as plain identifiers.

use proc_macro2::{Delimiter, Span, TokenStream, TokenTree};
use syn::parse::{Parse, ParseStream};
use syn::{Error, Ident, Path, Result};

/// A fully parsed `guard!` block.
pub struct GuardBlock {
    /// True for `try signal` regions.
    pub signal: bool,
    /// Tokens of the try body.
    pub body: TokenStream,
    /// Clauses in source order. Validation guarantees at most one `finally`,
    /// in last position, and nothing after a `catch_any`.
    pub clauses: Vec<Clause>,
}

pub struct Clause {
    pub kind: ClauseKind,
    /// Optional `(ident)` binding for the raised-record snapshot.
    pub binding: Option<Ident>,
    pub body: TokenStream,
    pub span: Span,
}

pub enum ClauseKind {
    /// `catch PATH`: match one descriptor by identity.
    Catch(Path),
    /// `catch_any`: match whatever is propagating.
    CatchAny,
    /// `finally`: unconditional, runs last.
    Finally,
}

impl GuardBlock {
    /// Parse `{ body } clause*` for a region whose kind the router already
    /// determined from the marker.
    pub fn parse_tagged(signal: bool, input: TokenStream) -> Result<GuardBlock> {
        let mut iter = input.into_iter();
        let body = match iter.next() {
            Some(TokenTree::Group(group)) if group.delimiter() == Delimiter::Brace => {
                group.stream()
            }
            Some(other) => {
                return Err(Error::new_spanned(other, "expected a braced try body"));
            }
            None => {
                return Err(Error::new(Span::call_site(), "expected a braced try body"));
            }
        };
        let rest: TokenStream = iter.collect();
        let ClauseList(clauses) = syn::parse2(rest)?;
        Ok(GuardBlock {
            signal,
            body,
            clauses,
        })
    }
}

struct ClauseList(Vec<Clause>);

impl Parse for ClauseList {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut clauses = Vec::new();
        while !input.is_empty() {
            clauses.push(parse_clause(input)?);
        }
        validate(&clauses)?;
        Ok(ClauseList(clauses))
    }
}

fn parse_clause(input: ParseStream) -> Result<Clause> {
    let keyword: Ident = input
        .parse()
        .map_err(|e| Error::new(e.span(), "expected `catch`, `catch_any`, or `finally`"))?;
    let span = keyword.span();

    match keyword.to_string().as_str() {
        "catch" => {
            // Mod-style path only: a descriptor is a static, never a generic
            // path, and `(binding)` must not be eaten as path arguments.
            let path = input
                .call(Path::parse_mod_style)
                .map_err(|e| Error::new(e.span(), "`catch` expects an exception descriptor"))?;
            let binding = parse_binding(input)?;
            let body = parse_body(input)?;
            Ok(Clause {
                kind: ClauseKind::Catch(path),
                binding,
                body,
                span,
            })
        }
        "catch_any" => {
            let binding = parse_binding(input)?;
            let body = parse_body(input)?;
            Ok(Clause {
                kind: ClauseKind::CatchAny,
                binding,
                body,
                span,
            })
        }
        "finally" => {
            let body = parse_body(input)?;
            Ok(Clause {
                kind: ClauseKind::Finally,
                binding: None,
                body,
                span,
            })
        }
        other => Err(Error::new(
            span,
            format!("expected `catch`, `catch_any`, or `finally`, found `{other}`"),
        )),
    }
}

fn parse_binding(input: ParseStream) -> Result<Option<Ident>> {
    if !input.peek(syn::token::Paren) {
        return Ok(None);
    }
    let content;
    syn::parenthesized!(content in input);
    let ident: Ident = content.parse()?;
    if !content.is_empty() {
        return Err(Error::new(
            content.span(),
            "expected a single binding identifier",
        ));
    }
    Ok(Some(ident))
}

fn parse_body(input: ParseStream) -> Result<TokenStream> {
    let content;
    syn::braced!(content in input);
    content.parse()
}

fn validate(clauses: &[Clause]) -> Result<()> {
    let mut finally_seen = false;
    let mut catch_any_seen = false;
    for clause in clauses {
        if finally_seen {
            return Err(Error::new(
                clause.span,
                "`finally` must be the last clause",
            ));
        }
        match clause.kind {
            ClauseKind::Finally => finally_seen = true,
            ClauseKind::CatchAny => {
                if catch_any_seen {
                    return Err(Error::new(clause.span, "unreachable clause after `catch_any`"));
                }
                catch_any_seen = true;
            }
            ClauseKind::Catch(_) => {
                if catch_any_seen {
                    return Err(Error::new(
                        clause.span,
                        "unreachable `catch` after `catch_any`",
                    ));
                }
            }
        }
    }
    Ok(())
}
