//! Public macros.
//!
//! `guard!` is a thin declarative router: it tags the input and hands it to
//! the proc macro, which parses the clause train and emits runtime calls.
//! The declaration macros (`exception!`, `throw!`, `ensure!`, `defer!`) are
//! plain `macro_rules!`.

mod decl;
mod guard;
