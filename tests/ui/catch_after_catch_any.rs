//! Error: catch clauses after catch_any are unreachable

use throw_this::{exception, guard};

exception! { static SHADOWED; }

fn main() {
    guard! {
        try { }
        catch_any { eprintln!("everything"); }
        catch SHADOWED { eprintln!("never"); }
    }
}
