//! Error: multiple finally clauses

use throw_this::guard;

fn main() {
    guard! {
        try { }
        finally { eprintln!("first"); }
        finally { eprintln!("second"); }
    }
}
