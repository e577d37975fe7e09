//! Error: finally must be the last clause

use throw_this::{exception, guard};

exception! { static LATE; }

fn main() {
    guard! {
        try { }
        finally { eprintln!("cleanup"); }
        catch LATE { eprintln!("too late"); }
    }
}
