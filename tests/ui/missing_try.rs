//! Error: guard! must start with a try clause

use throw_this::guard;

fn main() {
    guard! {
        catch_any { eprintln!("no try"); }
    }
}
