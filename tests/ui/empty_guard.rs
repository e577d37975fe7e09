//! Error: empty guard! block

use throw_this::guard;

fn main() {
    guard! {}
}
