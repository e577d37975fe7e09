//! Error: try requires a braced body

use throw_this::guard;

fn main() {
    guard! {
        try
    }
}
