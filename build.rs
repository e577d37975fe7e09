fn main() {
    println!("cargo:rerun-if-changed=src/sjlj.c");

    // The sigsetjmp shim is only meaningful where POSIX signals exist. On
    // other targets the signal bridge degrades to a plain protected region
    // and never calls into C.
    if std::env::var_os("CARGO_CFG_UNIX").is_some() {
        cc::Build::new().file("src/sjlj.c").compile("throw_this_sjlj");
    }
}
