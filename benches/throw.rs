//! Benchmarks for the exception engine.
//!
//! Compares guard!/throw! against idiomatic Result control flow, and arena
//! allocation against the global allocator. Each benchmark pair does
//! EQUIVALENT work.
//!
//! Run with: cargo bench

use std::sync::atomic::{AtomicU32, Ordering};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use throw_this::{exception, guard, protect, throw, Arena};

exception! { static BENCH_FAILURE; }

#[inline(never)]
fn fallible_ok() -> Result<i32, &'static str> {
    Ok(42)
}

#[inline(never)]
fn fallible_err() -> Result<i32, &'static str> {
    Err("fail")
}

// ============================================================
// 1. SUCCESS PATH: region entry with nothing thrown
// ============================================================

fn bench_success_guard(c: &mut Criterion) {
    c.bench_function("success_guard", |b| {
        b.iter(|| {
            let mut value = 0;
            guard! {
                try { value = fallible_ok().unwrap_or(0); }
                catch_any { value = -1; }
            }
            black_box(value)
        })
    });
}

fn bench_success_result(c: &mut Criterion) {
    c.bench_function("success_result", |b| {
        b.iter(|| {
            let value = fallible_ok().unwrap_or(-1);
            black_box(value)
        })
    });
}

// ============================================================
// 2. FAILURE PATH: one throw caught one frame up
// ============================================================

fn bench_throw_catch(c: &mut Criterion) {
    c.bench_function("throw_catch", |b| {
        b.iter(|| {
            let mut value = 0;
            guard! {
                try {
                    if fallible_err().is_err() {
                        throw!(BENCH_FAILURE);
                    }
                }
                catch BENCH_FAILURE { value = -1; }
            }
            black_box(value)
        })
    });
}

fn bench_err_result(c: &mut Criterion) {
    c.bench_function("err_result", |b| {
        b.iter(|| {
            let value = fallible_err().unwrap_or(-1);
            black_box(value)
        })
    });
}

// ============================================================
// 3. CLEANUP: one registered finalizer per region
// ============================================================

static RELEASED: AtomicU32 = AtomicU32::new(0);

fn bench_protect_drain(c: &mut Criterion) {
    c.bench_function("protect_drain", |b| {
        b.iter(|| {
            guard! {
                try {
                    protect(|| {
                        RELEASED.fetch_add(1, Ordering::Relaxed);
                    });
                }
            }
            black_box(RELEASED.load(Ordering::Relaxed))
        })
    });
}

struct DropProbe;

impl Drop for DropProbe {
    fn drop(&mut self) {
        RELEASED.fetch_add(1, Ordering::Relaxed);
    }
}

fn bench_drop_guard(c: &mut Criterion) {
    c.bench_function("drop_guard", |b| {
        b.iter(|| {
            {
                let _probe = DropProbe;
            }
            black_box(RELEASED.load(Ordering::Relaxed))
        })
    });
}

// ============================================================
// 4. ALLOCATION: arena bump vs global allocator
// ============================================================

fn bench_arena_alloc(c: &mut Criterion) {
    c.bench_function("arena_alloc", |b| {
        b.iter(|| {
            let arena = Arena::new();
            let buf = arena.alloc_zeroed(64);
            black_box(buf[0])
        })
    });
}

fn bench_heap_alloc(c: &mut Criterion) {
    c.bench_function("heap_alloc", |b| {
        b.iter(|| {
            let buf = vec![0u8; 64];
            black_box(buf[0])
        })
    });
}

criterion_group!(
    benches,
    bench_success_guard,
    bench_success_result,
    bench_throw_catch,
    bench_err_result,
    bench_protect_drain,
    bench_drop_guard,
    bench_arena_alloc,
    bench_heap_alloc
);
criterion_main!(benches);
