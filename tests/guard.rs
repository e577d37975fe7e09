//! Dispatch semantics: clause selection, propagation, rethrow, finally.

use throw_this::{exception, guard, rethrow, throw, with_raised, RaisedInfo};

exception! {
    static BAD_ALLOC;
    static DIVISION_BY_ZERO = "division by zero";
    static FIRST;
    static SECOND;
}

#[test]
fn body_runs_without_clauses() {
    let mut ran = false;
    guard! {
        try { ran = true; }
    }
    assert!(ran);
}

#[test]
fn unrelated_catch_does_not_match() {
    let mut out = Vec::new();
    guard! {
        try { throw!(DIVISION_BY_ZERO); }
        catch BAD_ALLOC { out.push("A"); }
        catch_any { out.push("B"); }
    }
    assert_eq!(out, ["B"]);
}

#[test]
fn finally_runs_after_catch() {
    let mut out = Vec::new();
    guard! {
        try { throw!(DIVISION_BY_ZERO); }
        catch_any { out.push("C"); }
        finally { out.push("F"); }
    }
    assert_eq!(out, ["C", "F"]);
}

#[test]
fn finally_runs_on_normal_exit() {
    let mut out = Vec::new();
    guard! {
        try { out.push("body"); }
        catch_any { out.push("handler"); }
        finally { out.push("finally"); }
    }
    assert_eq!(out, ["body", "finally"]);
}

#[test]
fn first_matching_clause_wins() {
    let mut out = Vec::new();
    guard! {
        try { throw!(DIVISION_BY_ZERO); }
        catch DIVISION_BY_ZERO { out.push("named"); }
        catch_any { out.push("any"); }
    }
    assert_eq!(out, ["named"]);
}

#[test]
fn statements_after_throw_do_not_run() {
    let mut out = Vec::new();
    guard! {
        try {
            out.push("before");
            throw!(FIRST);
        }
        catch FIRST { out.push("caught"); }
    }
    assert_eq!(out, ["before", "caught"]);
}

#[test]
fn unmatched_record_propagates_to_enclosing_region() {
    let mut out = Vec::new();
    guard! {
        try {
            guard! {
                try { throw!(FIRST); }
                catch SECOND { out.push("inner"); }
                finally { out.push("inner finally"); }
            }
            out.push("unreachable");
        }
        catch FIRST { out.push("outer"); }
    }
    assert_eq!(out, ["inner finally", "outer"]);
}

#[test]
fn propagation_crosses_function_frames() {
    fn deep_throw(depth: u32) {
        if depth == 0 {
            throw!(DIVISION_BY_ZERO, "bottom");
        }
        deep_throw(depth - 1);
    }

    let mut message = None;
    guard! {
        try { deep_throw(5); }
        catch DIVISION_BY_ZERO (e) { message = e.message().map(str::to_owned); }
    }
    assert_eq!(message.as_deref(), Some("bottom"));
}

#[test]
fn binding_exposes_descriptor_and_location() {
    let mut seen: Option<RaisedInfo> = None;
    guard! {
        try { throw!(DIVISION_BY_ZERO); }
        catch_any (e) { seen = Some(e); }
    }
    let info = seen.expect("clause should have bound the record");
    assert!(info.is(&DIVISION_BY_ZERO));
    assert_eq!(info.name(), "DIVISION_BY_ZERO");
    assert!(info.file().ends_with("guard.rs"));
    assert!(info.line() > 0);
    assert_eq!(info.message(), Some("division by zero"));
}

#[test]
fn rethrow_reemits_the_identical_record() {
    let mut inner: Option<RaisedInfo> = None;
    let mut outer: Option<RaisedInfo> = None;
    guard! {
        try {
            guard! {
                try { throw!(FIRST, "only once"); }
                catch FIRST (e) {
                    inner = Some(e);
                    rethrow();
                }
            }
        }
        catch_any (e) { outer = Some(e); }
    }
    let inner = inner.expect("inner catch ran");
    let outer = outer.expect("outer catch ran");
    assert!(outer.is(&FIRST));
    assert_eq!(inner.file(), outer.file());
    assert_eq!(inner.line(), outer.line());
    assert_eq!(inner.message(), outer.message());
}

#[test]
fn throw_inside_catch_replaces_the_record() {
    let mut name = None;
    guard! {
        try {
            guard! {
                try { throw!(FIRST); }
                catch FIRST { throw!(SECOND); }
            }
        }
        catch_any (e) { name = Some(e.name()); }
    }
    assert_eq!(name, Some("SECOND"));
}

#[test]
fn throw_inside_catch_skips_that_frames_finally() {
    let mut inner_finally = false;
    let mut outer_caught = false;
    guard! {
        try {
            guard! {
                try { throw!(FIRST); }
                catch FIRST { throw!(SECOND); }
                finally { inner_finally = true; }
            }
        }
        catch SECOND { outer_caught = true; }
    }
    assert!(outer_caught);
    assert!(!inner_finally);
}

#[test]
fn throw_inside_finally_propagates() {
    let mut caught = false;
    guard! {
        try {
            guard! {
                try { /* completes */ }
                finally { throw!(FIRST); }
            }
        }
        catch FIRST { caught = true; }
    }
    assert!(caught);
}

#[test]
fn finally_observes_an_unmatched_record() {
    let mut observed = None;
    let mut caught = false;
    guard! {
        try {
            guard! {
                try { throw!(FIRST); }
                finally {
                    observed = with_raised(|r| r.name());
                }
            }
        }
        catch FIRST { caught = true; }
    }
    assert_eq!(observed, Some("FIRST"));
    assert!(caught);
}

#[test]
fn record_is_released_after_its_region() {
    guard! {
        try { throw!(FIRST); }
        catch FIRST { /* consumed */ }
    }
    assert!(with_raised(|r| r.name()).is_none());
}

#[test]
fn handlers_support_loop_control_flow() {
    let mut caught = 0;
    for attempt in 0..5 {
        guard! {
            try {
                if attempt < 3 { throw!(FIRST); }
            }
            catch FIRST { caught += 1; }
        }
    }
    assert_eq!(caught, 3);
}

#[test]
fn handlers_can_break_out_of_loops() {
    let mut rounds = 0;
    for _ in 0..10 {
        rounds += 1;
        guard! {
            try { if rounds == 3 { throw!(FIRST); } }
            catch FIRST { break; }
        }
    }
    assert_eq!(rounds, 3);
}

#[test]
fn foreign_panics_are_not_caught() {
    let mut matched = false;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        guard! {
            try { panic!("not an exception"); }
            catch_any { matched = true; }
        }
    }));
    assert!(result.is_err());
    assert!(!matched);
}

#[test]
fn regions_reuse_cleanly_in_sequence() {
    for _ in 0..100 {
        let mut caught = false;
        guard! {
            try { throw!(SECOND); }
            catch SECOND { caught = true; }
        }
        assert!(caught);
    }
}
