//! Every diagnostic ends the process, so these run the scenario binary and
//! look at what comes out.

use std::process::{Command, Output};

fn run(scenario: &str) -> (Option<i32>, String) {
    let Output { status, stdout, .. } = Command::new(env!("CARGO_BIN_EXE_memdebug-scenarios"))
        .arg(scenario)
        .env_remove("RUST_LOG")
        .output()
        .expect("scenario binary should run");
    (status.code(), String::from_utf8_lossy(&stdout).into_owned())
}

#[test]
fn clean_single_exits_zero() {
    let (code, stdout) = run("clean-single");
    assert_eq!(code, Some(0));
    assert!(stdout.is_empty(), "{stdout}");
}

#[test]
fn clean_array_exits_zero() {
    let (code, stdout) = run("clean-array");
    assert_eq!(code, Some(0));
    assert!(stdout.is_empty(), "{stdout}");
}

#[test]
fn out_of_bounds_exits_13() {
    let (code, stdout) = run("out-of-bounds");
    assert_eq!(code, Some(13));
    assert!(stdout.starts_with("Index out of boundary!"), "{stdout}");
    assert!(stdout.contains("Index: 4, size: 4."), "{stdout}");
    assert!(stdout.contains("Allocated here: (f:1)."), "{stdout}");
}

#[test]
fn double_free_exits_12() {
    let (code, stdout) = run("double-free");
    assert_eq!(code, Some(12));
    assert!(stdout.starts_with("Double free detected!"), "{stdout}");
    assert!(stdout.contains("1st free: (f:2)."), "{stdout}");
    assert!(stdout.contains("2nd free: (f:3)."), "{stdout}");
}

#[test]
fn single_freed_as_array_exits_21() {
    let (code, stdout) = run("single-freed-as-array");
    assert_eq!(code, Some(21));
    assert!(stdout.contains("Allocated here: (f:1)."), "{stdout}");
    assert!(stdout.contains("Freed here: (f:2)."), "{stdout}");
}

#[test]
fn array_freed_as_single_exits_22() {
    let (code, stdout) = run("array-freed-as-single");
    assert_eq!(code, Some(22));
    assert!(stdout.contains("Allocated here: (f:1)."), "{stdout}");
    assert!(stdout.contains("Freed here: (f:2)."), "{stdout}");
}

#[test]
fn use_after_free_exits_14() {
    let (code, stdout) = run("use-after-free");
    assert_eq!(code, Some(14));
    assert!(stdout.starts_with("Access after freed!"), "{stdout}");
    assert!(stdout.contains("1st free: (f:2)."), "{stdout}");
}

#[test]
fn use_after_free_is_seen_by_aliases() {
    let (code, stdout) = run("use-after-free-through-alias");
    assert_eq!(code, Some(14));
    assert!(stdout.contains("1st free: (f:2)."), "{stdout}");
}

#[test]
fn leak_fires_when_the_last_handle_goes() {
    let (code, stdout) = run("leak");
    assert_eq!(code, Some(11));
    assert!(stdout.starts_with("still one handle left\n"), "{stdout}");
    assert!(stdout.contains("Memory leak detected!"), "{stdout}");
    assert!(stdout.contains("Allocated here: (f:1)."), "{stdout}");
    assert!(!stdout.contains("unreachable"), "{stdout}");
}

#[test]
fn reassignment_leaks_the_old_allocation() {
    let (code, stdout) = run("leak-on-reassignment");
    assert_eq!(code, Some(11));
    assert!(stdout.contains("Allocated here: (f:1)."), "{stdout}");
}

#[test]
fn teardown_finds_forgotten_allocations() {
    let (code, stdout) = run("leak-at-teardown");
    assert_eq!(code, Some(11));
    assert!(stdout.contains("Allocated here: (f:3)."), "{stdout}");
}

#[test]
fn teardown_reports_the_oldest_leak_first() {
    let (code, stdout) = run("leaks-at-teardown-in-order");
    assert_eq!(code, Some(11));
    assert!(stdout.contains("Allocated here: (f:3)."), "{stdout}");
    assert!(!stdout.contains("f:4"), "{stdout}");
}

#[test]
fn huge_index_is_named_exactly() {
    let (code, stdout) = run("huge-index");
    assert_eq!(code, Some(13));
    assert!(
        stdout.contains("Index: 18446744073709551615, size: 4."),
        "{stdout}"
    );
}

#[test]
fn huge_offset_is_out_of_bounds() {
    let (code, stdout) = run("huge-offset");
    assert_eq!(code, Some(13));
    assert!(
        stdout.contains("Index: 9223372036854775808, size: 4."),
        "{stdout}"
    );
}

#[test]
fn teardown_of_a_clean_session_exits_zero() {
    let (code, stdout) = run("clean-teardown");
    assert_eq!(code, Some(0));
    assert!(stdout.is_empty(), "{stdout}");
}

#[test]
fn cursor_past_the_end_exits_13() {
    let (code, stdout) = run("cursor-out-of-bounds");
    assert_eq!(code, Some(13));
    assert!(stdout.contains("Index: 2, size: 2."), "{stdout}");
}

#[test]
fn overview_lists_every_allocation() {
    let (code, stdout) = run("overview");
    assert_eq!(code, Some(0));
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert!(lines[0].ends_with("with refcount = 1; size = 1"), "{stdout}");
    assert!(lines[1].ends_with("with refcount = 2; size = 4"), "{stdout}");
}

#[test]
fn unknown_scenarios_are_rejected() {
    let (code, _) = run("no-such-thing");
    assert_eq!(code, Some(2));
}
