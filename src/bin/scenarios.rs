//! Runs one misuse scenario by name, so the exit code and diagnostic can be
//! checked from the outside.
//!
//! ```sh
//! RUST_LOG=debug memdebug-scenarios double-free
//! ```

use std::{env, process};

use memdebug::{delete_array, delete_single, new_array, new_single, Trunk};

fn clean_single() {
    let h = new_single::<i32>("a.x", 1);
    h.write(7);
    assert_eq!(h.read(), 7);
    delete_single(&h, "a.x", 2);
}

fn clean_array() {
    let h = new_array::<i32>(4, "a.x", 1);
    h.set(3, 9);
    assert_eq!(h.get(3), 9);
    delete_array(&h, "a.x", 2);
}

fn out_of_bounds() {
    let h = new_array::<i32>(4, "f", 1);
    h.get(4);
}

fn double_free() {
    let h = new_array::<i32>(2, "f", 1);
    delete_array(&h, "f", 2);
    delete_array(&h, "f", 3);
}

fn single_freed_as_array() {
    let h = new_single::<i32>("f", 1);
    delete_array(&h, "f", 2);
}

fn array_freed_as_single() {
    let h = new_array::<i32>(3, "f", 1);
    delete_single(&h, "f", 2);
}

fn use_after_free() {
    let h = new_single::<i32>("f", 1);
    delete_single(&h, "f", 2);
    h.read();
}

fn use_after_free_through_alias() {
    let h = new_array::<i32>(2, "f", 1);
    let alias = h.clone();
    delete_array(&h, "f", 2);
    alias.set(1, 5);
}

fn leak() {
    let h = new_single::<i32>("f", 1);
    let alias = h.clone();
    drop(h);
    println!("still one handle left");
    drop(alias);
    println!("unreachable");
}

fn leak_on_reassignment() {
    let mut h = new_array::<u8>(2, "f", 1);
    let other = new_array::<u8>(2, "f", 2);
    h.assign(&other);
}

fn leak_at_teardown() {
    let _session = memdebug::session();
    let freed = new_single::<i32>("f", 1);
    delete_single(&freed, "f", 2);
    // Never dropped, so only teardown can notice
    std::mem::forget(new_array::<i32>(2, "f", 3));
}

fn leaks_at_teardown_in_order() {
    let _session = memdebug::session();
    let freed = new_single::<i32>("f", 1);
    delete_single(&freed, "f", 2);
    std::mem::forget(new_array::<i32>(2, "f", 3));
    std::mem::forget(new_single::<u8>("f", 4));
}

fn huge_index() {
    let h = new_array::<i32>(4, "f", 1);
    h.get(usize::MAX);
}

fn huge_offset() {
    let h = new_array::<i32>(4, "f", 1);
    h.advance();
    h.offset(isize::MAX).get();
}

fn clean_teardown() {
    let _session = memdebug::session();
    let h = Trunk::<u64>::array(3);
    h.delete_array();
}

fn cursor_out_of_bounds() {
    let h = new_array::<i32>(2, "f", 1);
    h.advance();
    h.advance();
    h.cursor().get();
}

fn overview() {
    let a = new_single::<i32>("f", 1);
    let b = new_array::<u8>(4, "f", 2);
    let _alias = b.clone();
    memdebug::overview();
    delete_single(&a, "f", 3);
    delete_array(&b, "f", 4);
}

const SCENARIOS: &[(&str, fn())] = &[
    ("clean-single", clean_single),
    ("clean-array", clean_array),
    ("out-of-bounds", out_of_bounds),
    ("double-free", double_free),
    ("single-freed-as-array", single_freed_as_array),
    ("array-freed-as-single", array_freed_as_single),
    ("use-after-free", use_after_free),
    ("use-after-free-through-alias", use_after_free_through_alias),
    ("leak", leak),
    ("leak-on-reassignment", leak_on_reassignment),
    ("leak-at-teardown", leak_at_teardown),
    ("leaks-at-teardown-in-order", leaks_at_teardown_in_order),
    ("huge-index", huge_index),
    ("huge-offset", huge_offset),
    ("clean-teardown", clean_teardown),
    ("cursor-out-of-bounds", cursor_out_of_bounds),
    ("overview", overview),
];

fn main() {
    env_logger::init();
    let Some(name) = env::args().nth(1) else {
        eprintln!("usage: memdebug-scenarios <scenario>");
        process::exit(2);
    };
    let Some((_, scenario)) = SCENARIOS.iter().find(|(n, _)| *n == name) else {
        eprintln!("unknown scenario {name:?}");
        process::exit(2);
    };
    log::info!("running scenario {name}");
    scenario();
}
