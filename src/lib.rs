//! A better way to find memory bugs.
//!
//! Instead of handing out raw heap memory, hand out [`Trunk`]s. A trunk
//! remembers where it was allocated and where it was freed, and checks every
//! access. When something goes wrong (a leak, a double free, an index out of
//! bounds, a use-after-free, or freeing an array as a single element or vice
//! versa) it prints both source locations and exits with a fixed code:
//!
//! | code | bug                                  |
//! |-----:|--------------------------------------|
//! |   11 | leak                                 |
//! |   12 | double free                          |
//! |   13 | index out of bounds                  |
//! |   14 | access after free                    |
//! |   21 | single allocation freed as an array  |
//! |   22 | array allocation freed as single     |
//!
//! ```no_run
//! use memdebug::{delete_array, new_array};
//!
//! let _session = memdebug::session();
//! let ary = new_array!(i32, 16);
//! ary.set(3, 666);
//! println!("{}", ary.get(3));
//! println!("{}", (&ary + 3).get());
//! delete_array!(ary);
//! ```

pub mod alloc;
mod macros;
pub mod serialize;
pub mod trace;
pub mod util;

pub use alloc::{
    cursor::Cursor,
    diagnostic::Violation,
    registry::{
        alloc, delete_array, delete_single, leaks, live_by_site, new_array, new_single, overview,
        overview_json, session, snapshot, teardown, with_allocator, AllocRecord, Allocator,
        Session,
    },
    trunk::{Kind, Trunk},
};
pub use trace::Trace;
