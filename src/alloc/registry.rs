//! The [`Allocator`]: every allocation ever handed out, kept so that its state
//! can be inspected (and leaks found) long after the user's handles are gone.
//!
//! The registry is per thread. Handles are not `Send`, so an allocation can
//! never outlive the registry that knows about it on another thread.

use std::{
    cell::RefCell,
    fmt,
    io::{self, Write},
    marker::PhantomData,
    mem,
    rc::Rc,
};

use hashbrown::HashMap;
use serde::Serialize;

use crate::{
    alloc::{
        diagnostic::Violation,
        trunk::{Kind, Trunk, TrunkState},
    },
    serialize::serde_usize,
    trace::Trace,
};

thread_local! {
    static ALLOCATOR: RefCell<Allocator> = RefCell::new(Allocator::new());
}

/// What the registry needs from an allocation, whatever its element type.
pub(crate) trait Block {
    fn record(&self) -> AllocRecord;

    /// Release the allocation if it is still live, returning the leak. Does
    /// nothing to an allocation that was already freed.
    fn reap(&self) -> Option<Violation>;
}

/// A point-in-time description of one allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocRecord {
    /// Where the buffer lives. Null once released.
    #[serde(with = "serde_usize")]
    pub address: *const (),
    pub refcount: usize,
    pub size: usize,
    pub kind: Kind,
    pub type_name: String,
    pub allocated_at: Trace,
    pub freed_at: Option<Trace>,
}

impl AllocRecord {
    pub fn is_live(&self) -> bool {
        self.freed_at.is_none()
    }
}

impl fmt::Display for AllocRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:p} with refcount = {}; size = {}",
            self.address, self.refcount, self.size
        )
    }
}

#[derive(Default)]
pub struct Allocator {
    /// In allocation order
    pool: Vec<Rc<dyn Block>>,
}

impl Allocator {
    pub const fn new() -> Self {
        Self { pool: Vec::new() }
    }

    /// Create an allocation of `count` default `T`s and keep it in the pool.
    ///
    /// # Panics
    ///
    /// - If `count` is zero, or `kind` is [`Kind::Single`] and `count` is
    ///   not 1
    pub fn alloc<T>(&mut self, count: usize, trace: Trace, kind: Kind) -> Trunk<T>
    where
        T: Default + 'static,
    {
        let shared = Rc::new(RefCell::new(TrunkState::<T>::new(trace, count, kind)));
        self.pool.push(shared.clone());
        log::debug!(
            "allocated {kind} {}[{count}] at {trace} (#{})",
            tynm::type_name::<T>(),
            self.pool.len()
        );
        Trunk::adopt(shared)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn snapshot(&self) -> Vec<AllocRecord> {
        self.pool.iter().map(|block| block.record()).collect()
    }
}

/// Run `f` against this thread's allocator.
///
/// # Panics
///
/// - If called from inside another `with_allocator()`
pub fn with_allocator<R, F>(f: F) -> R
where
    F: FnOnce(&mut Allocator) -> R,
{
    ALLOCATOR.with(|allocator| f(&mut allocator.borrow_mut()))
}

/// [`Allocator::alloc()`] on this thread's allocator.
pub fn alloc<T>(count: usize, trace: Trace, kind: Kind) -> Trunk<T>
where
    T: Default + 'static,
{
    with_allocator(|allocator| allocator.alloc(count, trace, kind))
}

/// `new T`, allocated at `file:line`
pub fn new_single<T>(file: &'static str, line: u32) -> Trunk<T>
where
    T: Default + 'static,
{
    alloc(1, Trace::new(file, line), Kind::Single)
}

/// `new T[count]`, allocated at `file:line`
pub fn new_array<T>(count: usize, file: &'static str, line: u32) -> Trunk<T>
where
    T: Default + 'static,
{
    alloc(count, Trace::new(file, line), Kind::Array)
}

/// `delete trunk`, at `file:line`
pub fn delete_single<T>(trunk: &Trunk<T>, file: &'static str, line: u32) {
    trunk.free(Trace::new(file, line), Kind::Single)
}

/// `delete[] trunk`, at `file:line`
pub fn delete_array<T>(trunk: &Trunk<T>, file: &'static str, line: u32) {
    trunk.free(Trace::new(file, line), Kind::Array)
}

/// Every allocation made on this thread, in allocation order.
pub fn snapshot() -> Vec<AllocRecord> {
    with_allocator(|allocator| allocator.snapshot())
}

/// Print one line per allocation to stdout: address, refcount and size.
pub fn overview() {
    let records = snapshot();
    let mut out = io::stdout().lock();
    for record in records {
        // Same policy as the diagnostics, stdout going away is not our problem
        let _ = writeln!(out, "{record}");
    }
}

/// [`snapshot()`] as a JSON array.
pub fn overview_json() -> serde_json::Result<String> {
    serde_json::to_string(&snapshot())
}

/// Allocations that have not been freed (yet).
pub fn leaks() -> Vec<AllocRecord> {
    snapshot()
        .into_iter()
        .filter(AllocRecord::is_live)
        .collect()
}

/// How many live allocations each allocation site is responsible for.
pub fn live_by_site() -> HashMap<Trace, usize> {
    let mut sites = HashMap::new();
    for record in leaks() {
        *sites.entry(record.allocated_at).or_insert(0) += 1;
    }
    sites
}

/// Empty the pool in allocation order. The first allocation that was never
/// freed is released and reported as a leak, which terminates the process
/// with exit code 11.
///
/// This is the end-of-program check: an allocation counts as leaked here
/// even if some handle to it is still alive (or was forgotten), since
/// nothing will free it after this point. Call it only once every handle
/// that is going to be freed has been.
pub fn teardown() {
    let pool = with_allocator(|allocator| mem::take(&mut allocator.pool));
    log::info!("tearing down {} allocations", pool.len());
    for block in pool {
        if let Some(violation) = block.reap() {
            violation.terminate()
        }
    }
}

/// Start a session: the returned guard runs [`teardown()`] when dropped.
/// Create it before anything else in `main()` so it is dropped last.
pub fn session() -> Session {
    let live = with_allocator(|allocator| allocator.len());
    log::info!("memdebug session started ({live} allocations already known)");
    Session {
        _thread_bound: PhantomData,
    }
}

#[must_use = "the session tears down the allocator when it is dropped"]
pub struct Session {
    _thread_bound: PhantomData<Rc<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            teardown();
        }
    }
}
