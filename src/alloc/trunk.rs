//! [`Trunk`] is a handle to one instrumented heap allocation.
//!
//! Any number of handles may point at the same allocation. They all share a
//! single [`TrunkState`]: the buffer, whether (and where) it was freed, the
//! number of live handles and the cursor used by the pointer-arithmetic
//! operations. Cloning a handle is the equivalent of copying a raw pointer;
//! dropping the last handle to an allocation that was never freed is a leak.
//!
//! ```no_run
//! use memdebug::{Kind, Trace, Trunk};
//!
//! let ary = Trunk::<i32>::array(16);
//! ary.set(3, 666);
//! assert_eq!(ary.get(3), 666);
//! assert_eq!((&ary + 3).get(), 666);
//! ary.free(Trace::new(file!(), line!()), Kind::Array);
//! ```

use std::{
    cell::RefCell,
    fmt,
    ops::{Add, Sub},
    ptr,
    rc::Rc,
};

use serde::Serialize;

use crate::{
    alloc::{
        cursor::Cursor,
        diagnostic::Violation,
        registry::{self, AllocRecord, Block},
    },
    trace::Trace,
};

pub(crate) type Shared<T> = Rc<RefCell<TrunkState<T>>>;

/// How an allocation was requested, which decides how it must be freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Kind {
    Single,
    Array,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Single => write!(f, "single"),
            Kind::Array => write!(f, "array"),
        }
    }
}

/// The state behind every handle of one allocation.
pub struct TrunkState<T> {
    kind: Kind,
    count: usize,
    /// `None` once the allocation has been released
    buffer: Option<Box<[T]>>,
    allocated_at: Trace,
    freed_at: Trace,
    handles: usize,
    /// Not bounds-checked until something is read through it. Wide enough
    /// that no `isize` offset or `usize` index wraps around.
    cursor: i128,
}

impl<T> TrunkState<T>
where
    T: Default,
{
    /// # Panics
    ///
    /// - If `count` is zero
    /// - If `kind` is [`Kind::Single`] and `count` is not 1
    pub(crate) fn new(allocated_at: Trace, count: usize, kind: Kind) -> Self {
        assert!(count >= 1, "cannot allocate zero elements");
        if kind == Kind::Single {
            assert_eq!(count, 1, "a single allocation holds exactly one element");
        }
        Self {
            kind,
            count,
            buffer: Some((0..count).map(|_| T::default()).collect()),
            allocated_at,
            freed_at: Trace::default(),
            handles: 1,
            cursor: 0,
        }
    }
}

impl<T> TrunkState<T> {
    pub(crate) fn is_deleted(&self) -> bool {
        self.buffer.is_none()
    }

    fn out_of_bounds(&self, index: i128) -> Violation {
        Violation::OutOfBounds {
            index,
            size: self.count,
            allocated_at: self.allocated_at,
        }
    }

    fn use_after_free(&self) -> Violation {
        Violation::UseAfterFree {
            freed_at: self.freed_at,
        }
    }

    pub(crate) fn element(&self, index: i128) -> Result<&T, Violation> {
        let Some(buffer) = self.buffer.as_deref() else {
            return Err(self.use_after_free());
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| buffer.get(i))
            .ok_or_else(|| self.out_of_bounds(index))
    }

    pub(crate) fn element_mut(&mut self, index: i128) -> Result<&mut T, Violation> {
        let use_after_free = self.use_after_free();
        let out_of_bounds = self.out_of_bounds(index);
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return Err(use_after_free);
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| buffer.get_mut(i))
            .ok_or(out_of_bounds)
    }

    fn check_free(&self, trace: Trace, kind: Kind) -> Result<(), Violation> {
        match (self.kind, kind) {
            (Kind::Single, Kind::Array) => Err(Violation::SingleFreedAsArray {
                allocated_at: self.allocated_at,
                freed_at: trace,
            }),
            (Kind::Array, Kind::Single) => Err(Violation::ArrayFreedAsSingle {
                allocated_at: self.allocated_at,
                freed_at: trace,
            }),
            _ if self.is_deleted() => Err(Violation::DoubleFree {
                first: self.freed_at,
                second: trace,
            }),
            _ => Ok(()),
        }
    }

    /// Drop the buffer. The allocation stays deleted from here on.
    pub(crate) fn release(&mut self) {
        self.buffer = None;
    }

    fn address(&self) -> *const () {
        self.buffer
            .as_deref()
            .map_or(ptr::null(), |buffer| buffer.as_ptr() as *const ())
    }
}

/// Release the buffer if the violation calls for it, then die.
pub(crate) fn fail<T>(shared: &RefCell<TrunkState<T>>, violation: Violation) -> ! {
    if violation.releases_buffer() {
        shared.borrow_mut().release();
    }
    violation.terminate()
}

pub(crate) fn get_at<T>(shared: &Shared<T>, index: i128) -> T
where
    T: Clone,
{
    let result = shared.borrow().element(index).cloned();
    result.unwrap_or_else(|violation| fail(shared, violation))
}

pub(crate) fn set_at<T>(shared: &Shared<T>, index: i128, value: T) {
    let result = shared
        .borrow_mut()
        .element_mut(index)
        .map(|slot| *slot = value);
    if let Err(violation) = result {
        fail(shared, violation)
    }
}

/// A handle to an instrumented allocation of one or more `T`s.
pub struct Trunk<T> {
    shared: Shared<T>,
}

impl<T> Trunk<T>
where
    T: Default + 'static,
{
    /// Allocate one `T`, recording the caller as the allocation site.
    #[track_caller]
    pub fn single() -> Self {
        registry::alloc(1, Trace::caller(), Kind::Single)
    }

    /// Allocate `count` `T`s, recording the caller as the allocation site.
    ///
    /// # Panics
    ///
    /// - If `count` is zero
    #[track_caller]
    pub fn array(count: usize) -> Self {
        registry::alloc(count, Trace::caller(), Kind::Array)
    }
}

impl<T> Trunk<T> {
    /// Wrap freshly created state. The state already counts this handle.
    pub(crate) fn adopt(shared: Shared<T>) -> Self {
        Self { shared }
    }

    /// Read element `index`.
    ///
    /// Terminates the process on use-after-free (14) or if `index` is out of
    /// bounds (13).
    pub fn get(&self, index: usize) -> T
    where
        T: Clone,
    {
        get_at(&self.shared, as_offset(index))
    }

    /// Overwrite element `index`. Fails the same way as [`Trunk::get()`].
    pub fn set(&self, index: usize, value: T) {
        set_at(&self.shared, as_offset(index), value)
    }

    /// Mutate element `index` in place. `f` must not touch this allocation
    /// through any other handle.
    pub fn update<R, F>(&self, index: usize, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let result = self.shared.borrow_mut().element_mut(as_offset(index)).map(f);
        result.unwrap_or_else(|violation| fail(&self.shared, violation))
    }

    pub fn try_get(&self, index: usize) -> Result<T, Violation>
    where
        T: Clone,
    {
        self.shared.borrow().element(as_offset(index)).cloned()
    }

    pub fn try_set(&self, index: usize, value: T) -> Result<(), Violation> {
        self.shared
            .borrow_mut()
            .element_mut(as_offset(index))
            .map(|slot| *slot = value)
    }

    /// `*ptr`: the first element, whatever the kind of allocation.
    pub fn read(&self) -> T
    where
        T: Clone,
    {
        get_at(&self.shared, 0)
    }

    /// `*ptr = value`
    pub fn write(&self, value: T) {
        set_at(&self.shared, 0, value)
    }

    pub fn try_read(&self) -> Result<T, Violation>
    where
        T: Clone,
    {
        self.shared.borrow().element(0).cloned()
    }

    /// Free the allocation, as freed by `kind` at `trace`. The handle stays
    /// valid (and counted), but anything read through it afterwards is a
    /// use-after-free.
    ///
    /// Terminates on a kind mismatch (21 or 22) or a double free (12).
    pub fn free(&self, trace: Trace, kind: Kind) {
        if let Err(violation) = self.try_free(trace, kind) {
            fail(&self.shared, violation)
        }
    }

    /// [`Trunk::free()`], but reports the violation instead of dying. Nothing
    /// changes if this returns an error.
    pub fn try_free(&self, trace: Trace, kind: Kind) -> Result<(), Violation> {
        let mut state = self.shared.borrow_mut();
        state.check_free(trace, kind)?;
        state.release();
        state.freed_at = trace;
        log::debug!(
            "freed {} allocation from {} at {trace}",
            state.kind,
            state.allocated_at
        );
        Ok(())
    }

    /// Free a single allocation, recording the caller as the free site.
    #[track_caller]
    pub fn delete_single(&self) {
        self.free(Trace::caller(), Kind::Single)
    }

    /// Free an array allocation, recording the caller as the free site.
    #[track_caller]
    pub fn delete_array(&self) {
        self.free(Trace::caller(), Kind::Array)
    }

    /// Point this handle at `that`'s allocation. Giving up the old allocation
    /// may report it as leaked.
    pub fn assign(&mut self, that: &Trunk<T>) {
        if self.ptr_eq(that) {
            return;
        }
        *self = that.clone();
    }

    /// Do both handles point at the same allocation?
    pub fn ptr_eq(&self, that: &Trunk<T>) -> bool {
        Rc::ptr_eq(&self.shared, &that.shared)
    }

    /// The shared cursor position.
    pub fn position(&self) -> i128 {
        self.shared.borrow().cursor
    }

    /// A cursor at the shared position.
    pub fn cursor(&self) -> Cursor<T> {
        self.offset(0)
    }

    /// `ptr + n`, relative to the shared cursor. Not bounds-checked until it
    /// is read from.
    pub fn offset(&self, n: isize) -> Cursor<T> {
        self.cursor_at(self.position().saturating_add(n as i128))
    }

    fn cursor_at(&self, index: i128) -> Cursor<T> {
        Cursor::new(Rc::clone(&self.shared), index)
    }

    fn move_cursor(&self, by: i128) {
        let mut state = self.shared.borrow_mut();
        state.cursor = state.cursor.saturating_add(by);
        log::trace!(
            "cursor of allocation from {} moved to {}",
            state.allocated_at,
            state.cursor
        );
    }

    /// Step the shared cursor forward. Every alias sees the move.
    pub fn advance(&self) {
        self.move_cursor(1)
    }

    /// Step the shared cursor back. Every alias sees the move.
    pub fn retreat(&self) {
        self.move_cursor(-1)
    }

    /// `++ptr`: the cursor after the move
    pub fn pre_increment(&self) -> Cursor<T> {
        self.advance();
        self.cursor()
    }

    /// `ptr++`: the cursor before the move
    pub fn post_increment(&self) -> Cursor<T> {
        let before = self.cursor();
        self.advance();
        before
    }

    /// `--ptr`: the cursor after the move
    pub fn pre_decrement(&self) -> Cursor<T> {
        self.retreat();
        self.cursor()
    }

    /// `ptr--`: the cursor before the move
    pub fn post_decrement(&self) -> Cursor<T> {
        let before = self.cursor();
        self.retreat();
        before
    }

    /// Address of the buffer, null once it is released
    pub fn data(&self) -> *const () {
        self.shared.borrow().address()
    }

    pub fn size(&self) -> usize {
        self.shared.borrow().count
    }

    /// Number of live handles to this allocation
    pub fn refcount(&self) -> usize {
        self.shared.borrow().handles
    }

    pub fn kind(&self) -> Kind {
        self.shared.borrow().kind
    }

    pub fn allocated_at(&self) -> Trace {
        self.shared.borrow().allocated_at
    }

    /// Where this allocation was freed, if it was
    pub fn freed_at(&self) -> Option<Trace> {
        let state = self.shared.borrow();
        state.is_deleted().then_some(state.freed_at)
    }

    pub fn is_deleted(&self) -> bool {
        self.shared.borrow().is_deleted()
    }
}

fn as_offset(index: usize) -> i128 {
    index as i128
}

impl<T> Clone for Trunk<T> {
    fn clone(&self) -> Self {
        self.shared.borrow_mut().handles += 1;
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Trunk<T> {
    fn drop(&mut self) {
        let leaked = {
            let mut state = self.shared.borrow_mut();
            state.handles -= 1;
            (state.handles == 0 && !state.is_deleted()).then(|| Violation::Leak {
                allocated_at: state.allocated_at,
            })
        };
        // A panic is already on its way out, don't turn it into an exit code
        if std::thread::panicking() {
            return;
        }
        if let Some(violation) = leaked {
            fail(&self.shared, violation)
        }
    }
}

impl<T> fmt::Debug for Trunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.borrow();
        f.debug_struct("Trunk")
            .field("kind", &state.kind)
            .field("size", &state.count)
            .field("allocated_at", &state.allocated_at)
            .field("deleted", &state.is_deleted())
            .field("refcount", &state.handles)
            .field("cursor", &state.cursor)
            .finish()
    }
}

impl<T> Add<isize> for &Trunk<T> {
    type Output = Cursor<T>;

    fn add(self, n: isize) -> Cursor<T> {
        self.offset(n)
    }
}

impl<T> Sub<isize> for &Trunk<T> {
    type Output = Cursor<T>;

    fn sub(self, n: isize) -> Cursor<T> {
        self.cursor_at(self.position().saturating_sub(n as i128))
    }
}

impl<T> Block for RefCell<TrunkState<T>> {
    fn record(&self) -> AllocRecord {
        let state = self.borrow();
        AllocRecord {
            address: state.address(),
            refcount: state.handles,
            size: state.count,
            kind: state.kind,
            type_name: tynm::type_name::<T>(),
            allocated_at: state.allocated_at,
            freed_at: state.is_deleted().then_some(state.freed_at),
        }
    }

    fn reap(&self) -> Option<Violation> {
        let mut state = self.borrow_mut();
        if state.is_deleted() {
            return None;
        }
        state.release();
        Some(Violation::Leak {
            allocated_at: state.allocated_at,
        })
    }
}
