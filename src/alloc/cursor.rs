use std::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
    rc::Rc,
};

use crate::alloc::{
    diagnostic::Violation,
    trunk::{get_at, set_at, Shared},
};

/// `ptr + n`: a position inside some allocation.
///
/// A cursor is not a handle. It does not count towards the allocation's
/// refcount and cannot free anything; it only reads and writes through the
/// same checks as [`crate::Trunk`]. Its position is its own, moving it does
/// not move the cursor shared by the handles.
pub struct Cursor<T> {
    shared: Shared<T>,
    index: i128,
}

impl<T> Cursor<T> {
    pub(crate) fn new(shared: Shared<T>, index: i128) -> Self {
        Self { shared, index }
    }

    pub fn index(&self) -> i128 {
        self.index
    }

    /// `*cursor`
    ///
    /// Terminates on use-after-free (14) or when out of bounds (13).
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        get_at(&self.shared, self.index)
    }

    /// `*cursor = value`
    pub fn set(&self, value: T) {
        set_at(&self.shared, self.index, value)
    }

    pub fn try_get(&self) -> Result<T, Violation>
    where
        T: Clone,
    {
        self.shared.borrow().element(self.index).cloned()
    }

    pub fn try_set(&self, value: T) -> Result<(), Violation> {
        self.shared
            .borrow_mut()
            .element_mut(self.index)
            .map(|slot| *slot = value)
    }

    pub fn offset(&self, n: isize) -> Self {
        Self::new(Rc::clone(&self.shared), self.index.saturating_add(n as i128))
    }

    pub fn advance(&mut self) {
        *self += 1;
    }

    pub fn retreat(&mut self) {
        *self -= 1;
    }
}

impl<T> Clone for Cursor<T> {
    fn clone(&self) -> Self {
        self.offset(0)
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<T> Add<isize> for Cursor<T> {
    type Output = Self;

    fn add(mut self, n: isize) -> Self {
        self += n;
        self
    }
}

impl<T> Sub<isize> for Cursor<T> {
    type Output = Self;

    fn sub(mut self, n: isize) -> Self {
        self -= n;
        self
    }
}

impl<T> AddAssign<isize> for Cursor<T> {
    fn add_assign(&mut self, n: isize) {
        self.index = self.index.saturating_add(n as i128);
    }
}

impl<T> SubAssign<isize> for Cursor<T> {
    fn sub_assign(&mut self, n: isize) {
        self.index = self.index.saturating_sub(n as i128);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Kind, Trace, Trunk, Violation};

    #[test]
    pub fn walks_the_buffer() {
        let h = Trunk::<u32>::array(5);
        let mut cursor = h.cursor();
        for i in 0..5 {
            cursor.set(i * i);
            cursor.advance();
        }
        assert_eq!(cursor.index(), 5);
        assert!(cursor.try_get().is_err());
        cursor.retreat();
        assert_eq!(cursor.get(), 16);
        assert_eq!((cursor - 2).get(), 4);
        // Moving a cursor leaves the shared one alone
        assert_eq!(h.position(), 0);
        h.delete_array();
    }

    #[test]
    pub fn arithmetic_matches_offset() {
        let h = Trunk::<u8>::array(3);
        let mut c = &h + 1;
        c += 1;
        assert_eq!(c.index(), 2);
        c -= 2;
        assert_eq!(c.index(), 0);
        assert_eq!((c.clone() + 2).index(), c.offset(2).index());
        h.delete_array();
    }

    #[test]
    pub fn negative_positions_are_out_of_bounds() {
        let h = Trunk::<u8>::array(3);
        let before = &h - 1;
        assert_eq!(
            before.try_get(),
            Err(Violation::OutOfBounds {
                index: -1,
                size: 3,
                allocated_at: h.allocated_at(),
            })
        );
        assert!(before.try_set(1).is_err());
        h.delete_array();
    }

    #[test]
    pub fn extreme_offsets_stay_out_of_bounds() {
        let h = Trunk::<i32>::array(4);
        h.advance();
        let far = h.offset(isize::MAX);
        assert_eq!(far.index(), isize::MAX as i128 + 1);
        assert_eq!(
            far.try_get(),
            Err(Violation::OutOfBounds {
                index: isize::MAX as i128 + 1,
                size: 4,
                allocated_at: h.allocated_at(),
            })
        );

        let mut before = &h - isize::MIN;
        assert!(before.try_get().is_err());
        before -= isize::MAX;
        before += isize::MIN;
        assert_eq!(before.index(), 2 + isize::MIN as i128);
        assert!(before.try_set(0).is_err());
        h.delete_array();
    }

    #[test]
    pub fn sees_frees_through_any_handle() {
        let h = Trunk::<u8>::array(3);
        let cursor = &h + 1;
        h.free(Trace::new("cursor.rs", 7), Kind::Array);
        assert_eq!(
            cursor.try_get(),
            Err(Violation::UseAfterFree {
                freed_at: Trace::new("cursor.rs", 7)
            })
        );
    }
}
