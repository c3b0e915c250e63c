//! Critical section protected cell
//!
//! Wraps data that may only be touched with the kernel critical section held.
//! Borrows are checked, so a nested borrow of the same cell is caught instead
//! of aliasing.

use core::cell::{RefCell, RefMut};

use crate::critical::CriticalSection;

/// A cell that can only be accessed within a critical section.
pub struct CsCell<T>(critical_section::Mutex<RefCell<T>>);

impl<T> CsCell<T> {
    /// Create a new CsCell
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(critical_section::Mutex::new(RefCell::new(value)))
    }

    /// Borrow the inner value for as long as the guard lives
    #[inline(always)]
    pub fn get<'cs>(&'cs self, cs: &'cs CriticalSection) -> RefMut<'cs, T> {
        self.0.borrow_ref_mut(cs.token())
    }

    /// Run `f` on the inner value inside a fresh critical section
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let cs = CriticalSection::enter();
        let mut inner = self.get(&cs);
        let ret = f(&mut inner);
        drop(inner);
        ret
    }
}

impl<T: Default> Default for CsCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_mutates_in_place() {
        let cell = CsCell::new(1u32);
        cell.with(|v| *v += 41);
        assert_eq!(cell.with(|v| *v), 42);
    }

    #[test]
    fn distinct_cells_nest() {
        let a = CsCell::new(1u8);
        let b = CsCell::new(2u8);
        let sum = a.with(|x| b.with(|y| *x + *y));
        assert_eq!(sum, 3);
    }
}
