//! Borrowed-or-owned array view

use std::fmt;
use std::mem;
use std::ops::Deref;

use allocator_api2::alloc::{Allocator, Global};

use super::dyn_array::DynArray;

/// Array that either borrows someone else's buffer or owns its own.
///
/// Borrowed variants never free anything. The owned variant frees its buffer
/// exactly once, when it is dropped. [`ArrayRef::take`] moves the contents
/// out and leaves an empty borrow behind.
pub enum ArrayRef<'a, T, A: Allocator = Global> {
    /// Read-only borrow
    Borrowed(&'a [T]),
    /// Mutable borrow
    BorrowedMut(&'a mut [T]),
    /// Owned buffer
    Owned(DynArray<T, A>),
}

impl<'a, T, A: Allocator> ArrayRef<'a, T, A> {
    /// Whether this view owns its buffer
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Elements as a slice
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Borrowed(items) => items,
            Self::BorrowedMut(items) => items,
            Self::Owned(array) => array.as_slice(),
        }
    }

    /// Elements as a mutable slice, unless this is a read-only borrow
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match self {
            Self::Borrowed(_) => None,
            Self::BorrowedMut(items) => Some(&mut **items),
            Self::Owned(array) => Some(array.as_mut_slice()),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Pointer to the first element
    pub fn data(&self) -> *const T {
        self.as_slice().as_ptr()
    }

    /// Move the contents out, leaving an empty borrow.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::Borrowed(Default::default()))
    }

    /// Owned copy of the elements in `alloc`.
    pub fn to_owned_in<B: Allocator>(&self, alloc: B) -> DynArray<T, B>
    where
        T: Clone,
    {
        DynArray::from_slice_in(self.as_slice(), alloc)
    }
}

impl<T, A: Allocator> Default for ArrayRef<'_, T, A> {
    fn default() -> Self {
        Self::Borrowed(Default::default())
    }
}

impl<T, A: Allocator> Deref for ArrayRef<'_, T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T, A: Allocator> From<&'a [T]> for ArrayRef<'a, T, A> {
    fn from(items: &'a [T]) -> Self {
        Self::Borrowed(items)
    }
}

impl<'a, T, A: Allocator> From<&'a mut [T]> for ArrayRef<'a, T, A> {
    fn from(items: &'a mut [T]) -> Self {
        Self::BorrowedMut(items)
    }
}

impl<T, A: Allocator> From<DynArray<T, A>> for ArrayRef<'_, T, A> {
    fn from(array: DynArray<T, A>) -> Self {
        Self::Owned(array)
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for ArrayRef<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Borrowed(_) => "Borrowed",
            Self::BorrowedMut(_) => "BorrowedMut",
            Self::Owned(_) => "Owned",
        };
        f.debug_tuple(kind).field(&self.as_slice()).finish()
    }
}
