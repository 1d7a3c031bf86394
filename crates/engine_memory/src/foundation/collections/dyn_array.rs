//! Owning contiguous array

use std::fmt;
use std::ops::{Deref, DerefMut};

use allocator_api2::alloc::{Allocator, Global};
use allocator_api2::collections::TryReserveError;
use allocator_api2::vec::Vec;

/// Growable array that exclusively owns its buffer.
///
/// The buffer comes from `A`, the global heap by default or an arena through
/// [`ArenaAlloc`](crate::foundation::memory::ArenaAlloc). Cloning makes a
/// deep copy in the same allocator; moving transfers the buffer.
///
/// Running out of arena memory while growing aborts, the same way a failed
/// heap allocation does. Use [`DynArray::try_reserve`] to check first.
#[derive(Clone)]
pub struct DynArray<T, A: Allocator = Global> {
    items: Vec<T, A>,
}

impl<T> DynArray<T> {
    /// Empty heap-backed array
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Heap-backed array of `len` default values
    pub fn with_len(len: usize) -> Self
    where
        T: Default,
    {
        Self::with_len_in(len, Global)
    }
}

impl<T, A: Allocator> DynArray<T, A> {
    /// Empty array in `alloc`
    pub fn new_in(alloc: A) -> Self {
        Self { items: Vec::new_in(alloc) }
    }

    /// Array of `len` default values in `alloc`
    pub fn with_len_in(len: usize, alloc: A) -> Self
    where
        T: Default,
    {
        let mut items = Vec::with_capacity_in(len, alloc);
        items.resize_with(len, T::default);
        Self { items }
    }

    /// Array holding a copy of `src` in `alloc`
    pub fn from_slice_in(src: &[T], alloc: A) -> Self
    where
        T: Clone,
    {
        let mut items = Vec::with_capacity_in(src.len(), alloc);
        items.extend_from_slice(src);
        Self { items }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the array is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Elements the array can hold without reallocating
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Resize to `len`, filling new slots with `value`.
    pub fn resize(&mut self, len: usize, value: T)
    where
        T: Clone,
    {
        self.items.resize(len, value);
    }

    /// Reserve room for `additional` more elements, reporting failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.items.try_reserve(additional)
    }

    /// Append one element
    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    /// Remove and return the last element
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Drop all elements, keeping the buffer
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Elements as a slice
    pub fn as_slice(&self) -> &[T] {
        self.items.as_slice()
    }

    /// Elements as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.items.as_mut_slice()
    }

    /// Pointer to the first element, for C APIs taking `(count, data)`
    pub fn data(&self) -> *const T {
        self.items.as_ptr()
    }

    /// Mutable pointer to the first element
    pub fn data_mut(&mut self) -> *mut T {
        self.items.as_mut_ptr()
    }

    /// Allocator backing the buffer
    pub fn allocator(&self) -> &A {
        self.items.allocator()
    }
}

impl<T> Default for DynArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> Deref for DynArray<T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> DerefMut for DynArray<T, A> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s DynArray<T, A> {
    type Item = &'s T;
    type IntoIter = std::slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s mut DynArray<T, A> {
    type Item = &'s mut T;
    type IntoIter = std::slice::IterMut<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, A: Allocator> Extend<T> for DynArray<T, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T> FromIterator<T> for DynArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        array.extend(iter);
        array
    }
}

impl<T: PartialEq, A: Allocator> PartialEq for DynArray<T, A> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: Allocator> Eq for DynArray<T, A> {}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for DynArray<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
