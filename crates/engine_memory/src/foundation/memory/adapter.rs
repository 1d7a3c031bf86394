//! Allocator handles for standard containers
//!
//! [`ArenaAlloc`] and [`StackAlloc`] implement [`allocator_api2`]'s
//! `Allocator` trait, so `allocator_api2::vec::Vec` and friends can draw
//! their storage from an arena or a stack instead of the global heap.
//!
//! Both are `Copy` handles borrowing the allocator; two handles are equal iff
//! they refer to the same region. Allocators are untyped, so moving a
//! container to another element type keeps the same handle and region.

use std::fmt;
use std::ptr::{self, NonNull};

use allocator_api2::alloc::{AllocError, Allocator, Layout};

use super::arena::Arena;
use super::stack::StackAllocator;

/// `Vec` whose storage lives in an [`Arena`]
pub type ArenaVec<'a, T> = allocator_api2::vec::Vec<T, ArenaAlloc<'a>>;

/// `Vec` whose storage lives on a [`StackAllocator`]
pub type StackVec<'a, T> = allocator_api2::vec::Vec<T, StackAlloc<'a>>;

/// Container allocator backed by an [`Arena`].
///
/// `deallocate` is a no-op; memory comes back when the arena is cleared or
/// reset. The most recent allocation can grow and shrink in place.
#[derive(Clone, Copy)]
pub struct ArenaAlloc<'a> {
    arena: &'a Arena,
}

impl<'a> ArenaAlloc<'a> {
    /// Handle on `arena`
    pub const fn new(arena: &'a Arena) -> Self {
        Self { arena }
    }

    /// The arena behind this handle
    pub const fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// Move `value` into the arena.
    ///
    /// The value is never dropped; its memory is reclaimed with the arena.
    pub fn alloc_value<T>(self, value: T) -> Result<&'a mut T, AllocError> {
        let ptr = self.allocate(Layout::new::<T>())?.cast::<T>();
        // SAFETY: fresh, aligned and exclusively owned for `'a`.
        unsafe {
            construct(ptr, value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.arena.region().offset_of(ptr.as_ptr())
    }
}

unsafe impl Allocator for ArenaAlloc<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let offset = self.arena.bump(layout.size(), layout.align()).map_err(|e| {
            log::warn!("Arena allocator refused {:?}: {}", layout, e);
            AllocError
        })?;
        let ptr = self.arena.region().ptr_at(offset);
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        if ptr.as_ptr() as usize % new_layout.align() == 0 {
            if let Some(offset) = self.offset_of(ptr) {
                let end = offset + old_layout.size();
                let grown = offset
                    .checked_add(new_layout.size())
                    .is_some_and(|new_end| self.arena.extend_top(end, new_end));
                if grown {
                    return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
                }
            }
        }

        let new_ptr = self.allocate(new_layout)?;
        // SAFETY: the caller guarantees `ptr` is valid for `old_layout.size()`
        // bytes; the new block is fresh and at least as large.
        unsafe {
            ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), old_layout.size());
        }
        Ok(new_ptr)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        if ptr.as_ptr() as usize % new_layout.align() != 0 {
            let new_ptr = self.allocate(new_layout)?;
            // SAFETY: the new block is fresh and holds `new_layout.size()` bytes.
            unsafe {
                ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), new_layout.size());
            }
            return Ok(new_ptr);
        }

        if let Some(offset) = self.offset_of(ptr) {
            let end = offset + old_layout.size();
            if self.arena.used() == end {
                self.arena.region().set_cursor(offset + new_layout.size());
            }
        }
        Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()))
    }
}

impl PartialEq for ArenaAlloc<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.arena.region_id() == other.arena.region_id()
    }
}

impl Eq for ArenaAlloc<'_> {}

impl fmt::Debug for ArenaAlloc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ArenaAlloc").field(&self.arena.region_id()).finish()
    }
}

/// Container allocator backed by a [`StackAllocator`].
///
/// `deallocate` pops the block, alignment padding included, only if it is on
/// top of the stack. Containers must be dropped in reverse order of creation;
/// an out-of-order release is logged and its bytes stay in use until the
/// stack is rewound past them.
#[derive(Clone, Copy)]
pub struct StackAlloc<'a> {
    stack: &'a StackAllocator,
}

impl<'a> StackAlloc<'a> {
    /// Handle on `stack`
    pub const fn new(stack: &'a StackAllocator) -> Self {
        Self { stack }
    }

    /// The stack behind this handle
    pub const fn stack(&self) -> &'a StackAllocator {
        self.stack
    }

    fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.stack.region().offset_of(ptr.as_ptr())
    }
}

unsafe impl Allocator for StackAlloc<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let bump = self
            .stack
            .region()
            .bump(layout.size(), layout.align())
            .map_err(|e| {
                log::warn!("Stack allocator refused {:?}: {}", layout, e);
                AllocError
            })?;
        self.stack.track_container(&bump);
        let ptr = self.stack.region().ptr_at(bump.offset);
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let Some(offset) = self.offset_of(ptr) else {
            log::error!("Stack allocator asked to free a pointer it does not own");
            return;
        };
        if !self.stack.release_container(offset, offset + layout.size()) {
            log::warn!(
                "Stack block at offset {} freed out of LIFO order (cursor at {}); bytes stay in use",
                offset,
                self.stack.used()
            );
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        if ptr.as_ptr() as usize % new_layout.align() == 0 {
            if let Some(offset) = self.offset_of(ptr) {
                let end = offset + old_layout.size();
                let grown = offset
                    .checked_add(new_layout.size())
                    .is_some_and(|new_end| self.stack.region().extend_top(end, new_end));
                if grown {
                    return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
                }
            }
        }

        let new_ptr = self.allocate(new_layout)?;
        // SAFETY: as for `ArenaAlloc::grow`.
        unsafe {
            ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.cast::<u8>().as_ptr(), old_layout.size());
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }
}

impl PartialEq for StackAlloc<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.stack.region_id() == other.stack.region_id()
    }
}

impl Eq for StackAlloc<'_> {}

impl fmt::Debug for StackAlloc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StackAlloc").field(&self.stack.region_id()).finish()
    }
}

/// Write `value` into uninitialized storage.
///
/// # Safety
///
/// `ptr` must be valid for writes and aligned for `T`. Any previous value at
/// `ptr` is overwritten without being dropped.
pub unsafe fn construct<T>(ptr: NonNull<T>, value: T) {
    // SAFETY: upheld by the caller.
    unsafe { ptr.as_ptr().write(value) }
}

/// Drop the value at `ptr` in place without releasing its storage.
///
/// # Safety
///
/// `ptr` must point to a live, initialized `T` that is not used afterwards.
pub unsafe fn destroy<T>(ptr: NonNull<T>) {
    // SAFETY: upheld by the caller.
    unsafe { ptr::drop_in_place(ptr.as_ptr()) }
}

impl Arena {
    /// Container allocator handle for this arena
    pub const fn allocator(&self) -> ArenaAlloc<'_> {
        ArenaAlloc::new(self)
    }

    /// Empty vector backed by this arena
    pub fn new_vec<T>(&self) -> ArenaVec<'_, T> {
        ArenaVec::new_in(self.allocator())
    }
}

impl StackAllocator {
    /// Container allocator handle for this stack
    pub const fn allocator(&self) -> StackAlloc<'_> {
        StackAlloc::new(self)
    }
}
