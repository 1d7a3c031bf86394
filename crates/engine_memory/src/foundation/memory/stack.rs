//! LIFO stack allocator
//!
//! Same bump mechanics as [`Arena`](super::Arena), but memory is handed back
//! in reverse order of allocation instead of all at once. There are three ways
//! to release:
//!
//! - drop a [`ScopedAlloc`] handle, which rewinds to where it started;
//! - [`StackAllocator::free_bytes`] with the receipts of the most recent
//!   allocations;
//! - [`StackAllocator::free_to_marker`] with a previously taken marker.
//!
//! Scoped handles are the preferred form. They are move-only; only the single
//! live handle for an allocation can release it.
//!
//! # LIFO violations
//!
//! Releasing a scoped handle that is not on top of the stack is a programming
//! error. Debug builds panic. Release builds leave the cursor where it is, so
//! the bytes come back when the allocation below is released or the stack is
//! cleared; nothing that is still live is ever handed out twice.
//!
//! Debug builds also record the start of every live allocation and reject a
//! [`StackAllocator::free_bytes`] or [`StackAllocator::free_to_marker`] that
//! would land in the middle of one. Markers carry the stack's generation, so a
//! marker taken before [`StackAllocator::clear`] is rejected in every build.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bytemuck::Pod;
use thiserror::Error;

use super::region::{Bump, Region, RegionError, RegionId};

/// Stack allocator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// Region creation or exhaustion
    #[error(transparent)]
    Region(#[from] RegionError),

    /// The marker was taken on a different allocator
    #[error("Marker belongs to {marker_region}, not {stack_region}")]
    ForeignMarker {
        /// Region the marker was taken on
        marker_region: RegionId,
        /// Region of the allocator it was used with
        stack_region: RegionId,
    },

    /// The marker was taken before the stack was last cleared
    #[error("Stale marker from generation {marker_generation} (stack is at generation {current})")]
    StaleMarker {
        /// Generation recorded in the marker
        marker_generation: u32,
        /// Current stack generation
        current: u32,
    },

    /// The marker points past the cursor
    #[error("Marker at offset {offset} is beyond the stack cursor {used}")]
    MarkerOutOfRange {
        /// Offset recorded in the marker
        offset: usize,
        /// Current cursor
        used: usize,
    },

    /// More bytes were freed than are allocated
    #[error("Cannot free {requested} bytes with only {used} bytes allocated")]
    RewindOutOfRange {
        /// Bytes the caller asked to free
        requested: usize,
        /// Current cursor
        used: usize,
    },

    /// The rewind would split a live allocation
    #[error("Freeing to offset {target} does not match an allocation boundary (cursor at {used})")]
    LifoViolation {
        /// Cursor position the rewind would produce
        target: usize,
        /// Current cursor
        used: usize,
    },
}

/// Opaque stack position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMarker {
    region: RegionId,
    generation: u32,
    offset: usize,
}

impl StackMarker {
    /// Offset of this position from the stack base
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// Receipt for a raw allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackAllocation {
    /// First byte of the allocation
    pub ptr: NonNull<u8>,
    /// Requested size
    pub len: usize,
    /// Bytes consumed, including alignment padding. Pass this to
    /// [`StackAllocator::free_bytes`].
    pub bytes: usize,
    /// Position before the allocation
    pub marker: StackMarker,
}

/// Span of one allocation: the cursor before padding and the first data byte.
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    data: usize,
}

impl From<&Bump> for Block {
    fn from(bump: &Bump) -> Self {
        Self {
            start: bump.start,
            data: bump.offset,
        }
    }
}

/// Fixed-capacity LIFO allocator.
pub struct StackAllocator {
    region: Region,
    generation: u32,
    // Container blocks only know their data offset on release.
    containers: RefCell<Vec<Block>>,
    #[cfg(debug_assertions)]
    live: RefCell<Vec<Block>>,
}

impl StackAllocator {
    /// Create a stack with `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self, StackError> {
        Ok(Self {
            region: Region::new(capacity)?,
            generation: 0,
            containers: RefCell::new(Vec::new()),
            #[cfg(debug_assertions)]
            live: RefCell::new(Vec::new()),
        })
    }

    /// Total capacity in bytes
    pub const fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Bytes currently allocated
    pub fn used(&self) -> usize {
        self.region.used()
    }

    /// Bytes still available
    pub fn remaining(&self) -> usize {
        self.region.remaining()
    }

    /// Number of times the stack has been cleared
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Identity of the backing region
    pub const fn region_id(&self) -> RegionId {
        self.region.id()
    }

    pub(crate) const fn region(&self) -> &Region {
        &self.region
    }

    /// Current position
    pub fn marker(&self) -> StackMarker {
        StackMarker {
            region: self.region_id(),
            generation: self.generation,
            offset: self.used(),
        }
    }

    /// Marker for a pointer previously returned by this allocator.
    ///
    /// The pointer must lie between the base and the cursor.
    pub fn marker_for(&self, ptr: *const u8) -> Result<StackMarker, StackError> {
        match self.region.offset_of(ptr) {
            Some(offset) if offset <= self.used() => Ok(StackMarker {
                region: self.region_id(),
                generation: self.generation,
                offset,
            }),
            Some(offset) => Err(StackError::MarkerOutOfRange {
                offset,
                used: self.used(),
            }),
            None => Err(StackError::MarkerOutOfRange {
                offset: usize::MAX,
                used: self.used(),
            }),
        }
    }

    /// Allocate `size` bytes aligned to `align` and return a receipt.
    ///
    /// Nothing is released automatically; pair with
    /// [`StackAllocator::free_bytes`] or [`StackAllocator::free_to_marker`].
    pub fn allocate_raw(&self, size: usize, align: usize) -> Result<StackAllocation, StackError> {
        let bump = self.region.bump(size, align)?;
        #[cfg(debug_assertions)]
        self.live.borrow_mut().push(Block::from(&bump));

        Ok(StackAllocation {
            ptr: self.region.ptr_at(bump.offset),
            len: size,
            bytes: bump.end - bump.start,
            marker: StackMarker {
                region: self.region_id(),
                generation: self.generation,
                offset: bump.start,
            },
        })
    }

    /// Allocate `size` bytes, released when the handle is dropped.
    pub fn allocate(&self, size: usize) -> Result<ScopedAlloc<'_>, StackError> {
        self.allocate_aligned(size, 1)
    }

    /// Allocate `size` bytes aligned to `align`, released when the handle is
    /// dropped.
    pub fn allocate_aligned(&self, size: usize, align: usize) -> Result<ScopedAlloc<'_>, StackError> {
        let raw = self.allocate_raw(size, align)?;
        Ok(ScopedAlloc::new(self, raw))
    }

    /// Allocate `amount` blocks of `size` bytes as one scoped allocation.
    pub fn allocate_n(&self, size: usize, amount: usize) -> Result<ScopedAlloc<'_>, StackError> {
        let total = size.checked_mul(amount).ok_or(RegionError::OutOfMemory {
            requested: usize::MAX,
            align: 1,
            remaining: self.remaining(),
            capacity: self.capacity(),
        })?;
        self.allocate(total)
    }

    /// Allocate an array of `len` elements, released when the handle is
    /// dropped. Contents are unspecified but valid for `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn allocate_array<T: Pod>(&self, len: usize) -> Result<ScopedAlloc<'_, T>, StackError> {
        assert!(mem::size_of::<T>() != 0, "zero-sized element types are not supported");
        let size = len.checked_mul(mem::size_of::<T>()).ok_or(RegionError::OutOfMemory {
            requested: usize::MAX,
            align: mem::align_of::<T>(),
            remaining: self.remaining(),
            capacity: self.capacity(),
        })?;
        let raw = self.allocate_raw(size, mem::align_of::<T>())?;
        Ok(ScopedAlloc::new(self, StackAllocation { len, ..raw }))
    }

    /// Rewind the cursor by `n` bytes.
    ///
    /// `n` must be the total receipt of the most recent allocation(s). Freeing
    /// more than is allocated is rejected; in debug builds a rewind that does
    /// not land on an allocation boundary is rejected too.
    pub fn free_bytes(&mut self, n: usize) -> Result<(), StackError> {
        let used = self.used();
        let target = used
            .checked_sub(n)
            .ok_or(StackError::RewindOutOfRange { requested: n, used })?;

        #[cfg(debug_assertions)]
        if target != used && !self.live.get_mut().iter().any(|block| block.start == target) {
            log::error!("LIFO violation: free_bytes({}) with cursor at {}", n, used);
            return Err(StackError::LifoViolation { target, used });
        }

        self.rewind(target);
        Ok(())
    }

    /// Rewind the cursor to `marker`.
    ///
    /// Markers from another allocator, from before the last clear, or beyond
    /// the cursor are rejected and leave the stack untouched. Debug builds
    /// also reject a marker that points into the middle of a live allocation.
    pub fn free_to_marker(&mut self, marker: StackMarker) -> Result<(), StackError> {
        if marker.region != self.region_id() {
            log::warn!("Rejected stack marker from {}", marker.region);
            return Err(StackError::ForeignMarker {
                marker_region: marker.region,
                stack_region: self.region_id(),
            });
        }
        if marker.generation != self.generation {
            log::warn!(
                "Rejected stack marker from generation {} (now {})",
                marker.generation,
                self.generation
            );
            return Err(StackError::StaleMarker {
                marker_generation: marker.generation,
                current: self.generation,
            });
        }
        if marker.offset > self.used() {
            log::warn!("Rejected stack marker at {} (cursor at {})", marker.offset, self.used());
            return Err(StackError::MarkerOutOfRange {
                offset: marker.offset,
                used: self.used(),
            });
        }

        #[cfg(debug_assertions)]
        if self.splits_live_block(marker.offset) {
            log::error!(
                "LIFO violation: marker at {} is inside a live allocation (cursor at {})",
                marker.offset,
                self.used()
            );
            return Err(StackError::LifoViolation {
                target: marker.offset,
                used: self.used(),
            });
        }

        self.rewind(marker.offset);
        Ok(())
    }

    /// Release everything. Markers taken before this call become stale.
    pub fn clear(&mut self) {
        self.rewind(0);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether `offset` falls strictly inside a live allocation, other than
    /// at its first data byte.
    #[cfg(debug_assertions)]
    fn splits_live_block(&self, offset: usize) -> bool {
        let live = self.live.borrow();
        let used = self.used();
        live.iter().enumerate().any(|(i, block)| {
            let end = live.get(i + 1).map_or(used, |next| next.start);
            block.start < offset && offset < end && offset != block.data
        })
    }

    /// Move the cursor to `offset` and forget every block at or above it.
    fn rewind(&self, offset: usize) {
        self.region.set_cursor(offset);
        self.containers.borrow_mut().retain(|block| block.start < offset);
        #[cfg(debug_assertions)]
        self.live.borrow_mut().retain(|block| block.start < offset);
    }

    /// Pop the span `[start, end)` if it is on top of the stack.
    ///
    /// Returns `false` and leaves the cursor alone otherwise.
    fn pop_if_top(&self, start: usize, end: usize) -> bool {
        if self.used() != end {
            return false;
        }
        self.rewind(start);
        true
    }

    /// Record a container block bumped through the region directly.
    pub(crate) fn track_container(&self, bump: &Bump) {
        self.containers.borrow_mut().push(Block::from(bump));
        #[cfg(debug_assertions)]
        self.live.borrow_mut().push(Block::from(bump));
    }

    /// Release the container block whose data spans `[data, end)`.
    ///
    /// The cursor goes back to where the block started, padding included.
    /// Returns `false` if the block is not on top of the stack.
    pub(crate) fn release_container(&self, data: usize, end: usize) -> bool {
        let start = self
            .containers
            .borrow()
            .iter()
            .rev()
            .find(|block| block.data == data)
            .map_or(data, |block| block.start);
        self.pop_if_top(start, end)
    }

    fn release_scoped(&self, start: usize, end: usize) {
        if self.pop_if_top(start, end) || start == end {
            return;
        }

        log::error!(
            "Stack allocation [{}, {}) released out of LIFO order (cursor at {})",
            start,
            end,
            self.used()
        );
        #[cfg(debug_assertions)]
        if !std::thread::panicking() {
            panic!("scoped stack allocation [{start}, {end}) released out of LIFO order");
        }
    }
}

impl PartialEq for StackAllocator {
    fn eq(&self, other: &Self) -> bool {
        self.region == other.region
    }
}

impl Eq for StackAllocator {}

impl fmt::Debug for StackAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackAllocator")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Scoped stack allocation that rewinds the stack when dropped.
///
/// Derefs to `[T]`. Handles cannot be cloned: there is exactly one owner of
/// each allocation's release.
pub struct ScopedAlloc<'a, T: Pod = u8> {
    stack: &'a StackAllocator,
    ptr: NonNull<T>,
    len: usize,
    start: usize,
    end: usize,
    _owns: PhantomData<&'a mut [T]>,
}

impl<'a, T: Pod> ScopedAlloc<'a, T> {
    fn new(stack: &'a StackAllocator, raw: StackAllocation) -> Self {
        let start = raw.marker.offset;
        Self {
            stack,
            ptr: raw.ptr.cast(),
            len: raw.len,
            start,
            end: start + raw.bytes,
            _owns: PhantomData,
        }
    }

    /// Bytes this handle gives back when dropped, including padding
    pub const fn bytes(&self) -> usize {
        self.end - self.start
    }

    /// Position of the stack before this allocation
    pub const fn marker(&self) -> StackMarker {
        StackMarker {
            region: self.stack.region_id(),
            generation: self.stack.generation,
            offset: self.start,
        }
    }

    /// Raw pointer to the first element
    pub const fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T: Pod> Deref for ScopedAlloc<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: the span is exclusively owned by this handle until drop, the
        // region's bytes are always initialized, and `T` accepts any bit pattern.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Pod> DerefMut for ScopedAlloc<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as for `deref`, and `&mut self` guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Pod> Drop for ScopedAlloc<'_, T> {
    fn drop(&mut self) {
        self.stack.release_scoped(self.start, self.end);
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for ScopedAlloc<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedAlloc")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("data", &self.deref())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_handle_rewinds_on_drop() {
        let stack = StackAllocator::new(256).unwrap();
        let h1 = stack.allocate(50).unwrap();
        let after_h1 = stack.used();
        let h2_addr;
        {
            let h2 = stack.allocate(30).unwrap();
            h2_addr = h2.as_ptr();
            assert_eq!(stack.used(), after_h1 + 30);
        }
        assert_eq!(stack.used(), after_h1);

        let h3 = stack.allocate(10).unwrap();
        assert_eq!(h3.as_ptr(), h2_addr);
        drop(h3);
        drop(h1);
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_nested_handles_restore_cursor() {
        let stack = StackAllocator::new(128).unwrap();
        let before = stack.used();
        let outer = stack.allocate_aligned(7, 1).unwrap();
        let inner = stack.allocate_aligned(16, 16).unwrap();
        assert_eq!(inner.as_ptr().as_ptr() as usize % 16, 0);
        drop(inner);
        drop(outer);
        assert_eq!(stack.used(), before);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "out of LIFO order"))]
    fn test_out_of_order_release() {
        let stack = StackAllocator::new(128).unwrap();
        let h1 = stack.allocate(40).unwrap();
        let h2 = stack.allocate(20).unwrap();
        drop(h1);
        // Release builds keep the cursor where it was.
        assert_eq!(stack.used(), 60);
        drop(h2);
        assert_eq!(stack.used(), 40);
    }

    #[test]
    fn test_allocate_reports_exhaustion() {
        let stack = StackAllocator::new(32).unwrap();
        let _h = stack.allocate(30).unwrap();
        let err = stack.allocate(8).unwrap_err();
        assert!(matches!(err, StackError::Region(RegionError::OutOfMemory { .. })));
        assert_eq!(stack.used(), 30);
    }

    #[test]
    fn test_free_bytes_with_receipts() {
        let mut stack = StackAllocator::new(128).unwrap();
        let a = stack.allocate_raw(10, 1).unwrap();
        let b = stack.allocate_raw(8, 8).unwrap();
        assert_eq!(b.bytes, 14);
        stack.free_bytes(b.bytes).unwrap();
        assert_eq!(stack.used(), a.bytes);
        stack.free_bytes(a.bytes).unwrap();
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_free_bytes_can_release_several_allocations() {
        let mut stack = StackAllocator::new(64).unwrap();
        let a = stack.allocate_raw(10, 1).unwrap();
        let b = stack.allocate_raw(20, 1).unwrap();
        stack.free_bytes(a.bytes + b.bytes).unwrap();
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_free_bytes_rejects_overrun() {
        let mut stack = StackAllocator::new(64).unwrap();
        stack.allocate_raw(10, 1).unwrap();
        assert_eq!(
            stack.free_bytes(11),
            Err(StackError::RewindOutOfRange { requested: 11, used: 10 })
        );
        assert_eq!(stack.used(), 10);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_free_bytes_detects_lifo_violation() {
        let mut stack = StackAllocator::new(64).unwrap();
        stack.allocate_raw(10, 1).unwrap();
        stack.allocate_raw(20, 1).unwrap();
        assert_eq!(
            stack.free_bytes(5),
            Err(StackError::LifoViolation { target: 25, used: 30 })
        );
        assert_eq!(stack.used(), 30);
    }

    #[test]
    fn test_free_to_marker() {
        let mut stack = StackAllocator::new(64).unwrap();
        stack.allocate_raw(8, 1).unwrap();
        let marker = stack.marker();
        stack.allocate_raw(16, 1).unwrap();
        stack.allocate_raw(4, 1).unwrap();
        stack.free_to_marker(marker).unwrap();
        assert_eq!(stack.used(), 8);
    }

    #[test]
    fn test_free_to_marker_rejects_invalid_markers() {
        let mut stack = StackAllocator::new(64).unwrap();
        let other = StackAllocator::new(64).unwrap();
        stack.allocate_raw(16, 1).unwrap();

        let err = stack.free_to_marker(other.marker()).unwrap_err();
        assert!(matches!(err, StackError::ForeignMarker { .. }));

        let ahead = stack.marker();
        stack.free_bytes(16).unwrap();
        assert_eq!(
            stack.free_to_marker(ahead),
            Err(StackError::MarkerOutOfRange { offset: 16, used: 0 })
        );
    }

    #[test]
    fn test_marker_from_before_clear_is_stale() {
        let mut stack = StackAllocator::new(64).unwrap();
        stack.allocate_raw(8, 1).unwrap();
        let stale = stack.marker();
        stack.clear();
        stack.allocate_raw(16, 1).unwrap();

        assert_eq!(
            stack.free_to_marker(stale),
            Err(StackError::StaleMarker {
                marker_generation: 0,
                current: 1
            })
        );
        assert_eq!(stack.used(), 16);
        let next = stack.allocate_raw(8, 1).unwrap();
        assert_eq!(next.marker.offset(), 16);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_free_to_marker_detects_split_allocation() {
        let mut stack = StackAllocator::new(64).unwrap();
        let block = stack.allocate_raw(16, 1).unwrap();
        let inside = stack.marker_for(block.ptr.as_ptr().wrapping_add(8)).unwrap();
        assert_eq!(
            stack.free_to_marker(inside),
            Err(StackError::LifoViolation { target: 8, used: 16 })
        );
        assert_eq!(stack.used(), 16);

        let start = stack.marker_for(block.ptr.as_ptr()).unwrap();
        stack.free_to_marker(start).unwrap();
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_marker_for_pointer() {
        let mut stack = StackAllocator::new(64).unwrap();
        let a = stack.allocate_raw(8, 1).unwrap();
        let b = stack.allocate_raw(8, 1).unwrap();
        let marker = stack.marker_for(b.ptr.as_ptr()).unwrap();
        assert_eq!(marker.offset(), 8);
        stack.free_to_marker(marker).unwrap();
        assert_eq!(stack.used(), 8);

        let past = a.ptr.as_ptr().wrapping_add(32);
        assert!(stack.marker_for(past).is_err());
    }

    #[test]
    fn test_allocate_array_is_typed_and_aligned() {
        let stack = StackAllocator::new(128).unwrap();
        let _pad = stack.allocate(1).unwrap();
        let mut values = stack.allocate_array::<u64>(4).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values.as_ptr().as_ptr() as usize % 8, 0);
        values.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(values.iter().sum::<u64>(), 10);
        assert_eq!(values.bytes(), 39);
    }

    #[test]
    fn test_allocate_n() {
        let stack = StackAllocator::new(64).unwrap();
        let block = stack.allocate_n(4, 5).unwrap();
        assert_eq!(block.len(), 20);
        assert!(stack.allocate_n(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_clear_and_equality() {
        let mut stack = StackAllocator::new(32).unwrap();
        stack.allocate_raw(32, 1).unwrap();
        stack.clear();
        assert_eq!(stack.used(), 0);

        let other = StackAllocator::new(32).unwrap();
        assert_ne!(stack, other);
        assert_eq!(stack, stack);
    }
}
