//! Fixed-capacity byte regions
//!
//! A [`Region`] is one contiguous heap buffer plus a bump cursor. Every
//! allocator in this module carves its memory out of exactly one region:
//!
//! ```text
//! base                         base + cursor              base + capacity
//! |-------- handed out --------|---------- free ----------|
//! ```
//!
//! A region never grows. An allocator that needs more room creates a brand-new
//! region and drops the old one, which invalidates every pointer into it.
//!
//! The buffer is zero-filled once when the region is created, so every byte of
//! it is always initialized. Reused bytes keep whatever the previous owner
//! wrote; callers that need zeroes ask for them explicitly.

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use super::align::{align_up, is_valid_align};

/// Minimum alignment of every region's base address.
pub const REGION_ALIGN: usize = 16;

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a region.
///
/// Allocator handles, markers and container adapters compare regions by this
/// id, never by address, so a freed and re-created buffer at the same address
/// is still a different region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl RegionId {
    fn next() -> Self {
        Self(NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, mostly useful for logging.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Region errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// The backing buffer could not be obtained from the global allocator
    #[error("Failed to reserve {capacity} bytes (align {align}) for a region")]
    Allocation {
        /// Requested capacity in bytes
        capacity: usize,
        /// Requested base alignment
        align: usize,
    },

    /// The region does not have enough room left for the request
    #[error("Out of memory: requested {requested} bytes (align {align}) with {remaining} of {capacity} bytes remaining")]
    OutOfMemory {
        /// Requested size in bytes
        requested: usize,
        /// Requested alignment
        align: usize,
        /// Bytes left between the cursor and the end of the region
        remaining: usize,
        /// Total capacity of the region
        capacity: usize,
    },

    /// Alignment was zero or not a power of two
    #[error("Invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(usize),
}

/// Outcome of a successful bump: the span `[start, end)` was consumed and the
/// caller's bytes begin at `offset` (`offset - start` is alignment padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bump {
    pub start: usize,
    pub offset: usize,
    pub end: usize,
}

/// A contiguous, fixed-capacity byte buffer with a bump cursor.
pub struct Region {
    base: NonNull<u8>,
    capacity: usize,
    align: usize,
    cursor: Cell<usize>,
    id: RegionId,
}

// SAFETY: the region exclusively owns its buffer. The cursor is a `Cell`, so
// the type stays `!Sync` and can only be used from one thread at a time.
unsafe impl Send for Region {}

impl Region {
    /// Create a region of `capacity` bytes aligned to [`REGION_ALIGN`].
    pub fn new(capacity: usize) -> Result<Self, RegionError> {
        Self::with_alignment(capacity, REGION_ALIGN)
    }

    /// Create a region whose base address is aligned to at least `align`.
    pub fn with_alignment(capacity: usize, align: usize) -> Result<Self, RegionError> {
        if !is_valid_align(align) {
            return Err(RegionError::InvalidAlignment(align));
        }
        let align = align.max(REGION_ALIGN);
        let layout = Self::layout_for(capacity, align)
            .ok_or(RegionError::Allocation { capacity, align })?;

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(RegionError::Allocation { capacity, align })?;

        let region = Self {
            base,
            capacity,
            align,
            cursor: Cell::new(0),
            id: RegionId::next(),
        };
        log::debug!("Created {} with {} bytes", region.id, capacity);
        Ok(region)
    }

    // Zero-capacity regions still own a one-byte buffer so the base pointer is
    // always a real allocation.
    fn layout_for(capacity: usize, align: usize) -> Option<Layout> {
        Layout::from_size_align(capacity.max(1), align).ok()
    }

    /// Identity of this region
    pub const fn id(&self) -> RegionId {
        self.id
    }

    /// Start address of the buffer
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Total capacity in bytes
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Alignment guaranteed for the base address
    pub const fn base_align(&self) -> usize {
        self.align
    }

    /// Bytes currently handed out (the cursor)
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Bytes left before the region is exhausted
    pub fn remaining(&self) -> usize {
        self.capacity - self.cursor.get()
    }

    /// Whether `ptr` points inside the buffer
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.capacity
    }

    /// Offset of `ptr` from the base, if it lies in `[base, base + capacity]`.
    ///
    /// The one-past-the-end address is accepted because it is a valid cursor
    /// position.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let offset = (ptr as usize).checked_sub(base)?;
        (offset <= self.capacity).then_some(offset)
    }

    /// Reserve `size` bytes aligned to `align` at the cursor.
    pub(crate) fn bump(&self, size: usize, align: usize) -> Result<Bump, RegionError> {
        if !is_valid_align(align) {
            return Err(RegionError::InvalidAlignment(align));
        }

        let start = self.cursor.get();
        let out_of_memory = || RegionError::OutOfMemory {
            requested: size,
            align,
            remaining: self.capacity - start,
            capacity: self.capacity,
        };

        // Align the absolute address; `align` may exceed the base alignment.
        let base = self.base.as_ptr() as usize;
        let offset = align_up(base + start, align)
            .map(|addr| addr - base)
            .ok_or_else(out_of_memory)?;
        let end = offset.checked_add(size).ok_or_else(out_of_memory)?;
        if end > self.capacity {
            return Err(out_of_memory());
        }

        self.cursor.set(end);
        Ok(Bump { start, offset, end })
    }

    /// Extend the most recent allocation ending at `end` to end at `new_end`.
    pub(crate) fn extend_top(&self, end: usize, new_end: usize) -> bool {
        if self.cursor.get() != end || new_end > self.capacity {
            return false;
        }
        self.cursor.set(new_end);
        true
    }

    /// Move the cursor. Callers guarantee nothing live sits past `offset`.
    pub(crate) fn set_cursor(&self, offset: usize) {
        debug_assert!(offset <= self.capacity);
        self.cursor.set(offset);
    }

    /// Pointer to the byte at `offset`.
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity);
        // SAFETY: `offset` is within the allocation or one past its end.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Mutable view of `[offset, offset + len)`.
    ///
    /// # Safety
    ///
    /// The span must lie inside the region and must not be aliased by any other
    /// live reference for the returned lifetime.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(offset + len <= self.capacity);
        // SAFETY: upheld by the caller; every byte of the buffer is initialized.
        unsafe { std::slice::from_raw_parts_mut(self.ptr_at(offset).as_ptr(), len) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if let Some(layout) = Self::layout_for(self.capacity, self.align) {
            // SAFETY: `base` came from `alloc_zeroed` with this exact layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
        log::trace!("Released {}", self.id);
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Region {}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_region_is_empty_and_aligned() {
        let region = Region::new(256).unwrap();
        assert_eq!(region.capacity(), 256);
        assert_eq!(region.used(), 0);
        assert_eq!(region.remaining(), 256);
        assert_eq!(region.base().as_ptr() as usize % REGION_ALIGN, 0);
    }

    #[test]
    fn test_region_ids_are_unique() {
        let a = Region::new(8).unwrap();
        let b = Region::new(8).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_bump_advances_cursor() {
        let region = Region::new(64).unwrap();
        let first = region.bump(10, 1).unwrap();
        assert_eq!(first, Bump { start: 0, offset: 0, end: 10 });

        let second = region.bump(8, 8).unwrap();
        assert_eq!(second.start, 10);
        assert_eq!(second.offset, 16);
        assert_eq!(second.end, 24);
        assert_eq!(region.used(), 24);
    }

    #[test]
    fn test_bump_past_capacity_fails_without_moving_cursor() {
        let region = Region::new(32).unwrap();
        region.bump(30, 1).unwrap();
        let err = region.bump(4, 1).unwrap_err();
        assert_eq!(
            err,
            RegionError::OutOfMemory { requested: 4, align: 1, remaining: 2, capacity: 32 }
        );
        assert_eq!(region.used(), 30);
    }

    #[test]
    fn test_bump_rejects_bad_alignment() {
        let region = Region::new(32).unwrap();
        assert_eq!(region.bump(4, 3), Err(RegionError::InvalidAlignment(3)));
        assert_eq!(region.bump(4, 0), Err(RegionError::InvalidAlignment(0)));
    }

    #[test]
    fn test_zero_capacity_region() {
        let region = Region::new(0).unwrap();
        assert!(region.bump(0, 1).is_ok());
        assert!(region.bump(1, 1).is_err());
    }

    #[test]
    fn test_large_base_alignment() {
        let region = Region::with_alignment(128, 64).unwrap();
        assert_eq!(region.base().as_ptr() as usize % 64, 0);
        assert_eq!(region.base_align(), 64);
    }

    #[test]
    fn test_offset_of_and_contains() {
        let region = Region::new(16).unwrap();
        let base = region.base().as_ptr();
        assert_eq!(region.offset_of(base), Some(0));
        assert_eq!(region.offset_of(base.wrapping_add(16)), Some(16));
        assert_eq!(region.offset_of(base.wrapping_add(17)), None);
        assert!(region.contains(base.wrapping_add(15)));
        assert!(!region.contains(base.wrapping_add(16)));
    }

    #[test]
    fn test_extend_top() {
        let region = Region::new(32).unwrap();
        let bump = region.bump(8, 1).unwrap();
        assert!(region.extend_top(bump.end, 16));
        assert_eq!(region.used(), 16);
        assert!(!region.extend_top(8, 20));
        assert!(!region.extend_top(16, 64));
    }

    #[test]
    fn test_fresh_region_is_zeroed() {
        let region = Region::new(64).unwrap();
        let bump = region.bump(64, 1).unwrap();
        let bytes = unsafe { region.bytes_mut(bump.offset, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
