//! Bump arena
//!
//! The arena is the engine's main allocation strategy. Two lifetimes recur:
//!
//! - a **temporary** arena, cleared at the top of every frame, for scratch
//!   arrays handed to the graphics API (queue family lists, extension names,
//!   swapchain images);
//! - a **permanent** arena, created once and never cleared, for anything that
//!   must outlive a frame.
//!
//! Allocation goes through `&self` and every view it returns borrows the
//! arena. [`Arena::clear`], [`Arena::reset_to`] and [`Arena::regrow`] take
//! `&mut self`, so the borrow checker guarantees no view survives the memory
//! being handed out again.
//!
//! Running out of room in [`Arena::push`] is fatal: callers throughout the
//! engine size their arenas up front and treat a push as infallible. Code that
//! wants to handle exhaustion uses the `try_*` variants.

use std::cell::Cell;
use std::fmt;
use std::mem;
use std::ptr::NonNull;

use bytemuck::Pod;
use thiserror::Error;

use super::region::{Region, RegionError, RegionId};

/// Arena errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// Region creation or exhaustion
    #[error(transparent)]
    Region(#[from] RegionError),

    /// The mark was taken on a different arena
    #[error("Mark belongs to {mark_region}, not {arena_region}")]
    ForeignMark {
        /// Region the mark was taken on
        mark_region: RegionId,
        /// Region of the arena it was used with
        arena_region: RegionId,
    },

    /// The mark was taken before the arena was last cleared or regrown
    #[error("Stale mark from generation {mark_generation} (arena is at generation {current})")]
    StaleMark {
        /// Generation recorded in the mark
        mark_generation: u32,
        /// Current arena generation
        current: u32,
    },

    /// The mark points past the cursor, i.e. into memory not handed out
    #[error("Mark at offset {offset} is beyond the arena cursor {used}")]
    MarkOutOfRange {
        /// Offset recorded in the mark
        offset: usize,
        /// Current cursor
        used: usize,
    },
}

/// Opaque snapshot of an arena cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark {
    region: RegionId,
    generation: u32,
    offset: usize,
}

impl ArenaMark {
    /// Cursor offset captured by this mark
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// Usage snapshot of an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Total capacity in bytes
    pub capacity: usize,
    /// Bytes currently handed out
    pub used: usize,
    /// Largest cursor value seen since creation
    pub high_water_mark: usize,
    /// Number of clears/regrows so far
    pub generation: u32,
}

/// Linear allocator over a single [`Region`].
pub struct Arena {
    region: Region,
    generation: u32,
    high_water: Cell<usize>,
}

impl Arena {
    /// Create an arena with `capacity` bytes.
    ///
    /// This is the only heap allocation the arena makes until [`Arena::regrow`].
    pub fn new(capacity: usize) -> Result<Self, ArenaError> {
        Ok(Self {
            region: Region::new(capacity)?,
            generation: 0,
            high_water: Cell::new(0),
        })
    }

    /// Total capacity in bytes
    pub const fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Bytes handed out since the last clear
    pub fn used(&self) -> usize {
        self.region.used()
    }

    /// Bytes still available
    pub fn remaining(&self) -> usize {
        self.region.remaining()
    }

    /// Number of times the arena has been cleared or regrown
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Identity of the backing region
    pub const fn region_id(&self) -> RegionId {
        self.region.id()
    }

    /// Start address of the backing buffer
    pub const fn base(&self) -> NonNull<u8> {
        self.region.base()
    }

    /// Usage snapshot
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity: self.capacity(),
            used: self.used(),
            high_water_mark: self.high_water.get(),
            generation: self.generation,
        }
    }

    pub(crate) const fn region(&self) -> &Region {
        &self.region
    }

    /// Reserve an aligned span and return its offset.
    pub(crate) fn bump(&self, size: usize, align: usize) -> Result<usize, RegionError> {
        let bump = self.region.bump(size, align)?;
        if bump.end > self.high_water.get() {
            self.high_water.set(bump.end);
        }
        Ok(bump.offset)
    }

    /// Grow the most recent allocation in place.
    pub(crate) fn extend_top(&self, end: usize, new_end: usize) -> bool {
        let grown = self.region.extend_top(end, new_end);
        if grown && new_end > self.high_water.get() {
            self.high_water.set(new_end);
        }
        grown
    }

    /// Try to push `size` bytes aligned to `align`.
    #[allow(clippy::mut_from_ref)]
    pub fn try_push_aligned(&self, size: usize, align: usize) -> Result<&mut [u8], ArenaError> {
        let offset = self.bump(size, align)?;
        // SAFETY: `bump` hands out disjoint spans. A span can only be handed out
        // again after `clear`/`reset_to`/`regrow`, which need `&mut self` and so
        // end this borrow first.
        Ok(unsafe { self.region.bytes_mut(offset, size) })
    }

    /// Try to push `size` unaligned bytes.
    #[allow(clippy::mut_from_ref)]
    pub fn try_push(&self, size: usize) -> Result<&mut [u8], ArenaError> {
        self.try_push_aligned(size, 1)
    }

    /// Push `size` bytes aligned to `align`.
    ///
    /// # Panics
    ///
    /// Panics if the arena does not have room for the request or `align` is
    /// not a power of two.
    #[allow(clippy::mut_from_ref)]
    pub fn push_aligned(&self, size: usize, align: usize) -> &mut [u8] {
        match self.try_push_aligned(size, align) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Arena {} capacity exceeded: {}", self.region_id(), e);
                panic!("arena capacity exceeded: {e}");
            }
        }
    }

    /// Push `size` bytes at the cursor.
    ///
    /// The bytes are not cleared and may hold data from before the last
    /// [`Arena::clear`].
    ///
    /// # Panics
    ///
    /// Panics if the arena does not have room for the request.
    #[allow(clippy::mut_from_ref)]
    pub fn push(&self, size: usize) -> &mut [u8] {
        self.push_aligned(size, 1)
    }

    /// Push `size` zero-filled bytes.
    ///
    /// # Panics
    ///
    /// Panics if the arena does not have room for the request.
    #[allow(clippy::mut_from_ref)]
    pub fn push_zero(&self, size: usize) -> &mut [u8] {
        let bytes = self.push(size);
        bytes.fill(0);
        bytes
    }

    /// Push `size` bytes and return the raw address, for handing to C APIs.
    ///
    /// # Panics
    ///
    /// Panics if the arena does not have room for the request.
    pub fn push_raw(&self, size: usize, align: usize) -> NonNull<u8> {
        NonNull::from(self.push_aligned(size, align)).cast()
    }

    /// Push a single value and return a reference to it.
    ///
    /// # Panics
    ///
    /// Panics if the arena does not have room for the value.
    #[allow(clippy::mut_from_ref)]
    pub fn push_value<T: Pod>(&self, value: T) -> &mut T {
        let bytes = self.push_aligned(mem::size_of::<T>(), mem::align_of::<T>());
        let slot: &mut T = bytemuck::from_bytes_mut(bytes);
        *slot = value;
        slot
    }

    /// Push an array of `len` elements. Contents are unspecified but valid,
    /// since `T` accepts any bit pattern.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or the arena does not have room.
    #[allow(clippy::mut_from_ref)]
    pub fn push_slice<T: Pod>(&self, len: usize) -> &mut [T] {
        match self.try_push_slice(len) {
            Ok(slice) => slice,
            Err(e) => {
                log::error!("Arena {} capacity exceeded: {}", self.region_id(), e);
                panic!("arena capacity exceeded: {e}");
            }
        }
    }

    /// Fallible [`Arena::push_slice`].
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[allow(clippy::mut_from_ref)]
    pub fn try_push_slice<T: Pod>(&self, len: usize) -> Result<&mut [T], ArenaError> {
        assert!(mem::size_of::<T>() != 0, "zero-sized element types are not supported");
        let size = len.checked_mul(mem::size_of::<T>()).ok_or(RegionError::OutOfMemory {
            requested: usize::MAX,
            align: mem::align_of::<T>(),
            remaining: self.remaining(),
            capacity: self.capacity(),
        })?;
        let bytes = self.try_push_aligned(size, mem::align_of::<T>())?;
        Ok(bytemuck::cast_slice_mut(bytes))
    }

    /// Push an array of `len` zeroed elements.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or the arena does not have room.
    #[allow(clippy::mut_from_ref)]
    pub fn push_zeroed_slice<T: Pod>(&self, len: usize) -> &mut [T] {
        let slice = self.push_slice::<T>(len);
        bytemuck::cast_slice_mut::<T, u8>(slice).fill(0);
        slice
    }

    /// Copy `src` into the arena.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or the arena does not have room.
    #[allow(clippy::mut_from_ref)]
    pub fn push_copy<T: Pod>(&self, src: &[T]) -> &mut [T] {
        let dst = self.push_slice::<T>(src.len());
        dst.copy_from_slice(src);
        dst
    }

    /// Copy a string into the arena.
    ///
    /// # Panics
    ///
    /// Panics if the arena does not have room.
    #[allow(clippy::mut_from_ref)]
    pub fn push_str(&self, s: &str) -> &mut str {
        let bytes = self.push(s.len());
        bytes.copy_from_slice(s.as_bytes());
        // SAFETY: the bytes were just copied from a `str`.
        unsafe { std::str::from_utf8_unchecked_mut(bytes) }
    }

    /// Reset the cursor to zero. Memory is not cleared.
    pub fn clear(&mut self) {
        log::trace!(
            "Clearing arena {} ({} of {} bytes used, generation {})",
            self.region_id(),
            self.used(),
            self.capacity(),
            self.generation
        );
        self.region.set_cursor(0);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Snapshot the cursor.
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            region: self.region_id(),
            generation: self.generation,
            offset: self.used(),
        }
    }

    /// Roll the cursor back to `mark`, releasing everything pushed after it.
    ///
    /// Marks from another arena, from before the last clear, or beyond the
    /// current cursor are rejected and leave the arena untouched.
    pub fn reset_to(&mut self, mark: ArenaMark) -> Result<(), ArenaError> {
        if let Err(e) = self.check_mark(mark) {
            log::warn!("Rejected arena reset: {}", e);
            return Err(e);
        }
        self.region.set_cursor(mark.offset);
        Ok(())
    }

    fn check_mark(&self, mark: ArenaMark) -> Result<(), ArenaError> {
        if mark.region != self.region_id() {
            return Err(ArenaError::ForeignMark {
                mark_region: mark.region,
                arena_region: self.region_id(),
            });
        }
        if mark.generation != self.generation {
            return Err(ArenaError::StaleMark {
                mark_generation: mark.generation,
                current: self.generation,
            });
        }
        if mark.offset > self.used() {
            return Err(ArenaError::MarkOutOfRange {
                offset: mark.offset,
                used: self.used(),
            });
        }
        Ok(())
    }

    /// Run `f` against the arena and release everything it pushed.
    ///
    /// This is the nested scratch pattern: a short-lived scope inside a
    /// longer-lived (typically per-frame) arena.
    pub fn with_scratch<R>(&mut self, f: impl FnOnce(&Self) -> R) -> R {
        let mark = self.mark();
        let result = f(self);
        self.region.set_cursor(mark.offset);
        result
    }

    /// Replace the backing region with a new one of `capacity` bytes.
    ///
    /// Regions never grow in place; everything in the old region is gone.
    pub fn regrow(&mut self, capacity: usize) -> Result<(), ArenaError> {
        let region = Region::new(capacity)?;
        log::info!(
            "Regrowing arena {} from {} to {} bytes as {}",
            self.region_id(),
            self.capacity(),
            capacity,
            region.id()
        );
        self.region = region;
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("region", &self.region)
            .field("generation", &self.generation)
            .field("high_water_mark", &self.high_water.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(bytes: &[u8]) -> usize {
        bytes.as_ptr() as usize
    }

    #[test]
    fn test_consecutive_pushes_are_adjacent() {
        let arena = Arena::new(1024).unwrap();
        let p1 = addr(arena.push(100));
        let p2 = addr(arena.push(200));
        let base = arena.base().as_ptr() as usize;

        assert_eq!(p2, p1 + 100);
        assert!(p1 >= base && p2 + 200 <= base + 1024);
        assert_eq!(arena.used(), 300);
    }

    #[test]
    fn test_clear_restarts_at_base() {
        let mut arena = Arena::new(256).unwrap();
        let first = addr(arena.push(32));
        arena.push(64);
        arena.clear();
        assert_eq!(arena.used(), 0);
        assert_eq!(addr(arena.push(16)), first);
        assert_eq!(arena.generation(), 1);
    }

    #[test]
    fn test_mark_and_reset() {
        let mut arena = Arena::new(64).unwrap();
        let mark = arena.mark();
        let first_after_mark = addr(arena.push(32));
        arena.reset_to(mark).unwrap();
        assert_eq!(addr(arena.push(16)), first_after_mark);
    }

    #[test]
    fn test_reset_rejects_foreign_mark() {
        let mut a = Arena::new(64).unwrap();
        let b = Arena::new(64).unwrap();
        a.push(8);
        let err = a.reset_to(b.mark()).unwrap_err();
        assert!(matches!(err, ArenaError::ForeignMark { .. }));
        assert_eq!(a.used(), 8);
    }

    #[test]
    fn test_reset_rejects_stale_mark() {
        let mut arena = Arena::new(64).unwrap();
        arena.push(8);
        let mark = arena.mark();
        arena.clear();
        arena.push(16);
        assert_eq!(
            arena.reset_to(mark),
            Err(ArenaError::StaleMark { mark_generation: 0, current: 1 })
        );
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn test_reset_rejects_mark_beyond_cursor() {
        let mut arena = Arena::new(64).unwrap();
        arena.push(32);
        let late = arena.mark();
        let early = ArenaMark { offset: 0, ..late };
        arena.reset_to(early).unwrap();
        assert_eq!(
            arena.reset_to(late),
            Err(ArenaError::MarkOutOfRange { offset: 32, used: 0 })
        );
    }

    #[test]
    fn test_try_push_reports_exhaustion() {
        let arena = Arena::new(16).unwrap();
        arena.push(12);
        let err = arena.try_push(8).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::Region(RegionError::OutOfMemory { requested: 8, remaining: 4, .. })
        ));
        assert_eq!(arena.used(), 12);
    }

    #[test]
    #[should_panic(expected = "arena capacity exceeded")]
    fn test_push_past_capacity_panics() {
        let arena = Arena::new(16).unwrap();
        arena.push(17);
    }

    #[test]
    fn test_push_zero_clears_reused_bytes() {
        let mut arena = Arena::new(32).unwrap();
        arena.push(16).fill(0xAB);
        arena.clear();
        assert!(arena.push_zero(16).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_push_aligned() {
        let arena = Arena::new(128).unwrap();
        arena.push(3);
        let bytes = arena.push_aligned(8, 32);
        assert_eq!(addr(bytes) % 32, 0);
    }

    #[test]
    fn test_typed_pushes() {
        let arena = Arena::new(256).unwrap();
        let value = arena.push_value(0xDEAD_BEEF_u32);
        assert_eq!(*value, 0xDEAD_BEEF);

        let floats = arena.push_zeroed_slice::<f32>(4);
        assert_eq!(floats, &[0.0; 4]);
        assert_eq!(floats.as_ptr() as usize % mem::align_of::<f32>(), 0);

        let copied = arena.push_copy(&[1u16, 2, 3]);
        assert_eq!(copied, &[1, 2, 3]);

        assert_eq!(arena.push_str("VK_KHR_swapchain"), "VK_KHR_swapchain");
    }

    #[test]
    fn test_with_scratch_releases_everything() {
        let mut arena = Arena::new(128).unwrap();
        arena.push(10);
        let sum = arena.with_scratch(|scratch| {
            let numbers = scratch.push_copy(&[1u32, 2, 3, 4]);
            numbers.iter().sum::<u32>()
        });
        assert_eq!(sum, 10);
        assert_eq!(arena.used(), 10);
    }

    #[test]
    fn test_regrow_replaces_region() {
        let mut arena = Arena::new(16).unwrap();
        let old = arena.region_id();
        let mark = arena.mark();
        arena.push(16);
        arena.regrow(64).unwrap();
        assert_ne!(arena.region_id(), old);
        assert_eq!(arena.capacity(), 64);
        assert_eq!(arena.used(), 0);
        assert!(arena.reset_to(mark).is_err());
    }

    #[test]
    fn test_stats_track_high_water() {
        let mut arena = Arena::new(128).unwrap();
        arena.push(100);
        arena.clear();
        arena.push(20);
        let stats = arena.stats();
        assert_eq!(stats.used, 20);
        assert_eq!(stats.high_water_mark, 100);
        assert_eq!(stats.generation, 1);
    }
}
