//! Fixed-size chunk pool
//!
//! One region split into `chunk_count` chunks of `chunk_size` bytes, plus a
//! stack of free chunk indices. Chunks are released independently and in any
//! order, which is what arenas and stacks cannot do.

use std::fmt;
use std::mem;
use std::ptr::NonNull;

use thiserror::Error;

use super::region::{Region, RegionError};

/// Byte written over freed chunks in debug builds
pub const POOL_CANARY: u8 = 0xDD;

/// Pool allocator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Backing region could not be created
    #[error(transparent)]
    Region(#[from] RegionError),

    /// Chunks must hold at least one byte
    #[error("Pool chunk size must be non-zero")]
    ZeroChunkSize,

    /// Every chunk is handed out
    #[error("Pool exhausted: all {chunk_count} chunks are in use")]
    Exhausted {
        /// Total chunks in the pool
        chunk_count: usize,
    },

    /// The pointer was not handed out by this pool
    #[error("Pointer does not belong to this pool")]
    ForeignPointer,

    /// The pointer is inside the pool but not at a chunk start
    #[error("Pointer at offset {offset} is not on a {chunk_size}-byte chunk boundary")]
    Misaligned {
        /// Offset from the pool base
        offset: usize,
        /// Chunk size of the pool
        chunk_size: usize,
    },

    /// The chunk is already free. Release builds only detect this when every
    /// chunk is free.
    #[error("Chunk {index} freed twice")]
    DoubleFree {
        /// Index of the chunk
        index: usize,
    },
}

/// Fixed-capacity pool of equally sized chunks.
pub struct PoolAllocator {
    region: Region,
    chunk_size: usize,
    chunk_count: usize,
    free_list: Vec<usize>,
    #[cfg(debug_assertions)]
    live: Vec<bool>,
}

impl PoolAllocator {
    /// Create a pool of `chunk_count` chunks of `chunk_size` bytes each.
    pub fn new(chunk_count: usize, chunk_size: usize) -> Result<Self, PoolError> {
        Self::with_alignment(chunk_count, chunk_size, 1)
    }

    /// Create a pool whose chunks can each hold one `T`.
    pub fn for_type<T>(chunk_count: usize) -> Result<Self, PoolError> {
        Self::with_alignment(chunk_count, mem::size_of::<T>(), mem::align_of::<T>())
    }

    fn with_alignment(chunk_count: usize, chunk_size: usize, align: usize) -> Result<Self, PoolError> {
        if chunk_size == 0 {
            return Err(PoolError::ZeroChunkSize);
        }
        let total = chunk_count
            .checked_mul(chunk_size)
            .ok_or(RegionError::Allocation { capacity: usize::MAX, align })?;

        let region = Region::with_alignment(total, align)?;
        region.bump(total, 1)?;

        log::debug!(
            "Created pool of {} x {} bytes in {}",
            chunk_count,
            chunk_size,
            region.id()
        );

        Ok(Self {
            region,
            chunk_size,
            chunk_count,
            // Reversed so chunk 0 is handed out first.
            free_list: (0..chunk_count).rev().collect(),
            #[cfg(debug_assertions)]
            live: vec![false; chunk_count],
        })
    }

    /// Bytes per chunk
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total chunks
    pub const fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Chunks currently free
    pub fn available_chunks(&self) -> usize {
        self.free_list.len()
    }

    /// Whether `ptr` points into this pool's chunks
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.region.contains(ptr)
    }

    /// Hand out one chunk.
    pub fn allocate(&mut self) -> Result<NonNull<u8>, PoolError> {
        let index = self.free_list.pop().ok_or(PoolError::Exhausted {
            chunk_count: self.chunk_count,
        })?;

        #[cfg(debug_assertions)]
        {
            self.live[index] = true;
        }

        Ok(self.region.ptr_at(index * self.chunk_size))
    }

    /// Chunk index of `ptr`.
    pub fn index_of(&self, ptr: *const u8) -> Result<usize, PoolError> {
        if !self.contains(ptr) {
            return Err(PoolError::ForeignPointer);
        }
        let offset = self.region.offset_of(ptr).ok_or(PoolError::ForeignPointer)?;
        if offset % self.chunk_size != 0 {
            return Err(PoolError::Misaligned {
                offset,
                chunk_size: self.chunk_size,
            });
        }
        Ok(offset / self.chunk_size)
    }

    /// Return the chunk at `ptr` to the pool.
    ///
    /// `ptr` must have come from [`PoolAllocator::allocate`] on this pool, and
    /// nothing may still reference the chunk.
    ///
    /// Debug builds track which chunks are handed out and reject every double
    /// free with [`PoolError::DoubleFree`]. Release builds do not check for
    /// double frees: the only one reported is a free while every chunk is
    /// already free. Any other double free puts the chunk on the free list
    /// twice, and it will be handed out to two owners.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<(), PoolError> {
        let index = self.index_of(ptr.as_ptr()).inspect_err(|e| {
            log::warn!("Rejected pool deallocation: {}", e);
        })?;

        #[cfg(debug_assertions)]
        {
            if !self.live[index] {
                log::error!("Double free of pool chunk {}", index);
                return Err(PoolError::DoubleFree { index });
            }
            self.live[index] = false;
            // SAFETY: the chunk is in bounds and its owner just gave it back.
            unsafe {
                self.region
                    .bytes_mut(index * self.chunk_size, self.chunk_size)
                    .fill(POOL_CANARY);
            }
        }

        if self.free_list.len() >= self.chunk_count {
            log::error!("Double free of pool chunk {}", index);
            return Err(PoolError::DoubleFree { index });
        }

        self.free_list.push(index);
        Ok(())
    }

    /// Return every chunk to the pool.
    pub fn reset(&mut self) {
        self.free_list.clear();
        self.free_list.extend((0..self.chunk_count).rev());
        #[cfg(debug_assertions)]
        self.live.fill(false);
    }
}

impl fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("region", &self.region.id())
            .field("chunk_size", &self.chunk_size)
            .field("chunk_count", &self.chunk_count)
            .field("available", &self.free_list.len())
            .finish()
    }
}
