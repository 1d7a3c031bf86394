//! Memory management
//!
//! Region-backed allocators used in place of per-object heap allocation:
//!
//! - [`Arena`]: bump allocation, released wholesale or rewound to a mark
//! - [`StackAllocator`]: LIFO allocation with markers and scoped handles
//! - [`PoolAllocator`]: fixed-size chunks released in any order
//! - [`ArenaAlloc`] / [`StackAlloc`]: plug the above into standard containers
//!
//! None of these are `Sync`. Each thread owns its own allocators.

mod adapter;
mod align;
mod arena;
mod pool;
mod region;
mod stack;

pub use adapter::{construct, destroy, ArenaAlloc, ArenaVec, StackAlloc, StackVec};
pub use arena::{Arena, ArenaError, ArenaMark, ArenaStats};
pub use pool::{PoolAllocator, PoolError, POOL_CANARY};
pub use region::{Region, RegionError, RegionId, REGION_ALIGN};
pub use stack::{ScopedAlloc, StackAllocation, StackAllocator, StackError, StackMarker};
