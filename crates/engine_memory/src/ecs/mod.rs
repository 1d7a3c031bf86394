//! Entity bookkeeping backed by the allocator layer

mod entity;
mod lookup_table;

pub use entity::{ComponentSet, Entity, MAX_COMPONENTS};
pub use lookup_table::{EntityLookupTable, Iter, LookupError};
