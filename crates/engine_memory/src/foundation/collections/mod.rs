//! Collections built on the allocator layer

mod array_ref;
mod arena_string;
mod dyn_array;

pub use array_ref::ArrayRef;
pub use arena_string::ArenaString;
pub use dyn_array::DynArray;
