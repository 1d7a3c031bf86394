//! # Engine Memory
//!
//! The memory layer of a real-time rendering engine: region-backed arena,
//! stack and pool allocators, container adapters, and the small consumers
//! that exercise them the way the engine does.
//!
//! ## Features
//!
//! - **Arena**: bump allocation with marks, scratch scopes and wholesale clear
//! - **StackAllocator**: LIFO allocation with markers and scoped handles
//! - **PoolAllocator**: fixed-size chunks released in any order
//! - **Adapters**: arena- and stack-backed `allocator_api2` containers
//! - **Frame loop**: temporary and permanent arenas owned by the engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use engine_memory::prelude::*;
//!
//! struct MyApp;
//!
//! impl<'p> Application<'p> for MyApp {
//!     fn initialize(&mut self, permanent: &'p Arena) -> Result<(), AppError> {
//!         permanent.push_str("loaded once");
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, frame: &Frame<'_>) -> Result<bool, AppError> {
//!         let extensions = frame.temporary().push_slice::<u32>(4);
//!         extensions.fill(1);
//!         Ok(frame.index() < 60)
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(&MemoryConfig::default())?;
//!     engine.run(&mut MyApp, None)?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod config;
pub mod ecs;
pub mod engine;
pub mod foundation;

/// Common imports for engine users
pub mod prelude {
    pub use crate::application::{AppError, Application};
    pub use crate::config::{Config, ConfigError, MemoryConfig};
    pub use crate::ecs::{ComponentSet, Entity, EntityLookupTable, LookupError};
    pub use crate::engine::{Engine, EngineError, EngineMemory, Frame};
    pub use crate::foundation::collections::{ArenaString, ArrayRef, DynArray};
    pub use crate::foundation::memory::{
        Arena, ArenaAlloc, ArenaError, ArenaMark, ArenaVec, PoolAllocator, PoolError, ScopedAlloc, StackAlloc,
        StackAllocator, StackError, StackMarker, StackVec,
    };
}
