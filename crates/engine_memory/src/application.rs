//! Application trait and lifecycle management

use thiserror::Error;

use crate::ecs::LookupError;
use crate::engine::{EngineError, Frame};
use crate::foundation::fileio::FileError;
use crate::foundation::memory::{Arena, ArenaError, PoolError, StackError};

/// Application lifecycle trait
///
/// Implement this trait to drive the engine's frame loop. `'p` is the
/// lifetime of the permanent arena, which the application may keep
/// allocations from across frames.
pub trait Application<'p> {
    /// Initialize the application
    ///
    /// Called once before the first frame with the permanent arena.
    fn initialize(&mut self, permanent: &'p Arena) -> Result<(), AppError>;

    /// Update the application
    ///
    /// Called every frame with freshly cleared temporary memory. Return
    /// `Ok(false)` to stop the loop.
    fn update(&mut self, frame: &Frame<'_>) -> Result<bool, AppError>;

    /// Cleanup the application
    ///
    /// Called after the last frame.
    fn cleanup(&mut self) {}
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Arena error
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),

    /// Stack allocator error
    #[error("Stack error: {0}")]
    Stack(#[from] StackError),

    /// Pool allocator error
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Entity lookup error
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// File loading error
    #[error("File error: {0}")]
    File(#[from] FileError),
}
