//! Engine memory context and frame loop
//!
//! The engine owns three allocators, sized from [`MemoryConfig`]:
//!
//! - the **permanent** arena, never cleared, lent to the application for its
//!   whole life;
//! - the **temporary** arena, cleared at the top of every frame;
//! - the **scratch** stack, also reset every frame, for nested LIFO scratch
//!   work inside a frame.
//!
//! There is no global allocator state. Everything is reached through the
//! [`Frame`] handed to the application.

use thiserror::Error;

use crate::application::Application;
use crate::config::{ConfigError, MemoryConfig};
use crate::ecs::{EntityLookupTable, LookupError};
use crate::foundation::memory::{Arena, ArenaError, StackAllocator, StackError};

/// Owner of the engine's allocators.
#[derive(Debug)]
pub struct EngineMemory {
    permanent: Arena,
    frames: FrameMemory,
    config: MemoryConfig,
}

/// Allocators that are reset every frame.
#[derive(Debug)]
pub struct FrameMemory {
    temporary: Arena,
    scratch: StackAllocator,
    frame_index: u64,
}

impl EngineMemory {
    /// Create every allocator described by `config`.
    pub fn new(config: &MemoryConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let permanent = Arena::new(config.permanent_arena_bytes)?;
        let temporary = Arena::new(config.temporary_arena_bytes)?;
        let scratch = StackAllocator::new(config.scratch_stack_bytes)?;

        log::info!(
            "Engine memory: {} byte permanent arena, {} byte temporary arena, {} byte scratch stack",
            permanent.capacity(),
            temporary.capacity(),
            scratch.capacity()
        );

        Ok(Self {
            permanent,
            frames: FrameMemory {
                temporary,
                scratch,
                frame_index: 0,
            },
            config: config.clone(),
        })
    }

    /// Arena that lives as long as the engine
    pub const fn permanent(&self) -> &Arena {
        &self.permanent
    }

    /// Per-frame allocators
    pub const fn frames(&self) -> &FrameMemory {
        &self.frames
    }

    /// Configuration the allocators were sized from
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Borrow the permanent arena and the per-frame allocators separately.
    ///
    /// The permanent borrow can be held across frames while
    /// [`FrameMemory::begin_frame`] keeps resetting the rest.
    pub fn split(&mut self) -> (&Arena, &mut FrameMemory) {
        (&self.permanent, &mut self.frames)
    }

    /// Start a frame. See [`FrameMemory::begin_frame`].
    pub fn begin_frame(&mut self) -> Frame<'_> {
        let (permanent, frames) = self.split();
        frames.begin_frame(permanent)
    }

    /// Entity lookup table in the permanent arena, sized from the config.
    pub fn new_lookup_table(&self) -> Result<EntityLookupTable<'_>, LookupError> {
        EntityLookupTable::new(&self.permanent, self.config.lookup_buckets, self.config.lookup_nodes)
    }
}

impl FrameMemory {
    /// Frames started so far
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Per-frame arena
    pub const fn temporary(&self) -> &Arena {
        &self.temporary
    }

    /// Per-frame scratch stack
    pub const fn scratch(&self) -> &StackAllocator {
        &self.scratch
    }

    /// Clear the temporary arena and scratch stack and start a new frame.
    pub fn begin_frame<'f>(&'f mut self, permanent: &'f Arena) -> Frame<'f> {
        let stats = self.temporary.stats();
        log::trace!(
            "Frame {}: temporary arena used {} of {} bytes (high-water {})",
            self.frame_index,
            stats.used,
            stats.capacity,
            stats.high_water_mark
        );

        self.temporary.clear();
        self.scratch.clear();
        self.frame_index += 1;

        Frame {
            index: self.frame_index,
            temporary: &self.temporary,
            scratch: &self.scratch,
            permanent,
        }
    }
}

/// Allocators available during one frame.
///
/// Everything allocated through `temporary` or `scratch` is gone when the
/// next frame starts.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'f> {
    index: u64,
    temporary: &'f Arena,
    scratch: &'f StackAllocator,
    permanent: &'f Arena,
}

impl<'f> Frame<'f> {
    /// 1-based frame number
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Arena cleared at the start of the next frame
    pub const fn temporary(&self) -> &'f Arena {
        self.temporary
    }

    /// Scratch stack reset at the start of the next frame
    pub const fn scratch(&self) -> &'f StackAllocator {
        self.scratch
    }

    /// Arena that is never cleared
    pub const fn permanent(&self) -> &'f Arena {
        self.permanent
    }
}

/// Main engine struct
///
/// Owns the memory context and drives an [`Application`] through the frame
/// loop.
#[derive(Debug)]
pub struct Engine {
    memory: EngineMemory,
}

impl Engine {
    /// Create a new engine instance
    pub fn new(config: &MemoryConfig) -> Result<Self, EngineError> {
        log::info!("Initializing engine...");
        let memory = EngineMemory::new(config)
            .map_err(|e| EngineError::InitializationFailed(format!("Memory: {}", e)))?;
        Ok(Self { memory })
    }

    /// Engine memory context
    pub const fn memory(&self) -> &EngineMemory {
        &self.memory
    }

    /// Mutable engine memory context
    pub fn memory_mut(&mut self) -> &mut EngineMemory {
        &mut self.memory
    }

    /// Run the main loop with `app`.
    ///
    /// Runs until `update` returns `false` or `max_frames` frames have run,
    /// and returns the number of frames completed. The permanent arena is
    /// lent to the application for as long as the engine is borrowed.
    pub fn run<'p, A: Application<'p>>(&'p mut self, app: &mut A, max_frames: Option<u64>) -> Result<u64, EngineError> {
        let (permanent, frames) = self.memory.split();

        app.initialize(permanent)
            .map_err(|e| EngineError::ApplicationError(format!("App initialization: {}", e)))?;

        log::info!("Starting main loop...");

        let mut completed = 0;
        while max_frames.map_or(true, |max| completed < max) {
            let frame = frames.begin_frame(permanent);
            let keep_running = app
                .update(&frame)
                .map_err(|e| EngineError::ApplicationError(format!("App update (frame {}): {}", frame.index(), e)))?;
            completed += 1;
            if !keep_running {
                break;
            }
        }

        app.cleanup();

        log::info!("Engine shutdown complete after {} frames", completed);
        Ok(completed)
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Application error
    #[error("Application error: {0}")]
    ApplicationError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Arena creation failed
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),

    /// Stack creation failed
    #[error("Stack error: {0}")]
    Stack(#[from] StackError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppError;

    fn small_config() -> MemoryConfig {
        MemoryConfig {
            temporary_arena_bytes: 1024,
            permanent_arena_bytes: 1024,
            scratch_stack_bytes: 256,
            lookup_buckets: 4,
            lookup_nodes: 8,
        }
    }

    #[test]
    fn test_begin_frame_clears_temporary_memory() {
        let mut memory = EngineMemory::new(&small_config()).unwrap();
        let first_addr = {
            let frame = memory.begin_frame();
            assert_eq!(frame.index(), 1);
            frame.temporary().push(100).as_ptr()
        };
        assert_eq!(memory.frames().temporary().used(), 100);

        let frame = memory.begin_frame();
        assert_eq!(frame.index(), 2);
        assert_eq!(frame.temporary().used(), 0);
        assert_eq!(frame.temporary().push(10).as_ptr(), first_addr);
    }

    #[test]
    fn test_permanent_survives_frames() {
        let mut memory = EngineMemory::new(&small_config()).unwrap();
        let (permanent, frames) = memory.split();
        let name = permanent.push_str("ship");
        for _ in 0..3 {
            let frame = frames.begin_frame(permanent);
            frame.temporary().push(512);
        }
        assert_eq!(name, "ship");
        assert_eq!(permanent.used(), 4);
    }

    #[test]
    fn test_scratch_is_reset_each_frame() {
        let mut memory = EngineMemory::new(&small_config()).unwrap();
        {
            let frame = memory.begin_frame();
            frame.scratch().allocate_raw(64, 8).unwrap();
        }
        assert_eq!(memory.frames().scratch().used(), 64);
        let frame = memory.begin_frame();
        assert_eq!(frame.scratch().used(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MemoryConfig {
            temporary_arena_bytes: 0,
            ..small_config()
        };
        assert!(matches!(EngineMemory::new(&config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_lookup_table_from_config() {
        let memory = EngineMemory::new(&small_config()).unwrap();
        let table = memory.new_lookup_table().unwrap();
        assert_eq!(table.bucket_count(), 4);
        assert_eq!(table.capacity(), 8);
        assert!(memory.permanent().used() > 0);
    }

    struct CountingApp<'p> {
        permanent: Option<&'p Arena>,
        frames_seen: u64,
        stop_after: u64,
        cleaned_up: bool,
    }

    impl<'p> Application<'p> for CountingApp<'p> {
        fn initialize(&mut self, permanent: &'p Arena) -> Result<(), AppError> {
            permanent.push_str("initialized");
            self.permanent = Some(permanent);
            Ok(())
        }

        fn update(&mut self, frame: &Frame<'_>) -> Result<bool, AppError> {
            assert_eq!(frame.temporary().used(), 0);
            frame.temporary().push(32);
            self.frames_seen += 1;
            Ok(self.frames_seen < self.stop_after)
        }

        fn cleanup(&mut self) {
            self.cleaned_up = true;
        }
    }

    #[test]
    fn test_run_stops_when_update_returns_false() {
        let mut engine = Engine::new(&small_config()).unwrap();
        let mut app = CountingApp {
            permanent: None,
            frames_seen: 0,
            stop_after: 3,
            cleaned_up: false,
        };
        let frames = engine.run(&mut app, Some(10)).unwrap();
        assert_eq!(frames, 3);
        assert!(app.cleaned_up);
        assert_eq!(app.permanent.map(Arena::used), Some(11));
    }

    #[test]
    fn test_run_respects_frame_limit() {
        let mut engine = Engine::new(&small_config()).unwrap();
        let mut app = CountingApp {
            permanent: None,
            frames_seen: 0,
            stop_after: u64::MAX,
            cleaned_up: false,
        };
        assert_eq!(engine.run(&mut app, Some(5)).unwrap(), 5);
    }

    struct FailingApp;

    impl<'p> Application<'p> for FailingApp {
        fn initialize(&mut self, _permanent: &'p Arena) -> Result<(), AppError> {
            Ok(())
        }

        fn update(&mut self, _frame: &Frame<'_>) -> Result<bool, AppError> {
            Err(AppError::Custom("boom".to_string()))
        }
    }

    #[test]
    fn test_update_error_stops_the_loop() {
        let mut engine = Engine::new(&small_config()).unwrap();
        let err = engine.run(&mut FailingApp, None).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
