//! Foundation module - Core utilities and types
//!
//! - Memory management (regions, arenas, stacks, pools)
//! - Collections built on top of it
//! - File reads into temporary memory
//! - Logging utilities

pub mod collections;
pub mod fileio;
pub mod logging;
pub mod memory;
