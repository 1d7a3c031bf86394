//! Configuration system
//!
//! Configs are plain serde structs loaded from TOML or RON, picked by file
//! extension. Missing fields fall back to their defaults.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

const MIB: usize = 1024 * 1024;

/// Sizes of the engine's memory regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Per-frame arena, cleared at the top of every frame
    pub temporary_arena_bytes: usize,
    /// Arena for allocations that live as long as the engine
    pub permanent_arena_bytes: usize,
    /// LIFO scratch stack, also cleared every frame
    pub scratch_stack_bytes: usize,
    /// Chains in the entity lookup table
    pub lookup_buckets: usize,
    /// Maximum live entities in the lookup table
    pub lookup_nodes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            temporary_arena_bytes: 64 * MIB,
            permanent_arena_bytes: 64 * MIB,
            scratch_stack_bytes: MIB,
            lookup_buckets: 16,
            lookup_nodes: 1024,
        }
    }
}

impl MemoryConfig {
    /// Check that every size is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("temporary_arena_bytes", self.temporary_arena_bytes),
            ("permanent_arena_bytes", self.permanent_arena_bytes),
            ("scratch_stack_bytes", self.scratch_stack_bytes),
            ("lookup_buckets", self.lookup_buckets),
            ("lookup_nodes", self.lookup_nodes),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        Ok(())
    }
}

impl Config for MemoryConfig {}
