//! Entity and component-set types

use std::fmt;

/// Number of distinct component ids a [`ComponentSet`] can hold
pub const MAX_COMPONENTS: u8 = 32;

/// Entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: u32,
}

impl Entity {
    /// Create an entity with the given ID
    pub const fn new(id: u32) -> Self {
        Self { id }
    }

    /// Get the entity ID
    pub const fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.id)
    }
}

/// Set of enabled component ids, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentSet(u32);

impl ComponentSet {
    /// Set with no components
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// This set plus `component`
    pub const fn with(self, component: u8) -> Self {
        Self(self.0 | bit(component))
    }

    /// Enable `component`
    pub fn insert(&mut self, component: u8) {
        self.0 |= bit(component);
    }

    /// Disable `component`
    pub fn remove(&mut self, component: u8) {
        self.0 &= !bit(component);
    }

    /// Whether `component` is enabled
    pub const fn contains(self, component: u8) -> bool {
        self.0 & bit(component) != 0
    }

    /// Whether every component of `other` is enabled here
    pub const fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no component is enabled
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

const fn bit(component: u8) -> u32 {
    assert!(component < MAX_COMPONENTS, "component id out of range");
    1 << component
}
