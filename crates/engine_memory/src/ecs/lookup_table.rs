//! Entity lookup table
//!
//! Separate-chaining hash table from [`Entity`] to its enabled
//! [`ComponentSet`]. The bucket heads are a fixed array in the permanent
//! arena. Chain nodes come from a [`PoolAllocator`], since entities are
//! created and destroyed in any order and a bump allocator could never reuse
//! their memory.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use thiserror::Error;

use super::entity::{ComponentSet, Entity};
use crate::foundation::memory::{Arena, ArenaVec, PoolAllocator, PoolError};

/// Lookup table errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Node pool could not be created
    #[error("Node pool error: {0}")]
    Pool(#[from] PoolError),

    /// Every node is in use
    #[error("Entity lookup table is full ({capacity} entities)")]
    Exhausted {
        /// Maximum number of entities
        capacity: usize,
    },

    /// A table needs at least one bucket
    #[error("Entity lookup table needs at least one bucket")]
    NoBuckets,

    /// The arena cannot hold the bucket array
    #[error("Arena cannot hold {bucket_count} bucket heads")]
    BucketStorage {
        /// Requested number of buckets
        bucket_count: usize,
    },
}

type Link = Option<NonNull<Node>>;

struct Node {
    entity: Entity,
    components: ComponentSet,
    next: Link,
}

/// Map from entities to their enabled components.
pub struct EntityLookupTable<'a> {
    buckets: ArenaVec<'a, Link>,
    nodes: PoolAllocator,
    len: usize,
}

impl<'a> EntityLookupTable<'a> {
    /// Create a table with `bucket_count` chains in `arena` and room for
    /// `node_capacity` entities.
    pub fn new(arena: &'a Arena, bucket_count: usize, node_capacity: usize) -> Result<Self, LookupError> {
        if bucket_count == 0 {
            return Err(LookupError::NoBuckets);
        }

        let mut buckets = arena.new_vec();
        buckets
            .try_reserve_exact(bucket_count)
            .map_err(|_| LookupError::BucketStorage { bucket_count })?;
        buckets.resize(bucket_count, None);

        let nodes = PoolAllocator::for_type::<Node>(node_capacity)?;
        log::debug!(
            "Created entity lookup table with {} buckets and {} nodes",
            bucket_count,
            node_capacity
        );

        Ok(Self { buckets, nodes, len: 0 })
    }

    /// Number of entities in the table
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the table is empty
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chains
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Maximum number of entities
    pub const fn capacity(&self) -> usize {
        self.nodes.chunk_count()
    }

    fn bucket_of(&self, entity: Entity) -> usize {
        entity.id() as usize % self.buckets.len()
    }

    fn find(&self, entity: Entity) -> Option<NonNull<Node>> {
        let mut link = self.buckets[self.bucket_of(entity)];
        while let Some(node) = link {
            // SAFETY: linked nodes are initialized pool chunks owned by `self`.
            let node_ref = unsafe { node.as_ref() };
            if node_ref.entity == entity {
                return Some(node);
            }
            link = node_ref.next;
        }
        None
    }

    /// Set the components of `entity`, returning the previous set if the
    /// entity was already present.
    pub fn insert(&mut self, entity: Entity, components: ComponentSet) -> Result<Option<ComponentSet>, LookupError> {
        if let Some(mut node) = self.find(entity) {
            // SAFETY: see `find`; `&mut self` makes this the only access.
            let node = unsafe { node.as_mut() };
            return Ok(Some(std::mem::replace(&mut node.components, components)));
        }

        let chunk = self.nodes.allocate().map_err(|_| {
            log::warn!("Entity lookup table full, cannot insert {}", entity);
            LookupError::Exhausted {
                capacity: self.capacity(),
            }
        })?;

        let bucket = self.bucket_of(entity);
        let node = chunk.cast::<Node>();
        // SAFETY: the chunk is sized and aligned for `Node` and unused.
        unsafe {
            node.as_ptr().write(Node {
                entity,
                components,
                next: self.buckets[bucket],
            });
        }
        self.buckets[bucket] = Some(node);
        self.len += 1;
        Ok(None)
    }

    /// Components of `entity`
    pub fn get(&self, entity: Entity) -> Option<ComponentSet> {
        // SAFETY: see `find`.
        self.find(entity).map(|node| unsafe { node.as_ref().components })
    }

    /// Mutable components of `entity`
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut ComponentSet> {
        // SAFETY: see `find`; the borrow is tied to `&mut self`.
        self.find(entity)
            .map(|mut node| unsafe { &mut node.as_mut().components })
    }

    /// Whether `entity` is present
    pub fn contains(&self, entity: Entity) -> bool {
        self.find(entity).is_some()
    }

    /// Remove `entity` and return its components.
    pub fn remove(&mut self, entity: Entity) -> Option<ComponentSet> {
        let bucket = self.bucket_of(entity);
        let mut prev: Link = None;
        let mut link = self.buckets[bucket];

        while let Some(node) = link {
            // SAFETY: see `find`.
            let Node { entity: found, components, next } = unsafe { node.as_ptr().read() };
            if found == entity {
                match prev {
                    // SAFETY: `prev` is a live node in the same chain.
                    Some(mut p) => unsafe { p.as_mut().next = next },
                    None => self.buckets[bucket] = next,
                }
                if let Err(e) = self.nodes.deallocate(node.cast()) {
                    log::error!("Failed to return node for {} to the pool: {}", entity, e);
                }
                self.len -= 1;
                return Some(components);
            }
            prev = link;
            link = next;
        }
        None
    }

    /// Drop every entity.
    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|head| *head = None);
        self.nodes.reset();
        self.len = 0;
    }

    /// Iterate over `(entity, components)` pairs in bucket order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            buckets: self.buckets.as_slice(),
            current: None,
            _table: PhantomData,
        }
    }
}

impl fmt::Debug for EntityLookupTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'t> IntoIterator for &'t EntityLookupTable<'_> {
    type Item = (Entity, ComponentSet);
    type IntoIter = Iter<'t>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over an [`EntityLookupTable`]
pub struct Iter<'t> {
    buckets: &'t [Link],
    current: Link,
    _table: PhantomData<&'t Node>,
}

impl Iterator for Iter<'_> {
    type Item = (Entity, ComponentSet);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.current {
                // SAFETY: the table is borrowed for `'t`, so the chain is stable.
                let node = unsafe { node.as_ref() };
                self.current = node.next;
                return Some((node.entity, node.components));
            }
            let (head, rest) = self.buckets.split_first()?;
            self.current = *head;
            self.buckets = rest;
        }
    }
}
