//! Entity identifiers, allocation, and entity payloads.
//!
//! An [`EntityId`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. The generation is bumped
//! every time an index is recycled, which allows immediate stale-ID detection.
//!
//! A [`PendingEntity`] is an entity that has been requested but not yet
//! materialized: it has no ID until the world spawns it. Spawn events carry
//! pending entities so listeners can veto them before they exist.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::identity::Attribution;
use crate::position::BlockPos;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct an `EntityId` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`EntityId`]s with generational tracking.
///
/// Free indices are kept in a FIFO queue so that generations are spread out
/// over time rather than concentrated on a hot index.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_indices: VecDeque<u32>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            alive: Vec::new(),
            free_indices: VecDeque::new(),
        }
    }

    /// Allocate a fresh [`EntityId`], reusing a recycled index when one is
    /// available.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free_indices.pop_front() {
            // Generation was already bumped on deallocate.
            self.alive[index as usize] = true;
            EntityId::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            EntityId::new(index, 0)
        }
    }

    /// Release an entity, bumping the generation for its index so that
    /// outstanding handles become stale.
    ///
    /// Returns `false` if the entity was already dead or the handle is stale.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_indices.push_back(id.index());
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index() as usize;
        if idx >= self.generations.len() {
            return false;
        }
        self.alive[idx] && self.generations[idx] == id.generation()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    /// Capture `(generations, alive, free_indices)` for snapshot/restore.
    pub fn snapshot_state(&self) -> (Vec<u32>, Vec<bool>, Vec<u32>) {
        let free: Vec<u32> = self.free_indices.iter().copied().collect();
        (self.generations.clone(), self.alive.clone(), free)
    }

    /// Rebuild an allocator exactly as captured by [`snapshot_state`](Self::snapshot_state).
    pub fn restore_from_snapshot(
        generations: Vec<u32>,
        alive: Vec<bool>,
        free_indices: Vec<u32>,
    ) -> Self {
        Self {
            generations,
            alive,
            free_indices: VecDeque::from(free_indices),
        }
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ItemStack
// ---------------------------------------------------------------------------

/// A stack of identical items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, count: u32) -> Self {
        Self {
            item: item.into(),
            count,
        }
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.count, self.item)
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// What an entity is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A dropped item lying in the world.
    Item(ItemStack),
    /// An experience orb worth `amount` points.
    Experience { amount: u32 },
    /// Any living or non-living mob, by type name (`"zombie"`, `"arrow"`).
    Mob(String),
}

impl EntityKind {
    pub fn is_item(&self) -> bool {
        matches!(self, EntityKind::Item(_))
    }

    pub fn is_experience(&self) -> bool {
        matches!(self, EntityKind::Experience { .. })
    }

    /// Short type name for logs and journal records.
    pub fn type_name(&self) -> &str {
        match self {
            EntityKind::Item(_) => "item",
            EntityKind::Experience { .. } => "experience_orb",
            EntityKind::Mob(name) => name,
        }
    }
}

// ---------------------------------------------------------------------------
// PendingEntity
// ---------------------------------------------------------------------------

/// An entity requested but not yet spawned into the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntity {
    pub kind: EntityKind,
    pub pos: BlockPos,
    pub attribution: Attribution,
}

impl PendingEntity {
    pub fn new(kind: EntityKind, pos: BlockPos) -> Self {
        Self {
            kind,
            pos,
            attribution: Attribution::NONE,
        }
    }

    /// An item entity holding `stack`.
    pub fn item(stack: ItemStack, pos: BlockPos) -> Self {
        Self::new(EntityKind::Item(stack), pos)
    }

    pub fn experience(amount: u32, pos: BlockPos) -> Self {
        Self::new(EntityKind::Experience { amount }, pos)
    }

    pub fn mob(name: impl Into<String>, pos: BlockPos) -> Self {
        Self::new(EntityKind::Mob(name.into()), pos)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A materialized entity living in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pos: BlockPos,
    pub attribution: Attribution,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<EntityId> = (0..100).map(|_| alloc.allocate()).collect();
        let mut indices: Vec<u32> = ids.iter().map(|id| id.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 100);
    }

    #[test]
    fn generation_increments_on_recycle() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert_eq!(e0.generation(), 0);
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), 1);
    }

    #[test]
    fn stale_id_detection() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert!(alloc.deallocate(e0));
        let _e1 = alloc.allocate();
        assert!(!alloc.is_alive(e0), "stale ID still not alive after recycle");
        assert!(!alloc.deallocate(e0));
    }

    #[test]
    fn alive_count_tracks_correctly() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        let _e1 = alloc.allocate();
        assert_eq!(alloc.alive_count(), 2);
        alloc.deallocate(e0);
        assert_eq!(alloc.alive_count(), 1);
    }

    #[test]
    fn entity_kind_predicates() {
        let item = PendingEntity::item(ItemStack::new("torch", 1), BlockPos::ORIGIN);
        let orb = PendingEntity::experience(5, BlockPos::ORIGIN);
        let mob = PendingEntity::mob("zombie", BlockPos::ORIGIN);
        assert!(item.kind.is_item());
        assert!(orb.kind.is_experience());
        assert_eq!(mob.kind.type_name(), "zombie");
        assert!(item.attribution.is_empty());
    }

    #[test]
    fn entity_id_roundtrip_and_ordering() {
        let id = EntityId::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
        assert!(EntityId::new(1, 0) < EntityId::new(0, 1));
    }
}
