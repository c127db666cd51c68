//! The in-memory block world.
//!
//! [`BlockWorld`] is the simulation surface the tracker mutates. It exposes
//! exactly the operations the tracking engine needs from a world:
//!
//! - **Snapshot** the current state at a position ([`BlockWorld::snapshot`]).
//! - **Raw write** without side effects ([`BlockWorld::set_raw`]), used for
//!   provisional writes during capture and for restoring originals on
//!   rollback.
//! - **Apply** a state with [`BlockFlags`] ([`BlockWorld::apply`]), which
//!   writes the state and, when requested, runs neighbor reactions and returns
//!   the follow-up changes they propose. The world never applies reaction
//!   output itself: the caller decides whether those changes are captured or
//!   applied.
//!
//! Reactions are plain function pointers registered by name, evaluated for
//! each of the six neighbors of a changed position in registration order.
//! The first reaction that returns `Some` for a neighbor wins.

use std::collections::BTreeMap;

use crate::block::{BlockFlags, BlockSnapshot, BlockState};
use crate::entity::{Entity, EntityAllocator, EntityId, ItemStack, PendingEntity};
use crate::identity::Attribution;
use crate::position::BlockPos;
use crate::WorldError;

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

/// A follow-up change proposed by a neighbor reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// The state the neighbor should take.
    pub state: BlockState,
    /// Items the neighbor drops at its own position when the change applies.
    pub drops: Vec<ItemStack>,
}

impl Reaction {
    pub fn new(state: BlockState) -> Self {
        Self {
            state,
            drops: Vec::new(),
        }
    }

    pub fn with_drop(mut self, stack: ItemStack) -> Self {
        self.drops.push(stack);
        self
    }
}

/// A neighbor reaction: given the world, the block that just changed, and one
/// of its neighbors, optionally propose a new state for the neighbor.
pub type ReactionFn = fn(&BlockWorld, &BlockSnapshot, &BlockSnapshot) -> Option<Reaction>;

#[derive(Debug)]
struct RegisteredReaction {
    name: String,
    func: ReactionFn,
}

// ---------------------------------------------------------------------------
// BlockWorld
// ---------------------------------------------------------------------------

/// Sparse block storage plus entities and per-position ownership.
///
/// Positions not present in the store are air.
#[derive(Debug, Default)]
pub struct BlockWorld {
    pub(crate) blocks: BTreeMap<BlockPos, BlockState>,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) allocator: EntityAllocator,
    pub(crate) ownership: BTreeMap<BlockPos, Attribution>,
    reactions: Vec<RegisteredReaction>,
    write_count: u64,
}

impl BlockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    // -- blocks -------------------------------------------------------------

    /// The state at `pos` (air if nothing is stored).
    pub fn block(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self, pos: BlockPos) -> BlockSnapshot {
        BlockSnapshot::new(pos, self.block(pos))
    }

    /// Write `state` at `pos` with no side effects. Returns the previous
    /// snapshot.
    pub fn set_raw(&mut self, pos: BlockPos, state: BlockState) -> BlockSnapshot {
        self.write_count += 1;
        let previous = if state.is_air() {
            self.blocks.remove(&pos)
        } else {
            self.blocks.insert(pos, state)
        };
        BlockSnapshot::new(pos, previous.unwrap_or_default())
    }

    /// Write a snapshot's state back to its position with no side effects.
    pub fn restore(&mut self, snapshot: &BlockSnapshot) {
        self.set_raw(snapshot.pos, snapshot.state.clone());
        if snapshot.state.is_air() {
            self.ownership.remove(&snapshot.pos);
        }
    }

    /// Apply a snapshot's state with the given flags.
    ///
    /// Returns the neighbor reactions triggered by the change when
    /// `flags.notify_neighbors` is set, in neighbor order.
    pub fn apply(&mut self, snapshot: &BlockSnapshot, flags: BlockFlags) -> Vec<(BlockPos, Reaction)> {
        self.set_raw(snapshot.pos, snapshot.state.clone());
        if snapshot.state.is_air() {
            self.ownership.remove(&snapshot.pos);
        }
        if flags.notify_neighbors {
            self.neighbor_reactions(snapshot)
        } else {
            Vec::new()
        }
    }

    /// Evaluate registered reactions for the six neighbors of `changed`.
    pub fn neighbor_reactions(&self, changed: &BlockSnapshot) -> Vec<(BlockPos, Reaction)> {
        let mut out = Vec::new();
        if self.reactions.is_empty() {
            return out;
        }
        for npos in changed.pos.neighbors() {
            let neighbor = self.snapshot(npos);
            for rule in &self.reactions {
                if let Some(reaction) = (rule.func)(self, changed, &neighbor) {
                    tracing::trace!(
                        reaction = %rule.name,
                        changed = %changed,
                        neighbor = %neighbor,
                        proposed = %reaction.state,
                        "neighbor reaction fired"
                    );
                    out.push((npos, reaction));
                    break;
                }
            }
        }
        out
    }

    /// Register a neighbor reaction.
    ///
    /// # Panics
    ///
    /// Panics if a reaction with the same name is already registered.
    pub fn register_reaction(&mut self, name: &str, func: ReactionFn) {
        assert!(
            !self.reactions.iter().any(|r| r.name == name),
            "duplicate reaction name: {name:?}"
        );
        self.reactions.push(RegisteredReaction {
            name: name.to_owned(),
            func,
        });
    }

    pub fn reaction_names(&self) -> Vec<&str> {
        self.reactions.iter().map(|r| r.name.as_str()).collect()
    }

    /// Number of non-air blocks stored.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total raw writes performed since creation.
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    // -- ownership ----------------------------------------------------------

    /// Creator/notifier recorded for `pos`.
    pub fn ownership(&self, pos: BlockPos) -> Attribution {
        self.ownership.get(&pos).copied().unwrap_or_default()
    }

    /// Record attribution for a position. Set fields in `attribution`
    /// overwrite the stored ones; unset fields leave them untouched.
    pub fn stamp_ownership(&mut self, pos: BlockPos, attribution: Attribution) {
        if attribution.is_empty() {
            return;
        }
        let entry = self.ownership.entry(pos).or_default();
        *entry = attribution.or(*entry);
    }

    // -- entities -----------------------------------------------------------

    /// Materialize a pending entity and return its new ID.
    pub fn spawn_entity(&mut self, pending: PendingEntity) -> EntityId {
        let id = self.allocator.allocate();
        self.entities.insert(
            id,
            Entity {
                id,
                kind: pending.kind,
                pos: pending.pos,
                attribution: pending.attribution,
            },
        );
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Result<Entity, WorldError> {
        if !self.allocator.deallocate(id) {
            return Err(WorldError::StaleEntity { entity: id });
        }
        self.entities
            .remove(&id)
            .ok_or(WorldError::StaleEntity { entity: id })
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    /// All entities in ID order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
