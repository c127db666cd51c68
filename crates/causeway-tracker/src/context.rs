//! Phase contexts: cause slots plus lazily allocated capture buffers.
//!
//! A [`PhaseContext`] is built immediately before its phase is pushed:
//!
//! ```
//! use causeway_tracker::prelude::*;
//! use causeway_world::prelude::*;
//!
//! let mut tracker = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
//! PhaseContext::new(PhaseState::Command)
//!     .with_cause(SOURCE, UserId(7))
//!     .with_cause(COMMAND, "fill 0 0 0 4 4 4 stone")
//!     .complete()
//!     .push(&mut tracker)?;
//! assert_eq!(tracker.current_state(), PhaseState::Command);
//! tracker.pop_and_unwind()?;
//! # Ok::<(), TrackerError>(())
//! ```
//!
//! [`complete`](PhaseContext::complete) consumes the builder and returns a
//! [`CompletedPhase`], the only thing the tracker accepts on push. A context
//! therefore cannot be pushed half-built, and cannot be completed twice.
//!
//! Buffers start absent. The first capture into a buffer allocates it and
//! draining it releases it again, so an absent buffer always means "nothing
//! happened".

use std::collections::BTreeMap;

use causeway_world::block::BlockFlags;
use causeway_world::entity::{EntityId, ItemStack, PendingEntity};
use causeway_world::identity::{Attribution, UserId};
use causeway_world::position::BlockPos;
use serde::{Deserialize, Serialize};

use crate::cause::{CauseKey, CauseType, CauseValue, NamedCause, NOTIFIER, OWNER, SOURCE, UNWINDING_STATE};
use crate::error::TrackerError;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::transaction::BlockTransaction;

// ---------------------------------------------------------------------------
// Buffer entries
// ---------------------------------------------------------------------------

/// A captured block write and the flags it was requested with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBlock {
    pub transaction: BlockTransaction,
    pub flags: BlockFlags,
}

/// An item stack waiting to become an item entity at `pos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDrop {
    pub stack: ItemStack,
    pub pos: BlockPos,
}

impl ItemDrop {
    pub fn new(stack: ItemStack, pos: BlockPos) -> Self {
        Self { stack, pos }
    }

    pub fn into_pending(self) -> PendingEntity {
        PendingEntity::item(self.stack, self.pos)
    }
}

/// Number of entries held in each buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCounts {
    pub blocks: usize,
    pub entities: usize,
    pub items: usize,
    pub block_drops: usize,
    pub entity_drops: usize,
}

impl BufferCounts {
    pub fn total(&self) -> usize {
        self.blocks + self.entities + self.items + self.block_drops + self.entity_drops
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::fmt::Display for BufferCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "blocks={} entities={} items={} block_drops={} entity_drops={}",
            self.blocks, self.entities, self.items, self.block_drops, self.entity_drops
        )
    }
}

// ---------------------------------------------------------------------------
// PhaseContext
// ---------------------------------------------------------------------------

/// The capture frame of one phase.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    state: PhaseState,
    causes: Vec<NamedCause>,
    blocks: Option<Vec<CapturedBlock>>,
    entities: Option<Vec<PendingEntity>>,
    items: Option<Vec<ItemDrop>>,
    block_drops: Option<BTreeMap<BlockPos, Vec<ItemStack>>>,
    entity_drops: Option<BTreeMap<EntityId, Vec<ItemDrop>>>,
}

impl PhaseContext {
    /// Start building a context for `state`.
    pub fn new(state: PhaseState) -> Self {
        Self {
            state,
            causes: Vec::new(),
            blocks: None,
            entities: None,
            items: None,
            block_drops: None,
            entity_drops: None,
        }
    }

    /// The context a post-unwind frame uses while `state` unwinds: the
    /// unwinding state first, then a copy of `source`'s slots.
    pub(crate) fn post_unwind(state: PhaseState, source: &PhaseContext) -> Self {
        let mut ctx = PhaseContext::new(PhaseState::PostUnwind);
        ctx.set_cause(UNWINDING_STATE, state);
        for entry in source.causes.iter().filter(|c| c.name != UNWINDING_STATE) {
            ctx.set_cause(entry.name, entry.value.clone());
        }
        ctx
    }

    /// Set a cause slot.
    ///
    /// Setting a key that is already present replaces its value in place and
    /// keeps the slot's original position: last write wins.
    pub fn with_cause(mut self, key: CauseKey, value: impl Into<CauseValue>) -> Self {
        self.set_cause(key, value);
        self
    }

    pub fn set_cause(&mut self, key: CauseKey, value: impl Into<CauseValue>) {
        let value = value.into();
        match self.causes.iter_mut().find(|c| c.name == key) {
            Some(slot) => slot.value = value,
            None => self.causes.push(NamedCause { name: key, value }),
        }
    }

    /// Finish building. The returned value is what the tracker pushes.
    pub fn complete(self) -> CompletedPhase {
        CompletedPhase { context: self }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    // -- cause lookup -------------------------------------------------------

    /// Slots in insertion order.
    pub fn causes(&self) -> &[NamedCause] {
        &self.causes
    }

    pub fn cause(&self, key: CauseKey) -> Option<&CauseValue> {
        self.causes.iter().find(|c| c.name == key).map(|c| &c.value)
    }

    pub fn has_cause(&self, key: CauseKey) -> bool {
        self.cause(key).is_some()
    }

    /// The slot named `key`, viewed as a `T`.
    pub fn first_named<T: CauseType>(&self, key: CauseKey) -> Option<&T> {
        self.cause(key).and_then(T::from_value)
    }

    /// The `SOURCE` slot, viewed as a `T`.
    pub fn source<T: CauseType>(&self) -> Option<&T> {
        self.first_named(SOURCE)
    }

    /// Creator/notifier derived from the slots: creator is `OWNER` or a user
    /// `SOURCE`; notifier is `NOTIFIER`.
    pub fn attribution(&self) -> Attribution {
        let creator = self
            .first_named::<UserId>(OWNER)
            .or_else(|| self.source::<UserId>())
            .copied();
        Attribution {
            creator,
            notifier: self.first_named::<UserId>(NOTIFIER).copied(),
        }
    }

    // -- capture ------------------------------------------------------------

    pub fn capture_block(&mut self, transaction: BlockTransaction, flags: BlockFlags) {
        self.blocks.get_or_insert_with(Vec::new).push(CapturedBlock { transaction, flags });
    }

    pub fn capture_entity(&mut self, entity: PendingEntity) {
        self.entities.get_or_insert_with(Vec::new).push(entity);
    }

    pub fn capture_item(&mut self, drop: ItemDrop) {
        self.items.get_or_insert_with(Vec::new).push(drop);
    }

    pub fn capture_block_drop(&mut self, pos: BlockPos, stack: ItemStack) {
        self.block_drops
            .get_or_insert_with(BTreeMap::new)
            .entry(pos)
            .or_default()
            .push(stack);
    }

    pub fn capture_entity_drop(&mut self, owner: EntityId, drop: ItemDrop) {
        self.entity_drops
            .get_or_insert_with(BTreeMap::new)
            .entry(owner)
            .or_default()
            .push(drop);
    }

    // -- inspection ---------------------------------------------------------

    pub fn captured_blocks(&self) -> &[CapturedBlock] {
        self.blocks.as_deref().unwrap_or(&[])
    }

    pub fn captured_entities(&self) -> &[PendingEntity] {
        self.entities.as_deref().unwrap_or(&[])
    }

    pub fn captured_items(&self) -> &[ItemDrop] {
        self.items.as_deref().unwrap_or(&[])
    }

    pub fn block_drops_at(&self, pos: BlockPos) -> &[ItemStack] {
        self.block_drops
            .as_ref()
            .and_then(|m| m.get(&pos))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entity_drops_of(&self, owner: EntityId) -> &[ItemDrop] {
        self.entity_drops
            .as_ref()
            .and_then(|m| m.get(&owner))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn counts(&self) -> BufferCounts {
        BufferCounts {
            blocks: self.blocks.as_ref().map_or(0, Vec::len),
            entities: self.entities.as_ref().map_or(0, Vec::len),
            items: self.items.as_ref().map_or(0, Vec::len),
            block_drops: self
                .block_drops
                .as_ref()
                .map_or(0, |m| m.values().map(Vec::len).sum()),
            entity_drops: self
                .entity_drops
                .as_ref()
                .map_or(0, |m| m.values().map(Vec::len).sum()),
        }
    }

    pub fn has_captures(&self) -> bool {
        !self.counts().is_empty()
    }

    /// Number of buffers currently allocated, empty or not.
    pub fn allocated_buffers(&self) -> usize {
        [
            self.blocks.is_some(),
            self.entities.is_some(),
            self.items.is_some(),
            self.block_drops.is_some(),
            self.entity_drops.is_some(),
        ]
        .into_iter()
        .filter(|allocated| *allocated)
        .count()
    }

    // -- draining -----------------------------------------------------------

    pub fn take_blocks(&mut self) -> Vec<CapturedBlock> {
        self.blocks.take().unwrap_or_default()
    }

    pub fn take_entities(&mut self) -> Vec<PendingEntity> {
        self.entities.take().unwrap_or_default()
    }

    pub fn take_items(&mut self) -> Vec<ItemDrop> {
        self.items.take().unwrap_or_default()
    }

    pub fn take_block_drops_at(&mut self, pos: BlockPos) -> Vec<ItemStack> {
        let Some(map) = self.block_drops.as_mut() else {
            return Vec::new();
        };
        let taken = map.remove(&pos).unwrap_or_default();
        if map.is_empty() {
            self.block_drops = None;
        }
        taken
    }

    pub fn take_block_drops(&mut self) -> BTreeMap<BlockPos, Vec<ItemStack>> {
        self.block_drops.take().unwrap_or_default()
    }

    pub fn take_entity_drops(&mut self) -> BTreeMap<EntityId, Vec<ItemDrop>> {
        self.entity_drops.take().unwrap_or_default()
    }

    /// Take the entity drops landing on `pos`, in owner order.
    pub fn take_entity_drops_at(&mut self, pos: BlockPos) -> Vec<ItemStack> {
        let Some(map) = self.entity_drops.as_mut() else {
            return Vec::new();
        };
        let mut taken = Vec::new();
        for drops in map.values_mut() {
            let (here, elsewhere): (Vec<ItemDrop>, Vec<ItemDrop>) =
                std::mem::take(drops).into_iter().partition(|d| d.pos == pos);
            *drops = elsewhere;
            taken.extend(here.into_iter().map(|d| d.stack));
        }
        map.retain(|_, drops| !drops.is_empty());
        if map.is_empty() {
            self.entity_drops = None;
        }
        taken
    }

    /// Take every drop tied to `pos`: block drops keyed by it, then entity
    /// drops landing on it.
    pub fn take_drops_at(&mut self, pos: BlockPos) -> Vec<ItemStack> {
        let mut drops = self.take_block_drops_at(pos);
        drops.extend(self.take_entity_drops_at(pos));
        drops
    }

    /// Discard every drop tied to `pos`.
    pub fn clear_drops_at(&mut self, pos: BlockPos) {
        self.take_drops_at(pos);
    }
}

// ---------------------------------------------------------------------------
// CompletedPhase
// ---------------------------------------------------------------------------

/// A fully built context, ready to be pushed.
#[derive(Debug, Clone)]
pub struct CompletedPhase {
    context: PhaseContext,
}

impl CompletedPhase {
    pub fn state(&self) -> PhaseState {
        self.context.state
    }

    pub fn context(&self) -> &PhaseContext {
        &self.context
    }

    /// Push onto `tracker`. Same as [`PhaseTracker::push`].
    pub fn push(self, tracker: &mut PhaseTracker) -> Result<(), TrackerError> {
        tracker.push(self)
    }

    pub(crate) fn into_context(self) -> PhaseContext {
        self.context
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::COMMAND;
    use crate::transaction::Transaction;
    use causeway_world::block::{BlockSnapshot, BlockState};

    fn place(x: i32) -> BlockTransaction {
        let pos = BlockPos::new(x, 0, 0);
        Transaction::new(
            BlockSnapshot::new(pos, BlockState::air()),
            BlockSnapshot::new(pos, BlockState::new("stone")),
        )
    }

    // -- 1. Cause slots -----------------------------------------------------

    #[test]
    fn duplicate_key_last_write_wins_in_place() {
        let ctx = PhaseContext::new(PhaseState::Command)
            .with_cause(SOURCE, UserId(1))
            .with_cause(COMMAND, "say hi")
            .with_cause(SOURCE, UserId(2));
        assert_eq!(ctx.causes().len(), 2);
        assert_eq!(ctx.causes()[0].name, SOURCE);
        assert_eq!(ctx.source::<UserId>(), Some(&UserId(2)));
    }

    #[test]
    fn typed_lookup_rejects_wrong_kind() {
        let ctx = PhaseContext::new(PhaseState::EntityTick).with_cause(SOURCE, EntityId::new(3, 0));
        assert!(ctx.source::<UserId>().is_none());
        assert_eq!(ctx.source::<EntityId>(), Some(&EntityId::new(3, 0)));
        assert!(!ctx.has_cause(OWNER));
    }

    #[test]
    fn attribution_prefers_owner_over_source() {
        let ctx = PhaseContext::new(PhaseState::PlayerInteraction)
            .with_cause(SOURCE, UserId(5))
            .with_cause(NOTIFIER, UserId(6));
        assert_eq!(ctx.attribution().creator, Some(UserId(5)));
        assert_eq!(ctx.attribution().notifier, Some(UserId(6)));

        let owned = ctx.with_cause(OWNER, UserId(9));
        assert_eq!(owned.attribution().creator, Some(UserId(9)));
    }

    // -- 2. Lazy buffers ----------------------------------------------------

    #[test]
    fn buffers_allocate_on_first_write_and_release_on_drain() {
        let mut ctx = PhaseContext::new(PhaseState::Command);
        assert_eq!(ctx.allocated_buffers(), 0);
        assert!(!ctx.has_captures());

        ctx.capture_block(place(0), BlockFlags::ALL);
        ctx.capture_entity(PendingEntity::mob("pig", BlockPos::ORIGIN));
        assert_eq!(ctx.allocated_buffers(), 2);
        assert_eq!(ctx.counts().blocks, 1);

        assert_eq!(ctx.take_blocks().len(), 1);
        assert_eq!(ctx.take_entities().len(), 1);
        assert_eq!(ctx.allocated_buffers(), 0);
        assert!(ctx.take_blocks().is_empty());
    }

    #[test]
    fn capture_order_is_preserved() {
        let mut ctx = PhaseContext::new(PhaseState::Command);
        for x in 0..5 {
            ctx.capture_block(place(x), BlockFlags::ALL);
        }
        let xs: Vec<i32> = ctx.take_blocks().iter().map(|c| c.transaction.pos().x).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 4]);
    }

    // -- 3. Drops -----------------------------------------------------------

    #[test]
    fn clear_drops_at_removes_both_kinds_for_position() {
        let mut ctx = PhaseContext::new(PhaseState::Command);
        let here = BlockPos::new(1, 0, 0);
        let there = BlockPos::new(2, 0, 0);
        let owner = EntityId::new(0, 0);
        ctx.capture_block_drop(here, ItemStack::new("torch", 1));
        ctx.capture_block_drop(there, ItemStack::new("sand", 1));
        ctx.capture_entity_drop(owner, ItemDrop::new(ItemStack::new("bone", 2), here));
        ctx.capture_entity_drop(owner, ItemDrop::new(ItemStack::new("string", 1), there));

        ctx.clear_drops_at(here);

        assert!(ctx.block_drops_at(here).is_empty());
        assert_eq!(ctx.block_drops_at(there).len(), 1);
        assert_eq!(ctx.entity_drops_of(owner).len(), 1);
        assert_eq!(ctx.counts().block_drops + ctx.counts().entity_drops, 2);
    }

    #[test]
    fn take_block_drops_at_releases_empty_map() {
        let mut ctx = PhaseContext::new(PhaseState::BlockDropItems);
        let pos = BlockPos::new(0, 5, 0);
        ctx.capture_block_drop(pos, ItemStack::new("gravel", 1));
        assert_eq!(ctx.take_block_drops_at(pos), vec![ItemStack::new("gravel", 1)]);
        assert_eq!(ctx.allocated_buffers(), 0);
    }

    // -- 4. Post-unwind copy ------------------------------------------------

    #[test]
    fn post_unwind_context_carries_unwinding_state_first() {
        let src = PhaseContext::new(PhaseState::Command)
            .with_cause(SOURCE, UserId(3))
            .with_cause(COMMAND, "kill");
        let post = PhaseContext::post_unwind(PhaseState::Command, &src);
        assert_eq!(post.state(), PhaseState::PostUnwind);
        assert_eq!(post.causes()[0].name, UNWINDING_STATE);
        assert_eq!(post.first_named::<PhaseState>(UNWINDING_STATE), Some(&PhaseState::Command));
        assert_eq!(post.source::<UserId>(), Some(&UserId(3)));
        assert!(!post.has_captures());
    }
}
