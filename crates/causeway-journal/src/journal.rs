//! Cause journal recording every tracked mutation outcome.
//!
//! The [`CauseJournal`] records what the tracker did with each captured
//! mutation during a simulation step. Each [`BlockRecord`] captures the
//! position, original and final states, the change kind, whether the
//! transaction was applied or rolled back, the drain pass it was processed in,
//! the phase that captured it, and the root cause of the event it was posted
//! in. Each [`SpawnRecord`] does the same for entity materialization.
//!
//! The journal is cleared at the start of each step via
//! [`CauseJournal::clear`].
//!
//! # Query API
//!
//! - **Position**: [`CauseJournal::records_at`]
//! - **Phase**: [`CauseJournal::records_by_phase`]
//! - **Change kind**: [`CauseJournal::records_of_change`]
//! - **Outcome**: [`CauseJournal::applied`], [`CauseJournal::rolled_back`]
//!
//! # Example
//!
//! ```
//! use causeway_journal::journal::{BlockOutcome, BlockRecord, CauseJournal};
//! use causeway_world::prelude::*;
//!
//! let mut journal = CauseJournal::new();
//! journal.record_block(BlockRecord {
//!     tick: 1,
//!     pass: 1,
//!     pos: BlockPos::new(0, 64, 0),
//!     original: BlockState::air(),
//!     final_state: BlockState::new("stone"),
//!     change: BlockChange::Place,
//!     outcome: BlockOutcome::Applied,
//!     phase: "player_interaction".to_owned(),
//!     root_cause: "user#7".to_owned(),
//! });
//!
//! assert_eq!(journal.len(), 1);
//! assert_eq!(journal.records_at(BlockPos::new(0, 64, 0)).count(), 1);
//! ```

use causeway_world::block::{BlockChange, BlockState};
use causeway_world::entity::EntityId;
use causeway_world::position::BlockPos;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BlockRecord
// ---------------------------------------------------------------------------

/// What happened to a captured block transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockOutcome {
    /// The final state (proposed or custom) was applied to the world.
    Applied,
    /// The original state was restored.
    RolledBack,
}

/// A single block transaction outcome.
///
/// For rolled-back records `final_state` is the restored original, so
/// `original == final_state` always holds for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Simulation step during which the transaction was processed.
    pub tick: u64,
    /// Fixed-point drain pass (1-based) that processed the transaction.
    pub pass: u32,
    pub pos: BlockPos,
    pub original: BlockState,
    pub final_state: BlockState,
    pub change: BlockChange,
    pub outcome: BlockOutcome,
    /// Name of the phase whose context captured the transaction.
    pub phase: String,
    /// Display form of the first entry of the event cause.
    pub root_cause: String,
}

// ---------------------------------------------------------------------------
// SpawnRecord
// ---------------------------------------------------------------------------

/// What happened to a spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnOutcome {
    Spawned(EntityId),
    /// Removed by a listener, cancelled with its event, or disallowed by the
    /// active phase.
    Rejected,
}

/// A single spawn request outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub tick: u64,
    /// Entity type name (`"item"`, `"experience_orb"`, `"zombie"`).
    pub entity_type: String,
    /// Spawn event kind the request was posted under (`"drop_item"`, ...).
    pub spawn_kind: String,
    pub pos: BlockPos,
    pub outcome: SpawnOutcome,
    pub phase: String,
    pub root_cause: String,
}

// ---------------------------------------------------------------------------
// CauseJournal
// ---------------------------------------------------------------------------

/// Accumulates block and spawn records during a step and answers queries for
/// debugging tools and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CauseJournal {
    blocks: Vec<BlockRecord>,
    spawns: Vec<SpawnRecord>,
}

impl CauseJournal {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            spawns: Vec::new(),
        }
    }

    pub fn record_block(&mut self, record: BlockRecord) {
        tracing::trace!(
            pos = %record.pos,
            change = %record.change,
            outcome = ?record.outcome,
            phase = %record.phase,
            "journal: block"
        );
        self.blocks.push(record);
    }

    pub fn record_spawn(&mut self, record: SpawnRecord) {
        tracing::trace!(
            entity_type = %record.entity_type,
            outcome = ?record.outcome,
            phase = %record.phase,
            "journal: spawn"
        );
        self.spawns.push(record);
    }

    /// Clear all records. Called at the start of each step.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.spawns.clear();
    }

    /// Total number of block and spawn records.
    pub fn len(&self) -> usize {
        self.blocks.len() + self.spawns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.spawns.is_empty()
    }

    /// Block records in processing order.
    pub fn block_records(&self) -> &[BlockRecord] {
        &self.blocks
    }

    /// Spawn records in processing order.
    pub fn spawn_records(&self) -> &[SpawnRecord] {
        &self.spawns
    }

    pub fn records_at(&self, pos: BlockPos) -> impl Iterator<Item = &BlockRecord> {
        self.blocks.iter().filter(move |r| r.pos == pos)
    }

    pub fn records_by_phase<'a>(&'a self, phase: &'a str) -> impl Iterator<Item = &'a BlockRecord> {
        self.blocks.iter().filter(move |r| r.phase == phase)
    }

    pub fn records_of_change(&self, change: BlockChange) -> impl Iterator<Item = &BlockRecord> {
        self.blocks.iter().filter(move |r| r.change == change)
    }

    pub fn applied(&self) -> impl Iterator<Item = &BlockRecord> {
        self.blocks
            .iter()
            .filter(|r| r.outcome == BlockOutcome::Applied)
    }

    pub fn rolled_back(&self) -> impl Iterator<Item = &BlockRecord> {
        self.blocks
            .iter()
            .filter(|r| r.outcome == BlockOutcome::RolledBack)
    }

    /// IDs of every entity spawned, in spawn order.
    pub fn spawned_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.spawns.iter().filter_map(|r| match r.outcome {
            SpawnOutcome::Spawned(id) => Some(id),
            SpawnOutcome::Rejected => None,
        })
    }

    pub fn rejected_spawns(&self) -> impl Iterator<Item = &SpawnRecord> {
        self.spawns
            .iter()
            .filter(|r| r.outcome == SpawnOutcome::Rejected)
    }

    /// Highest drain pass number recorded, or 0 when nothing was recorded.
    pub fn max_pass(&self) -> u32 {
        self.blocks.iter().map(|r| r.pass).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- helpers ------------------------------------------------------------

    fn pos(x: i32) -> BlockPos {
        BlockPos::new(x, 0, 0)
    }

    fn block(
        x: i32,
        change: BlockChange,
        outcome: BlockOutcome,
        phase: &str,
        pass: u32,
    ) -> BlockRecord {
        let original = BlockState::air();
        let final_state = match outcome {
            BlockOutcome::Applied => BlockState::new("stone"),
            BlockOutcome::RolledBack => original.clone(),
        };
        BlockRecord {
            tick: 1,
            pass,
            pos: pos(x),
            original,
            final_state,
            change,
            outcome,
            phase: phase.to_owned(),
            root_cause: "user#1".to_owned(),
        }
    }

    fn spawn(outcome: SpawnOutcome) -> SpawnRecord {
        SpawnRecord {
            tick: 1,
            entity_type: "item".to_owned(),
            spawn_kind: "drop_item".to_owned(),
            pos: pos(0),
            outcome,
            phase: "death_drops".to_owned(),
            root_cause: "entity#0v0".to_owned(),
        }
    }

    // -- 1. Empty journal ---------------------------------------------------

    #[test]
    fn empty_journal() {
        let journal = CauseJournal::new();
        assert!(journal.is_empty());
        assert_eq!(journal.len(), 0);
        assert_eq!(journal.records_at(pos(0)).count(), 0);
        assert_eq!(journal.max_pass(), 0);
        assert_eq!(journal.spawned_entities().count(), 0);
    }

    // -- 2. Queries ---------------------------------------------------------

    #[test]
    fn query_by_position_phase_and_change() {
        let mut journal = CauseJournal::new();
        journal.record_block(block(0, BlockChange::Place, BlockOutcome::Applied, "command", 1));
        journal.record_block(block(1, BlockChange::Break, BlockOutcome::RolledBack, "command", 1));
        journal.record_block(block(0, BlockChange::Modify, BlockOutcome::Applied, "block_tick", 2));

        assert_eq!(journal.records_at(pos(0)).count(), 2);
        assert_eq!(journal.records_by_phase("command").count(), 2);
        assert_eq!(journal.records_of_change(BlockChange::Break).count(), 1);
        assert_eq!(journal.applied().count(), 2);
        assert_eq!(journal.rolled_back().count(), 1);
        assert_eq!(journal.max_pass(), 2);
    }

    #[test]
    fn rolled_back_records_keep_original() {
        let mut journal = CauseJournal::new();
        journal.record_block(block(3, BlockChange::Place, BlockOutcome::RolledBack, "command", 1));
        let r = journal.rolled_back().next().unwrap();
        assert_eq!(r.original, r.final_state);
    }

    // -- 3. Spawns ----------------------------------------------------------

    #[test]
    fn spawn_records_split_by_outcome() {
        let mut journal = CauseJournal::new();
        journal.record_spawn(spawn(SpawnOutcome::Spawned(EntityId::new(0, 0))));
        journal.record_spawn(spawn(SpawnOutcome::Rejected));
        journal.record_spawn(spawn(SpawnOutcome::Spawned(EntityId::new(1, 0))));

        let ids: Vec<EntityId> = journal.spawned_entities().collect();
        assert_eq!(ids, vec![EntityId::new(0, 0), EntityId::new(1, 0)]);
        assert_eq!(journal.rejected_spawns().count(), 1);
        assert_eq!(journal.len(), 3);
    }

    // -- 4. Clear and serialization -----------------------------------------

    #[test]
    fn clear_resets_everything() {
        let mut journal = CauseJournal::new();
        journal.record_block(block(0, BlockChange::Place, BlockOutcome::Applied, "command", 1));
        journal.record_spawn(spawn(SpawnOutcome::Rejected));
        journal.clear();
        assert!(journal.is_empty());
    }

    #[test]
    fn journal_serializes_to_json() {
        let mut journal = CauseJournal::new();
        journal.record_block(block(0, BlockChange::Decay, BlockOutcome::Applied, "block_decay", 1));
        let json = serde_json::to_string(&journal).unwrap();
        let back: CauseJournal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.block_records(), journal.block_records());
    }
}
