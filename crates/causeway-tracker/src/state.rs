//! The closed catalogue of phase states.
//!
//! A [`PhaseState`] is a stateless descriptor of one kind of simulation work.
//! It answers capture-policy questions (resolved through its
//! [`PhaseGroup`]), decides which states may be pushed on top of it, names the
//! cause slots its unwind requires, and dispatches to its group's unwind
//! handler.

use std::fmt;

use causeway_world::block::{BlockChange, BlockState};
use serde::{Deserialize, Serialize};

use crate::cause::{
    CauseKey, CauseKind, BLOCK_BROKEN, COMMAND, PLUGIN, POPULATOR, SOURCE, UNWINDING_STATE,
};
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::group::PhaseGroup;
use crate::policy::{Policy, PolicyOverrides};
use crate::tracker::PhaseTracker;

/// Drains a popped context. Receives the state whose semantics apply, which
/// differs from `context.state()` for post-unwind frames.
pub type UnwindFn = fn(&mut PhaseTracker, PhaseState, &mut PhaseContext) -> Result<(), TrackerError>;

/// A cause slot a state cannot unwind without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredCause {
    pub key: CauseKey,
    pub kind: CauseKind,
}

const fn required(key: CauseKey, kind: CauseKind) -> RequiredCause {
    RequiredCause { key, kind }
}

/// One kind of simulation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseState {
    // general
    /// The implicit state of an empty stack. Never pushed.
    Idle,
    Command,
    Explosion,
    RestoringBlocks,
    PostUnwind,
    // block
    BlockDropItems,
    BlockDecay,
    // entity
    DeathDrops,
    // tick
    BlockTick,
    RandomBlockTick,
    EntityTick,
    // generation
    TerrainGeneration,
    ChunkLoading,
    Populate,
    // plugin
    ScheduledTask,
    // packet
    PlayerInteraction,
}

impl PhaseState {
    pub const ALL: [PhaseState; 16] = [
        PhaseState::Idle,
        PhaseState::Command,
        PhaseState::Explosion,
        PhaseState::RestoringBlocks,
        PhaseState::PostUnwind,
        PhaseState::BlockDropItems,
        PhaseState::BlockDecay,
        PhaseState::DeathDrops,
        PhaseState::BlockTick,
        PhaseState::RandomBlockTick,
        PhaseState::EntityTick,
        PhaseState::TerrainGeneration,
        PhaseState::ChunkLoading,
        PhaseState::Populate,
        PhaseState::ScheduledTask,
        PhaseState::PlayerInteraction,
    ];

    pub fn group(self) -> PhaseGroup {
        match self {
            PhaseState::Idle
            | PhaseState::Command
            | PhaseState::Explosion
            | PhaseState::RestoringBlocks
            | PhaseState::PostUnwind => PhaseGroup::General,
            PhaseState::BlockDropItems | PhaseState::BlockDecay => PhaseGroup::Block,
            PhaseState::DeathDrops => PhaseGroup::Entity,
            PhaseState::BlockTick | PhaseState::RandomBlockTick | PhaseState::EntityTick => {
                PhaseGroup::Tick
            }
            PhaseState::TerrainGeneration | PhaseState::ChunkLoading | PhaseState::Populate => {
                PhaseGroup::Generation
            }
            PhaseState::ScheduledTask => PhaseGroup::Plugin,
            PhaseState::PlayerInteraction => PhaseGroup::Packet,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PhaseState::Idle => "idle",
            PhaseState::Command => "command",
            PhaseState::Explosion => "explosion",
            PhaseState::RestoringBlocks => "restoring_blocks",
            PhaseState::PostUnwind => "post_unwind",
            PhaseState::BlockDropItems => "block_drop_items",
            PhaseState::BlockDecay => "block_decay",
            PhaseState::DeathDrops => "death_drops",
            PhaseState::BlockTick => "block_tick",
            PhaseState::RandomBlockTick => "random_block_tick",
            PhaseState::EntityTick => "entity_tick",
            PhaseState::TerrainGeneration => "terrain_generation",
            PhaseState::ChunkLoading => "chunk_loading",
            PhaseState::Populate => "populate",
            PhaseState::ScheduledTask => "scheduled_task",
            PhaseState::PlayerInteraction => "player_interaction",
        }
    }

    // -- policy -------------------------------------------------------------

    fn overrides(self) -> PolicyOverrides {
        match self {
            PhaseState::Idle => PolicyOverrides {
                captures_blocks: Some(false),
                captures_entities: Some(false),
                tracks_block_specific_drops: Some(false),
                tracks_entity_drops: Some(false),
                tracks_post_unwind: Some(false),
                ..PolicyOverrides::INHERIT
            },
            // Restoration must not re-capture the blocks it is restoring.
            PhaseState::RestoringBlocks => PolicyOverrides {
                captures_blocks: Some(false),
                allows_entity_spawns: Some(false),
                captures_entities: Some(false),
                tracks_block_specific_drops: Some(false),
                tracks_entity_drops: Some(false),
                ignores_block_physics: Some(true),
                tracks_post_unwind: Some(false),
                ..PolicyOverrides::INHERIT
            },
            PhaseState::PostUnwind => PolicyOverrides {
                tracks_post_unwind: Some(false),
                reentrant: Some(true),
                ..PolicyOverrides::INHERIT
            },
            PhaseState::Populate => PolicyOverrides {
                captures_entities: Some(true),
                reentrant: Some(true),
                ..PolicyOverrides::INHERIT
            },
            _ => PolicyOverrides::INHERIT,
        }
    }

    /// Fully resolved policy.
    pub fn policy(self) -> Policy {
        self.group().resolve(self.overrides())
    }

    pub fn requires_block_capturing(self) -> bool {
        self.policy().captures_blocks
    }

    pub fn allows_entity_spawns(self) -> bool {
        self.policy().allows_entity_spawns
    }

    pub fn captures_entities(self) -> bool {
        self.policy().captures_entities
    }

    pub fn tracks_block_specific_drops(self) -> bool {
        self.policy().tracks_block_specific_drops
    }

    pub fn tracks_entity_drops(self) -> bool {
        self.policy().tracks_entity_drops
    }

    pub fn ignores_block_physics(self) -> bool {
        self.policy().ignores_block_physics
    }

    pub fn tracks_post_unwind(self) -> bool {
        self.policy().tracks_post_unwind
    }

    pub fn is_reentrant(self) -> bool {
        self.policy().reentrant
    }

    // -- transitions --------------------------------------------------------

    /// Whether `next` may be pushed while `self` is on top of the stack.
    ///
    /// Neither symmetric nor transitive. The same state may follow itself
    /// only when it is re-entrant.
    pub fn can_switch_to(self, next: PhaseState) -> bool {
        if next == self {
            return self.is_reentrant();
        }
        if next == PhaseState::Idle || self == PhaseState::RestoringBlocks {
            return false;
        }
        if matches!(next, PhaseState::PostUnwind | PhaseState::RestoringBlocks) {
            return true;
        }
        let target = next.group();
        match self {
            PhaseState::Idle
            | PhaseState::Command
            | PhaseState::ScheduledTask
            | PhaseState::PostUnwind => true,
            PhaseState::Explosion
            | PhaseState::BlockDropItems
            | PhaseState::BlockDecay
            | PhaseState::DeathDrops => {
                matches!(target, PhaseGroup::Block | PhaseGroup::Entity)
                    || next == PhaseState::ChunkLoading
            }
            PhaseState::BlockTick | PhaseState::RandomBlockTick | PhaseState::EntityTick => {
                matches!(
                    target,
                    PhaseGroup::Block | PhaseGroup::Entity | PhaseGroup::Generation
                ) || next == PhaseState::Explosion
            }
            PhaseState::PlayerInteraction => {
                matches!(target, PhaseGroup::Block | PhaseGroup::Entity)
                    || matches!(
                        next,
                        PhaseState::Command | PhaseState::Explosion | PhaseState::ChunkLoading
                    )
            }
            PhaseState::TerrainGeneration | PhaseState::ChunkLoading | PhaseState::Populate => {
                target == PhaseGroup::Generation
            }
            PhaseState::RestoringBlocks => false,
        }
    }

    // -- unwind -------------------------------------------------------------

    /// Cause slots that must be present, with the expected value kind, for
    /// this state to unwind.
    pub fn required_causes(self) -> &'static [RequiredCause] {
        const COMMAND_SLOTS: &[RequiredCause] = &[
            required(SOURCE, CauseKind::User),
            required(COMMAND, CauseKind::Text),
        ];
        const EXPLOSION_ORIGIN: &[RequiredCause] = &[required(SOURCE, CauseKind::Position)];
        const UNWINDING: &[RequiredCause] = &[required(UNWINDING_STATE, CauseKind::Phase)];
        const BROKEN_BLOCK: &[RequiredCause] = &[required(BLOCK_BROKEN, CauseKind::Block)];
        const BLOCK_SOURCE: &[RequiredCause] = &[required(SOURCE, CauseKind::Block)];
        const ENTITY_SOURCE: &[RequiredCause] = &[required(SOURCE, CauseKind::Entity)];
        const POPULATOR_NAME: &[RequiredCause] = &[required(POPULATOR, CauseKind::Text)];
        const OWNING_PLUGIN: &[RequiredCause] = &[required(PLUGIN, CauseKind::Plugin)];
        const USER_SOURCE: &[RequiredCause] = &[required(SOURCE, CauseKind::User)];
        match self {
            PhaseState::Command => COMMAND_SLOTS,
            PhaseState::Explosion => EXPLOSION_ORIGIN,
            PhaseState::PostUnwind => UNWINDING,
            PhaseState::BlockDropItems => BROKEN_BLOCK,
            PhaseState::BlockDecay | PhaseState::BlockTick | PhaseState::RandomBlockTick => {
                BLOCK_SOURCE
            }
            PhaseState::DeathDrops | PhaseState::EntityTick => ENTITY_SOURCE,
            PhaseState::Populate => POPULATOR_NAME,
            PhaseState::ScheduledTask => OWNING_PLUGIN,
            PhaseState::PlayerInteraction => USER_SOURCE,
            PhaseState::Idle
            | PhaseState::RestoringBlocks
            | PhaseState::TerrainGeneration
            | PhaseState::ChunkLoading => &[],
        }
    }

    /// Classify a captured transition for event bucketing.
    pub fn classify(self, original: &BlockState, proposed: &BlockState) -> BlockChange {
        match self {
            PhaseState::BlockDecay => BlockChange::Decay,
            PhaseState::Explosion => BlockChange::Break,
            _ => BlockChange::infer(original, proposed),
        }
    }

    /// The unwind procedure for this state.
    pub fn unwind_fn(self) -> UnwindFn {
        self.group().unwind_handler()
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- 1. Policy ----------------------------------------------------------

    #[test]
    fn block_capturing_defaults_on() {
        assert!(PhaseState::Command.requires_block_capturing());
        assert!(PhaseState::BlockTick.requires_block_capturing());
        assert!(PhaseState::PostUnwind.requires_block_capturing());
        assert!(!PhaseState::RestoringBlocks.requires_block_capturing());
        assert!(!PhaseState::Idle.requires_block_capturing());
        assert!(!PhaseState::TerrainGeneration.requires_block_capturing());
    }

    #[test]
    fn populate_overrides_generation_defaults() {
        let policy = PhaseState::Populate.policy();
        assert!(policy.captures_entities);
        assert!(policy.reentrant);
        assert!(!policy.captures_blocks, "inherited from generation group");
        assert!(!PhaseState::ChunkLoading.captures_entities());
    }

    #[test]
    fn restoring_blocks_forbids_spawns_and_physics() {
        let p = PhaseState::RestoringBlocks.policy();
        assert!(!p.allows_entity_spawns);
        assert!(p.ignores_block_physics);
        assert!(!p.tracks_post_unwind);
    }

    // -- 2. Transitions -----------------------------------------------------

    #[test]
    fn restoring_blocks_pushes_nothing() {
        for next in PhaseState::ALL {
            assert!(!PhaseState::RestoringBlocks.can_switch_to(next), "{next}");
        }
    }

    #[test]
    fn command_may_push_restoration_but_not_reverse() {
        assert!(PhaseState::Command.can_switch_to(PhaseState::RestoringBlocks));
        assert!(!PhaseState::RestoringBlocks.can_switch_to(PhaseState::Command));
    }

    #[test]
    fn idle_is_never_a_push_target() {
        for state in PhaseState::ALL {
            assert!(!state.can_switch_to(PhaseState::Idle), "{state}");
        }
    }

    #[test]
    fn same_state_only_when_reentrant() {
        assert!(PhaseState::Populate.can_switch_to(PhaseState::Populate));
        assert!(PhaseState::PostUnwind.can_switch_to(PhaseState::PostUnwind));
        assert!(!PhaseState::Command.can_switch_to(PhaseState::Command));
        assert!(!PhaseState::BlockTick.can_switch_to(PhaseState::BlockTick));
    }

    #[test]
    fn tick_states_do_not_nest_other_ticks() {
        assert!(!PhaseState::BlockTick.can_switch_to(PhaseState::EntityTick));
        assert!(PhaseState::BlockTick.can_switch_to(PhaseState::BlockDropItems));
        assert!(PhaseState::EntityTick.can_switch_to(PhaseState::DeathDrops));
        assert!(PhaseState::RandomBlockTick.can_switch_to(PhaseState::Explosion));
    }

    #[test]
    fn generation_only_nests_generation() {
        assert!(PhaseState::ChunkLoading.can_switch_to(PhaseState::Populate));
        assert!(!PhaseState::Populate.can_switch_to(PhaseState::Command));
        assert!(PhaseState::Populate.can_switch_to(PhaseState::RestoringBlocks));
    }

    #[test]
    fn can_switch_to_is_not_symmetric() {
        assert!(PhaseState::Command.can_switch_to(PhaseState::BlockTick));
        assert!(!PhaseState::BlockTick.can_switch_to(PhaseState::Command));
    }

    // -- 3. Unwind metadata -------------------------------------------------

    #[test]
    fn required_causes_by_state() {
        let keys: Vec<_> = PhaseState::Command.required_causes().iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![SOURCE, COMMAND]);
        assert_eq!(PhaseState::PostUnwind.required_causes()[0].kind, CauseKind::Phase);
        assert!(PhaseState::ChunkLoading.required_causes().is_empty());
    }

    #[test]
    fn classification_overrides() {
        let stone = BlockState::new("stone");
        let air = BlockState::air();
        let leaves = BlockState::new("leaves");
        assert_eq!(PhaseState::BlockDecay.classify(&leaves, &air), BlockChange::Decay);
        assert_eq!(PhaseState::Explosion.classify(&stone, &BlockState::new("fire")), BlockChange::Break);
        assert_eq!(PhaseState::Command.classify(&air, &stone), BlockChange::Place);
    }
}
