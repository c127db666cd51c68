//! Capture policy flags and their group-fallback resolution.
//!
//! Every [`PhaseState`](crate::state::PhaseState) answers a fixed set of
//! yes/no questions that call sites consult before deciding whether to buffer
//! a mutation or apply it immediately. A state only states the answers it
//! disagrees with its group about ([`PolicyOverrides`]); unanswered flags fall
//! back to the group, then the group's parent, then [`Policy::ROOT`].

use serde::{Deserialize, Serialize};

/// Fully resolved capture policy of one phase state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Block writes are captured as transactions instead of applied.
    pub captures_blocks: bool,
    /// Entities may be spawned at all while this state is active.
    pub allows_entity_spawns: bool,
    /// Spawns are buffered and posted at unwind instead of materialized now.
    pub captures_entities: bool,
    /// Item drops are keyed by the block position that produced them.
    pub tracks_block_specific_drops: bool,
    /// Item drops are keyed by the entity that produced them.
    pub tracks_entity_drops: bool,
    /// Neighbor reactions are suppressed when writes apply.
    pub ignores_block_physics: bool,
    /// A post-unwind frame collects mutations escaping this state's unwind.
    pub tracks_post_unwind: bool,
    /// The state may be pushed directly on top of itself.
    pub reentrant: bool,
}

impl Policy {
    /// Defaults at the root of the group tree.
    pub const ROOT: Policy = Policy {
        captures_blocks: true,
        allows_entity_spawns: true,
        captures_entities: true,
        tracks_block_specific_drops: true,
        tracks_entity_drops: true,
        ignores_block_physics: false,
        tracks_post_unwind: true,
        reentrant: false,
    };
}

impl Default for Policy {
    fn default() -> Self {
        Self::ROOT
    }
}

/// Partial policy: `None` means "ask the parent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyOverrides {
    pub captures_blocks: Option<bool>,
    pub allows_entity_spawns: Option<bool>,
    pub captures_entities: Option<bool>,
    pub tracks_block_specific_drops: Option<bool>,
    pub tracks_entity_drops: Option<bool>,
    pub ignores_block_physics: Option<bool>,
    pub tracks_post_unwind: Option<bool>,
    pub reentrant: Option<bool>,
}

impl PolicyOverrides {
    pub const INHERIT: PolicyOverrides = PolicyOverrides {
        captures_blocks: None,
        allows_entity_spawns: None,
        captures_entities: None,
        tracks_block_specific_drops: None,
        tracks_entity_drops: None,
        ignores_block_physics: None,
        tracks_post_unwind: None,
        reentrant: None,
    };

    /// Fill every unanswered flag from `fallback`.
    pub fn or(self, fallback: PolicyOverrides) -> PolicyOverrides {
        PolicyOverrides {
            captures_blocks: self.captures_blocks.or(fallback.captures_blocks),
            allows_entity_spawns: self.allows_entity_spawns.or(fallback.allows_entity_spawns),
            captures_entities: self.captures_entities.or(fallback.captures_entities),
            tracks_block_specific_drops: self
                .tracks_block_specific_drops
                .or(fallback.tracks_block_specific_drops),
            tracks_entity_drops: self.tracks_entity_drops.or(fallback.tracks_entity_drops),
            ignores_block_physics: self.ignores_block_physics.or(fallback.ignores_block_physics),
            tracks_post_unwind: self.tracks_post_unwind.or(fallback.tracks_post_unwind),
            reentrant: self.reentrant.or(fallback.reentrant),
        }
    }

    /// Resolve against a complete policy.
    pub fn resolve(self, base: Policy) -> Policy {
        Policy {
            captures_blocks: self.captures_blocks.unwrap_or(base.captures_blocks),
            allows_entity_spawns: self.allows_entity_spawns.unwrap_or(base.allows_entity_spawns),
            captures_entities: self.captures_entities.unwrap_or(base.captures_entities),
            tracks_block_specific_drops: self
                .tracks_block_specific_drops
                .unwrap_or(base.tracks_block_specific_drops),
            tracks_entity_drops: self.tracks_entity_drops.unwrap_or(base.tracks_entity_drops),
            ignores_block_physics: self.ignores_block_physics.unwrap_or(base.ignores_block_physics),
            tracks_post_unwind: self.tracks_post_unwind.unwrap_or(base.tracks_post_unwind),
            reentrant: self.reentrant.unwrap_or(base.reentrant),
        }
    }
}
