//! The phase group tree.
//!
//! Groups classify phase states and supply default policy. They carry no
//! runtime state: a group is a node in a fixed tree with a parent, a list of
//! children, partial policy defaults, and the unwind handler its member
//! states dispatch to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::phase;
use crate::policy::{Policy, PolicyOverrides};
use crate::state::{PhaseState, UnwindFn};

/// A node in the group tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseGroup {
    Root,
    /// Commands, explosions, restoration, and post-unwind bookkeeping.
    General,
    Block,
    Entity,
    Tick,
    Generation,
    Plugin,
    Packet,
}

impl PhaseGroup {
    pub const ALL: [PhaseGroup; 8] = [
        PhaseGroup::Root,
        PhaseGroup::General,
        PhaseGroup::Block,
        PhaseGroup::Entity,
        PhaseGroup::Tick,
        PhaseGroup::Generation,
        PhaseGroup::Plugin,
        PhaseGroup::Packet,
    ];

    pub fn parent(self) -> Option<PhaseGroup> {
        match self {
            PhaseGroup::Root => None,
            _ => Some(PhaseGroup::Root),
        }
    }

    pub fn children(self) -> &'static [PhaseGroup] {
        match self {
            PhaseGroup::Root => &[
                PhaseGroup::General,
                PhaseGroup::Block,
                PhaseGroup::Entity,
                PhaseGroup::Tick,
                PhaseGroup::Generation,
                PhaseGroup::Plugin,
                PhaseGroup::Packet,
            ],
            _ => &[],
        }
    }

    /// Whether `self` is `ancestor` or lies beneath it.
    pub fn is_within(self, ancestor: PhaseGroup) -> bool {
        let mut current = Some(self);
        while let Some(group) = current {
            if group == ancestor {
                return true;
            }
            current = group.parent();
        }
        false
    }

    /// Member states of this group, in declaration order.
    pub fn states(self) -> impl Iterator<Item = PhaseState> {
        PhaseState::ALL.into_iter().filter(move |s| s.group() == self)
    }

    pub fn name(self) -> &'static str {
        match self {
            PhaseGroup::Root => "root",
            PhaseGroup::General => "general",
            PhaseGroup::Block => "block",
            PhaseGroup::Entity => "entity",
            PhaseGroup::Tick => "tick",
            PhaseGroup::Generation => "generation",
            PhaseGroup::Plugin => "plugin",
            PhaseGroup::Packet => "packet",
        }
    }

    /// Policy flags this group answers for its members.
    pub fn defaults(self) -> PolicyOverrides {
        match self {
            PhaseGroup::Tick => PolicyOverrides {
                captures_blocks: Some(true),
                ..PolicyOverrides::INHERIT
            },
            // World generation writes straight into fresh chunks.
            PhaseGroup::Generation => PolicyOverrides {
                captures_blocks: Some(false),
                captures_entities: Some(false),
                tracks_block_specific_drops: Some(false),
                tracks_entity_drops: Some(false),
                ignores_block_physics: Some(true),
                tracks_post_unwind: Some(false),
                ..PolicyOverrides::INHERIT
            },
            _ => PolicyOverrides::INHERIT,
        }
    }

    /// Resolve `overrides` against this group, its ancestors, and the root.
    pub fn resolve(self, overrides: PolicyOverrides) -> Policy {
        let mut merged = overrides;
        let mut current = Some(self);
        while let Some(group) = current {
            merged = merged.or(group.defaults());
            current = group.parent();
        }
        merged.resolve(Policy::ROOT)
    }

    /// The unwind procedure shared by this group's states.
    pub fn unwind_handler(self) -> UnwindFn {
        match self {
            PhaseGroup::Root | PhaseGroup::General => phase::general::unwind,
            PhaseGroup::Block => phase::block::unwind,
            PhaseGroup::Entity => phase::entity::unwind,
            PhaseGroup::Tick => phase::tick::unwind,
            PhaseGroup::Generation => phase::generation::unwind,
            PhaseGroup::Plugin => phase::plugin::unwind,
            PhaseGroup::Packet => phase::packet::unwind,
        }
    }
}

impl fmt::Display for PhaseGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
