//! The standard unwind shared by most phase handlers.
//!
//! A handler only decides which cause slot roots the chain and how captured
//! entities are announced; [`run`] does the rest in a fixed order: blocks
//! through the pipeline, then captured entities, loose items, leftover
//! block drops, and entity drops.

use causeway_world::entity::PendingEntity;
use tracing::debug;

use crate::cause::{CauseBuilder, CauseKey, SOURCE};
use crate::context::{ItemDrop, PhaseContext};
use crate::error::TrackerError;
use crate::event::SpawnKind;
use crate::pipeline;
use crate::spawn::{self, Partition};
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;

/// How a state's captures are announced.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnwindPlan {
    pub(crate) root: Option<CauseKey>,
    pub(crate) spawn_kind: SpawnKind,
    pub(crate) partition: Option<Partition>,
}

impl UnwindPlan {
    /// Slots in insertion order; captured entities announced as plain spawns.
    pub(crate) const INHERIT: UnwindPlan = UnwindPlan {
        root: None,
        spawn_kind: SpawnKind::Spawn,
        partition: None,
    };

    pub(crate) const fn rooted(key: CauseKey) -> Self {
        UnwindPlan {
            root: Some(key),
            ..Self::INHERIT
        }
    }

    pub(crate) const fn spawning(self, kind: SpawnKind) -> Self {
        UnwindPlan {
            spawn_kind: kind,
            ..self
        }
    }

    pub(crate) const fn split(self, matches: fn(&PendingEntity) -> bool, kind: SpawnKind) -> Self {
        UnwindPlan {
            partition: Some(Partition { matches, kind }),
            ..self
        }
    }
}

pub(crate) fn run(
    tracker: &mut PhaseTracker,
    state: PhaseState,
    ctx: &mut PhaseContext,
    plan: UnwindPlan,
) -> Result<(), TrackerError> {
    if !ctx.has_captures() {
        return Ok(());
    }
    let cause = tracker.build_cause(state, ctx, plan.root);
    let attribution = ctx.attribution();
    let phase = ctx.state();
    debug!(%phase, effective = %state, captures = %ctx.counts(), cause = %cause, "unwinding");

    pipeline::drain_blocks(tracker, state, ctx, &cause)?;

    let entities = ctx.take_entities();
    match plan.partition {
        Some(partition) => {
            spawn::drain_partitioned(tracker, phase, attribution, &cause, entities, partition, plan.spawn_kind)?;
        }
        None => {
            spawn::drain_spawns(tracker, phase, attribution, &cause, plan.spawn_kind, entities)?;
        }
    }

    let items: Vec<PendingEntity> = ctx.take_items().into_iter().map(ItemDrop::into_pending).collect();
    spawn::drain_spawns(tracker, phase, attribution, &cause, SpawnKind::DropItem, items)?;

    for (pos, stacks) in ctx.take_block_drops() {
        let mut builder = CauseBuilder::rooted(SOURCE, tracker.world().snapshot(pos));
        builder.extend_from(&cause);
        let drops = stacks
            .into_iter()
            .map(|stack| PendingEntity::item(stack, pos))
            .collect();
        spawn::drain_spawns(tracker, phase, attribution, &builder.build(), SpawnKind::DropItem, drops)?;
    }

    for (owner, drops) in ctx.take_entity_drops() {
        let mut builder = CauseBuilder::rooted(SOURCE, owner);
        builder.extend_from(&cause);
        let drops = drops.into_iter().map(ItemDrop::into_pending).collect();
        spawn::drain_spawns(tracker, phase, attribution, &builder.build(), SpawnKind::DropItem, drops)?;
    }
    Ok(())
}
