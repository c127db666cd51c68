//! Entity group.

use causeway_world::entity::PendingEntity;

use crate::cause::SOURCE;
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::event::SpawnKind;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::unwind::{self, UnwindPlan};

fn is_experience(entity: &PendingEntity) -> bool {
    entity.kind.is_experience()
}

/// Death drops announce experience orbs in their own event, separate from
/// everything else the dying entity left behind.
pub fn unwind(tracker: &mut PhaseTracker, state: PhaseState, ctx: &mut PhaseContext) -> Result<(), TrackerError> {
    let plan = match state {
        PhaseState::DeathDrops => UnwindPlan::rooted(SOURCE).split(is_experience, SpawnKind::Experience),
        _ => UnwindPlan::rooted(SOURCE),
    };
    unwind::run(tracker, state, ctx, plan)
}
