//! Block group: drops of a broken block, and decay.

use crate::cause::{BLOCK_BROKEN, SOURCE};
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::event::SpawnKind;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::unwind::{self, UnwindPlan};

/// Drops of a broken block are rooted at the block that broke, not at
/// whoever broke it.
pub fn unwind(tracker: &mut PhaseTracker, state: PhaseState, ctx: &mut PhaseContext) -> Result<(), TrackerError> {
    let plan = match state {
        PhaseState::BlockDropItems => UnwindPlan::rooted(BLOCK_BROKEN).spawning(SpawnKind::DropItem),
        PhaseState::BlockDecay => UnwindPlan::rooted(SOURCE),
        _ => UnwindPlan::INHERIT,
    };
    unwind::run(tracker, state, ctx, plan)
}
