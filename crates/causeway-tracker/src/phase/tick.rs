//! Tick group: block, random block, and entity ticks, all rooted at the
//! ticking thing.

use crate::cause::SOURCE;
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::unwind::{self, UnwindPlan};

pub fn unwind(tracker: &mut PhaseTracker, state: PhaseState, ctx: &mut PhaseContext) -> Result<(), TrackerError> {
    unwind::run(tracker, state, ctx, UnwindPlan::rooted(SOURCE))
}
