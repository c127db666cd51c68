//! Generation group.
//!
//! Terrain generation and chunk loading capture nothing: blocks are written
//! directly without physics and entities spawn immediately. Populators
//! capture their entities so the whole batch is announced as one
//! `populate` event rooted at the populator.

use crate::cause::POPULATOR;
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::event::SpawnKind;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::unwind::{self, UnwindPlan};

pub fn unwind(tracker: &mut PhaseTracker, state: PhaseState, ctx: &mut PhaseContext) -> Result<(), TrackerError> {
    let plan = match state {
        PhaseState::Populate => UnwindPlan::rooted(POPULATOR).spawning(SpawnKind::Populate),
        _ => UnwindPlan::INHERIT,
    };
    unwind::run(tracker, state, ctx, plan)
}
