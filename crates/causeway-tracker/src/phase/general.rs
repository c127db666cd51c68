//! General group: commands, explosions, restoration, and post-unwind.
//!
//! The post-unwind state has no procedure of its own. Its frame carries the
//! state being unwound in the `UNWINDING_STATE` slot, and whatever was
//! captured into it while that state's events ran is drained with that
//! state's procedure.

use tracing::trace;

use crate::cause::{CauseKind, SOURCE, UNWINDING_STATE};
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::unwind::{self, UnwindPlan};

pub fn unwind(tracker: &mut PhaseTracker, state: PhaseState, ctx: &mut PhaseContext) -> Result<(), TrackerError> {
    match state {
        PhaseState::Command | PhaseState::Explosion => {
            unwind::run(tracker, state, ctx, UnwindPlan::rooted(SOURCE))
        }
        PhaseState::PostUnwind => delegate(tracker, ctx),
        // Neither captures anything.
        PhaseState::Idle | PhaseState::RestoringBlocks => Ok(()),
        other => unwind::run(tracker, other, ctx, UnwindPlan::INHERIT),
    }
}

fn delegate(tracker: &mut PhaseTracker, ctx: &mut PhaseContext) -> Result<(), TrackerError> {
    let inner = match ctx.first_named::<PhaseState>(UNWINDING_STATE) {
        Some(&inner) if inner != PhaseState::PostUnwind => inner,
        _ => {
            return Err(tracker.missing_cause(PhaseState::PostUnwind, UNWINDING_STATE, CauseKind::Phase));
        }
    };
    if !ctx.has_captures() {
        return Ok(());
    }
    tracker.require_causes(inner, ctx)?;
    trace!(unwinding = %inner, captures = %ctx.counts(), "draining post-unwind captures");
    (inner.unwind_fn())(tracker, inner, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::COMMAND;
    use crate::config::TrackerConfig;
    use causeway_world::identity::UserId;
    use causeway_world::world::BlockWorld;

    #[test]
    fn post_unwind_without_unwinding_state_is_rejected() {
        let mut tracker = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
        let mut ctx = PhaseContext::new(PhaseState::PostUnwind);
        let err = unwind(&mut tracker, PhaseState::PostUnwind, &mut ctx).unwrap_err();
        assert!(matches!(err, TrackerError::MissingCause { key: UNWINDING_STATE, .. }));
    }

    #[test]
    fn post_unwind_checks_the_delegate_slots() {
        let mut tracker = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
        let mut ctx = PhaseContext::new(PhaseState::PostUnwind)
            .with_cause(UNWINDING_STATE, PhaseState::Command)
            .with_cause(SOURCE, UserId(3));
        ctx.capture_entity(causeway_world::entity::PendingEntity::mob(
            "pig",
            causeway_world::position::BlockPos::ORIGIN,
        ));
        let err = unwind(&mut tracker, PhaseState::PostUnwind, &mut ctx).unwrap_err();
        assert!(matches!(err, TrackerError::MissingCause { phase: PhaseState::Command, key: COMMAND, .. }));
    }

    #[test]
    fn empty_contexts_unwind_to_nothing() {
        let mut tracker = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
        let mut ctx = PhaseContext::new(PhaseState::RestoringBlocks);
        unwind(&mut tracker, PhaseState::RestoringBlocks, &mut ctx).unwrap();
        assert!(tracker.journal().is_empty());
    }
}
