//! The block pipeline: bucket, post, roll back, apply, repeat.
//!
//! One pass takes every captured block transaction out of the context and
//!
//! 1. buckets them by change kind, in order of first appearance;
//! 2. posts one [`ChangeBlockEvent`] per bucket, then an aggregate `Post`
//!    event over all of them;
//! 3. restores the originals of invalid transactions, newest first, inside a
//!    `RestoringBlocks` frame;
//! 4. applies the valid ones in capture order, capturing the neighbor
//!    reactions they trigger back into the same context;
//! 5. flushes the drops of applied positions (block drops keyed by the
//!    position and entity drops landing on it) as item spawns rooted at the
//!    new block.
//!
//! If posting fails, every write of the pass is restored before the error is
//! returned.
//!
//! Passes repeat until a pass captures nothing new, bounded by
//! `max_drain_passes`.

use causeway_journal::journal::{BlockOutcome, BlockRecord};
use causeway_world::block::{BlockChange, BlockSnapshot};
use causeway_world::entity::{ItemStack, PendingEntity};
use tracing::{debug, error, trace, warn};

use crate::cause::{Cause, CauseBuilder, SOURCE};
use crate::context::{CapturedBlock, PhaseContext};
use crate::error::TrackerError;
use crate::event::{ChangeBlockEvent, ChangeBlockKind, Event, SpawnKind};
use crate::spawn;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::transaction::{BlockTransaction, Transaction};

/// Totals of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub passes: u32,
    pub applied: usize,
    pub rolled_back: usize,
}

/// Drain `ctx`'s block buffer to a fixed point.
///
/// `state` drives classification and physics; `cause` is attached to every
/// event posted along the way.
pub(crate) fn drain_blocks(
    tracker: &mut PhaseTracker,
    state: PhaseState,
    ctx: &mut PhaseContext,
    cause: &Cause,
) -> Result<PipelineReport, TrackerError> {
    let mut report = PipelineReport::default();
    loop {
        let captured = ctx.take_blocks();
        if captured.is_empty() {
            break;
        }
        if report.passes >= tracker.config().max_drain_passes {
            for entry in captured.iter().rev() {
                tracker.world_mut().restore(entry.transaction.original());
            }
            let stack = tracker.diagnostics();
            error!(phase = %state, passes = report.passes, remaining = captured.len(), %stack, "block pipeline did not converge");
            return Err(TrackerError::DrainDidNotConverge {
                phase: state,
                passes: report.passes,
                remaining: captured.len(),
                stack,
            });
        }
        report.passes += 1;
        run_pass(tracker, state, ctx, cause, captured, &mut report)?;
    }
    if report.passes > 0 {
        debug!(phase = %state, passes = report.passes, applied = report.applied, rolled_back = report.rolled_back, "block pipeline drained");
    }
    Ok(report)
}

fn run_pass(
    tracker: &mut PhaseTracker,
    state: PhaseState,
    ctx: &mut PhaseContext,
    cause: &Cause,
    captured: Vec<CapturedBlock>,
    report: &mut PipelineReport,
) -> Result<(), TrackerError> {
    let pass = report.passes;
    let changes: Vec<BlockChange> = captured
        .iter()
        .map(|c| state.classify(&c.transaction.original().state, &c.transaction.proposed().state))
        .collect();

    let mut buckets: Vec<(BlockChange, Vec<usize>)> = Vec::new();
    for (idx, change) in changes.iter().enumerate() {
        match buckets.iter_mut().find(|(kind, _)| kind == change) {
            Some((_, indices)) => indices.push(idx),
            None => buckets.push((*change, vec![idx])),
        }
    }
    trace!(phase = %state, pass, transactions = captured.len(), buckets = buckets.len(), "pipeline pass");

    let mut transactions: Vec<BlockTransaction> =
        captured.iter().map(|c| c.transaction.clone()).collect();

    if let Err(err) = post_events(tracker, cause, &buckets, &mut transactions) {
        // Nothing was approved: undo every provisional write of the pass.
        for entry in captured.iter().rev() {
            tracker.world_mut().restore(entry.transaction.original());
        }
        return Err(err);
    }

    let phase_label = ctx.state().name();
    let root_cause = cause.root_label();
    let tick = tracker.tick();

    // -- rollback --

    let invalid: Vec<usize> = (0..transactions.len())
        .filter(|&i| !transactions[i].is_valid())
        .collect();
    if !invalid.is_empty() {
        tracker.push_internal(PhaseContext::new(PhaseState::RestoringBlocks));
        for &idx in invalid.iter().rev() {
            let tx = &transactions[idx];
            trace!(phase = %state, at = %tx.original(), "roll back");
            tracker.world_mut().restore(tx.original());
            ctx.clear_drops_at(tx.pos());
            tracker.record_block(BlockRecord {
                tick,
                pass,
                pos: tx.pos(),
                original: tx.original().state.clone(),
                final_state: tx.original().state.clone(),
                change: changes[idx],
                outcome: BlockOutcome::RolledBack,
                phase: phase_label.to_owned(),
                root_cause: root_cause.clone(),
            });
        }
        tracker.pop_and_unwind()?;
        report.rolled_back += invalid.len();
        tracker.stats_mut().rolled_back += invalid.len() as u64;
    }

    // -- apply --

    let attribution = ctx.attribution();
    let physics_off = state.ignores_block_physics();
    let mut pending_drops: Vec<(BlockSnapshot, Vec<ItemStack>)> = Vec::new();
    let mut applied = 0usize;

    for (idx, tx) in transactions.iter().enumerate() {
        if !tx.is_valid() {
            continue;
        }
        let requested = captured[idx].flags;
        let flags = if physics_off {
            requested.without_physics()
        } else {
            requested
        };
        let final_snap = tx.final_value().clone();
        trace!(phase = %state, at = %final_snap, "apply");
        let reactions = tracker.world_mut().apply(&final_snap, flags);
        if flags.track_ownership {
            tracker.world_mut().stamp_ownership(final_snap.pos, attribution);
        }

        let drops = ctx.take_drops_at(final_snap.pos);
        if !drops.is_empty() {
            pending_drops.push((final_snap.clone(), drops));
        }

        for (npos, reaction) in reactions {
            let original = tracker.world().snapshot(npos);
            if original.state == reaction.state {
                continue;
            }
            for stack in reaction.drops {
                ctx.capture_block_drop(npos, stack);
            }
            let proposed = original.with_state(reaction.state.clone());
            ctx.capture_block(Transaction::new(original, proposed), requested);
            tracker.world_mut().set_raw(npos, reaction.state);
        }

        tracker.record_block(BlockRecord {
            tick,
            pass,
            pos: final_snap.pos,
            original: tx.original().state.clone(),
            final_state: final_snap.state.clone(),
            change: changes[idx],
            outcome: BlockOutcome::Applied,
            phase: phase_label.to_owned(),
            root_cause: root_cause.clone(),
        });
        applied += 1;
    }
    report.applied += applied;
    let stats = tracker.stats_mut();
    stats.applied += applied as u64;
    stats.pipeline_passes += 1;

    // -- drops of applied positions --

    for (snapshot, stacks) in pending_drops {
        let pos = snapshot.pos;
        let mut builder = CauseBuilder::rooted(SOURCE, snapshot);
        builder.extend_from(cause);
        let items: Vec<PendingEntity> = stacks
            .into_iter()
            .map(|stack| PendingEntity::item(stack, pos))
            .collect();
        spawn::drain_spawns(
            tracker,
            ctx.state(),
            attribution,
            &builder.build(),
            SpawnKind::DropItem,
            items,
        )?;
    }
    Ok(())
}

/// Post one event per bucket, then the aggregate `Post` event, merging
/// listener edits back after each.
fn post_events(
    tracker: &mut PhaseTracker,
    cause: &Cause,
    buckets: &[(BlockChange, Vec<usize>)],
    transactions: &mut [BlockTransaction],
) -> Result<(), TrackerError> {
    for (change, indices) in buckets {
        let txs = indices.iter().map(|&i| transactions[i].clone()).collect();
        let mut event = Event::ChangeBlock(ChangeBlockEvent::new(
            ChangeBlockKind::Change(*change),
            cause.clone(),
            txs,
        ));
        let cancelled = tracker.post_event(&mut event)?;
        merge_back(transactions, indices, event, cancelled);
    }

    let all: Vec<usize> = (0..transactions.len()).collect();
    let mut post = Event::ChangeBlock(ChangeBlockEvent::new(
        ChangeBlockKind::Post,
        cause.clone(),
        transactions.to_vec(),
    ));
    let cancelled = tracker.post_event(&mut post)?;
    merge_back(transactions, &all, post, cancelled);
    Ok(())
}

/// Copy listener edits from a posted event back onto the pass's
/// transactions. Validity is taken as-is, so a later event may re-validate
/// what an earlier one invalidated. A cancelled event invalidates all of its
/// transactions.
fn merge_back(transactions: &mut [BlockTransaction], indices: &[usize], event: Event, cancelled: bool) {
    let edited = match event {
        Event::ChangeBlock(event) if event.transactions().len() == indices.len() => {
            event.into_transactions()
        }
        Event::ChangeBlock(event) => {
            warn!(
                expected = indices.len(),
                actual = event.transactions().len(),
                "listener replaced the transactions of a block event; edits ignored"
            );
            Vec::new()
        }
        Event::SpawnEntity(_) => {
            warn!("listener replaced a block event with another kind; edits ignored");
            Vec::new()
        }
    };
    if edited.is_empty() {
        if cancelled {
            for &idx in indices {
                transactions[idx].invalidate();
            }
        }
        return;
    }
    for (&idx, edited) in indices.iter().zip(edited) {
        let target = &mut transactions[idx];
        target.set_valid(edited.is_valid() && !cancelled);
        match edited.custom() {
            Some(custom) if custom.pos == target.pos() => target.set_custom(custom.clone()),
            Some(custom) => {
                warn!(at = %target.pos(), custom = %custom, "custom block state targets another position; ignored");
                target.clear_custom();
            }
            None => target.clear_custom(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_world::block::BlockState;
    use causeway_world::position::BlockPos;

    fn tx(x: i32, to: &str) -> BlockTransaction {
        let pos = BlockPos::new(x, 0, 0);
        Transaction::new(
            BlockSnapshot::new(pos, BlockState::air()),
            BlockSnapshot::new(pos, BlockState::new(to)),
        )
    }

    #[test]
    fn merge_back_takes_validity_and_custom() {
        let mut txs = vec![tx(0, "stone"), tx(1, "dirt")];
        let mut edited = txs.clone();
        edited[0].invalidate();
        edited[1].set_custom(BlockSnapshot::new(BlockPos::new(1, 0, 0), BlockState::new("glass")));
        let event = Event::ChangeBlock(ChangeBlockEvent::new(ChangeBlockKind::Post, Cause::default(), edited));
        merge_back(&mut txs, &[0, 1], event, false);
        assert!(!txs[0].is_valid());
        assert!(txs[1].final_value().state.is("glass"));
    }

    #[test]
    fn merge_back_revalidates_and_cancels() {
        let mut txs = vec![tx(0, "stone")];
        txs[0].invalidate();
        let event = Event::ChangeBlock(ChangeBlockEvent::new(ChangeBlockKind::Post, Cause::default(), vec![tx(0, "stone")]));
        merge_back(&mut txs, &[0], event, false);
        assert!(txs[0].is_valid());

        let event = Event::ChangeBlock(ChangeBlockEvent::new(ChangeBlockKind::Post, Cause::default(), txs.clone()));
        merge_back(&mut txs, &[0], event, true);
        assert!(!txs[0].is_valid());
    }

    #[test]
    fn custom_for_other_position_is_dropped() {
        let mut txs = vec![tx(0, "stone")];
        let mut edited = txs.clone();
        edited[0].set_custom(BlockSnapshot::new(BlockPos::new(9, 9, 9), BlockState::new("gold")));
        let event = Event::ChangeBlock(ChangeBlockEvent::new(ChangeBlockKind::Post, Cause::default(), edited));
        merge_back(&mut txs, &[0], event, false);
        assert!(txs[0].custom().is_none());
        assert!(txs[0].is_valid());
    }

    #[test]
    fn replaced_transaction_list_is_ignored() {
        let mut txs = vec![tx(0, "stone"), tx(1, "dirt")];
        let mut shorter = vec![tx(1, "dirt")];
        shorter[0].invalidate();
        let event = Event::ChangeBlock(ChangeBlockEvent::new(ChangeBlockKind::Post, Cause::default(), shorter));
        merge_back(&mut txs, &[0, 1], event, false);
        assert!(txs.iter().all(|t| t.is_valid()), "misaligned edits must not land on the wrong transaction");

        let event = Event::ChangeBlock(ChangeBlockEvent::new(ChangeBlockKind::Post, Cause::default(), Vec::new()));
        merge_back(&mut txs, &[0, 1], event, true);
        assert!(txs.iter().all(|t| !t.is_valid()), "cancellation still applies");
    }
}
