//! Property tests for stack discipline and transaction ordering.
//!
//! Random push/pop/write sequences must keep the tracker's stack in lockstep
//! with a plain `Vec` model, and random invalidation patterns must apply in
//! capture order and roll back in exact reverse.

use std::rc::Rc;

use causeway_tracker::prelude::*;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Stack discipline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum StackOp {
    Push(usize),
    Pop,
    Write(i32, bool),
}

fn stack_op_strategy() -> impl Strategy<Value = StackOp> {
    prop_oneof![
        3 => (0..PhaseState::ALL.len()).prop_map(StackOp::Push),
        2 => Just(StackOp::Pop),
        2 => (0..8i32, any::<bool>()).prop_map(|(x, solid)| StackOp::Write(x, solid)),
    ]
}

/// A context for `state` carrying every slot it requires.
fn complete_phase(state: PhaseState) -> CompletedPhase {
    let ctx = PhaseContext::new(state);
    let ctx = match state {
        PhaseState::Command => ctx.with_cause(SOURCE, UserId(1)).with_cause(COMMAND, "op"),
        PhaseState::Explosion => ctx.with_cause(SOURCE, BlockPos::ORIGIN),
        PhaseState::PostUnwind => ctx
            .with_cause(UNWINDING_STATE, PhaseState::Command)
            .with_cause(SOURCE, UserId(1))
            .with_cause(COMMAND, "op"),
        PhaseState::BlockDropItems => ctx.with_cause(
            BLOCK_BROKEN,
            BlockSnapshot::new(BlockPos::ORIGIN, BlockState::new("stone")),
        ),
        PhaseState::BlockDecay | PhaseState::BlockTick | PhaseState::RandomBlockTick => ctx.with_cause(
            SOURCE,
            BlockSnapshot::new(BlockPos::ORIGIN, BlockState::new("leaves")),
        ),
        PhaseState::DeathDrops | PhaseState::EntityTick => {
            ctx.with_cause(SOURCE, EntityId::new(0, 0))
        }
        PhaseState::Populate => ctx.with_cause(POPULATOR, "ores"),
        PhaseState::ScheduledTask => ctx.with_cause(PLUGIN, PluginId::new("test")),
        PhaseState::PlayerInteraction => ctx.with_cause(SOURCE, UserId(2)),
        PhaseState::Idle
        | PhaseState::RestoringBlocks
        | PhaseState::TerrainGeneration
        | PhaseState::ChunkLoading => ctx,
    };
    ctx.complete()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn stack_tracks_model(ops in prop::collection::vec(stack_op_strategy(), 0..40)) {
        let mut t = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
        let mut model: Vec<PhaseState> = Vec::new();

        for op in ops {
            match op {
                StackOp::Push(idx) => {
                    let state = PhaseState::ALL[idx];
                    let current = model.last().copied().unwrap_or(PhaseState::Idle);
                    let result = t.push(complete_phase(state));
                    if current.can_switch_to(state) {
                        prop_assert!(result.is_ok(), "push {state} over {current}: {result:?}");
                        model.push(state);
                    } else {
                        let rejected = matches!(result, Err(TrackerError::IncompatiblePush { .. }));
                        prop_assert!(rejected);
                    }
                }
                StackOp::Pop => {
                    let result = t.pop_and_unwind();
                    if model.pop().is_some() {
                        prop_assert!(result.is_ok(), "{result:?}");
                    } else {
                        let empty = matches!(result, Err(TrackerError::PopOnEmptyStack));
                        prop_assert!(empty);
                    }
                }
                StackOp::Write(x, solid) => {
                    let state = if solid { BlockState::new("stone") } else { BlockState::air() };
                    prop_assert!(t.set_block(BlockPos::new(x, 0, 0), state, BlockFlags::ALL).is_ok());
                }
            }
            prop_assert_eq!(t.depth(), model.len());
            prop_assert_eq!(t.current_state(), model.last().copied().unwrap_or(PhaseState::Idle));
            prop_assert_eq!(t.ensure_empty().is_ok(), model.is_empty());
        }

        while model.pop().is_some() {
            prop_assert!(t.pop_and_unwind().is_ok());
        }
        prop_assert!(t.ensure_empty().is_ok());
    }
}

// ---------------------------------------------------------------------------
// Transaction ordering
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn apply_in_capture_order_rollback_in_reverse(
        invalid in prop::collection::vec(any::<bool>(), 1..24),
        cancel_post in any::<bool>(),
    ) {
        let mut t = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
        let flags = Rc::new(invalid.clone());
        let listener_flags = Rc::clone(&flags);
        t.register_listener("invalidate", EventOrder::Default, move |event, _| {
            let is_post = event
                .as_change_block()
                .is_some_and(|e| e.kind() == ChangeBlockKind::Post);
            if let Some(change) = event.as_change_block_mut() {
                for tx in change.transactions_mut() {
                    if listener_flags[tx.pos().x as usize] {
                        tx.invalidate();
                    }
                }
            }
            if is_post && cancel_post {
                event.set_cancelled(true);
            }
        });

        let count = invalid.len() as i32;
        let phase = PhaseContext::new(PhaseState::Command)
            .with_cause(SOURCE, UserId(1))
            .with_cause(COMMAND, "fill")
            .complete();
        t.run_in(phase, |t| {
            for x in 0..count {
                t.set_block(BlockPos::new(x, 0, 0), BlockState::new("stone"), BlockFlags::ALL)?;
            }
            Ok(())
        }).unwrap();

        let applied: Vec<i32> = t.journal().applied().map(|r| r.pos.x).collect();
        let rolled_back: Vec<i32> = t.journal().rolled_back().map(|r| r.pos.x).collect();

        let expected_applied: Vec<i32> = if cancel_post {
            Vec::new()
        } else {
            (0..count).filter(|&x| !invalid[x as usize]).collect()
        };
        let expected_rolled_back: Vec<i32> = (0..count)
            .rev()
            .filter(|&x| cancel_post || invalid[x as usize])
            .collect();

        prop_assert_eq!(applied, expected_applied);
        prop_assert_eq!(rolled_back, expected_rolled_back);

        for x in 0..count {
            let kept = !cancel_post && !invalid[x as usize];
            prop_assert_eq!(t.world().block(BlockPos::new(x, 0, 0)).is("stone"), kept);
        }
        prop_assert!(t.ensure_empty().is_ok());
    }
}
