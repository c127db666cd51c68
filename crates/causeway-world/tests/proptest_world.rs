//! Property tests for world storage and snapshots.
//!
//! These tests use `proptest` to generate random sequences of world writes and
//! entity operations and verify that snapshot/restore and raw restore hold
//! their invariants after each sequence.

use causeway_world::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum WorldOp {
    Set(i32, i32, u8),
    Clear(i32, i32),
    Spawn(i32),
    Despawn(usize),
}

fn world_op_strategy() -> impl Strategy<Value = WorldOp> {
    prop_oneof![
        (0..8i32, 0..8i32, 0..4u8).prop_map(|(x, z, d)| WorldOp::Set(x, z, d)),
        (0..8i32, 0..8i32).prop_map(|(x, z)| WorldOp::Clear(x, z)),
        (0..8i32).prop_map(WorldOp::Spawn),
        (0..16usize).prop_map(WorldOp::Despawn),
    ]
}

fn run_ops(world: &mut BlockWorld, ops: &[WorldOp]) {
    let mut spawned: Vec<EntityId> = Vec::new();
    for op in ops {
        match op {
            WorldOp::Set(x, z, d) => {
                world.set_raw(BlockPos::new(*x, 0, *z), BlockState::new("stone").with_data(*d));
            }
            WorldOp::Clear(x, z) => {
                world.set_raw(BlockPos::new(*x, 0, *z), BlockState::air());
            }
            WorldOp::Spawn(x) => {
                spawned.push(world.spawn_entity(PendingEntity::mob("sheep", BlockPos::new(*x, 1, 0))));
            }
            WorldOp::Despawn(i) => {
                if !spawned.is_empty() {
                    let id = spawned.remove(i % spawned.len());
                    world.despawn(id).unwrap();
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any sequence of mutations after a snapshot is fully undone by restore.
    #[test]
    fn restore_undoes_any_mutation_sequence(
        setup in prop::collection::vec(world_op_strategy(), 0..30),
        noise in prop::collection::vec(world_op_strategy(), 0..30),
    ) {
        let mut world = BlockWorld::new();
        run_ops(&mut world, &setup);
        let snap = world.capture_snapshot();
        let hash = snap.hash().unwrap();

        run_ops(&mut world, &noise);
        world.restore_snapshot(&snap).unwrap();

        prop_assert_eq!(world.state_hash().unwrap(), hash);
    }

    /// Restoring originals in reverse capture order returns every position to
    /// its first observed state, even when a position was written repeatedly.
    #[test]
    fn reverse_restore_returns_first_original(
        writes in prop::collection::vec((0..4i32, 0..6u8), 1..40),
    ) {
        let mut world = BlockWorld::new();
        let initial = world.capture_snapshot().hash().unwrap();

        let mut originals = Vec::new();
        for (x, d) in &writes {
            let pos = BlockPos::new(*x, 0, 0);
            originals.push(world.set_raw(pos, BlockState::new("wool").with_data(*d)));
        }
        for original in originals.iter().rev() {
            world.restore(original);
        }

        prop_assert_eq!(world.state_hash().unwrap(), initial);
        prop_assert_eq!(world.block_count(), 0);
    }
}
