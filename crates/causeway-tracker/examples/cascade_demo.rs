//! Fuse cascade demo -- a plugin task lights a fuse line, a protection
//! listener stops the burn at a guarded block, and the journal shows who did
//! what in which pass.
//!
//! Run with:
//!   RUST_LOG=causeway_tracker=debug cargo run --example cascade_demo -p causeway-tracker

use causeway_tracker::prelude::*;

const FUSE_LEN: i32 = 8;
const GUARDED_X: i32 = 6;

fn at(x: i32) -> BlockPos {
    BlockPos::new(x, 64, 0)
}

/// A burnt block ignites a neighboring fuse and leaves ash behind.
fn fuse_chain(_world: &BlockWorld, changed: &BlockSnapshot, neighbor: &BlockSnapshot) -> Option<Reaction> {
    if changed.state.is("burnt") && neighbor.state.is("fuse") {
        Some(Reaction::new(BlockState::new("burnt")).with_drop(ItemStack::new("ash", 1)))
    } else {
        None
    }
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut world = BlockWorld::new();
    world.register_reaction("fuse", fuse_chain);
    for x in 1..=FUSE_LEN {
        world.set_raw(at(x), BlockState::new("fuse"));
    }

    let mut tracker = PhaseTracker::new(world, TrackerConfig::default());
    tracker.register_listener("protect", EventOrder::Early, |event, _| {
        if let Some(change) = event.as_change_block_mut() {
            for tx in change.transactions_mut() {
                if tx.pos() == at(GUARDED_X) {
                    tx.invalidate();
                }
            }
        }
    });

    let mut sim = TickLoop::new(tracker, TickConfig::default());
    sim.schedule(PluginId::new("demolition"), "light_fuse", |t| {
        t.set_block(at(0), BlockState::new("burnt"), BlockFlags::ALL)
    });
    sim.tick()?;

    let tracker = sim.tracker();
    println!("tick {} ({} passes)", sim.tick_count(), tracker.journal().max_pass());
    for record in tracker.journal().block_records() {
        println!(
            "  pass {:>2}  {}  {} -> {}  {:?}  [{} / {}]",
            record.pass,
            record.pos,
            record.original,
            record.final_state,
            record.outcome,
            record.phase,
            record.root_cause,
        );
    }
    for record in tracker.journal().spawn_records() {
        println!(
            "  spawn {} at {}  {:?}  [{}]",
            record.entity_type, record.pos, record.outcome, record.spawn_kind
        );
    }

    let row: String = (0..=FUSE_LEN)
        .map(|x| {
            let block = tracker.world().block(at(x));
            if block.is("burnt") {
                '#'
            } else if block.is("fuse") {
                '-'
            } else {
                '.'
            }
        })
        .collect();
    println!("fuse line: {row}");
    println!("state hash: {}", sim.state_hash()?);
    Ok(())
}
