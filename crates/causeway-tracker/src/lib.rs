//! Causeway Tracker -- phase-based cause tracking for a block world.
//!
//! Every piece of simulation work runs inside a *phase*: a frame on the
//! [`PhaseTracker`](tracker::PhaseTracker)'s stack that names what kind of
//! work it is ([`PhaseState`](state::PhaseState)) and who is responsible for
//! it (cause slots on its [`PhaseContext`](context::PhaseContext)). While the
//! frame is on top, block writes and spawns are captured instead of applied.
//! When it is popped, the captures are drained: block transactions go through
//! a cancellable event pipeline that rolls back what listeners reject and
//! applies the rest, iterating until neighbor reactions stop producing new
//! writes; entities and item drops are announced in spawn events and
//! materialized with creator/notifier attribution.
//!
//! # Quick Start
//!
//! ```
//! use causeway_tracker::prelude::*;
//!
//! let mut tracker = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
//! tracker.register_listener("no-tnt", EventOrder::Default, |event, _tracker| {
//!     if let Some(change) = event.as_change_block_mut() {
//!         for tx in change.transactions_mut() {
//!             if tx.proposed().state.is("tnt") {
//!                 tx.invalidate();
//!             }
//!         }
//!     }
//! });
//!
//! let command = PhaseContext::new(PhaseState::Command)
//!     .with_cause(SOURCE, UserId(1))
//!     .with_cause(COMMAND, "setblock")
//!     .complete();
//! tracker.run_in(command, |t| {
//!     t.set_block(BlockPos::new(0, 64, 0), BlockState::new("tnt"), BlockFlags::ALL)?;
//!     t.set_block(BlockPos::new(1, 64, 0), BlockState::new("stone"), BlockFlags::ALL)
//! })?;
//!
//! assert!(tracker.world().block(BlockPos::new(0, 64, 0)).is_air());
//! assert!(tracker.world().block(BlockPos::new(1, 64, 0)).is("stone"));
//! assert_eq!(tracker.journal().rolled_back().count(), 1);
//! # Ok::<(), TrackerError>(())
//! ```

#![deny(unsafe_code)]

pub mod cause;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod group;
pub mod phase;
pub mod pipeline;
pub mod policy;
pub mod stack;
pub mod state;
pub mod tick;
pub mod tracker;
pub mod transaction;

mod spawn;
mod unwind;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use causeway_journal;
pub use causeway_world;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use causeway_world::prelude::*;

    pub use crate::cause::{
        Cause, CauseBuilder, CauseKey, CauseKind, CauseType, CauseValue, NamedCause, BLOCK_BROKEN,
        COMMAND, DAMAGE, NOTIFIER, OWNER, PHASE, PLUGIN, POPULATOR, SOURCE, TASK,
        UNWINDING_STATE, USED_ITEM,
    };
    pub use crate::config::TrackerConfig;
    pub use crate::context::{BufferCounts, CompletedPhase, ItemDrop, PhaseContext};
    pub use crate::diagnostics::{StackDiagnostics, TrackerStats};
    pub use crate::error::{ConfigError, EnrichmentError, TrackerError};
    pub use crate::event::{
        ChangeBlockEvent, ChangeBlockKind, Event, EventOrder, ListenerId, SpawnEntityEvent,
        SpawnKind,
    };
    pub use crate::group::PhaseGroup;
    pub use crate::policy::Policy;
    pub use crate::state::PhaseState;
    pub use crate::tick::{SystemFn, TickConfig, TickDiagnostics, TickLoop};
    pub use crate::tracker::{PhaseTracker, SpawnDisposition};
    pub use crate::transaction::{BlockTransaction, Transaction};

    pub use causeway_journal::journal::{
        BlockOutcome, BlockRecord, CauseJournal, SpawnOutcome, SpawnRecord,
    };
}
