//! Causeway World -- the block world the cause tracker mutates.
//!
//! This crate provides the simulation surface for the Causeway tracking
//! engine: block coordinates and states, generational entity IDs, pending and
//! materialized entities, per-position ownership, neighbor reactions, and a
//! deterministic snapshot with a BLAKE3 state hash.
//!
//! The world itself knows nothing about phases or causes. It offers raw
//! writes, flagged application that reports neighbor reactions, and restore;
//! the tracker decides when each of those is legal.
//!
//! # Quick Start
//!
//! ```
//! use causeway_world::prelude::*;
//!
//! let mut world = BlockWorld::new();
//! let pos = BlockPos::new(0, 64, 0);
//! world.set_raw(pos, BlockState::new("stone"));
//!
//! let before = world.snapshot(pos);
//! assert!(before.state.is("stone"));
//!
//! world.apply(&before.with_state(BlockState::air()), BlockFlags::ALL);
//! assert!(world.block(pos).is_air());
//! ```

#![deny(unsafe_code)]

pub mod block;
pub mod entity;
pub mod identity;
pub mod position;
pub mod snapshot;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// A snapshot is internally inconsistent and cannot be restored.
    #[error("world snapshot cannot be restored: {details}")]
    SnapshotMismatch { details: String },

    /// Serializing world state for hashing failed.
    #[error("failed to serialize world state: {details}")]
    Serialization { details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::block::{BlockChange, BlockFlags, BlockSnapshot, BlockState, AIR};
    pub use crate::entity::{Entity, EntityId, EntityKind, ItemStack, PendingEntity};
    pub use crate::identity::{Attribution, PluginId, UserId};
    pub use crate::position::BlockPos;
    pub use crate::snapshot::WorldSnapshot;
    pub use crate::world::{BlockWorld, Reaction, ReactionFn};
    pub use crate::WorldError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
