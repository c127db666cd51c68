//! World snapshot and restore support.
//!
//! Provides [`WorldSnapshot`] -- a fully serializable representation of the
//! block world (blocks, entities, ownership, and allocator state) that can be
//! captured, hashed with BLAKE3, and used to restore the world to an exact
//! previous state. Reactions are not part of the snapshot: they are code, and
//! a restored world keeps the reactions it already had.

use serde::{Deserialize, Serialize};

use crate::block::BlockState;
use crate::entity::{Entity, EntityAllocator};
use crate::identity::Attribution;
use crate::position::BlockPos;
use crate::world::BlockWorld;
use crate::WorldError;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Serializable allocator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorSnapshot {
    pub generations: Vec<u32>,
    pub alive: Vec<bool>,
    pub free_indices: Vec<u32>,
}

/// A complete, serializable snapshot of a [`BlockWorld`].
///
/// All collections are stored in key order so that two worlds with the same
/// content always serialize (and hash) identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub blocks: Vec<(BlockPos, BlockState)>,
    pub entities: Vec<Entity>,
    pub ownership: Vec<(BlockPos, Attribution)>,
    pub allocator: AllocatorSnapshot,
}

impl WorldSnapshot {
    /// BLAKE3 hex digest of the snapshot's JSON form.
    pub fn hash(&self) -> Result<String, WorldError> {
        let json_bytes = serde_json::to_vec(self).map_err(|e| WorldError::Serialization {
            details: e.to_string(),
        })?;
        Ok(blake3::hash(&json_bytes).to_hex().to_string())
    }
}

// ---------------------------------------------------------------------------
// BlockWorld snapshot/restore impl
// ---------------------------------------------------------------------------

impl BlockWorld {
    /// Capture a complete snapshot of the world state.
    pub fn capture_snapshot(&self) -> WorldSnapshot {
        let (generations, alive, free_indices) = self.allocator.snapshot_state();
        WorldSnapshot {
            blocks: self
                .blocks
                .iter()
                .map(|(pos, state)| (*pos, state.clone()))
                .collect(),
            entities: self.entities.values().cloned().collect(),
            ownership: self.ownership.iter().map(|(pos, a)| (*pos, *a)).collect(),
            allocator: AllocatorSnapshot {
                generations,
                alive,
                free_indices,
            },
        }
    }

    /// Replace all state with the snapshot's content. Registered reactions
    /// are kept.
    ///
    /// # Errors
    ///
    /// [`WorldError::SnapshotMismatch`] if an entity in the snapshot is not
    /// alive according to the snapshot's own allocator state.
    pub fn restore_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<(), WorldError> {
        let allocator = EntityAllocator::restore_from_snapshot(
            snapshot.allocator.generations.clone(),
            snapshot.allocator.alive.clone(),
            snapshot.allocator.free_indices.clone(),
        );
        for entity in &snapshot.entities {
            if !allocator.is_alive(entity.id) {
                return Err(WorldError::SnapshotMismatch {
                    details: format!("{} is not alive in the snapshot allocator", entity.id),
                });
            }
        }

        self.blocks = snapshot.blocks.iter().cloned().collect();
        self.entities = snapshot.entities.iter().map(|e| (e.id, e.clone())).collect();
        self.ownership = snapshot.ownership.iter().copied().collect();
        self.allocator = allocator;
        Ok(())
    }

    /// BLAKE3 hash of the current world state.
    pub fn state_hash(&self) -> Result<String, WorldError> {
        self.capture_snapshot().hash()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
