//! Block states, snapshots, change kinds, and application flags.
//!
//! A [`BlockState`] is the value stored at one [`BlockPos`]: a block type name
//! plus a small data value (growth stage, orientation, power level). A
//! [`BlockSnapshot`] pairs a state with the position it was observed at and is
//! the payload of every captured block transaction.
//!
//! [`BlockChange`] classifies a transition between two states. It carries no
//! behavior of its own; the tracker only uses it to bucket transactions into
//! per-kind events.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::BlockPos;

// ---------------------------------------------------------------------------
// BlockState
// ---------------------------------------------------------------------------

/// The name used for the empty block.
pub const AIR: &str = "air";

/// The state of a single block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockState {
    block: String,
    data: u8,
}

impl BlockState {
    /// A block of the given type with data value 0.
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            data: 0,
        }
    }

    /// The empty block.
    pub fn air() -> Self {
        Self::new(AIR)
    }

    /// Return a copy of this state with a different data value.
    pub fn with_data(mut self, data: u8) -> Self {
        self.data = data;
        self
    }

    pub fn block(&self) -> &str {
        &self.block
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    pub fn is_air(&self) -> bool {
        self.block == AIR
    }

    /// Whether `other` has the same block type (data may differ).
    pub fn same_block(&self, other: &BlockState) -> bool {
        self.block == other.block
    }

    pub fn is(&self, block: &str) -> bool {
        self.block == block
    }
}

impl Default for BlockState {
    fn default() -> Self {
        Self::air()
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data == 0 {
            write!(f, "{}", self.block)
        } else {
            write!(f, "{}[{}]", self.block, self.data)
        }
    }
}

// ---------------------------------------------------------------------------
// BlockSnapshot
// ---------------------------------------------------------------------------

/// A block state observed at a position.
///
/// Snapshots are immutable values; restoring one writes its state back to its
/// position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub pos: BlockPos,
    pub state: BlockState,
}

impl BlockSnapshot {
    pub fn new(pos: BlockPos, state: BlockState) -> Self {
        Self { pos, state }
    }

    /// The same position with a different state.
    pub fn with_state(&self, state: BlockState) -> Self {
        Self {
            pos: self.pos,
            state,
        }
    }
}

impl fmt::Display for BlockSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.state, self.pos)
    }
}

// ---------------------------------------------------------------------------
// BlockChange
// ---------------------------------------------------------------------------

/// The kind of a block transition, used to bucket transactions into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockChange {
    /// A non-air block replaced air, or one block type replaced another.
    Place,
    /// A block became air.
    Break,
    /// Same block type, different data value.
    Modify,
    /// A block removed by natural decay (assigned by the active phase, never
    /// inferred from states alone).
    Decay,
}

impl BlockChange {
    /// Infer the kind of a transition from its two endpoint states.
    ///
    /// Air to air (a no-op write) classifies as `Modify`.
    pub fn infer(original: &BlockState, proposed: &BlockState) -> BlockChange {
        match (original.is_air(), proposed.is_air()) {
            (false, true) => BlockChange::Break,
            (true, false) => BlockChange::Place,
            (true, true) => BlockChange::Modify,
            (false, false) if original.same_block(proposed) => BlockChange::Modify,
            (false, false) => BlockChange::Place,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockChange::Place => "place",
            BlockChange::Break => "break",
            BlockChange::Modify => "modify",
            BlockChange::Decay => "decay",
        }
    }
}

impl fmt::Display for BlockChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// BlockFlags
// ---------------------------------------------------------------------------

/// Side effects requested when a block state is applied to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockFlags {
    /// Run neighbor reactions for the six adjacent positions.
    pub notify_neighbors: bool,
    /// Stamp creator/notifier ownership onto the position.
    pub track_ownership: bool,
}

impl BlockFlags {
    /// Full application: neighbor reactions and ownership tracking.
    pub const ALL: BlockFlags = BlockFlags {
        notify_neighbors: true,
        track_ownership: true,
    };

    /// Raw write with no side effects.
    pub const NONE: BlockFlags = BlockFlags {
        notify_neighbors: false,
        track_ownership: false,
    };

    /// Return these flags with neighbor notification removed.
    pub fn without_physics(self) -> BlockFlags {
        BlockFlags {
            notify_neighbors: false,
            ..self
        }
    }
}

impl Default for BlockFlags {
    fn default() -> Self {
        Self::ALL
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
