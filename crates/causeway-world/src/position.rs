//! Integer block coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// A block coordinate in the world grid.
///
/// Ordering is lexicographic on `(x, y, z)`, which gives the world's block
/// store and every position-keyed buffer a deterministic iteration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    /// The world origin.
    pub const ORIGIN: BlockPos = BlockPos { x: 0, y: 0, z: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Return this position shifted by the given deltas.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    #[inline]
    pub const fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    #[inline]
    pub const fn down(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// The six face-adjacent neighbors in a fixed order:
    /// west, east, down, up, north, south.
    ///
    /// Neighbor notification walks this order, so reactions fire
    /// deterministically.
    pub fn neighbors(self) -> [BlockPos; 6] {
        [
            self.offset(-1, 0, 0),
            self.offset(1, 0, 0),
            self.offset(0, -1, 0),
            self.offset(0, 1, 0),
            self.offset(0, 0, -1),
            self.offset(0, 0, 1),
        ]
    }
}

impl fmt::Debug for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPos({}, {}, {})", self.x, self.y, self.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_are_face_adjacent_and_distinct() {
        let p = BlockPos::new(3, -2, 7);
        let n = p.neighbors();
        for q in n {
            let d = (q.x - p.x).abs() + (q.y - p.y).abs() + (q.z - p.z).abs();
            assert_eq!(d, 1);
        }
        let mut sorted = n.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 6);
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(BlockPos::new(0, 5, 5) < BlockPos::new(1, 0, 0));
        assert!(BlockPos::new(1, 0, 0) < BlockPos::new(1, 0, 1));
    }

    #[test]
    fn up_and_down_are_inverse() {
        let p = BlockPos::new(4, 4, 4);
        assert_eq!(p.up().down(), p);
        assert_eq!(BlockPos::ORIGIN.up(), BlockPos::new(0, 1, 0));
    }
}
