//! Integer chunk coordinates in the world grid.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Position of a chunk in the world grid, in chunk units.
///
/// Ordered lexicographically (x, then y, then z) so it can key ordered maps
/// and be deduplicated deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoords {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoords {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        ChunkCoords { x, y, z }
    }

    /// Chebyshev distance in the ground plane, ignoring z.
    ///
    /// The streaming window is a square, so "distance" here is the box
    /// distance, not Euclidean.
    pub fn planar_distance(&self, other: &ChunkCoords) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl Add for ChunkCoords {
    type Output = ChunkCoords;

    fn add(self, rhs: ChunkCoords) -> ChunkCoords {
        ChunkCoords::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl fmt::Display for ChunkCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_translation() {
        let a = ChunkCoords::new(3, -2, 0);
        let b = ChunkCoords::new(-1, 5, 2);
        assert_eq!(a + b, ChunkCoords::new(2, 3, 2));
    }

    #[test]
    fn test_lexicographic_order() {
        let mut coords = vec![
            ChunkCoords::new(1, 0, 0),
            ChunkCoords::new(0, 1, 0),
            ChunkCoords::new(0, 0, 1),
            ChunkCoords::new(-1, 9, 9),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                ChunkCoords::new(-1, 9, 9),
                ChunkCoords::new(0, 0, 1),
                ChunkCoords::new(0, 1, 0),
                ChunkCoords::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_planar_distance_ignores_z() {
        let a = ChunkCoords::new(0, 0, 0);
        let b = ChunkCoords::new(3, -2, 100);
        assert_eq!(a.planar_distance(&b), 3);
        assert_eq!(b.planar_distance(&a), 3);
    }
}
