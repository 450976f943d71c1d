//! Grid positions.
//!
//! A node is identified by its position alone. Positions are plain values,
//! so they double as map keys everywhere in the mesh.

use std::ops::{Add, Neg, Sub};

use crate::Direction;

/// A position on the 3D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodePosition {
    /// East/west axis
    pub x: i32,
    /// Vertical axis
    pub y: i32,
    /// North/south axis
    pub z: i32,
}

impl NodePosition {
    /// Origin of the grid.
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a new position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The adjacent position through the given port.
    ///
    /// Positions on the edge of the `i32` range have no neighbor on that
    /// side; use [`checked_neighbor`](Self::checked_neighbor) wherever that
    /// can happen.
    #[inline]
    pub fn neighbor(&self, dir: Direction) -> Self {
        *self + dir.offset()
    }

    /// The adjacent position through the given port, or `None` past the edge
    /// of the grid.
    #[inline]
    pub fn checked_neighbor(&self, dir: Direction) -> Option<Self> {
        let step = dir.offset();
        Some(Self {
            x: self.x.checked_add(step.x)?,
            y: self.y.checked_add(step.y)?,
            z: self.z.checked_add(step.z)?,
        })
    }

    /// The direction leading from `self` to `other`, if they are adjacent.
    pub fn direction_to(&self, other: Self) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|d| self.checked_neighbor(*d) == Some(other))
    }

    /// Manhattan distance between two positions.
    pub fn manhattan(&self, other: &Self) -> u64 {
        u64::from(self.x.abs_diff(other.x)) + u64::from(self.y.abs_diff(other.y)) + u64::from(self.z.abs_diff(other.z))
    }
}

impl Add for NodePosition {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl Sub for NodePosition {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl Neg for NodePosition {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl std::fmt::Display for NodePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_zero() {
        let origin = NodePosition::ORIGIN;
        assert_eq!(origin, NodePosition::new(0, 0, 0));
        assert_eq!(origin, NodePosition::default());
    }

    #[test]
    fn neighbor_steps_one_cell() {
        let p = NodePosition::new(3, -2, 7);
        for dir in Direction::ALL {
            assert_eq!(p.neighbor(dir).manhattan(&p), 1);
            assert_eq!(p.neighbor(dir).neighbor(dir.opposite()), p);
        }
    }

    #[test]
    fn direction_to_adjacent_only() {
        let p = NodePosition::new(1, 1, 1);
        assert_eq!(p.direction_to(p.neighbor(Direction::Up)), Some(Direction::Up));
        assert_eq!(p.direction_to(p.neighbor(Direction::West)), Some(Direction::West));
        assert_eq!(p.direction_to(NodePosition::new(3, 1, 1)), None);
        assert_eq!(p.direction_to(p), None);
    }

    #[test]
    fn no_neighbor_past_the_edge() {
        let edge = NodePosition::new(i32::MAX, 0, i32::MIN);
        assert_eq!(edge.checked_neighbor(Direction::East), None);
        assert_eq!(edge.checked_neighbor(Direction::North), None);
        assert_eq!(
            edge.checked_neighbor(Direction::West),
            Some(NodePosition::new(i32::MAX - 1, 0, i32::MIN))
        );

        let wrapped = NodePosition::new(i32::MIN, 0, i32::MIN);
        assert_eq!(edge.direction_to(wrapped), None);
        assert_eq!(edge.manhattan(&wrapped), u64::from(u32::MAX));
    }

    #[test]
    fn addition_subtraction() {
        let a = NodePosition::new(1, 2, 3);
        let b = NodePosition::new(4, -1, 2);

        assert_eq!(a + b, NodePosition::new(5, 1, 5));
        assert_eq!(a - b, NodePosition::new(-3, 3, 1));
        assert_eq!(a + (-b), a - b);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut v = vec![
            NodePosition::new(1, 0, 0),
            NodePosition::new(0, 5, 0),
            NodePosition::new(0, 0, 9),
        ];
        v.sort();
        assert_eq!(v[0], NodePosition::new(0, 0, 9));
        assert_eq!(v[2], NodePosition::new(1, 0, 0));
    }
}
