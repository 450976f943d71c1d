//! Port directions and compact direction sets.

use crate::{NodePosition, PORTS_PER_NODE};

/// One of the six axis-aligned ports of a node.
///
/// The variant order is the enumeration order used for every deterministic
/// tie-break in the mesh. Do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// -z
    North,
    /// +z
    South,
    /// +x
    East,
    /// -x
    West,
    /// +y
    Up,
    /// -y
    Down,
}

impl Direction {
    /// All directions in enumeration order.
    pub const ALL: [Self; PORTS_PER_NODE] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::Up,
        Self::Down,
    ];

    /// The port facing back at us from the neighbor.
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Unit step on the grid.
    pub const fn offset(self) -> NodePosition {
        match self {
            Self::North => NodePosition::new(0, 0, -1),
            Self::South => NodePosition::new(0, 0, 1),
            Self::East => NodePosition::new(1, 0, 0),
            Self::West => NodePosition::new(-1, 0, 0),
            Self::Up => NodePosition::new(0, 1, 0),
            Self::Down => NodePosition::new(0, -1, 0),
        }
    }

    /// Position in [`Direction::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Direction::index`]; `None` for out-of-range ordinals.
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::North),
            1 => Some(Self::South),
            2 => Some(Self::East),
            3 => Some(Self::West),
            4 => Some(Self::Up),
            5 => Some(Self::Down),
            _ => None,
        }
    }

    /// Whether this port lies on the vertical axis.
    pub const fn is_vertical(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
        };
        f.write_str(name)
    }
}

/// A set of directions packed into six bits.
///
/// Iteration always follows enumeration order, independent of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirectionSet(u8);

impl DirectionSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// All six directions.
    pub const FULL: Self = Self(0b11_1111);

    /// Add a direction. Returns false if it was already present.
    #[inline]
    pub fn insert(&mut self, dir: Direction) -> bool {
        let bit = 1 << dir.index();
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    /// Remove a direction. Returns true if it was present.
    #[inline]
    pub fn remove(&mut self, dir: Direction) -> bool {
        let bit = 1 << dir.index();
        let present = self.0 & bit != 0;
        self.0 &= !bit;
        present
    }

    #[inline]
    pub const fn contains(&self, dir: Direction) -> bool {
        self.0 & (1 << dir.index()) != 0
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Union of two sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterate in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for dir in iter {
            set.insert(dir);
        }
        set
    }
}
