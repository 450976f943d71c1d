//! Six-Port Neighbor Computation
//!
//! Every node has at most six neighbors, one per port. The topology is
//! translation-invariant: the same offsets apply everywhere, except on the
//! edge of the `i32` range where the grid simply ends.

use crate::{Direction, NodePosition};

/// Neighbor lookups for a node.
pub struct Neighbors;

impl Neighbors {
    /// Every on-grid neighbor, paired with the port that reaches it, in
    /// enumeration order.
    pub fn of(pos: NodePosition) -> impl Iterator<Item = (Direction, NodePosition)> {
        Direction::ALL
            .into_iter()
            .filter_map(move |dir| pos.checked_neighbor(dir).map(|n| (dir, n)))
    }

    /// Only the positions, in enumeration order.
    pub fn positions(pos: NodePosition) -> impl Iterator<Item = NodePosition> {
        Self::of(pos).map(|(_, n)| n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn six_neighbors_inside_the_grid() {
        assert_eq!(Neighbors::of(NodePosition::ORIGIN).count(), 6);
    }

    #[test]
    fn neighbors_pair_direction_with_position() {
        let p = NodePosition::new(-4, 10, 2);
        for (dir, n) in Neighbors::of(p) {
            assert_eq!(p.direction_to(n), Some(dir));
            assert_eq!(n.direction_to(p), Some(dir.opposite()));
        }
    }

    #[test]
    fn corner_of_the_grid_has_three() {
        let corner = NodePosition::new(i32::MAX, i32::MIN, i32::MAX);
        let dirs: Vec<_> = Neighbors::of(corner).map(|(d, _)| d).collect();
        assert_eq!(dirs, vec![Direction::North, Direction::West, Direction::Up]);
        assert!(Neighbors::positions(corner).all(|n| n.manhattan(&corner) == 1));
    }

    proptest! {
        #[test]
        fn adjacency_symmetric(
            x in -1000i32..1000, y in -1000i32..1000, z in -1000i32..1000,
            dx in -2i32..=2, dy in -2i32..=2, dz in -2i32..=2,
        ) {
            let a = NodePosition::new(x, y, z);
            let b = NodePosition::new(x + dx, y + dy, z + dz);
            let forward = a.direction_to(b);
            prop_assert_eq!(forward.is_some(), b.direction_to(a).is_some());
            prop_assert_eq!(forward.is_some(), a.manhattan(&b) == 1);
            prop_assert_eq!(forward.map(Direction::opposite), b.direction_to(a));
        }
    }
}
