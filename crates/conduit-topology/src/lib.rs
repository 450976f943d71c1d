//! Conduit Mesh Topology
//!
//! Cubic grid topology for the conduit resource mesh.
//!
//! # Grid
//!
//! Every node sits on an integer 3D grid position and owns exactly six ports,
//! one per axis-aligned neighbor:
//! - 4 horizontal ports (north, south, east, west)
//! - 2 vertical ports (up, down)
//!
//! Adjacency is the only relation the mesh routes over. There is no
//! pathfinding beyond a single step, so everything here is a constant-time
//! computation over at most six cells.
//!
//! # Enumeration Order
//!
//! [`Direction::ALL`] fixes the order North, South, East, West, Up, Down.
//! Any tie broken "by direction" in the mesh uses this order, which makes
//! routing decisions reproducible across runs.

mod direction;
mod neighbors;
mod position;

pub use direction::{Direction, DirectionSet};
pub use neighbors::Neighbors;
pub use position::NodePosition;

/// Total number of ports per node (invariant: always 6)
pub const PORTS_PER_NODE: usize = 6;
