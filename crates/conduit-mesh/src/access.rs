//! The host boundary.
//!
//! The core never owns the world. Everything it needs from outside goes
//! through [`MeshAccess`]: probing a neighbor cell, reading a neighbor's port
//! mode, borrowing a resource handle or pool, and telling a conduit it was
//! fed. Handles
//! are borrowed one at a time, so the two sides of a transfer are never
//! borrowed together.

use conduit_topology::{Direction, NodePosition};

use crate::cache::SharedScanCache;
use crate::handle::{ManaBuffer, ResourceHandle};
use crate::port::IoType;
use crate::virtual_network::{NetworkId, NetworkState};

/// What sits behind a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborHandle {
    /// Another conduit; may relay further.
    Conduit(NodePosition),
    /// A producer or consumer outside the mesh.
    External(NodePosition),
}

impl NeighborHandle {
    pub const fn position(&self) -> NodePosition {
        match *self {
            Self::Conduit(pos) | Self::External(pos) => pos,
        }
    }

    pub const fn is_conduit(&self) -> bool {
        matches!(self, Self::Conduit(_))
    }
}

/// A live read of a neighbor cell.
///
/// For a conduit inside a virtual network, `stored` and `capacity` are the
/// pooled totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborProbe {
    pub handle: NeighborHandle,
    pub stored: i64,
    pub capacity: i64,
    pub can_receive: bool,
    pub network: Option<NetworkId>,
}

impl NeighborProbe {
    pub fn space(&self) -> i64 {
        (self.capacity - self.stored).max(0)
    }
}

/// Address of a resource handle the host can lend out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleRef {
    /// The cell at a position. A pooled conduit resolves to its pool.
    Node(NodePosition),
    /// A virtual network's pool.
    Pool(NetworkId),
}

/// Host services used during a node's tick.
pub trait MeshAccess {
    /// Read the cell at `pos`, if it holds anything with a resource handle.
    fn probe(&self, pos: NodePosition) -> Option<NeighborProbe>;

    /// Port mode of the cell at `pos` on its `side`. Empty cells are `Disabled`.
    fn port_io(&self, pos: NodePosition, side: Direction) -> IoType;

    /// Borrow a resource handle. `None` if nothing is there.
    fn handle_mut(&mut self, target: HandleRef) -> Option<&mut dyn ResourceHandle>;

    /// Borrow a virtual network's shared state.
    fn pool_mut(&mut self, id: NetworkId) -> Option<&mut NetworkState>;

    /// The conduit at `pos` just received through its `side` port.
    fn notify_received(&mut self, pos: NodePosition, side: Direction, tick: u64);

    /// Scan snapshots shared between nodes.
    fn shared_cache(&mut self) -> &mut SharedScanCache;
}

/// The ticking node's own store: its buffer, or its pool when it is a
/// virtual network member.
pub struct LocalStore<'a> {
    position: NodePosition,
    buffer: &'a mut ManaBuffer,
    network: Option<NetworkId>,
}

impl<'a> LocalStore<'a> {
    pub fn new(position: NodePosition, buffer: &'a mut ManaBuffer, network: Option<NetworkId>) -> Self {
        Self {
            position,
            buffer,
            network,
        }
    }

    pub fn position(&self) -> NodePosition {
        self.position
    }

    pub fn network(&self) -> Option<NetworkId> {
        self.network
    }

    /// The pool if pooled, otherwise the node's buffer.
    ///
    /// A pool id the host no longer knows falls back to the buffer.
    pub fn handle<'s, W: MeshAccess>(&'s mut self, world: &'s mut W) -> &'s mut dyn ResourceHandle {
        if let Some(id) = self.network {
            if let Some(pool) = world.handle_mut(HandleRef::Pool(id)) {
                return pool;
            }
            tracing::warn!(position = %self.position, network = ?id, "pool missing, using local buffer");
            debug_assert!(false, "conduit {} references unknown network {:?}", self.position, id);
        }
        &mut *self.buffer
    }

    pub fn stored<W: MeshAccess>(&mut self, world: &mut W) -> i64 {
        self.handle(world).stored()
    }

    pub fn space<W: MeshAccess>(&mut self, world: &mut W) -> i64 {
        self.handle(world).space()
    }
}
