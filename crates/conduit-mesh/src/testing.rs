//! In-memory host for unit tests.

use std::collections::HashMap;

use conduit_topology::{Direction, NodePosition, PORTS_PER_NODE};

use crate::access::{HandleRef, MeshAccess, NeighborHandle, NeighborProbe};
use crate::cache::SharedScanCache;
use crate::handle::{ManaBuffer, ResourceHandle};
use crate::port::IoType;
use crate::virtual_network::{NetworkId, NetworkState};

struct Cell {
    buffer: ManaBuffer,
    conduit: bool,
    sides: [IoType; PORTS_PER_NODE],
    network: Option<NetworkId>,
}

#[derive(Default)]
pub(crate) struct FakeWorld {
    cells: HashMap<NodePosition, Cell>,
    pools: HashMap<NetworkId, NetworkState>,
    shared: SharedScanCache,
    pub received: Vec<(NodePosition, Direction, u64)>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, pos: NodePosition, stored: i64, capacity: i64, conduit: bool) {
        self.cells.insert(
            pos,
            Cell {
                buffer: ManaBuffer::new(capacity).filled(stored),
                conduit,
                sides: [IoType::Both; PORTS_PER_NODE],
                network: None,
            },
        );
    }

    pub fn external(&mut self, pos: NodePosition, stored: i64, capacity: i64) {
        self.insert(pos, stored, capacity, false);
    }

    pub fn conduit(&mut self, pos: NodePosition, stored: i64, capacity: i64) {
        self.insert(pos, stored, capacity, true);
    }

    pub fn set_side(&mut self, pos: NodePosition, side: Direction, io: IoType) {
        if let Some(cell) = self.cells.get_mut(&pos) {
            cell.sides[side.index()] = io;
        }
    }

    pub fn set_network(&mut self, pos: NodePosition, network: Option<NetworkId>) {
        if let Some(cell) = self.cells.get_mut(&pos) {
            cell.network = network;
        }
    }

    pub fn add_pool(&mut self, id: NetworkId, state: NetworkState) {
        self.pools.insert(id, state);
    }

    pub fn pool(&self, id: NetworkId) -> Option<&NetworkState> {
        self.pools.get(&id)
    }

    pub fn remove(&mut self, pos: NodePosition) {
        self.cells.remove(&pos);
    }

    pub fn stored(&self, pos: NodePosition) -> i64 {
        self.cells.get(&pos).map_or(0, |c| c.buffer.stored())
    }
}

impl MeshAccess for FakeWorld {
    fn probe(&self, pos: NodePosition) -> Option<NeighborProbe> {
        let cell = self.cells.get(&pos)?;
        let handle = if cell.conduit {
            NeighborHandle::Conduit(pos)
        } else {
            NeighborHandle::External(pos)
        };
        let (stored, capacity) = match cell.network.and_then(|id| self.pools.get(&id)) {
            Some(pool) => (pool.stored(), pool.capacity()),
            None => (cell.buffer.stored(), cell.buffer.capacity()),
        };
        Some(NeighborProbe {
            handle,
            stored,
            capacity,
            can_receive: stored < capacity,
            network: cell.network,
        })
    }

    fn port_io(&self, pos: NodePosition, side: Direction) -> IoType {
        self.cells
            .get(&pos)
            .map_or(IoType::Disabled, |c| c.sides[side.index()])
    }

    fn handle_mut(&mut self, target: HandleRef) -> Option<&mut dyn ResourceHandle> {
        match target {
            HandleRef::Pool(id) => self.pools.get_mut(&id).map(|p| p as &mut dyn ResourceHandle),
            HandleRef::Node(pos) => {
                let cell = self.cells.get_mut(&pos)?;
                if let Some(pool) = cell.network.and_then(|id| self.pools.get_mut(&id)) {
                    return Some(pool as &mut dyn ResourceHandle);
                }
                Some(&mut cell.buffer as &mut dyn ResourceHandle)
            }
        }
    }

    fn pool_mut(&mut self, id: NetworkId) -> Option<&mut NetworkState> {
        self.pools.get_mut(&id)
    }

    fn notify_received(&mut self, pos: NodePosition, side: Direction, tick: u64) {
        self.received.push((pos, side, tick));
    }

    fn shared_cache(&mut self) -> &mut SharedScanCache {
        &mut self.shared
    }
}
