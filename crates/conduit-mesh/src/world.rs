//! Reference host.
//!
//! [`MeshWorld`] owns every cell, the virtual network registry and the shared
//! scan cache, and implements [`MeshAccess`] for the node currently ticking.
//! A node is taken out of the map while it ticks, so the host can lend out
//! neighbor handles without aliasing the node's own state.

use std::collections::{BTreeSet, HashMap};

use conduit_topology::{Direction, Neighbors, NodePosition, PORTS_PER_NODE};
use tracing::{debug, info};

use crate::access::{HandleRef, MeshAccess, NeighborHandle, NeighborProbe};
use crate::cache::SharedScanCache;
use crate::config::MeshConfig;
use crate::error::{Error, Result};
use crate::handle::{ManaBuffer, ResourceHandle};
use crate::node::{ConduitNode, TickReport};
use crate::persist::NodeRecord;
use crate::port::{IoType, PortIo};
use crate::transfer::TransferKind;
use crate::virtual_network::{connected_components, share_out, NetworkId, NetworkState, VirtualNetworks};

/// A producer or consumer: a buffer with per-side IO modes.
#[derive(Debug, Clone)]
pub struct ExternalNode {
    buffer: ManaBuffer,
    sides: [IoType; PORTS_PER_NODE],
}

impl ExternalNode {
    /// All sides `Both`.
    pub fn new(buffer: ManaBuffer) -> Self {
        Self {
            buffer,
            sides: [IoType::Both; PORTS_PER_NODE],
        }
    }

    /// Only ever hands resource out.
    pub fn source(buffer: ManaBuffer) -> Self {
        Self {
            buffer,
            sides: [IoType::Output; PORTS_PER_NODE],
        }
    }

    /// Only ever takes resource in.
    pub fn sink(buffer: ManaBuffer) -> Self {
        Self {
            buffer,
            sides: [IoType::Input; PORTS_PER_NODE],
        }
    }

    pub fn with_side(mut self, side: Direction, io: IoType) -> Self {
        self.sides[side.index()] = io;
        self
    }

    pub fn buffer(&self) -> &ManaBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ManaBuffer {
        &mut self.buffer
    }
}

impl PortIo for ExternalNode {
    fn io_config(&self, direction: Direction) -> IoType {
        self.sides[direction.index()]
    }
}

#[derive(Debug, Clone)]
enum Cell {
    Conduit(Box<ConduitNode>),
    External(ExternalNode),
}

impl Cell {
    fn io(&self, side: Direction) -> IoType {
        match self {
            Cell::Conduit(node) => node.io_config(side),
            Cell::External(ext) => ext.io_config(side),
        }
    }
}

/// Per-node reports of one world tick.
#[derive(Debug, Clone, Default)]
pub struct WorldTickReport {
    pub tick: u64,
    pub nodes: Vec<(NodePosition, TickReport)>,
    pub networks_rebuilt: bool,
}

impl WorldTickReport {
    pub fn moved(&self, kind: TransferKind) -> i64 {
        self.nodes.iter().map(|(_, r)| r.moved(kind)).sum()
    }
}

/// A grid of conduits and external nodes.
#[derive(Debug)]
pub struct MeshWorld {
    config: MeshConfig,
    cells: HashMap<NodePosition, Cell>,
    networks: VirtualNetworks,
    shared: SharedScanCache,
    tick: u64,
    networks_dirty: bool,
}

impl MeshWorld {
    pub fn new(config: MeshConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cells: HashMap::new(),
            networks: VirtualNetworks::new(),
            shared: SharedScanCache::new(),
            tick: 0,
            networks_dirty: false,
        })
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// The tick the next `tick_node` call runs as.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_occupied(&self, pos: NodePosition) -> bool {
        self.cells.contains_key(&pos)
    }

    // ==================== Placement ====================

    pub fn place_conduit(&mut self, pos: NodePosition) -> Result<&mut ConduitNode> {
        let node = ConduitNode::new(pos, self.tick, &self.config);
        self.insert_conduit(node)
    }

    /// Place a conduit restored from a saved record.
    pub fn restore_conduit(&mut self, pos: NodePosition, record: &NodeRecord) -> Result<&mut ConduitNode> {
        let node = ConduitNode::from_record(pos, record, &self.config, self.tick)?;
        self.insert_conduit(node)
    }

    fn insert_conduit(&mut self, node: ConduitNode) -> Result<&mut ConduitNode> {
        let pos = node.position();
        if self.cells.contains_key(&pos) {
            return Err(Error::Occupied(pos));
        }
        self.cells.insert(pos, Cell::Conduit(Box::new(node)));
        self.topology_changed(pos, true);
        debug!(position = %pos, "conduit placed");
        self.conduit_mut(pos).ok_or(Error::NotAConduit(pos))
    }

    pub fn place_external(&mut self, pos: NodePosition, node: ExternalNode) -> Result<()> {
        if self.cells.contains_key(&pos) {
            return Err(Error::Occupied(pos));
        }
        self.cells.insert(pos, Cell::External(node));
        self.topology_changed(pos, false);
        debug!(position = %pos, "external node placed");
        Ok(())
    }

    /// Remove whatever is at `pos`. Returns whether anything was there.
    ///
    /// Pools are split back to their members first, so a removed conduit
    /// takes only its own share with it.
    pub fn remove(&mut self, pos: NodePosition) -> bool {
        let was_conduit = matches!(self.cells.get(&pos), Some(Cell::Conduit(_)));
        if was_conduit {
            self.dissolve_networks();
        }
        if self.cells.remove(&pos).is_none() {
            return false;
        }
        self.topology_changed(pos, was_conduit);
        debug!(position = %pos, was_conduit, "node removed");
        true
    }

    fn topology_changed(&mut self, pos: NodePosition, conduit: bool) {
        for (dir, neighbor) in Neighbors::of(pos) {
            if let Some(Cell::Conduit(node)) = self.cells.get_mut(&neighbor) {
                node.on_neighbor_changed(dir.opposite());
            }
        }
        self.shared.invalidate_around(pos);
        if conduit {
            self.networks_dirty = true;
        }
    }

    // ==================== Lookup ====================

    pub fn conduit(&self, pos: NodePosition) -> Option<&ConduitNode> {
        match self.cells.get(&pos) {
            Some(Cell::Conduit(node)) => Some(&**node),
            _ => None,
        }
    }

    pub fn conduit_mut(&mut self, pos: NodePosition) -> Option<&mut ConduitNode> {
        match self.cells.get_mut(&pos) {
            Some(Cell::Conduit(node)) => Some(&mut **node),
            _ => None,
        }
    }

    pub fn external(&self, pos: NodePosition) -> Option<&ExternalNode> {
        match self.cells.get(&pos) {
            Some(Cell::External(node)) => Some(node),
            _ => None,
        }
    }

    pub fn external_mut(&mut self, pos: NodePosition) -> Option<&mut ExternalNode> {
        match self.cells.get_mut(&pos) {
            Some(Cell::External(node)) => Some(node),
            _ => None,
        }
    }

    /// Conduit positions in ascending order.
    pub fn conduit_positions(&self) -> Vec<NodePosition> {
        let mut positions: Vec<_> = self
            .cells
            .iter()
            .filter(|(_, c)| matches!(c, Cell::Conduit(_)))
            .map(|(p, _)| *p)
            .collect();
        positions.sort_unstable();
        positions
    }

    pub fn networks(&self) -> &VirtualNetworks {
        &self.networks
    }

    pub fn shared_scan_cache(&self) -> &SharedScanCache {
        &self.shared
    }

    /// What a conduit holds: its share of the pool if pooled.
    pub fn conduit_stored(&self, pos: NodePosition) -> Option<i64> {
        let node = self.conduit(pos)?;
        match node.virtual_network().and_then(|id| self.networks.get(id)) {
            Some(pool) => self.pool_share(pool, pos),
            None => Some(node.buffer().stored()),
        }
    }

    fn pool_share(&self, pool: &NetworkState, pos: NodePosition) -> Option<i64> {
        let members: Vec<_> = pool
            .members()
            .iter()
            .filter_map(|m| self.conduit(*m).map(|n| (*m, n.buffer().capacity())))
            .collect();
        share_out(pool.stored(), &members)
            .into_iter()
            .find(|(m, _)| *m == pos)
            .map(|(_, share)| share)
    }

    /// Resource held by every conduit and pool.
    pub fn mesh_stored(&self) -> i64 {
        let buffers: i64 = self
            .cells
            .values()
            .filter_map(|c| match c {
                Cell::Conduit(node) => Some(node.buffer().stored()),
                Cell::External(_) => None,
            })
            .sum();
        buffers + self.networks.total_stored()
    }

    /// Resource held anywhere in the world.
    pub fn total_stored(&self) -> i64 {
        let externals: i64 = self
            .cells
            .values()
            .filter_map(|c| match c {
                Cell::External(ext) => Some(ext.buffer().stored()),
                Cell::Conduit(_) => None,
            })
            .sum();
        externals + self.mesh_stored()
    }

    /// Saved state of a conduit. A pooled conduit records its pool share.
    pub fn record(&self, pos: NodePosition) -> Result<NodeRecord> {
        let node = self.conduit(pos).ok_or(Error::NotAConduit(pos))?;
        let mut record = node.to_record();
        if let Some(stored) = self.conduit_stored(pos) {
            record.stored = stored;
        }
        Ok(record)
    }

    // ==================== Port control ====================

    pub fn configure_port(&mut self, pos: NodePosition, dir: Direction, io: IoType) -> Result<()> {
        self.conduit_mut(pos).ok_or(Error::NotAConduit(pos))?.ports_mut().set(dir, io);
        self.facing_port_changed(pos, dir);
        Ok(())
    }

    /// Advance a port to its next mode and return it.
    pub fn cycle_port(&mut self, pos: NodePosition, dir: Direction) -> Result<IoType> {
        let next = self
            .conduit(pos)
            .ok_or(Error::NotAConduit(pos))?
            .ports()
            .io(dir)
            .cycle();
        self.configure_port(pos, dir, next)?;
        Ok(next)
    }

    pub fn set_priority(&mut self, pos: NodePosition, dir: Direction, priority: i32) -> Result<()> {
        self.conduit_mut(pos)
            .ok_or(Error::NotAConduit(pos))?
            .ports_mut()
            .set_priority(dir, priority);
        Ok(())
    }

    pub fn reset_ports(&mut self, pos: NodePosition) -> Result<()> {
        self.conduit_mut(pos).ok_or(Error::NotAConduit(pos))?.ports_mut().reset_all();
        for dir in Direction::ALL {
            self.facing_port_changed(pos, dir);
        }
        Ok(())
    }

    pub fn set_external_side(&mut self, pos: NodePosition, side: Direction, io: IoType) -> Result<()> {
        let Some(Cell::External(ext)) = self.cells.get_mut(&pos) else {
            return Err(Error::NotExternal(pos));
        };
        ext.sides[side.index()] = io;
        self.facing_port_changed(pos, side);
        Ok(())
    }

    /// A port at `pos` facing `dir` changed; the neighbor's view of it is stale.
    fn facing_port_changed(&mut self, pos: NodePosition, dir: Direction) {
        let Some(neighbor) = pos.checked_neighbor(dir) else {
            return;
        };
        if let Some(Cell::Conduit(node)) = self.cells.get_mut(&neighbor) {
            node.on_neighbor_changed(dir.opposite());
            self.shared.invalidate(neighbor);
            if matches!(self.cells.get(&pos), Some(Cell::Conduit(_))) {
                self.networks_dirty = true;
            }
        }
    }

    // ==================== Virtual networks ====================

    /// Whether a rebuild is queued for the next tick.
    pub fn networks_dirty(&self) -> bool {
        self.networks_dirty
    }

    /// Split every pool back into its members' buffers.
    fn dissolve_networks(&mut self) {
        for pool in self.networks.dissolve_all() {
            let members: Vec<_> = pool
                .members()
                .iter()
                .filter_map(|m| self.conduit(*m).map(|n| (*m, n.buffer().capacity())))
                .collect();
            for (pos, share) in share_out(pool.stored(), &members) {
                if let Some(node) = self.conduit_mut(pos) {
                    node.buffer_mut().set_stored(share);
                }
            }
        }
        for cell in self.cells.values_mut() {
            if let Cell::Conduit(node) = cell {
                node.set_virtual_network(None);
            }
        }
    }

    /// Rebuild every virtual network from scratch.
    pub fn rebuild_networks(&mut self) {
        self.dissolve_networks();
        self.networks_dirty = false;
        if !self.config.virtual_networks {
            return;
        }

        let conduits: BTreeSet<_> = self.conduit_positions().into_iter().collect();
        let cells = &self.cells;
        let facing = |pos: NodePosition, dir: Direction| cells.get(&pos).map_or(IoType::Disabled, |c| c.io(dir));
        let components = connected_components(&conduits, |pos, dir| {
            facing(pos, dir) != IoType::Disabled
                && pos
                    .checked_neighbor(dir)
                    .is_some_and(|n| facing(n, dir.opposite()) != IoType::Disabled)
        });

        for members in components {
            if members.len() < self.config.min_network_size.max(2) {
                continue;
            }
            let mut stored = 0;
            let mut capacity = 0;
            for pos in &members {
                if let Some(node) = self.conduit_mut(*pos) {
                    capacity += node.buffer().capacity();
                    stored += node.buffer_mut().drain();
                }
            }
            let id = self.networks.form(NetworkState::new(members.clone(), stored, capacity));
            for pos in &members {
                if let Some(node) = self.conduit_mut(*pos) {
                    node.set_virtual_network(Some(id));
                }
            }
        }

        let cells = &self.cells;
        self.networks.verify_membership(|pos, id| match cells.get(&pos) {
            Some(Cell::Conduit(node)) if node.virtual_network() == Some(id) => Some(node.buffer().capacity()),
            _ => None,
        });
        info!(networks = self.networks.len(), conduits = conduits.len(), "virtual networks rebuilt");
    }

    // ==================== Ticking ====================

    /// Run queued network rebuilds. Returns whether one ran.
    pub fn begin_tick(&mut self) -> bool {
        if self.networks_dirty {
            self.rebuild_networks();
            true
        } else {
            false
        }
    }

    /// Tick one conduit at the current tick. `None` if there is none at `pos`.
    pub fn tick_node(&mut self, pos: NodePosition) -> Option<TickReport> {
        let mut node = match self.cells.remove(&pos) {
            Some(Cell::Conduit(node)) => node,
            Some(other) => {
                self.cells.insert(pos, other);
                return None;
            }
            None => return None,
        };
        let mut ctx = TickContext {
            cells: &mut self.cells,
            networks: &mut self.networks,
            shared: &mut self.shared,
        };
        let report = node.tick(self.tick, &self.config, &mut ctx);
        self.cells.insert(pos, Cell::Conduit(node));
        Some(report)
    }

    /// Close the current tick.
    pub fn end_tick(&mut self) {
        if self.tick % self.config.scan_interval == 0 {
            let now_ms = self.config.tick_to_ms(self.tick);
            self.shared.prune(now_ms, self.config.cache_ttl_ms);
        }
        self.tick += 1;
    }

    /// One full world tick: rebuild if queued, tick every conduit in
    /// position order, advance.
    pub fn step(&mut self) -> WorldTickReport {
        let networks_rebuilt = self.begin_tick();
        let tick = self.tick;
        let nodes = self
            .conduit_positions()
            .into_iter()
            .filter_map(|pos| self.tick_node(pos).map(|r| (pos, r)))
            .collect();
        self.end_tick();
        WorldTickReport {
            tick,
            nodes,
            networks_rebuilt,
        }
    }
}

/// Host view lent to a ticking node.
struct TickContext<'a> {
    cells: &'a mut HashMap<NodePosition, Cell>,
    networks: &'a mut VirtualNetworks,
    shared: &'a mut SharedScanCache,
}

impl MeshAccess for TickContext<'_> {
    fn probe(&self, pos: NodePosition) -> Option<NeighborProbe> {
        match self.cells.get(&pos)? {
            Cell::Conduit(node) => {
                let network = node.virtual_network();
                let (stored, capacity) = match network.and_then(|id| self.networks.get(id)) {
                    Some(pool) => (pool.stored(), pool.capacity()),
                    None => (node.buffer().stored(), node.buffer().capacity()),
                };
                Some(NeighborProbe {
                    handle: NeighborHandle::Conduit(pos),
                    stored,
                    capacity,
                    can_receive: stored < capacity,
                    network,
                })
            }
            Cell::External(ext) => Some(NeighborProbe {
                handle: NeighborHandle::External(pos),
                stored: ext.buffer.stored(),
                capacity: ext.buffer.capacity(),
                can_receive: ext.buffer.can_receive(),
                network: None,
            }),
        }
    }

    fn port_io(&self, pos: NodePosition, side: Direction) -> IoType {
        self.cells.get(&pos).map_or(IoType::Disabled, |c| c.io(side))
    }

    fn handle_mut(&mut self, target: HandleRef) -> Option<&mut dyn ResourceHandle> {
        match target {
            HandleRef::Pool(id) => self.networks.get_mut(id).map(|p| p as &mut dyn ResourceHandle),
            HandleRef::Node(pos) => match self.cells.get_mut(&pos)? {
                Cell::Conduit(node) => {
                    if let Some(pool) = node.virtual_network().and_then(|id| self.networks.get_mut(id)) {
                        return Some(pool as &mut dyn ResourceHandle);
                    }
                    Some(node.buffer_mut() as &mut dyn ResourceHandle)
                }
                Cell::External(ext) => Some(&mut ext.buffer as &mut dyn ResourceHandle),
            },
        }
    }

    fn pool_mut(&mut self, id: NetworkId) -> Option<&mut NetworkState> {
        self.networks.get_mut(id)
    }

    fn notify_received(&mut self, pos: NodePosition, side: Direction, tick: u64) {
        if let Some(Cell::Conduit(node)) = self.cells.get_mut(&pos) {
            node.record_receive(side, tick);
        }
    }

    fn shared_cache(&mut self) -> &mut SharedScanCache {
        &mut *self.shared
    }
}
