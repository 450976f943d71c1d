//! A single conduit.
//!
//! Per tick, in order:
//! 1. observe port changes made since the last tick
//! 2. pull from external producers
//! 3. push toward the best targets
//! 4. rescan if the schedule says so
//! 5. periodic stats maintenance

use conduit_topology::{Direction, NodePosition};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::access::{LocalStore, MeshAccess};
use crate::config::MeshConfig;
use crate::handle::ManaBuffer;
use crate::network::{NetworkManager, ScanKind};
use crate::port::{IoType, PortConfig, PortIo};
use crate::pull::PullManager;
use crate::stats::StatsManager;
use crate::transfer::{TransferKind, TransferManager, TransferOutcome};
use crate::virtual_network::NetworkId;

/// Everything a node did in one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub outcomes: Vec<TransferOutcome>,
    pub scan: Option<ScanKind>,
}

impl TickReport {
    /// Sum of successful amounts of the given kind.
    pub fn moved(&self, kind: TransferKind) -> i64 {
        self.outcomes
            .iter()
            .filter(|o| o.success && o.kind == kind)
            .map(|o| o.amount)
            .sum()
    }
}

/// A relay node in the mesh.
#[derive(Debug, Clone)]
pub struct ConduitNode {
    position: NodePosition,
    ports: PortConfig,
    buffer: ManaBuffer,
    network: NetworkManager,
    transfer: TransferManager,
    pull: PullManager,
    stats: StatsManager,
    virtual_network: Option<NetworkId>,
}

impl ConduitNode {
    /// A fresh conduit with default ports and an empty buffer.
    pub fn new(position: NodePosition, tick: u64, config: &MeshConfig) -> Self {
        Self {
            position,
            ports: PortConfig::new(),
            buffer: ManaBuffer::new(config.conduit_capacity),
            network: NetworkManager::new(position),
            transfer: TransferManager::new(config),
            pull: PullManager::new(config.pull_rate),
            stats: StatsManager::new(tick, config),
            virtual_network: None,
        }
    }

    pub fn position(&self) -> NodePosition {
        self.position
    }

    pub fn ports(&self) -> &PortConfig {
        &self.ports
    }

    /// Changes take effect at the start of the next tick.
    pub fn ports_mut(&mut self) -> &mut PortConfig {
        &mut self.ports
    }

    pub fn buffer(&self) -> &ManaBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ManaBuffer {
        &mut self.buffer
    }

    pub fn network(&self) -> &NetworkManager {
        &self.network
    }

    pub fn transfer(&self) -> &TransferManager {
        &self.transfer
    }

    pub(crate) fn transfer_mut(&mut self) -> &mut TransferManager {
        &mut self.transfer
    }

    pub fn stats(&self) -> &StatsManager {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StatsManager {
        &mut self.stats
    }

    pub fn virtual_network(&self) -> Option<NetworkId> {
        self.virtual_network
    }

    pub(crate) fn set_virtual_network(&mut self, id: Option<NetworkId>) {
        self.virtual_network = id;
    }

    /// A neighbor cell changed behind `dir`.
    pub fn on_neighbor_changed(&mut self, dir: Direction) {
        self.network.on_neighbor_changed(dir);
    }

    /// Force a rescan at the next tick.
    pub fn invalidate(&mut self) {
        self.network.mark_dirty();
    }

    /// Resource arrived through `side`.
    pub fn record_receive(&mut self, side: Direction, tick: u64) {
        self.transfer.record_receive(side, tick);
    }

    /// Run one tick against the host.
    pub fn tick<W: MeshAccess>(&mut self, tick: u64, config: &MeshConfig, world: &mut W) -> TickReport {
        let changes = self.ports.take_changes();
        if !changes.is_empty() {
            trace!(position = %self.position, changed = changes.len(), "ports changed");
            self.network.on_config_changed(changes);
            world.shared_cache().invalidate(self.position);
        }

        let mut store = LocalStore::new(self.position, &mut self.buffer, self.virtual_network);
        let mut outcomes = self.pull.pull(
            tick,
            &mut store,
            &self.ports,
            &self.network,
            &mut self.transfer,
            &mut self.stats,
            world,
        );
        outcomes.extend(self.transfer.process_flow(
            tick,
            &mut store,
            &self.ports,
            &mut self.network,
            &mut self.stats,
            world,
        ));

        let scan = self.network.update(tick, &self.ports, config, world);

        if tick % config.stats_maintenance_interval.max(1) == 0 {
            self.stats.maintain(tick);
        }

        TickReport { tick, outcomes, scan }
    }
}

impl PortIo for ConduitNode {
    fn io_config(&self, direction: Direction) -> IoType {
        self.ports.io(direction)
    }
}
