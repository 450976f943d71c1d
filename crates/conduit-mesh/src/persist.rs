//! Saved conduit state.
//!
//! Only durable state is saved: ports, per-direction counters, the last
//! receive/transfer direction and tick, and the buffer's contents. Topology,
//! caches and virtual network membership are derived again after load.

use conduit_topology::{Direction, NodePosition, PORTS_PER_NODE};
use serde::{Deserialize, Serialize};

use crate::config::MeshConfig;
use crate::error::{Error, Result};
use crate::handle::ResourceHandle;
use crate::node::ConduitNode;
use crate::port::{IoType, PRIORITY_MAX, PRIORITY_MIN};

/// One port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub io: u8,
    pub priority: i16,
}

/// One direction's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub total: i64,
    pub successes: u64,
    pub failures: u64,
    pub last_transfer_tick: u64,
}

/// A conduit's saved state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub ports: [PortRecord; PORTS_PER_NODE],
    pub stats: [StatsRecord; PORTS_PER_NODE],
    pub last_receive_direction: Option<u8>,
    pub last_transfer_direction: Option<u8>,
    pub last_transfer_tick: u64,
    pub last_receive_tick: u64,
    pub stored: i64,
}

impl NodeRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn direction_from_record(ordinal: Option<u8>) -> Result<Option<Direction>> {
    ordinal
        .map(|o| Direction::from_index(o).ok_or(Error::InvalidDirection(o)))
        .transpose()
}

impl ConduitNode {
    /// Capture durable state.
    ///
    /// A pooled conduit saves its own buffer, which holds its share only
    /// after the pool is redistributed.
    pub fn to_record(&self) -> NodeRecord {
        let ports = Direction::ALL.map(|dir| {
            let (io, priority) = self.ports().get(dir);
            PortRecord {
                io: io.ordinal(),
                priority: priority.clamp(PRIORITY_MIN, PRIORITY_MAX) as i16,
            }
        });
        let stats = Direction::ALL.map(|dir| {
            let s = self.stats().get(dir);
            StatsRecord {
                total: s.total_transferred,
                successes: s.successes,
                failures: s.failures,
                last_transfer_tick: s.last_transfer_tick,
            }
        });
        let (last_transfer_direction, last_transfer_tick) = self.transfer().last_transfer();
        let (last_receive_direction, last_receive_tick) = self.transfer().last_receive();

        NodeRecord {
            ports,
            stats,
            last_receive_direction: last_receive_direction.map(|d| d.index() as u8),
            last_transfer_direction: last_transfer_direction.map(|d| d.index() as u8),
            last_transfer_tick,
            last_receive_tick,
            stored: self.buffer().stored(),
        }
    }

    /// Rebuild a conduit from a record. Fails on out-of-range ordinals.
    ///
    /// The result starts Dirty and may adopt a shared scan snapshot on its
    /// first tick.
    pub fn from_record(position: NodePosition, record: &NodeRecord, config: &MeshConfig, tick: u64) -> Result<Self> {
        let mut node = ConduitNode::new(position, tick, config);

        for (dir, port) in Direction::ALL.into_iter().zip(&record.ports) {
            let io = IoType::from_ordinal(port.io)?;
            node.ports_mut().set(dir, io);
            node.ports_mut().set_priority(dir, i32::from(port.priority));
        }
        // Restored settings are not a change.
        node.ports_mut().take_changes();

        for (dir, s) in Direction::ALL.into_iter().zip(&record.stats) {
            node.stats_mut()
                .restore(dir, s.total, s.successes, s.failures, s.last_transfer_tick);
        }

        let last_transfer = direction_from_record(record.last_transfer_direction)?;
        let last_receive = direction_from_record(record.last_receive_direction)?;
        node.transfer_mut().restore_history(
            (last_transfer, record.last_transfer_tick),
            (last_receive, record.last_receive_tick),
        );
        node.buffer_mut().set_stored(record.stored);
        Ok(node)
    }
}
