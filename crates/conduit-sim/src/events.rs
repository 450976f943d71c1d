//! Flow events for the simulation timeline.

use conduit_mesh::{ScanKind, TransferKind};
use conduit_topology::{Direction, NodePosition};
use serde::{Deserialize, Serialize};

/// Something that happened during a simulated tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    /// A conduit moved resource through one of its ports
    Transfer {
        tick: u64,
        node: NodePosition,
        direction: Direction,
        amount: i64,
        kind: TransferKind,
    },

    /// A conduit refreshed its view of its neighbors
    Scan {
        tick: u64,
        node: NodePosition,
        kind: ScanKind,
    },

    /// Virtual networks were rebuilt before the tick ran
    NetworksRebuilt { tick: u64, networks: usize },
}

impl FlowEvent {
    pub fn tick(&self) -> u64 {
        match self {
            FlowEvent::Transfer { tick, .. } | FlowEvent::Scan { tick, .. } | FlowEvent::NetworksRebuilt { tick, .. } => {
                *tick
            }
        }
    }
}
