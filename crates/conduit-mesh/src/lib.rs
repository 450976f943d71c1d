//! Conduit Mesh - tick-synchronous resource transport
//!
//! This crate provides:
//! - Six-port conduits with per-port IO mode and priority
//! - Staggered local topology discovery with a per-node and a shared cache
//! - Greedy push balancing with anti-loop and anti-oscillation guards
//! - Pull from external producers
//! - Virtual networks pooling the capacity of chained conduits
//! - A reference host ([`MeshWorld`]) and saved node records
//!
//! # Tick
//!
//! Each conduit, once per tick: observe port changes, pull, push, rescan if
//! due. Nothing inside a tick returns an error; a problem means no transfer
//! this tick. Every move is simulate-then-commit, so the host may tick nodes
//! in any order.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_mesh::{ExternalNode, ManaBuffer, MeshConfig, MeshWorld};
//! use conduit_topology::NodePosition;
//!
//! let mut world = MeshWorld::new(MeshConfig::default())?;
//! world.place_external(NodePosition::new(0, 0, 0), ExternalNode::source(ManaBuffer::new(1000).filled(1000)))?;
//! world.place_conduit(NodePosition::new(1, 0, 0))?;
//! world.place_external(NodePosition::new(2, 0, 0), ExternalNode::sink(ManaBuffer::new(1000)))?;
//! for _ in 0..10 {
//!     world.step();
//! }
//! ```

pub mod access;
pub mod balancing;
pub mod cache;
pub mod config;
pub mod error;
pub mod handle;
pub mod network;
pub mod node;
pub mod persist;
pub mod port;
pub mod protocol;
pub mod pull;
pub mod stats;
pub mod transfer;
pub mod virtual_network;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use access::{HandleRef, LocalStore, MeshAccess, NeighborHandle, NeighborProbe};
pub use balancing::BalancingStrategy;
pub use cache::{CacheManager, ScanSnapshot, SharedScanCache, TargetInfo};
pub use config::{BalancingConfig, MeshConfig};
pub use error::{Error, Result};
pub use handle::{ManaBuffer, ResourceHandle};
pub use network::{Endpoint, NetworkManager, ScanKind, ScanState};
pub use node::{ConduitNode, TickReport};
pub use persist::{NodeRecord, PortRecord, StatsRecord};
pub use port::{IoType, PortConfig, PortIo, PRIORITY_MAX, PRIORITY_MIN};
pub use pull::PullManager;
pub use stats::{StatsManager, StatsSummary, TransferStats};
pub use transfer::{GuardRejection, TransferKind, TransferManager, TransferOutcome};
pub use virtual_network::{NetworkId, NetworkState, VirtualNetworks};
pub use world::{ExternalNode, MeshWorld, WorldTickReport};
