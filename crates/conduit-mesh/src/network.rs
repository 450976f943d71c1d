//! Local topology discovery.
//!
//! # Scan Schedule
//!
//! Each node gets a scan opportunity when `tick % scan_interval` equals its
//! scan phase (the residue where `tick + node_offset` is a multiple of the
//! interval), or on any tick while it is Dirty. `node_offset` is a hash of the node's
//! position, which spreads a population sharing one interval across all
//! residues instead of rescanning in lockstep.
//!
//! On an opportunity:
//! - Dirty: full scan (probe all six neighbors)
//! - every `full_scan_every`-th opportunity, or when the cache has outlived
//!   its TTL: full scan
//! - otherwise: quick check (probe one endpoint, round-robin)
//!
//! # State Machine
//!
//! ```text
//!            full scan
//!   Dirty ─────────────▶ Clean
//!     ▲                    │
//!     └────────────────────┘
//!   neighbor changed / port changed / forced / quick check miss
//! ```
//!
//! Going Dirty clears endpoints and cache synchronously.

use conduit_topology::{Direction, DirectionSet, Neighbors, NodePosition, PORTS_PER_NODE};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::access::{MeshAccess, NeighborHandle, NeighborProbe};
use crate::cache::{CacheManager, ScanSnapshot, TargetInfo};
use crate::config::MeshConfig;
use crate::port::{IoType, PortConfig};
use crate::virtual_network::NetworkId;

/// Freshness of a node's topology view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Clean,
    Dirty,
}

/// Work done by [`NetworkManager::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanKind {
    /// Probed all six neighbors
    Full,
    /// Probed one endpoint
    Quick,
    /// Took a fresh snapshot from the shared cache
    Adopted,
}

/// A connected neighbor in the local topology snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub handle: NeighborHandle,
    pub priority: i32,
}

impl Endpoint {
    pub fn is_conduit(&self) -> bool {
        self.handle.is_conduit()
    }
}

/// Deterministic per-position scan offset (splitmix64 finalizer).
pub fn node_offset(pos: NodePosition) -> u64 {
    let packed = (u64::from(pos.x as u32) << 32) ^ (u64::from(pos.y as u32) << 16) ^ u64::from(pos.z as u32);
    let mut z = packed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Topology view of one conduit.
#[derive(Debug, Clone)]
pub struct NetworkManager {
    position: NodePosition,
    state: ScanState,
    node_offset: u64,
    endpoints: [Option<Endpoint>; PORTS_PER_NODE],
    cache: CacheManager,
    opportunities: u64,
    quick_cursor: usize,
    /// Never scanned since construction; may adopt a shared snapshot
    fresh: bool,
    last_full_scan_tick: Option<u64>,
}

impl NetworkManager {
    pub fn new(position: NodePosition) -> Self {
        Self {
            position,
            state: ScanState::Dirty,
            node_offset: node_offset(position),
            endpoints: [None; PORTS_PER_NODE],
            cache: CacheManager::new(),
            opportunities: 0,
            quick_cursor: 0,
            fresh: true,
            last_full_scan_tick: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == ScanState::Dirty
    }

    pub fn node_offset(&self) -> u64 {
        self.node_offset
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn last_full_scan_tick(&self) -> Option<u64> {
        self.last_full_scan_tick
    }

    pub fn endpoint(&self, dir: Direction) -> Option<Endpoint> {
        self.endpoints[dir.index()]
    }

    /// Connected endpoints in enumeration order.
    pub fn endpoints(&self) -> impl Iterator<Item = (Direction, Endpoint)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(|dir| self.endpoints[dir.index()].map(|e| (dir, e)))
    }

    pub fn target(&self, dir: Direction) -> Option<TargetInfo> {
        self.cache.get_cached_target(dir)
    }

    /// Drop everything and rescan at the next opportunity.
    pub fn mark_dirty(&mut self) {
        self.state = ScanState::Dirty;
        self.endpoints = [None; PORTS_PER_NODE];
        self.cache.invalidate_all();
        self.fresh = false;
    }

    /// A neighbor appeared or disappeared behind `dir`.
    pub fn on_neighbor_changed(&mut self, dir: Direction) {
        trace!(position = %self.position, %dir, "neighbor changed");
        self.mark_dirty();
    }

    /// Ports changed; drop what those ports knew.
    pub fn on_config_changed(&mut self, changes: DirectionSet) {
        if changes.is_empty() {
            return;
        }
        for dir in changes.iter() {
            self.endpoints[dir.index()] = None;
            self.cache.invalidate_direction(dir);
        }
        self.state = ScanState::Dirty;
        self.fresh = false;
    }

    /// Stale cache detected by a refused transfer. Not a rescan.
    pub fn invalidate_direction(&mut self, dir: Direction) {
        self.cache.invalidate_direction(dir);
    }

    /// The residue of `tick % scan_interval` at which this node's scans fall.
    pub fn scan_phase(&self, scan_interval: u64) -> u64 {
        let n = scan_interval.max(1);
        (n - self.node_offset % n) % n
    }

    pub fn is_scan_due(&self, tick: u64, scan_interval: u64) -> bool {
        self.is_dirty() || tick % scan_interval.max(1) == self.scan_phase(scan_interval)
    }

    /// Run whatever scan work this tick calls for.
    pub fn update<W: MeshAccess>(
        &mut self,
        tick: u64,
        ports: &PortConfig,
        config: &MeshConfig,
        world: &mut W,
    ) -> Option<ScanKind> {
        if !self.is_scan_due(tick, config.scan_interval) {
            return None;
        }
        let now_ms = config.tick_to_ms(tick);

        if self.is_dirty() {
            if self.fresh && self.adopt_shared(ports, now_ms, config.cache_ttl_ms, world) {
                return Some(ScanKind::Adopted);
            }
            self.full_scan(tick, ports, config, world);
            return Some(ScanKind::Full);
        }

        self.opportunities += 1;
        let scheduled = self.opportunities % config.full_scan_every.max(1) == 0;
        if scheduled || !self.cache.is_valid(config.cache_ttl_ms, now_ms) {
            self.full_scan(tick, ports, config, world);
            Some(ScanKind::Full)
        } else {
            self.quick_check(ports, now_ms, world);
            Some(ScanKind::Quick)
        }
    }

    /// Rebuild the endpoint set by probing every neighbor.
    pub fn full_scan<W: MeshAccess>(&mut self, tick: u64, ports: &PortConfig, config: &MeshConfig, world: &mut W) {
        let now_ms = config.tick_to_ms(tick);
        self.endpoints = [None; PORTS_PER_NODE];
        self.cache.invalidate_all();

        for (dir, neighbor) in Neighbors::of(self.position) {
            if ports.io(dir) == IoType::Disabled {
                continue;
            }
            let Some(probe) = world.probe(neighbor) else {
                continue;
            };
            let reciprocal = world.port_io(neighbor, dir.opposite());
            if reciprocal == IoType::Disabled {
                continue;
            }
            let priority = ports.priority(dir);
            self.endpoints[dir.index()] = Some(Endpoint {
                handle: probe.handle,
                priority,
            });
            self.cache.set_cached_target(dir, target_from_probe(&probe, reciprocal, priority), now_ms);
        }

        self.cache.mark_scanned(now_ms);
        self.state = ScanState::Clean;
        self.fresh = false;
        self.last_full_scan_tick = Some(tick);

        let snapshot = ScanSnapshot {
            generation: now_ms,
            targets: self.cache.targets(),
        };
        world.shared_cache().publish(self.position, snapshot);
        debug!(position = %self.position, endpoints = self.cache.len(), tick, "full scan");
    }

    /// Probe the next endpoint in round-robin order.
    ///
    /// A missing neighbor, a changed kind or a newly disabled facing port
    /// sends the node Dirty. Otherwise the endpoint's cache entry is
    /// refreshed, which also restores an entry dropped as stale.
    pub fn quick_check<W: MeshAccess>(&mut self, ports: &PortConfig, now_ms: u64, world: &mut W) {
        let Some(dir) = self.next_quick_direction() else {
            return;
        };
        let Some(endpoint) = self.endpoints[dir.index()] else {
            return;
        };
        let Some(neighbor) = self.position.checked_neighbor(dir) else {
            return;
        };
        let reciprocal = world.port_io(neighbor, dir.opposite());

        match world.probe(neighbor) {
            Some(probe) if probe.handle == endpoint.handle && reciprocal != IoType::Disabled => {
                let info = target_from_probe(&probe, reciprocal, ports.priority(dir));
                self.cache.set_cached_target(dir, info, now_ms);
            }
            _ => {
                debug!(position = %self.position, %dir, "quick check miss");
                self.mark_dirty();
            }
        }
    }

    fn next_quick_direction(&mut self) -> Option<Direction> {
        for step in 0..6 {
            let idx = (self.quick_cursor + step) % 6;
            if self.endpoints[idx].is_some() {
                self.quick_cursor = (idx + 1) % 6;
                return Direction::from_index(idx as u8);
            }
        }
        None
    }

    /// Take a fresh shared snapshot of our own position instead of probing.
    fn adopt_shared<W: MeshAccess>(&mut self, ports: &PortConfig, now_ms: u64, ttl_ms: u64, world: &mut W) -> bool {
        let Some(snapshot) = world.shared_cache().lookup(self.position, now_ms, ttl_ms).cloned() else {
            return false;
        };
        self.endpoints = [None; PORTS_PER_NODE];
        self.cache.invalidate_all();
        for dir in Direction::ALL {
            let Some(mut info) = snapshot.targets[dir.index()] else {
                continue;
            };
            if ports.io(dir) == IoType::Disabled {
                continue;
            }
            info.priority = ports.priority(dir);
            self.endpoints[dir.index()] = Some(Endpoint {
                handle: info.handle,
                priority: info.priority,
            });
            self.cache.set_cached_target(dir, info, snapshot.generation);
        }
        self.cache.mark_scanned(snapshot.generation);
        self.state = ScanState::Clean;
        self.fresh = false;
        debug!(position = %self.position, generation = snapshot.generation, "adopted shared scan");
        true
    }

    /// Directions we may push through this tick.
    ///
    /// Refreshes the live fields of every cached target first, then keeps
    /// those where our port can output, the target accepts and has room, and
    /// (for conduits) the pairwise check passes. Conduits sharing our pool
    /// are skipped: moving between them changes nothing.
    pub fn valid_targets<W: MeshAccess>(
        &mut self,
        ports: &PortConfig,
        own_network: Option<NetworkId>,
        world: &W,
    ) -> DirectionSet {
        let mut valid = DirectionSet::EMPTY;
        for dir in Direction::ALL {
            let Some(cached) = self.cache.get_cached_target(dir) else {
                continue;
            };
            if !ports.io(dir).can_output() {
                continue;
            }
            let Some(neighbor) = self.position.checked_neighbor(dir) else {
                continue;
            };
            let Some(probe) = world.probe(neighbor) else {
                continue;
            };
            if probe.handle != cached.handle {
                continue;
            }
            let reciprocal = world.port_io(neighbor, dir.opposite());
            let live = target_from_probe(&probe, reciprocal, cached.priority);
            self.cache.refresh(dir, live.can_receive, live.available_space, live.capacity);

            if !live.can_receive || live.available_space <= 0 {
                continue;
            }
            if live.is_conduit() {
                if !conduit_link_valid(&probe, reciprocal) {
                    continue;
                }
                if own_network.is_some() && probe.network == own_network {
                    continue;
                }
            }
            valid.insert(dir);
        }
        valid
    }
}

/// Pairwise check for a conduit neighbor: its facing port is live and it
/// has spare capacity.
pub fn conduit_link_valid(probe: &NeighborProbe, reciprocal: IoType) -> bool {
    reciprocal != IoType::Disabled && probe.stored < probe.capacity
}

fn target_from_probe(probe: &NeighborProbe, reciprocal: IoType, priority: i32) -> TargetInfo {
    let port_accepts = match probe.handle {
        NeighborHandle::Conduit(_) => reciprocal != IoType::Disabled,
        NeighborHandle::External(_) => reciprocal.can_input(),
    };
    TargetInfo {
        handle: probe.handle,
        can_receive: probe.can_receive && port_accepts,
        available_space: probe.space(),
        capacity: probe.capacity,
        priority,
    }
}
