//! Virtual networks: pooled capacity for chained conduits.
//!
//! Nodes and networks refer to each other by index only. A conduit stores a
//! [`NetworkId`]; [`VirtualNetworks`] maps ids to [`NetworkState`]. Networks
//! are rebuilt from scratch whenever topology changes, never patched.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use conduit_topology::{Direction, Neighbors, NodePosition};
use serde::{Deserialize, Serialize};

use crate::handle::ResourceHandle;
use crate::transfer::RECEIVE_COOLDOWN_TICKS;

/// Index of a virtual network in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// A pooled cluster.
///
/// Members share one store, so the receive cooldown a lone conduit keeps per
/// port is kept here per producer: whatever any member pulled from stays off
/// limits as a push target for every member until the cooldown runs out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    members: BTreeSet<NodePosition>,
    total_stored: i64,
    total_capacity: i64,
    pulled_from: BTreeMap<NodePosition, u64>,
}

impl NetworkState {
    pub fn new(members: BTreeSet<NodePosition>, total_stored: i64, total_capacity: i64) -> Self {
        Self {
            members,
            total_stored: total_stored.clamp(0, total_capacity.max(0)),
            total_capacity: total_capacity.max(0),
            pulled_from: BTreeMap::new(),
        }
    }

    /// A member pulled from the producer at `source` during `tick`.
    pub fn record_pull(&mut self, source: NodePosition, tick: u64) {
        self.pulled_from
            .retain(|_, at| tick.saturating_sub(*at) < RECEIVE_COOLDOWN_TICKS);
        self.pulled_from.insert(source, tick);
    }

    /// Whether any member pulled from `pos` within the receive cooldown.
    pub fn recently_pulled_from(&self, pos: NodePosition, tick: u64) -> bool {
        self.pulled_from
            .get(&pos)
            .is_some_and(|at| tick.saturating_sub(*at) < RECEIVE_COOLDOWN_TICKS)
    }

    pub fn members(&self) -> &BTreeSet<NodePosition> {
        &self.members
    }

    pub fn contains(&self, pos: NodePosition) -> bool {
        self.members.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// Pool arithmetic is plain addition and subtraction, so the order in which
// member nodes touch the pool within a tick does not matter.
impl ResourceHandle for NetworkState {
    fn stored(&self) -> i64 {
        self.total_stored
    }

    fn capacity(&self) -> i64 {
        self.total_capacity
    }

    fn receive(&mut self, amount: i64, simulate: bool) -> i64 {
        let accepted = amount.min(self.space()).max(0);
        if !simulate {
            self.total_stored += accepted;
        }
        accepted
    }

    fn extract(&mut self, amount: i64, simulate: bool) -> i64 {
        let removed = amount.min(self.total_stored).max(0);
        if !simulate {
            self.total_stored -= removed;
        }
        removed
    }
}

/// Registry of all live virtual networks.
#[derive(Debug, Default)]
pub struct VirtualNetworks {
    networks: HashMap<NetworkId, NetworkState>,
    next_id: u32,
}

impl VirtualNetworks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NetworkId) -> Option<&NetworkState> {
        self.networks.get(&id)
    }

    pub fn get_mut(&mut self, id: NetworkId) -> Option<&mut NetworkState> {
        self.networks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NetworkId, &NetworkState)> {
        self.networks.iter().map(|(id, state)| (*id, state))
    }

    /// Total resource held in all pools.
    pub fn total_stored(&self) -> i64 {
        self.networks.values().map(|n| n.total_stored).sum()
    }

    /// Register a new network and return its id.
    pub fn form(&mut self, state: NetworkState) -> NetworkId {
        let id = NetworkId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.networks.insert(id, state);
        id
    }

    /// Remove every network, handing back the pools for redistribution.
    pub fn dissolve_all(&mut self) -> Vec<NetworkState> {
        self.networks.drain().map(|(_, state)| state).collect()
    }

    /// Check the symmetric membership invariant.
    ///
    /// `reports` returns the buffer capacity of the conduit at a position if
    /// it claims membership in the given network, `None` otherwise. Members
    /// that do not claim it are dropped along with their share of capacity.
    /// Returns how many were dropped.
    pub fn verify_membership<F>(&mut self, reports: F) -> usize
    where
        F: Fn(NodePosition, NetworkId) -> Option<i64>,
    {
        let mut dropped = 0;
        for (id, state) in self.networks.iter_mut() {
            let stale: Vec<_> = state
                .members
                .iter()
                .copied()
                .filter(|pos| reports(*pos, *id).is_none())
                .collect();
            if stale.is_empty() {
                continue;
            }
            for pos in &stale {
                tracing::warn!(network = ?id, position = %pos, "member does not report membership");
                debug_assert!(false, "network {:?} lists {} which is not a member", id, pos);
                state.members.remove(pos);
            }
            dropped += stale.len();
            let capacity: i64 = state
                .members
                .iter()
                .filter_map(|pos| reports(*pos, *id))
                .sum();
            state.total_capacity = capacity;
            state.total_stored = state.total_stored.min(capacity);
        }
        self.networks.retain(|_, state| !state.members.is_empty());
        dropped
    }
}

/// Group conduits into connected clusters.
///
/// `linked(pos, dir)` says whether the conduit at `pos` is chained to the
/// conduit through `dir`. Components come back in position order.
pub fn connected_components<F>(conduits: &BTreeSet<NodePosition>, linked: F) -> Vec<BTreeSet<NodePosition>>
where
    F: Fn(NodePosition, Direction) -> bool,
{
    let mut seen = BTreeSet::new();
    let mut components = Vec::new();

    for &start in conduits {
        if !seen.insert(start) {
            continue;
        }
        let mut component = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(pos) = queue.pop_front() {
            for (dir, next) in Neighbors::of(pos) {
                if conduits.contains(&next) && !seen.contains(&next) && linked(pos, dir) {
                    seen.insert(next);
                    component.insert(next);
                    queue.push_back(next);
                }
            }
        }
        components.push(component);
    }
    components
}

/// Split `total` over members in proportion to capacity.
///
/// Integer division leaves a remainder, which is handed out in position
/// order up to each member's capacity. The result always sums to `total`
/// as long as `total` fits in the combined capacity.
pub fn share_out(total: i64, members: &[(NodePosition, i64)]) -> Vec<(NodePosition, i64)> {
    let capacity: i64 = members.iter().map(|(_, c)| (*c).max(0)).sum();
    if capacity <= 0 || total <= 0 {
        return members.iter().map(|(pos, _)| (*pos, 0)).collect();
    }
    let total = total.min(capacity);

    let mut shares: Vec<(NodePosition, i64)> = members
        .iter()
        .map(|(pos, cap)| {
            let share = (i128::from(total) * i128::from((*cap).max(0)) / i128::from(capacity)) as i64;
            (*pos, share)
        })
        .collect();

    let mut remainder = total - shares.iter().map(|(_, s)| s).sum::<i64>();
    for ((_, share), (_, cap)) in shares.iter_mut().zip(members) {
        if remainder == 0 {
            break;
        }
        let room = (*cap).max(0) - *share;
        let extra = room.min(remainder);
        *share += extra;
        remainder -= extra;
    }
    shares
}
