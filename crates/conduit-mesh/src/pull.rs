//! Pull path: drawing resource in from producers.
//!
//! Only external neighbors are pulled from. Conduits never pull from each
//! other; resource moves between conduits by push alone, which rules out
//! trivial two-node pull loops.

use conduit_topology::Direction;
use tracing::trace;

use crate::access::{HandleRef, LocalStore, MeshAccess};
use crate::network::NetworkManager;
use crate::port::PortConfig;
use crate::protocol;
use crate::stats::StatsManager;
use crate::transfer::{TransferKind, TransferManager, TransferOutcome};

/// Pull-side state for one node.
#[derive(Debug, Clone)]
pub struct PullManager {
    budget_per_tick: i64,
}

impl PullManager {
    pub fn new(budget_per_tick: i64) -> Self {
        Self {
            budget_per_tick: budget_per_tick.max(0),
        }
    }

    pub fn budget_per_tick(&self) -> i64 {
        self.budget_per_tick
    }

    /// Pull from eligible neighbors in enumeration order until the budget or
    /// local space runs out.
    #[allow(clippy::too_many_arguments)]
    pub fn pull<W: MeshAccess>(
        &self,
        tick: u64,
        store: &mut LocalStore<'_>,
        ports: &PortConfig,
        network: &NetworkManager,
        transfer: &mut TransferManager,
        stats: &mut StatsManager,
        world: &mut W,
    ) -> Vec<TransferOutcome> {
        let mut outcomes = Vec::new();
        let mut remaining = self.budget_per_tick;

        for dir in Direction::ALL {
            if remaining <= 0 {
                break;
            }
            if !ports.io(dir).can_input() {
                continue;
            }
            // Cached topology answers the conduit question without a probe.
            if network.endpoint(dir).is_some_and(|e| e.is_conduit()) {
                continue;
            }
            let Some(neighbor) = store.position().checked_neighbor(dir) else {
                continue;
            };
            let Some(probe) = world.probe(neighbor) else {
                continue;
            };
            if probe.handle.is_conduit() {
                continue;
            }
            if !world.port_io(neighbor, dir.opposite()).can_output() {
                continue;
            }

            let space = store.space(world);
            if space <= 0 {
                break;
            }
            let amount = remaining.min(probe.stored).min(space);
            if amount <= 0 {
                continue;
            }

            let moved = protocol::pull(store, world, HandleRef::Node(neighbor), amount);
            let success = moved > 0;
            stats.record_transfer(dir, moved, success, tick);
            if success {
                remaining -= moved;
                transfer.record_receive(dir, tick);
                if let Some(pool) = store.network().and_then(|id| world.pool_mut(id)) {
                    pool.record_pull(neighbor, tick);
                }
                trace!(position = %store.position(), %dir, moved, "pulled");
            }
            outcomes.push(TransferOutcome {
                direction: dir,
                amount: moved,
                success,
                kind: TransferKind::Pull,
            });
        }
        outcomes
    }
}
