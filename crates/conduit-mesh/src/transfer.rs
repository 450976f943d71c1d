//! Push path: moving resource out to the best neighbor.
//!
//! Each tick a node makes at most `max_transfers_per_tick` successful pushes.
//! A candidate direction is rejected when:
//! - it already carried a successful push this tick
//! - resource arrived through it less than two ticks ago
//! - it carried the last push and no tick has elapsed since
//! - it leads to a producer our virtual network pulled from less than two
//!   ticks ago, through any member
//!
//! Per-tick state resets when the tick id changes, not on a schedule, so a
//! host that skips ticks under load still gets a clean slate.

use conduit_topology::{Direction, DirectionSet};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::access::{HandleRef, LocalStore, MeshAccess};
use crate::balancing::BalancingStrategy;
use crate::config::MeshConfig;
use crate::network::NetworkManager;
use crate::port::PortConfig;
use crate::protocol;
use crate::stats::StatsManager;

/// Ticks a just-used input direction stays closed for pushing.
pub(crate) const RECEIVE_COOLDOWN_TICKS: u64 = 2;

/// Which path produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Push,
    Pull,
}

/// Result of one attempted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub direction: Direction,
    pub amount: i64,
    pub success: bool,
    pub kind: TransferKind,
}

/// Why a candidate direction was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRejection {
    /// Already pushed through this tick
    Busy,
    /// Resource came in through this port too recently
    RecentlyReceived,
    /// Same direction as the last push, same tick
    Oscillation,
    /// Another member of our pool pulled from this target too recently
    PoolSource,
}

/// Push-side state for one node.
#[derive(Debug, Clone)]
pub struct TransferManager {
    strategy: BalancingStrategy,
    transfer_rate: i64,
    max_transfers_per_tick: u32,
    current_tick: Option<u64>,
    busy: DirectionSet,
    transfers_this_tick: u32,
    last_transfer_direction: Option<Direction>,
    last_transfer_tick: u64,
    last_receive_direction: Option<Direction>,
    last_receive_tick: u64,
}

impl TransferManager {
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            strategy: BalancingStrategy::new(config.balancing.clone()),
            transfer_rate: config.transfer_rate,
            max_transfers_per_tick: config.max_transfers_per_tick,
            current_tick: None,
            busy: DirectionSet::EMPTY,
            transfers_this_tick: 0,
            last_transfer_direction: None,
            last_transfer_tick: 0,
            last_receive_direction: None,
            last_receive_tick: 0,
        }
    }

    pub fn strategy(&self) -> &BalancingStrategy {
        &self.strategy
    }

    /// Reset per-tick state if `tick` is a tick we have not seen yet.
    pub fn begin_tick(&mut self, tick: u64) {
        if self.current_tick != Some(tick) {
            self.current_tick = Some(tick);
            self.busy.clear();
            self.transfers_this_tick = 0;
        }
    }

    pub fn busy_directions(&self) -> DirectionSet {
        self.busy
    }

    pub fn transfers_this_tick(&self) -> u32 {
        self.transfers_this_tick
    }

    pub fn last_transfer(&self) -> (Option<Direction>, u64) {
        (self.last_transfer_direction, self.last_transfer_tick)
    }

    pub fn last_receive(&self) -> (Option<Direction>, u64) {
        (self.last_receive_direction, self.last_receive_tick)
    }

    /// Resource arrived through `dir`.
    pub fn record_receive(&mut self, dir: Direction, tick: u64) {
        self.last_receive_direction = Some(dir);
        self.last_receive_tick = tick;
    }

    pub(crate) fn restore_history(
        &mut self,
        last_transfer: (Option<Direction>, u64),
        last_receive: (Option<Direction>, u64),
    ) {
        (self.last_transfer_direction, self.last_transfer_tick) = last_transfer;
        (self.last_receive_direction, self.last_receive_tick) = last_receive;
    }

    /// Anti-loop and anti-oscillation check for one candidate.
    pub fn check_guards(&self, dir: Direction, tick: u64) -> Option<GuardRejection> {
        if self.current_tick == Some(tick) && self.busy.contains(dir) {
            return Some(GuardRejection::Busy);
        }
        if self.last_receive_direction == Some(dir)
            && tick.saturating_sub(self.last_receive_tick) < RECEIVE_COOLDOWN_TICKS
        {
            return Some(GuardRejection::RecentlyReceived);
        }
        if self.last_transfer_direction == Some(dir) && tick == self.last_transfer_tick {
            return Some(GuardRejection::Oscillation);
        }
        None
    }

    /// Run this tick's push decisions.
    pub fn process_flow<W: MeshAccess>(
        &mut self,
        tick: u64,
        store: &mut LocalStore<'_>,
        ports: &PortConfig,
        network: &mut NetworkManager,
        stats: &mut StatsManager,
        world: &mut W,
    ) -> Vec<TransferOutcome> {
        self.begin_tick(tick);
        let mut outcomes = Vec::new();
        let mut candidates = network.valid_targets(ports, store.network(), &*world);

        while self.transfers_this_tick < self.max_transfers_per_tick {
            let stored = store.stored(world);
            if stored <= 0 {
                break;
            }
            let Some(dir) = self.strategy.select_best_target(candidates, ports, network, stats) else {
                break;
            };
            // Every candidate is considered at most once per tick.
            candidates.remove(dir);

            if let Some(reason) = self.check_guards(dir, tick) {
                trace!(position = %store.position(), %dir, ?reason, "push rejected");
                continue;
            }
            let Some(target) = network.target(dir) else {
                continue;
            };
            let target_pos = target.handle.position();
            let pool_fed = store
                .network()
                .and_then(|id| world.pool_mut(id))
                .is_some_and(|pool| pool.recently_pulled_from(target_pos, tick));
            if pool_fed {
                trace!(position = %store.position(), %dir, reason = ?GuardRejection::PoolSource, "push rejected");
                continue;
            }
            let amount = self.transfer_rate.min(stored).min(target.available_space);
            if amount <= 0 {
                continue;
            }

            let moved = protocol::push(store, world, HandleRef::Node(target_pos), amount);
            let success = moved > 0;
            stats.record_transfer(dir, moved, success, tick);

            if success {
                world.notify_received(target_pos, dir.opposite(), tick);
                self.mark_busy(dir);
                self.transfers_this_tick += 1;
                self.last_transfer_direction = Some(dir);
                self.last_transfer_tick = tick;
                trace!(position = %store.position(), %dir, moved, "pushed");
            } else {
                // Advertised space was stale.
                network.invalidate_direction(dir);
            }
            outcomes.push(TransferOutcome {
                direction: dir,
                amount: moved,
                success,
                kind: TransferKind::Push,
            });
        }
        outcomes
    }

    fn mark_busy(&mut self, dir: Direction) {
        if !self.busy.insert(dir) {
            warn!(%dir, "direction marked busy twice in one tick");
            debug_assert!(false, "direction {dir} used twice in one tick");
        }
    }
}
