//! Per-direction transfer statistics.
//!
//! Counters only ever accumulate. The moving average is the one field that
//! decays, and only for directions that have been quiet for a long time.
//! Idle state is advisory: nothing in the transfer paths reads it.

use conduit_topology::{Direction, PORTS_PER_NODE};
use serde::{Deserialize, Serialize};

use crate::config::MeshConfig;

/// Weight of the previous average in the moving average.
const AVG_KEEP: f64 = 0.9;

/// Multiplier applied to a quiet direction's average per maintenance pass.
const DECAY_FACTOR: f64 = 0.5;

/// Averages below this snap to zero.
const DECAY_FLOOR: f64 = 0.01;

/// Counters for one port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferStats {
    pub total_transferred: i64,
    pub successes: u64,
    pub failures: u64,
    pub last_transfer_tick: u64,
    pub moving_avg_rate: f64,
}

impl TransferStats {
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    /// Success ratio; 1.0 when nothing was attempted.
    pub fn reliability(&self) -> f64 {
        match self.attempts() {
            0 => 1.0,
            n => self.successes as f64 / n as f64,
        }
    }
}

/// Totals across all six ports, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_transferred: i64,
    pub successes: u64,
    pub failures: u64,
    pub throughput: f64,
}

/// Transfer statistics for one node.
#[derive(Debug, Clone)]
pub struct StatsManager {
    per_direction: [TransferStats; PORTS_PER_NODE],
    last_activity_tick: u64,
    idle_after_ticks: u64,
    decay_after_ticks: u64,
}

impl StatsManager {
    pub fn new(created_tick: u64, config: &MeshConfig) -> Self {
        Self {
            per_direction: Default::default(),
            last_activity_tick: created_tick,
            idle_after_ticks: config.ms_to_ticks(config.idle_threshold_ms),
            decay_after_ticks: config.ms_to_ticks(config.stats_decay_after_ms),
        }
    }

    /// Record one attempt. Failed attempts count toward the average as zero.
    pub fn record_transfer(&mut self, dir: Direction, amount: i64, success: bool, tick: u64) {
        let stats = &mut self.per_direction[dir.index()];
        let moved = if success { amount.max(0) } else { 0 };
        stats.moving_avg_rate = AVG_KEEP * stats.moving_avg_rate + (1.0 - AVG_KEEP) * moved as f64;
        if success {
            stats.total_transferred += moved;
            stats.successes += 1;
            stats.last_transfer_tick = tick;
        } else {
            stats.failures += 1;
        }
        self.last_activity_tick = self.last_activity_tick.max(tick);
    }

    pub fn get(&self, dir: Direction) -> &TransferStats {
        &self.per_direction[dir.index()]
    }

    pub fn reliability(&self, dir: Direction) -> f64 {
        self.get(dir).reliability()
    }

    /// True once more than the idle threshold has passed without activity.
    pub fn is_idle(&self, tick: u64) -> bool {
        tick.saturating_sub(self.last_activity_tick) > self.idle_after_ticks
    }

    pub fn last_activity_tick(&self) -> u64 {
        self.last_activity_tick
    }

    /// Decay averages of directions quiet for longer than the decay window.
    pub fn maintain(&mut self, tick: u64) {
        for stats in &mut self.per_direction {
            if stats.moving_avg_rate == 0.0 {
                continue;
            }
            if tick.saturating_sub(stats.last_transfer_tick) > self.decay_after_ticks {
                stats.moving_avg_rate *= DECAY_FACTOR;
                if stats.moving_avg_rate < DECAY_FLOOR {
                    stats.moving_avg_rate = 0.0;
                }
            }
        }
    }

    pub fn summary(&self) -> StatsSummary {
        self.per_direction
            .iter()
            .fold(StatsSummary::default(), |mut acc, s| {
                acc.total_transferred += s.total_transferred;
                acc.successes += s.successes;
                acc.failures += s.failures;
                acc.throughput += s.moving_avg_rate;
                acc
            })
    }

    /// Reinstate saved counters. The moving average restarts from zero.
    pub(crate) fn restore(&mut self, dir: Direction, total: i64, successes: u64, failures: u64, last_transfer_tick: u64) {
        self.per_direction[dir.index()] = TransferStats {
            total_transferred: total,
            successes,
            failures,
            last_transfer_tick,
            moving_avg_rate: 0.0,
        };
        self.last_activity_tick = self.last_activity_tick.max(last_transfer_tick);
    }
}
