//! Mesh tuning.
//!
//! The rate and bonus constants are empirically tuned rather than derived,
//! so all of them live here instead of being baked into the managers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scoring weights for [`crate::BalancingStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancingConfig {
    /// Added to a target's priority when it is below `emptiness_threshold` full
    pub emptiness_bonus: i32,
    /// Fill ratio under which a target counts as "empty"
    pub emptiness_threshold: f64,
    /// Subtracted from targets that keep refusing transfers
    pub unreliable_penalty: i32,
    /// Reliability under which the penalty applies
    pub unreliable_below: f64,
    /// Attempts needed before reliability is trusted
    pub min_attempts_for_reliability: u64,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            emptiness_bonus: 10,
            emptiness_threshold: 0.5,
            unreliable_penalty: 5,
            unreliable_below: 0.25,
            min_attempts_for_reliability: 8,
        }
    }
}

/// Configuration for the whole mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Wall-clock length of one tick; converts the millisecond windows below
    pub tick_millis: u64,
    /// Most resource moved by one push transfer
    pub transfer_rate: i64,
    /// Successful push transfers allowed per node per tick
    pub max_transfers_per_tick: u32,
    /// Resource a node may pull per tick, across all ports
    pub pull_rate: i64,
    /// Ticks between scan opportunities
    pub scan_interval: u64,
    /// Every n-th scan opportunity is a full scan, the rest are quick checks
    pub full_scan_every: u64,
    /// Age after which cached scan data is stale
    pub cache_ttl_ms: u64,
    /// Inactivity after which a node reports idle
    pub idle_threshold_ms: u64,
    /// Inactivity after which a direction's moving average decays
    pub stats_decay_after_ms: u64,
    /// Ticks between stats maintenance passes
    pub stats_maintenance_interval: u64,
    /// Buffer size of a freshly placed conduit
    pub conduit_capacity: i64,
    /// Merge chained conduits into pooled virtual networks
    pub virtual_networks: bool,
    /// Smallest cluster that forms a virtual network
    pub min_network_size: usize,
    pub balancing: BalancingConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            tick_millis: 50,
            transfer_rate: 100,
            max_transfers_per_tick: 2,
            pull_rate: 100,
            scan_interval: 20,
            full_scan_every: 4,
            cache_ttl_ms: 30_000,
            idle_threshold_ms: 30_000,
            stats_decay_after_ms: 300_000,
            stats_maintenance_interval: 100,
            conduit_capacity: 1_000,
            virtual_networks: true,
            min_network_size: 2,
            balancing: BalancingConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or divide by zero.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 6] = [
            (self.tick_millis == 0, "tick_millis must be positive"),
            (self.scan_interval == 0, "scan_interval must be positive"),
            (self.full_scan_every == 0, "full_scan_every must be positive"),
            (self.stats_maintenance_interval == 0, "stats_maintenance_interval must be positive"),
            (self.transfer_rate < 0 || self.pull_rate < 0, "rates must not be negative"),
            (self.conduit_capacity <= 0, "conduit_capacity must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(Error::Config((*reason).to_string())),
            None => Ok(()),
        }
    }

    /// Tick timestamp in milliseconds of tick time.
    #[inline]
    pub fn tick_to_ms(&self, tick: u64) -> u64 {
        tick.saturating_mul(self.tick_millis)
    }

    /// Convert a millisecond window into whole ticks (at least one).
    #[inline]
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        (ms / self.tick_millis.max(1)).max(1)
    }
}
