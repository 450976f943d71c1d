//! Target selection for the push path.
//!
//! ```text
//! score(dir) = priority(dir)
//!            + emptiness_bonus     if fill(dir) < emptiness_threshold
//!            - unreliable_penalty  if enough attempts and reliability(dir) < unreliable_below
//! ```
//!
//! Highest score wins. Equal scores go to the direction that comes first in
//! [`Direction::ALL`], never to insertion order, so identical inputs always
//! give the same answer.

use conduit_topology::{Direction, DirectionSet};

use crate::config::BalancingConfig;
use crate::network::NetworkManager;
use crate::port::PortConfig;
use crate::stats::StatsManager;

/// Pure scoring over a node's valid targets.
#[derive(Debug, Clone, Default)]
pub struct BalancingStrategy {
    config: BalancingConfig,
}

impl BalancingStrategy {
    pub fn new(config: BalancingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BalancingConfig {
        &self.config
    }

    /// Score one direction; `None` if the network has no target there.
    pub fn score(&self, dir: Direction, ports: &PortConfig, network: &NetworkManager, stats: &StatsManager) -> Option<i64> {
        let target = network.target(dir)?;
        let mut score = i64::from(ports.priority(dir));

        if target.fill_ratio() < self.config.emptiness_threshold {
            score += i64::from(self.config.emptiness_bonus);
        }

        let history = stats.get(dir);
        if history.attempts() >= self.config.min_attempts_for_reliability
            && history.reliability() < self.config.unreliable_below
        {
            score -= i64::from(self.config.unreliable_penalty);
        }
        Some(score)
    }

    /// The best direction among `valid`, or `None` if none is scorable.
    pub fn select_best_target(
        &self,
        valid: DirectionSet,
        ports: &PortConfig,
        network: &NetworkManager,
        stats: &StatsManager,
    ) -> Option<Direction> {
        let mut best: Option<(Direction, i64)> = None;
        for dir in valid.iter() {
            let Some(score) = self.score(dir, ports, network, stats) else {
                continue;
            };
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((dir, score)),
            }
        }
        best.map(|(dir, _)| dir)
    }
}
