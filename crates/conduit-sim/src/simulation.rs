//! Scenario simulation with flow recording.

use std::path::Path;
use std::time::Duration;

use conduit_mesh::{
    ExternalNode, ManaBuffer, MeshConfig, MeshWorld, ResourceHandle, TransferKind, WorldTickReport,
};
use conduit_topology::NodePosition;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::FlowEvent;

/// Layout to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    /// A source, `length` conduits along +x, a sink.
    Line { length: i32 },
    /// A `width` x `depth` slab of conduits, one source per row at the west
    /// edge and one sink per row at the east edge.
    Grid { width: i32, depth: i32 },
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::Line { length: 8 }
    }
}

/// Configuration for the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub scenario: Scenario,
    /// Ticks to run
    pub ticks: u64,
    /// Keep a per-tick event timeline in the report
    pub record_events: bool,
    /// Pace ticks at `mesh.tick_millis` of wall time
    pub realtime: bool,
    pub source_capacity: i64,
    pub sink_capacity: i64,
    pub mesh: MeshConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            ticks: 200,
            record_events: false,
            realtime: false,
            source_capacity: 10_000,
            sink_capacity: 1_000_000,
            mesh: MeshConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub ticks: u64,
    pub conduits: usize,
    /// Resource that reached the sinks
    pub delivered: i64,
    /// Resource held inside the mesh (buffers and pools)
    pub in_transit: i64,
    /// Resource the harness added to sources
    pub produced: i64,
    pub pushes: u64,
    pub pulls: u64,
    pub networks: usize,
    pub idle_conduits: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<FlowEvent>,
}

/// Drives a [`MeshWorld`] through a scenario.
pub struct Simulation {
    config: SimulationConfig,
    world: MeshWorld,
    sources: Vec<NodePosition>,
    sinks: Vec<NodePosition>,
    events: Vec<FlowEvent>,
    produced: i64,
    pushes: u64,
    pulls: u64,
    ticks_run: u64,
}

impl Simulation {
    /// Build the scenario. Fails on an invalid mesh config or empty layout.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let mut world = MeshWorld::new(config.mesh.clone())?;
        let (width, depth) = match config.scenario {
            Scenario::Line { length } => (length, 1),
            Scenario::Grid { width, depth } => (width, depth),
        };
        if width <= 0 || depth <= 0 {
            return Err(Error::Scenario(format!("{width}x{depth} has no conduits")));
        }

        let mut sources = Vec::new();
        let mut sinks = Vec::new();
        for z in 0..depth {
            let source = NodePosition::new(-1, 0, z);
            let sink = NodePosition::new(width, 0, z);
            world.place_external(
                source,
                ExternalNode::source(ManaBuffer::new(config.source_capacity).filled(config.source_capacity)),
            )?;
            world.place_external(sink, ExternalNode::sink(ManaBuffer::new(config.sink_capacity)))?;
            sources.push(source);
            sinks.push(sink);
            for x in 0..width {
                world.place_conduit(NodePosition::new(x, 0, z))?;
            }
        }
        info!(scenario = ?config.scenario, conduits = width * depth, "scenario built");

        Ok(Self {
            config,
            world,
            sources,
            sinks,
            events: Vec::new(),
            produced: 0,
            pushes: 0,
            pulls: 0,
            ticks_run: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn world(&self) -> &MeshWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut MeshWorld {
        &mut self.world
    }

    pub fn events(&self) -> &[FlowEvent] {
        &self.events
    }

    /// Top up every source, then run one world tick.
    pub fn step(&mut self) -> WorldTickReport {
        for pos in &self.sources {
            if let Some(source) = self.world.external_mut(*pos) {
                let space = source.buffer().space();
                self.produced += source.buffer_mut().receive(space, false);
            }
        }

        let report = self.world.step();
        for (_, node) in &report.nodes {
            for outcome in node.outcomes.iter().filter(|o| o.success) {
                match outcome.kind {
                    TransferKind::Push => self.pushes += 1,
                    TransferKind::Pull => self.pulls += 1,
                }
            }
        }
        if self.config.record_events {
            self.record(&report);
        }
        self.ticks_run += 1;
        debug!(tick = report.tick, pushed = report.moved(TransferKind::Push), "tick complete");
        report
    }

    fn record(&mut self, report: &WorldTickReport) {
        let tick = report.tick;
        if report.networks_rebuilt {
            self.events.push(FlowEvent::NetworksRebuilt {
                tick,
                networks: self.world.networks().len(),
            });
        }
        for (pos, node) in &report.nodes {
            for outcome in node.outcomes.iter().filter(|o| o.success) {
                self.events.push(FlowEvent::Transfer {
                    tick,
                    node: *pos,
                    direction: outcome.direction,
                    amount: outcome.amount,
                    kind: outcome.kind,
                });
            }
            if let Some(kind) = node.scan {
                self.events.push(FlowEvent::Scan { tick, node: *pos, kind });
            }
        }
    }

    /// Run `ticks` ticks as fast as possible.
    pub fn run(&mut self, ticks: u64) -> SimulationReport {
        for _ in 0..ticks {
            self.step();
        }
        self.report()
    }

    /// Run `ticks` ticks paced at the mesh tick length. Stops early on Ctrl-C.
    pub async fn run_paced(&mut self, ticks: u64) -> SimulationReport {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.mesh.tick_millis));
        for _ in 0..ticks {
            tokio::select! {
                _ = interval.tick() => {
                    self.step();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(ticks = self.ticks_run, "interrupted");
                    break;
                }
            }
        }
        self.report()
    }

    /// Totals so far.
    pub fn report(&self) -> SimulationReport {
        let delivered = self
            .sinks
            .iter()
            .filter_map(|pos| self.world.external(*pos))
            .map(|sink| sink.buffer().stored())
            .sum();
        let positions = self.world.conduit_positions();
        let tick = self.world.current_tick();
        let idle_conduits = positions
            .iter()
            .filter_map(|pos| self.world.conduit(*pos))
            .filter(|node| node.stats().is_idle(tick))
            .count();

        SimulationReport {
            ticks: self.ticks_run,
            conduits: positions.len(),
            delivered,
            in_transit: self.world.mesh_stored(),
            produced: self.produced,
            pushes: self.pushes,
            pulls: self.pulls,
            networks: self.world.networks().len(),
            idle_conduits,
            events: self.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_delivers_to_sink() {
        let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
        let report = sim.run(100);

        assert_eq!(report.ticks, 100);
        assert_eq!(report.conduits, 8);
        assert_eq!(report.networks, 1);
        assert!(report.delivered > 0);
        assert!(report.pulls > 0 && report.pushes > 0);
    }

    #[test]
    fn nothing_is_created_or_lost() {
        let config = SimulationConfig {
            scenario: Scenario::Grid { width: 5, depth: 3 },
            ..SimulationConfig::default()
        };
        let initial = config.source_capacity * 3;
        let mut sim = Simulation::new(config).unwrap();
        let report = sim.run(60);

        let in_sources: i64 = sim
            .sources
            .iter()
            .filter_map(|p| sim.world().external(*p))
            .map(|s| s.buffer().stored())
            .sum();
        assert_eq!(in_sources + report.in_transit + report.delivered, initial + report.produced);
    }

    #[test]
    fn events_only_when_recording() {
        let mut quiet = Simulation::new(SimulationConfig::default()).unwrap();
        assert!(quiet.run(10).events.is_empty());

        let config = SimulationConfig {
            record_events: true,
            ..SimulationConfig::default()
        };
        let mut loud = Simulation::new(config).unwrap();
        let report = loud.run(10);
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, FlowEvent::NetworksRebuilt { tick: 0, .. })));
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, FlowEvent::Transfer { kind: TransferKind::Pull, .. })));
        assert!(report.events.windows(2).all(|w| w[0].tick() <= w[1].tick()));
    }

    #[test]
    fn empty_scenario_is_rejected() {
        let config = SimulationConfig {
            scenario: Scenario::Grid { width: 0, depth: 4 },
            ..SimulationConfig::default()
        };
        assert!(matches!(Simulation::new(config), Err(Error::Scenario(_))));
    }

    #[test]
    fn config_json_fills_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"scenario": {"kind": "grid", "width": 3, "depth": 2}, "ticks": 5}"#).unwrap();
        assert_eq!(config.scenario, Scenario::Grid { width: 3, depth: 2 });
        assert_eq!(config.ticks, 5);
        assert_eq!(config.mesh, MeshConfig::default());
    }

    #[test]
    fn paced_run_completes() {
        let config = SimulationConfig {
            mesh: MeshConfig {
                tick_millis: 1,
                ..MeshConfig::default()
            },
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        let report = tokio_test::block_on(sim.run_paced(5));
        assert_eq!(report.ticks, 5);
    }
}
