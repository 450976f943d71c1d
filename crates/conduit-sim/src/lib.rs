//! Conduit Mesh Simulation
//!
//! Builds a scenario on the reference host, runs it, and reports where the
//! resource went.
//!
//! # Scenarios
//!
//! - **Line**: source, a row of conduits, sink
//! - **Grid**: a slab of conduits fed by one source per row on the west edge
//!   and drained by one sink per row on the east edge
//!
//! Sources are topped up by the harness at the start of every tick, standing
//! in for production the mesh itself never does.
//!
//! # Usage
//!
//! ```ignore
//! let mut sim = Simulation::new(SimulationConfig::default())?;
//! let report = sim.run(200);
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```

mod error;
mod events;
mod simulation;

pub use error::{Error, Result};
pub use events::FlowEvent;
pub use simulation::{Scenario, Simulation, SimulationConfig, SimulationReport};
