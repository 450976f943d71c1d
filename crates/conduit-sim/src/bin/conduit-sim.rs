//! Conduit Mesh Simulator
//!
//! Usage: `conduit-sim [config.json]`

use conduit_sim::{Simulation, SimulationConfig};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit_sim=info,conduit_mesh=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match env::args().nth(1) {
        Some(path) => {
            tracing::info!(%path, "loading config");
            SimulationConfig::from_file(&path)?
        }
        None => SimulationConfig::default(),
    };
    config.mesh.validate()?;

    println!("Conduit Mesh Simulator");
    println!("======================");
    println!();
    println!("Scenario: {:?}", config.scenario);
    println!("Running {} ticks{}...", config.ticks, if config.realtime { " (paced)" } else { "" });

    let mut sim = Simulation::new(config.clone())?;
    let report = if config.realtime {
        sim.run_paced(config.ticks).await
    } else {
        sim.run(config.ticks)
    };

    println!();
    println!("Simulation complete:");
    println!("  Conduits:   {}", report.conduits);
    println!("  Networks:   {}", report.networks);
    println!("  Produced:   {}", report.produced);
    println!("  Delivered:  {}", report.delivered);
    println!("  In transit: {}", report.in_transit);
    println!("  Pushes:     {}", report.pushes);
    println!("  Pulls:      {}", report.pulls);
    println!("  Idle:       {}", report.idle_conduits);
    println!();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
