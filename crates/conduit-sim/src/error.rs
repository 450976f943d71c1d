//! Error types for conduit-sim.

use thiserror::Error;

/// Result type for simulation setup.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or building a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// Config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for the config shape
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The mesh rejected the config or the layout
    #[error("mesh error: {0}")]
    Mesh(#[from] conduit_mesh::Error),

    /// Scenario dimensions are unusable
    #[error("invalid scenario: {0}")]
    Scenario(String),
}
