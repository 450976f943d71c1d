//! Error types for conduit-mesh.
//!
//! Nothing inside a tick returns these. They cover the host-facing surface:
//! placing and configuring nodes, restoring saved records, loading config.

use conduit_topology::NodePosition;
use thiserror::Error;

/// Result type for conduit-mesh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur at the mesh's host boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A node already occupies the position
    #[error("position {0} is already occupied")]
    Occupied(NodePosition),

    /// No conduit at the position
    #[error("no conduit at {0}")]
    NotAConduit(NodePosition),

    /// No external node at the position
    #[error("no external node at {0}")]
    NotExternal(NodePosition),

    /// Saved direction ordinal out of range
    #[error("invalid direction ordinal: {0}")]
    InvalidDirection(u8),

    /// Saved IO type ordinal out of range
    #[error("invalid io type ordinal: {0}")]
    InvalidIoType(u8),

    /// Configuration rejected by validation
    #[error("invalid config: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
