//! Per-port IO modes and priorities.
//!
//! A [`PortConfig`] is a total mapping from each of the six directions to an
//! [`IoType`] and a priority. Mutations are not seen by the network layer
//! immediately: each one is recorded in a pending change set that the owning
//! node drains at the start of its next tick.

use conduit_topology::{Direction, DirectionSet};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lowest priority a port can hold (persisted as `i16`).
pub const PRIORITY_MIN: i32 = i16::MIN as i32;

/// Highest priority a port can hold.
pub const PRIORITY_MAX: i32 = i16::MAX as i32;

/// What a port lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IoType {
    Input,
    Output,
    #[default]
    Both,
    Disabled,
}

impl IoType {
    #[inline]
    pub const fn can_output(self) -> bool {
        matches!(self, Self::Output | Self::Both)
    }

    #[inline]
    pub const fn can_input(self) -> bool {
        matches!(self, Self::Input | Self::Both)
    }

    /// Next mode in the configuring tool's cycle.
    pub const fn cycle(self) -> Self {
        match self {
            Self::Both => Self::Input,
            Self::Input => Self::Output,
            Self::Output => Self::Disabled,
            Self::Disabled => Self::Both,
        }
    }

    /// Stable ordinal used in saved records.
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::Both => 2,
            Self::Disabled => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Result<Self> {
        match ordinal {
            0 => Ok(Self::Input),
            1 => Ok(Self::Output),
            2 => Ok(Self::Both),
            3 => Ok(Self::Disabled),
            other => Err(Error::InvalidIoType(other)),
        }
    }
}

/// Neighbors that want directional control over what the mesh does at
/// their faces.
pub trait PortIo {
    /// Mode of the port facing `direction`.
    fn io_config(&self, direction: Direction) -> IoType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct PortSetting {
    io: IoType,
    priority: i32,
}

/// IO mode and priority for all six ports of a node.
#[derive(Debug, Clone, Default)]
pub struct PortConfig {
    ports: [PortSetting; 6],
    changed: DirectionSet,
}

impl PortConfig {
    /// All ports `Both` at priority 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dir: Direction) -> (IoType, i32) {
        let port = self.ports[dir.index()];
        (port.io, port.priority)
    }

    #[inline]
    pub fn io(&self, dir: Direction) -> IoType {
        self.ports[dir.index()].io
    }

    #[inline]
    pub fn priority(&self, dir: Direction) -> i32 {
        self.ports[dir.index()].priority
    }

    pub fn set(&mut self, dir: Direction, io: IoType) {
        let port = &mut self.ports[dir.index()];
        if port.io != io {
            port.io = io;
            self.changed.insert(dir);
        }
    }

    /// Set a priority, clamped into the persisted range.
    pub fn set_priority(&mut self, dir: Direction, priority: i32) {
        let clamped = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        let port = &mut self.ports[dir.index()];
        if port.priority != clamped {
            port.priority = clamped;
            self.changed.insert(dir);
        }
    }

    /// Back to `Both`/0 everywhere. Every port is reported as changed.
    pub fn reset_all(&mut self) {
        self.ports = [PortSetting::default(); 6];
        self.changed = DirectionSet::FULL;
    }

    /// Drain the directions changed since the last call.
    pub fn take_changes(&mut self) -> DirectionSet {
        std::mem::take(&mut self.changed)
    }

    /// Whether changes are waiting to be observed.
    pub fn has_pending_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

impl PortIo for PortConfig {
    fn io_config(&self, direction: Direction) -> IoType {
        self.io(direction)
    }
}
