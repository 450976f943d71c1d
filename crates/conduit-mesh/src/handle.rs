//! The resource handle boundary.
//!
//! Conduits, external machines and pooled virtual networks all expose the
//! same five operations. With `simulate = true`, `receive` and `extract` must
//! not mutate anything; the two-phase transfer protocol depends on it.

/// Something that stores mana.
pub trait ResourceHandle {
    fn stored(&self) -> i64;

    fn capacity(&self) -> i64;

    /// Whether any amount could be accepted right now.
    fn can_receive(&self) -> bool {
        self.stored() < self.capacity()
    }

    /// Accept up to `amount`; returns what was (or would be) accepted.
    fn receive(&mut self, amount: i64, simulate: bool) -> i64;

    /// Remove up to `amount`; returns what was (or would be) removed.
    fn extract(&mut self, amount: i64, simulate: bool) -> i64;

    /// Free space, never negative.
    fn space(&self) -> i64 {
        (self.capacity() - self.stored()).max(0)
    }

    /// Stored over capacity, 1.0 for a zero-capacity handle.
    fn fill_ratio(&self) -> f64 {
        fill_ratio(self.stored(), self.capacity())
    }
}

pub(crate) fn fill_ratio(stored: i64, capacity: i64) -> f64 {
    if capacity <= 0 {
        1.0
    } else {
        stored as f64 / capacity as f64
    }
}

/// A plain bounded store with optional per-call throughput limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManaBuffer {
    stored: i64,
    capacity: i64,
    max_receive: i64,
    max_extract: i64,
}

impl ManaBuffer {
    /// Unlimited per-call throughput.
    pub fn new(capacity: i64) -> Self {
        Self::with_limits(capacity, i64::MAX, i64::MAX)
    }

    pub fn with_limits(capacity: i64, max_receive: i64, max_extract: i64) -> Self {
        Self {
            stored: 0,
            capacity: capacity.max(0),
            max_receive: max_receive.max(0),
            max_extract: max_extract.max(0),
        }
    }

    /// Builder-style initial fill, clamped to capacity.
    pub fn filled(mut self, stored: i64) -> Self {
        self.set_stored(stored);
        self
    }

    /// Overwrite the stored amount (restores and pool redistribution).
    pub fn set_stored(&mut self, stored: i64) {
        self.stored = stored.clamp(0, self.capacity);
    }

    /// Remove everything, returning what was held.
    pub fn drain(&mut self) -> i64 {
        std::mem::take(&mut self.stored)
    }
}

impl ResourceHandle for ManaBuffer {
    fn stored(&self) -> i64 {
        self.stored
    }

    fn capacity(&self) -> i64 {
        self.capacity
    }

    fn receive(&mut self, amount: i64, simulate: bool) -> i64 {
        let accepted = amount.min(self.max_receive).min(self.space()).max(0);
        if !simulate {
            self.stored += accepted;
        }
        accepted
    }

    fn extract(&mut self, amount: i64, simulate: bool) -> i64 {
        let removed = amount.min(self.max_extract).min(self.stored).max(0);
        if !simulate {
            self.stored -= removed;
        }
        removed
    }
}
