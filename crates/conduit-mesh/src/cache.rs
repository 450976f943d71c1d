//! Neighbor lookup caches.
//!
//! [`CacheManager`] memoizes per-direction scan results for one node; it never
//! holds more than six entries. [`SharedScanCache`] is a store passed in by the
//! host and shared by every node, keyed by position and tagged with the scan
//! generation (timestamp in tick-time milliseconds) that produced it.

use std::collections::HashMap;

use conduit_topology::{Direction, Neighbors, NodePosition, PORTS_PER_NODE};

use crate::access::NeighborHandle;
use crate::handle::fill_ratio;

/// Cached knowledge about one port's neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetInfo {
    pub handle: NeighborHandle,
    /// Neighbor accepts through the facing port right now
    pub can_receive: bool,
    pub available_space: i64,
    pub capacity: i64,
    /// Our priority for this port when it was cached
    pub priority: i32,
}

impl TargetInfo {
    #[inline]
    pub fn is_conduit(&self) -> bool {
        self.handle.is_conduit()
    }

    pub fn fill_ratio(&self) -> f64 {
        fill_ratio(self.capacity - self.available_space, self.capacity)
    }
}

/// Per-node target cache.
#[derive(Debug, Clone, Default)]
pub struct CacheManager {
    targets: [Option<TargetInfo>; PORTS_PER_NODE],
    last_scan_ms: Option<u64>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_cached_target(&self, dir: Direction) -> Option<TargetInfo> {
        self.targets[dir.index()]
    }

    /// Store a scan result; also stamps the cache as scanned at `now_ms`.
    pub fn set_cached_target(&mut self, dir: Direction, info: TargetInfo, now_ms: u64) {
        self.targets[dir.index()] = Some(info);
        self.last_scan_ms = Some(now_ms);
    }

    /// Stamp a scan that may have found nothing.
    pub fn mark_scanned(&mut self, now_ms: u64) {
        self.last_scan_ms = Some(now_ms);
    }

    /// Update the live fields of an existing entry without restamping it.
    pub(crate) fn refresh(&mut self, dir: Direction, can_receive: bool, available_space: i64, capacity: i64) {
        if let Some(info) = self.targets[dir.index()].as_mut() {
            info.can_receive = can_receive;
            info.available_space = available_space;
            info.capacity = capacity;
        }
    }

    pub fn invalidate_direction(&mut self, dir: Direction) {
        self.targets[dir.index()] = None;
    }

    pub fn invalidate_all(&mut self) {
        self.targets = [None; PORTS_PER_NODE];
        self.last_scan_ms = None;
    }

    /// Whether the last scan is at most `max_age_ms` old.
    pub fn is_valid(&self, max_age_ms: u64, now_ms: u64) -> bool {
        self.last_scan_ms
            .is_some_and(|scanned| now_ms.saturating_sub(scanned) <= max_age_ms)
    }

    pub fn last_scan_ms(&self) -> Option<u64> {
        self.last_scan_ms
    }

    pub fn len(&self) -> usize {
        self.targets.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn targets(&self) -> [Option<TargetInfo>; PORTS_PER_NODE] {
        self.targets
    }
}

/// One node's full scan result as published to the shared cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSnapshot {
    /// Tick-time millisecond timestamp of the scan
    pub generation: u64,
    pub targets: [Option<TargetInfo>; PORTS_PER_NODE],
}

/// Scan snapshots shared across nodes.
///
/// Writes replace whole snapshots and only ever move a position's generation
/// forward, so repeated or out-of-order publishes within a tick are harmless.
#[derive(Debug, Default)]
pub struct SharedScanCache {
    entries: HashMap<NodePosition, ScanSnapshot>,
}

impl SharedScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot unless a newer one is already present.
    pub fn publish(&mut self, pos: NodePosition, snapshot: ScanSnapshot) -> bool {
        match self.entries.get(&pos) {
            Some(existing) if existing.generation > snapshot.generation => false,
            _ => {
                self.entries.insert(pos, snapshot);
                true
            }
        }
    }

    /// A snapshot for `pos` no older than `max_age_ms`.
    pub fn lookup(&self, pos: NodePosition, now_ms: u64, max_age_ms: u64) -> Option<&ScanSnapshot> {
        self.entries
            .get(&pos)
            .filter(|s| now_ms.saturating_sub(s.generation) <= max_age_ms)
    }

    pub fn invalidate(&mut self, pos: NodePosition) {
        self.entries.remove(&pos);
    }

    /// Drop snapshots at `pos` and at every neighbor, whose view includes `pos`.
    pub fn invalidate_around(&mut self, pos: NodePosition) {
        self.entries.remove(&pos);
        for n in Neighbors::positions(pos) {
            self.entries.remove(&n);
        }
    }

    /// Drop everything older than `max_age_ms`.
    pub fn prune(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, s| now_ms.saturating_sub(s.generation) <= max_age_ms);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(pos: NodePosition) -> TargetInfo {
        TargetInfo {
            handle: NeighborHandle::External(pos),
            can_receive: true,
            available_space: 40,
            capacity: 100,
            priority: 0,
        }
    }

    #[test]
    fn invalidate_direction_clears_only_that_entry() {
        let mut cache = CacheManager::new();
        cache.set_cached_target(Direction::East, target(NodePosition::new(1, 0, 0)), 0);
        cache.set_cached_target(Direction::West, target(NodePosition::new(-1, 0, 0)), 0);

        cache.invalidate_direction(Direction::East);
        assert_eq!(cache.get_cached_target(Direction::East), None);
        assert!(cache.get_cached_target(Direction::West).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_validity() {
        let mut cache = CacheManager::new();
        assert!(!cache.is_valid(30_000, 0));

        cache.mark_scanned(1_000);
        assert!(cache.is_valid(30_000, 31_000));
        assert!(!cache.is_valid(30_000, 31_001));

        cache.invalidate_all();
        assert!(!cache.is_valid(30_000, 1_000));
    }

    #[test]
    fn refresh_keeps_timestamp() {
        let mut cache = CacheManager::new();
        cache.set_cached_target(Direction::Up, target(NodePosition::new(0, 1, 0)), 500);
        cache.refresh(Direction::Up, false, 0, 100);

        let info = cache.get_cached_target(Direction::Up).unwrap();
        assert!(!info.can_receive);
        assert_eq!(info.fill_ratio(), 1.0);
        assert_eq!(cache.last_scan_ms(), Some(500));
    }

    #[test]
    fn fill_ratio_from_space() {
        let info = target(NodePosition::ORIGIN);
        assert!((info.fill_ratio() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn shared_publish_keeps_newest() {
        let mut shared = SharedScanCache::new();
        let pos = NodePosition::new(4, 4, 4);
        let snap = |generation| ScanSnapshot {
            generation,
            targets: [None; 6],
        };

        assert!(shared.publish(pos, snap(200)));
        assert!(!shared.publish(pos, snap(100)));
        // Equal generation is an equivalent snapshot; overwrite is fine
        assert!(shared.publish(pos, snap(200)));
        assert_eq!(shared.lookup(pos, 200, 0).unwrap().generation, 200);
    }

    #[test]
    fn shared_lookup_respects_age() {
        let mut shared = SharedScanCache::new();
        let pos = NodePosition::ORIGIN;
        shared.publish(pos, ScanSnapshot { generation: 1_000, targets: [None; 6] });

        assert!(shared.lookup(pos, 2_000, 1_000).is_some());
        assert!(shared.lookup(pos, 2_001, 1_000).is_none());
        assert_eq!(shared.prune(2_001, 1_000), 1);
        assert!(shared.is_empty());
    }

    #[test]
    fn invalidate_around_hits_neighbors() {
        let mut shared = SharedScanCache::new();
        let center = NodePosition::ORIGIN;
        let far = NodePosition::new(5, 5, 5);
        for pos in [center, center.neighbor(Direction::North), far] {
            shared.publish(pos, ScanSnapshot { generation: 0, targets: [None; 6] });
        }

        shared.invalidate_around(center);
        assert_eq!(shared.len(), 1);
        assert!(shared.lookup(far, 0, 0).is_some());
    }
}
