//! End-to-end transfer scenarios against the reference host.

use conduit_mesh::{
    ExternalNode, IoType, ManaBuffer, MeshConfig, MeshWorld, NetworkManager, ResourceHandle, ScanKind,
    TransferKind,
};
use conduit_topology::{Direction, NodePosition};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

fn origin() -> NodePosition {
    NodePosition::ORIGIN
}

fn stored_at(world: &MeshWorld, pos: NodePosition) -> i64 {
    world
        .external(pos)
        .map(|e| e.buffer().stored())
        .or_else(|| world.conduit_stored(pos))
        .unwrap_or(0)
}

#[test]
fn push_moves_min_of_rate_stored_and_space() {
    init_tracing();
    let config = MeshConfig {
        conduit_capacity: 200,
        ..MeshConfig::default()
    };
    let mut world = MeshWorld::new(config).unwrap();
    let y = origin().neighbor(Direction::East);
    world.place_conduit(origin()).unwrap().buffer_mut().set_stored(100);
    world.place_external(y, ExternalNode::sink(ManaBuffer::new(50))).unwrap();
    world.set_priority(origin(), Direction::East, 10).unwrap();

    let first = world.step();
    assert_eq!(first.moved(TransferKind::Push), 0);
    assert_eq!(first.nodes[0].1.scan, Some(ScanKind::Full));

    let second = world.step();
    assert_eq!(second.moved(TransferKind::Push), 50);
    assert_eq!(stored_at(&world, origin()), 50);
    assert_eq!(stored_at(&world, y), 50);
}

#[test]
fn emptier_target_is_preferred_on_priority_tie() {
    init_tracing();
    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    let north = origin().neighbor(Direction::North);
    let south = origin().neighbor(Direction::South);
    world.place_conduit(origin()).unwrap().buffer_mut().set_stored(200);
    world
        .place_external(north, ExternalNode::sink(ManaBuffer::new(100).filled(80)))
        .unwrap();
    world
        .place_external(south, ExternalNode::sink(ManaBuffer::new(100).filled(20)))
        .unwrap();
    world.set_priority(origin(), Direction::North, 10).unwrap();
    world.set_priority(origin(), Direction::South, 10).unwrap();

    world.step();
    let report = world.step();
    let pushes: Vec<_> = report.nodes[0].1.outcomes.iter().filter(|o| o.success).collect();
    assert_eq!(pushes[0].direction, Direction::South);
    assert_eq!(pushes[0].amount, 80);
}

#[test]
fn disabled_reciprocal_is_never_attempted() {
    init_tracing();
    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    let east = origin().neighbor(Direction::East);
    world.place_conduit(origin()).unwrap().buffer_mut().set_stored(500);
    world
        .place_external(
            east,
            ExternalNode::new(ManaBuffer::new(1000)).with_side(Direction::West, IoType::Disabled),
        )
        .unwrap();

    for _ in 0..30 {
        let report = world.step();
        assert!(report.nodes.iter().all(|(_, r)| r.outcomes.is_empty()));
    }
    let node = world.conduit(origin()).unwrap();
    assert_eq!(node.stats().get(Direction::East).attempts(), 0);
    assert_eq!(node.buffer().stored(), 500);
}

#[test]
fn facing_conduits_do_not_ping_pong() {
    init_tracing();
    let config = MeshConfig {
        virtual_networks: false,
        ..MeshConfig::default()
    };
    let cap = config.transfer_rate;
    let mut world = MeshWorld::new(config).unwrap();
    let a = origin();
    let b = origin().neighbor(Direction::East);
    world.place_conduit(a).unwrap().buffer_mut().set_stored(500);
    world.place_conduit(b).unwrap().buffer_mut().set_stored(300);
    let total = world.total_stored();

    for _ in 0..4 {
        world.begin_tick();
        let ra = world.tick_node(a).unwrap();
        let rb = world.tick_node(b).unwrap();
        world.end_tick();

        let a_to_b = ra.moved(TransferKind::Push);
        let b_to_a = rb.moved(TransferKind::Push);
        assert!(a_to_b + b_to_a <= 2 * cap);
        for report in [&ra, &rb] {
            let successes = report.outcomes.iter().filter(|o| o.success).count();
            assert!(successes <= 1, "one facing direction, at most one push");
        }
        // B was just fed through West, so it must not push back
        assert_eq!(b_to_a, 0);
        assert_eq!(world.total_stored(), total);
    }
    assert_eq!(stored_at(&world, a), 200);
    assert_eq!(stored_at(&world, b), 600);
}

#[test]
fn line_relays_from_source_to_sink() {
    init_tracing();
    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    let source = NodePosition::new(-1, 0, 0);
    let sink = NodePosition::new(4, 0, 0);
    world
        .place_external(source, ExternalNode::source(ManaBuffer::new(5000).filled(5000)))
        .unwrap();
    for x in 0..4 {
        world.place_conduit(NodePosition::new(x, 0, 0)).unwrap();
    }
    world.place_external(sink, ExternalNode::sink(ManaBuffer::new(5000))).unwrap();
    let total = world.total_stored();

    for _ in 0..40 {
        world.step();
        assert_eq!(world.total_stored(), total);
    }
    assert_eq!(world.networks().len(), 1);
    assert!(stored_at(&world, sink) > 0);
    assert!(stored_at(&world, source) < 5000);
}

#[test]
fn removed_neighbor_is_not_pushed_to() {
    init_tracing();
    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    let east = origin().neighbor(Direction::East);
    world.place_conduit(origin()).unwrap().buffer_mut().set_stored(1000);
    world.place_external(east, ExternalNode::sink(ManaBuffer::new(10_000))).unwrap();
    world.step();
    assert_eq!(world.step().moved(TransferKind::Push), 100);

    assert!(world.remove(east));
    assert!(world.conduit(origin()).unwrap().network().is_dirty());
    let report = world.step();
    assert!(report.nodes[0].1.outcomes.is_empty());
    assert_eq!(report.nodes[0].1.scan, Some(ScanKind::Full));
    assert!(world.conduit(origin()).unwrap().network().endpoint(Direction::East).is_none());
}

#[test]
fn restored_conduit_adopts_shared_scan() {
    init_tracing();
    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    let pos = NodePosition::new(0, 5, 0);
    world.place_conduit(pos).unwrap().buffer_mut().set_stored(70);
    world
        .place_external(pos.neighbor(Direction::Up), ExternalNode::sink(ManaBuffer::new(10).filled(10)))
        .unwrap();
    world.step();

    // Swap the node for a restored copy, as a reload would, without touching neighbors
    let record = world.record(pos).unwrap();
    let restored = conduit_mesh::ConduitNode::from_record(pos, &record, world.config(), world.current_tick()).unwrap();
    if let Some(node) = world.conduit_mut(pos) {
        *node = restored;
    }

    let report = world.step();
    assert_eq!(report.nodes[0].1.scan, Some(ScanKind::Adopted));
    assert!(world.conduit(pos).unwrap().network().endpoint(Direction::Up).is_some());
}

#[test]
fn refused_push_drops_only_that_cache_entry() {
    init_tracing();
    let config = MeshConfig::default();
    let interval = config.scan_interval;
    // A node whose scan slot does not land on tick 1
    let pos = (0..)
        .map(|x| NodePosition::new(x * 4, 0, 0))
        .find(|p| NetworkManager::new(*p).scan_phase(interval) != 1)
        .unwrap();
    let east = pos.neighbor(Direction::East);
    let west = pos.neighbor(Direction::West);

    let mut world = MeshWorld::new(config).unwrap();
    world.place_conduit(pos).unwrap().buffer_mut().set_stored(200);
    // Advertises space but accepts nothing
    world
        .place_external(east, ExternalNode::sink(ManaBuffer::with_limits(1000, 0, 0)))
        .unwrap();
    world.place_external(west, ExternalNode::sink(ManaBuffer::new(1000))).unwrap();
    world.set_priority(pos, Direction::East, 10).unwrap();

    world.step();
    let report = world.step();
    let (_, node_report) = report.nodes.iter().find(|(p, _)| *p == pos).unwrap();

    let refused = node_report.outcomes.iter().find(|o| o.direction == Direction::East).unwrap();
    assert!(!refused.success);
    assert_eq!(refused.amount, 0);
    assert_eq!(node_report.moved(TransferKind::Push), 100);
    assert_ne!(node_report.scan, Some(ScanKind::Full));

    let node = world.conduit(pos).unwrap();
    assert_eq!(node.stats().get(Direction::East).failures, 1);
    assert!(node.network().target(Direction::East).is_none());
    assert!(node.network().endpoint(Direction::East).is_some());
    assert!(node.network().target(Direction::West).is_some());
    assert_eq!(stored_at(&world, west), 100);
    assert_eq!(stored_at(&world, east), 0);
}

#[test]
fn pool_does_not_return_what_a_member_just_pulled() {
    init_tracing();
    // L-shaped pool a - x - b with one machine touching both ends
    let a = NodePosition::new(0, 0, 0);
    let x = NodePosition::new(1, 0, 0);
    let b = NodePosition::new(1, 0, 1);
    let machine = NodePosition::new(0, 0, 1);

    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    for pos in [a, x, b] {
        world.place_conduit(pos).unwrap();
    }
    world
        .place_external(machine, ExternalNode::new(ManaBuffer::new(1000).filled(100)))
        .unwrap();

    let first = world.step();
    assert_eq!(world.networks().len(), 1);
    assert_eq!(first.moved(TransferKind::Pull), 100);
    assert_eq!(stored_at(&world, machine), 0);

    // b never pulled itself, but its pool did, one tick ago
    let second = world.step();
    assert_eq!(second.moved(TransferKind::Push), 0);
    assert_eq!(stored_at(&world, machine), 0);
    assert_eq!(world.mesh_stored(), 100);
}
