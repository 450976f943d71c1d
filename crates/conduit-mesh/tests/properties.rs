//! Mesh-wide invariants over random layouts.

use conduit_mesh::{
    ExternalNode, IoType, ManaBuffer, MeshConfig, MeshWorld, TransferKind, WorldTickReport,
};
use conduit_topology::{Direction, DirectionSet, NodePosition};
use proptest::prelude::*;

const SIDE: i32 = 4;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Empty,
    Conduit,
    Machine,
    Source,
    Sink,
}

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        1 => Just(Kind::Empty),
        3 => Just(Kind::Conduit),
        1 => Just(Kind::Machine),
        1 => Just(Kind::Source),
        1 => Just(Kind::Sink),
    ]
}

fn cell() -> impl Strategy<Value = (Kind, i64, u8)> {
    (kind(), 0i64..=1000, 0u8..4)
}

fn layout() -> impl Strategy<Value = Vec<(Kind, i64, u8)>> {
    proptest::collection::vec(cell(), (SIDE * SIDE) as usize)
}

fn build(cells: &[(Kind, i64, u8)], virtual_networks: bool) -> MeshWorld {
    let config = MeshConfig {
        virtual_networks,
        scan_interval: 5,
        ..MeshConfig::default()
    };
    let mut world = MeshWorld::new(config).unwrap();
    for (i, (kind, stored, io)) in cells.iter().enumerate() {
        let pos = NodePosition::new(i as i32 % SIDE, 0, i as i32 / SIDE);
        let buffer = ManaBuffer::new(1000).filled(*stored);
        match kind {
            Kind::Empty => {}
            Kind::Conduit => {
                let node = world.place_conduit(pos).unwrap();
                node.buffer_mut().set_stored(*stored);
                // Vary one port per conduit
                let dir = Direction::ALL[i % 6];
                node.ports_mut().set(dir, IoType::from_ordinal(*io).unwrap());
            }
            Kind::Machine => world.place_external(pos, ExternalNode::new(buffer)).unwrap(),
            Kind::Source => world.place_external(pos, ExternalNode::source(buffer)).unwrap(),
            Kind::Sink => world.place_external(pos, ExternalNode::sink(buffer)).unwrap(),
        }
    }
    world
}

fn check_tick(world: &MeshWorld, report: &WorldTickReport) -> Result<(), TestCaseError> {
    for (pos, node) in &report.nodes {
        let mut used = DirectionSet::EMPTY;
        let mut pushes = 0;
        for outcome in node.outcomes.iter().filter(|o| o.success) {
            match outcome.kind {
                TransferKind::Push => {
                    prop_assert!(used.insert(outcome.direction), "{} pushed {} twice", pos, outcome.direction);
                    pushes += 1;
                }
                TransferKind::Pull => {
                    let from = pos.neighbor(outcome.direction);
                    prop_assert!(world.conduit(from).is_none(), "{} pulled from conduit {}", pos, from);
                }
            }
            prop_assert!(outcome.amount > 0);
        }
        prop_assert!(pushes <= world.config().max_transfers_per_tick);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn resource_is_conserved(cells in layout(), pooled in any::<bool>()) {
        let mut world = build(&cells, pooled);
        let total = world.total_stored();
        for _ in 0..25 {
            let report = world.step();
            check_tick(&world, &report)?;
            prop_assert_eq!(world.total_stored(), total);
        }
    }

    #[test]
    fn identical_worlds_make_identical_moves(cells in layout()) {
        let mut a = build(&cells, true);
        let mut b = build(&cells, true);
        for _ in 0..15 {
            let ra = a.step();
            let rb = b.step();
            prop_assert_eq!(ra.nodes, rb.nodes);
        }
    }

    #[test]
    fn rebuilds_conserve_pooled_resource(cells in layout(), toggles in proptest::collection::vec((0usize..16, 0usize..6), 1..10)) {
        let mut world = build(&cells, true);
        let total = world.total_stored();
        world.step();
        for (index, dir) in toggles {
            let pos = NodePosition::new(index as i32 % SIDE, 0, index as i32 / SIDE);
            let _ = world.cycle_port(pos, Direction::ALL[dir]);
            world.step();
            prop_assert_eq!(world.total_stored(), total);
        }
    }
}

#[test]
fn scans_are_staggered_across_a_slab() {
    let mut world = MeshWorld::new(MeshConfig::default()).unwrap();
    for x in 0..10 {
        for z in 0..10 {
            let pos = NodePosition::new(x, 0, z);
            world.place_conduit(pos).unwrap();
            // Disable every port so the slab stays a hundred loose conduits
            for dir in Direction::ALL {
                world.configure_port(pos, dir, IoType::Disabled).unwrap();
            }
        }
    }
    // Settle: first ticks scan everything
    world.step();
    world.step();

    let interval = world.config().scan_interval;
    let mut per_tick = Vec::new();
    for _ in 0..interval {
        let report = world.step();
        per_tick.push(report.nodes.iter().filter(|(_, r)| r.scan.is_some()).count());
    }
    let busiest = per_tick.iter().copied().max().unwrap_or(0);
    assert_eq!(per_tick.iter().sum::<usize>(), 100);
    assert!(busiest < 30, "rescans bunched up: {per_tick:?}");
}
