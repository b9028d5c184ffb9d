//! Draining on worker clones matches draining on the outputs themselves.

use std::sync::Arc;

use geo::Coord;
use rstest::rstest;
use waymark_core::{FeatureLookup, Member, MemoryLookup, MemoryTable, OsmId, Row, Tags};
use waymark_output::{DrainReport, ImportConfig, OutputSet, OutputStats};

const CHAIN: i32 = 40;
const SQUARES: i32 = 6;

fn coord(x: i32, y: i32) -> Coord<f64> {
    Coord {
        x: f64::from(x),
        y: f64::from(y),
    }
}

/// A chain of road ways joined into one route relation, plus a row of
/// square landuse areas.
fn network() -> Arc<MemoryLookup> {
    let lookup = Arc::new(MemoryLookup::new());
    let highway = Tags::from_pairs([("highway", "residential")]);
    let mut route = Vec::new();
    for i in 0..=CHAIN {
        lookup.insert_node(OsmId::from(i), coord(i, 0), Tags::new());
    }
    for i in 0..CHAIN {
        let id = OsmId::from(i);
        lookup.insert_way(1000 + id, vec![id, id + 1], highway.clone());
        route.push(Member::way(1000 + id, ""));
    }
    lookup.insert_relation(
        5000,
        route,
        Tags::from_pairs([("type", "route"), ("highway", "bus")]),
    );

    for k in 0..SQUARES {
        let x = k * 2;
        let base = 10_000 + OsmId::from(k) * 4;
        lookup.insert_node(base, coord(x, 10), Tags::new());
        lookup.insert_node(base + 1, coord(x + 1, 10), Tags::new());
        lookup.insert_node(base + 2, coord(x + 1, 11), Tags::new());
        lookup.insert_node(base + 3, coord(x, 11), Tags::new());
        lookup.insert_way(
            2000 + OsmId::from(k),
            vec![base, base + 1, base + 2, base + 3, base],
            Tags::from_pairs([("landuse", "grass")]),
        );
    }
    lookup
}

struct Run {
    report: DrainReport,
    roads: Vec<(OsmId, Vec<Row>)>,
    areas: Vec<(OsmId, Vec<Row>)>,
    stats: Vec<OutputStats>,
    expired: Vec<usize>,
}

fn snapshot(table: &MemoryTable) -> Vec<(OsmId, Vec<Row>)> {
    table.ids().into_iter().map(|id| (id, table.rows(id))).collect()
}

fn import_and_drain(workers: usize) -> Run {
    let config = ImportConfig::from_json(
        r#"{
            "tables": [
                { "name": "roads", "kind": "line", "columns": ["highway"] },
                { "name": "areas", "kind": "polygon", "columns": ["landuse"],
                  "polygon_keys": ["landuse"] }
            ]
        }"#,
    )
    .expect("valid config");
    let lookup = network();
    let roads = MemoryTable::new("roads");
    let areas = MemoryTable::new("areas");
    let mut outputs = OutputSet::from_config(
        &config,
        Arc::clone(&lookup) as Arc<dyn FeatureLookup>,
        |table| match table.name.as_str() {
            "roads" => Box::new(roads.clone()),
            _ => Box::new(areas.clone()),
        },
    )
    .with_workers(workers);
    outputs.start().expect("start");

    for id in (1000..1000 + OsmId::from(CHAIN)).chain(2000..2000 + OsmId::from(SQUARES)) {
        let way = lookup
            .way(id)
            .expect("memory lookup never fails")
            .expect("way is in the store");
        outputs.way_add(id, &way.nodes, &way.tags).expect("way add");
    }
    let route = lookup
        .relation(5000)
        .expect("memory lookup never fails")
        .expect("route is in the store");
    outputs
        .relation_add(5000, &route.members, &route.tags)
        .expect("relation add");

    // Lift every other chain node and the first corner of every square.
    for i in (0..=CHAIN).step_by(2) {
        lookup.insert_node(OsmId::from(i), coord(i, 1), Tags::new());
        outputs
            .node_modify(OsmId::from(i), 1.0, f64::from(i), &Tags::new())
            .expect("node modify");
    }
    for k in 0..SQUARES {
        let corner = 10_000 + OsmId::from(k) * 4;
        lookup.insert_node(corner, coord(k * 2, 9), Tags::new());
        outputs
            .node_modify(corner, 9.0, f64::from(k * 2), &Tags::new())
            .expect("node modify");
    }

    let report = outputs.drain_pending().expect("drain");
    assert_eq!(outputs.pending_count(), 0);
    let stats = outputs
        .outputs()
        .iter()
        .map(|output| *output.stats())
        .collect();
    let expired = outputs
        .outputs()
        .iter()
        .map(|output| output.expire_tree().len())
        .collect();
    outputs.stop().expect("stop");
    Run {
        report,
        roads: snapshot(&roads),
        areas: snapshot(&areas),
        stats,
        expired,
    }
}

#[rstest]
fn sequential_drain_rebuilds_every_dependent() {
    let run = import_and_drain(1);
    // Both tables track ways and relations: 40 chain ways and 6 squares each.
    assert_eq!(
        run.report,
        DrainReport {
            ways: 92,
            relations: 2,
            passes: 2,
        }
    );
    assert_eq!(run.roads.len(), 41, "chain ways and the route");
    assert_eq!(run.areas.len(), 6);
}

#[rstest]
#[case(2)]
#[case(3)]
fn parallel_drain_matches_sequential(#[case] workers: usize) {
    let sequential = import_and_drain(1);
    let parallel = import_and_drain(workers);
    assert_eq!(parallel.report, sequential.report);
    assert_eq!(parallel.roads, sequential.roads);
    assert_eq!(parallel.areas, sequential.areas);
    assert_eq!(parallel.stats, sequential.stats);
    assert_eq!(parallel.expired, sequential.expired);
}
