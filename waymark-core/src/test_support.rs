//! Test-only collaborators and fixtures shared by unit and behaviour tests.

use geo::Coord;

use crate::{
    FeatureLookup, LookupError, Member, MemoryLookup, OsmId, RelationRecord, Tags, WayRecord,
};

/// Feature store containing a small closed-loop network.
///
/// - nodes 100 `(1, 1)`, 101 `(3, 1)`, 102 `(3, 3)`, 103 `(1, 3)` as
///   `(lon, lat)`;
/// - way 200 `[100, 101]` tagged `highway=residential`;
/// - way 201 `[100, 101, 102, 103, 100]` tagged `building=yes`;
/// - relation 300 `[(way 201, outer)]` tagged `type=multipolygon`,
///   `landuse=grass`.
#[must_use]
pub fn sample_network() -> MemoryLookup {
    let lookup = MemoryLookup::new();
    lookup.insert_node(100, Coord { x: 1.0, y: 1.0 }, Tags::new());
    lookup.insert_node(101, Coord { x: 3.0, y: 1.0 }, Tags::new());
    lookup.insert_node(102, Coord { x: 3.0, y: 3.0 }, Tags::new());
    lookup.insert_node(103, Coord { x: 1.0, y: 3.0 }, Tags::new());
    lookup.insert_way(
        200,
        vec![100, 101],
        Tags::from_pairs([("highway", "residential")]),
    );
    lookup.insert_way(
        201,
        vec![100, 101, 102, 103, 100],
        Tags::from_pairs([("building", "yes")]),
    );
    lookup.insert_relation(
        300,
        vec![Member::way(201, "outer")],
        Tags::from_pairs([("type", "multipolygon"), ("landuse", "grass")]),
    );
    lookup
}

/// Feature store whose every query fails, for error propagation tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLookup;

impl UnavailableLookup {
    fn error() -> LookupError {
        LookupError::Unavailable {
            reason: String::from("store offline"),
        }
    }
}

impl FeatureLookup for UnavailableLookup {
    fn node_location(&self, _id: OsmId) -> Result<Option<Coord<f64>>, LookupError> {
        Err(Self::error())
    }

    fn way(&self, _id: OsmId) -> Result<Option<WayRecord>, LookupError> {
        Err(Self::error())
    }

    fn relation(&self, _id: OsmId) -> Result<Option<RelationRecord>, LookupError> {
        Err(Self::error())
    }

    fn ways_referencing(&self, _node_id: OsmId) -> Result<Vec<OsmId>, LookupError> {
        Err(Self::error())
    }

    fn relations_referencing(&self, _way_id: OsmId) -> Result<Vec<OsmId>, LookupError> {
        Err(Self::error())
    }
}
