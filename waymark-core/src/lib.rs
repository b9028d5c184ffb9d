//! Core domain types for the Waymark output pipeline.
//!
//! Responsibilities:
//! - Model OSM features (nodes, ways, relations) as id-indexed records.
//! - Define the collaborator traits an output processor consumes: feature
//!   lookup, geometry building, tag transformation and row writing.
//! - Provide the dependency tracker and the tile invalidation tree owned by
//!   each output processor.
//!
//! Boundaries:
//! - No processing policy lives here; `waymark-output` orchestrates.
//! - Features never embed back-pointers. Ways reference nodes and relations
//!   reference members only through [`OsmId`] values.
//!
//! Invariants:
//! - Coordinates are WGS84 with `x = longitude`, `y = latitude`.
//! - No global mutable state.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod expire;
pub mod feature;
pub mod geometry;
pub mod lookup;
pub mod tracker;
pub mod transform;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use expire::{ExpireConfig, ExpireTiles, Tile};
pub use feature::{
    FeatureKind, Member, MemberKind, NodeRecord, OsmId, RelationRecord, Tag, Tags, WayRecord,
};
pub use geometry::{
    BuildInput, GeometryBuilder, GeometryError, Interests, MemberGeometry, TableKind,
};
pub use lookup::{FeatureLookup, LookupError, MemoryLookup};
pub use tracker::IdTracker;
pub use transform::{
    Cardinality, Classification, ClassifyContext, Columns, ResolvedMember, Shape, TagTransform,
};
pub use writer::{MemoryTable, Row, RowWriter, WriteError};
