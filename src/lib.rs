//! Facade crate for the Waymark output pipeline.
//!
//! This crate re-exports the core domain types and exposes the geometry
//! builder, output processors and SQLite tables behind feature flags.

#![forbid(unsafe_code)]

pub use waymark_core::{
    BuildInput, Cardinality, Classification, ClassifyContext, Columns, ExpireConfig, ExpireTiles,
    FeatureKind, FeatureLookup, GeometryBuilder, GeometryError, IdTracker, Interests, LookupError,
    Member, MemberGeometry, MemberKind, MemoryLookup, MemoryTable, NodeRecord, OsmId,
    RelationRecord, ResolvedMember, Row, RowWriter, Shape, TableKind, Tag, TagTransform, Tags,
    Tile, WayRecord, WriteError,
};

#[cfg(feature = "geometry-geo")]
pub use waymark_geometry::GeoBuilder;

#[cfg(feature = "output")]
pub use waymark_output::{
    BoundingBox, Change, ChangeAction, ChangeElement, ChangeSummary, ConfigError, DrainReport,
    ImportConfig, KeyFilterTransform, MultiOutput, Outcome, Output, OutputError, OutputSet,
    OutputStats, PendingJob, PendingQueue, PendingTracker, SkipReason, TableConfig,
};

#[cfg(feature = "store-sqlite")]
pub use waymark_store::{SqliteTable, StoreError};
