//! Geometry construction interface.
//!
//! A [`GeometryBuilder`] is stateless policy: it only exposes `&self`
//! methods and is shared between an output processor and all of its clones
//! through an `Arc`.

use std::fmt;

use geo::{Coord, Geometry};
use thiserror::Error;

use crate::{FeatureKind, OsmId, Shape};

/// Feature kinds a builder produces geometries for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Interests {
    /// Nodes are processed.
    pub nodes: bool,
    /// Ways are processed.
    pub ways: bool,
    /// Relations are processed.
    pub relations: bool,
}

impl Interests {
    /// Only nodes.
    pub const NODES: Self = Self {
        nodes: true,
        ways: false,
        relations: false,
    };

    /// Ways and relations.
    pub const WAYS_AND_RELATIONS: Self = Self {
        nodes: false,
        ways: true,
        relations: true,
    };

    /// Report whether `kind` is of interest.
    #[must_use]
    pub const fn contains(self, kind: FeatureKind) -> bool {
        match kind {
            FeatureKind::Node => self.nodes,
            FeatureKind::Way => self.ways,
            FeatureKind::Relation => self.relations,
        }
    }
}

/// Geometry family a destination table stores.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TableKind {
    /// Point rows built from nodes.
    Point,
    /// Line rows built from ways and route-like relations.
    #[default]
    Line,
    /// Polygon rows built from closed ways and multipolygon relations.
    Polygon,
}

/// Coordinates of one way member of a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberGeometry {
    /// Way id.
    pub id: OsmId,
    /// Member role, e.g. `outer` or `inner`.
    pub role: String,
    /// Resolved coordinates in node order.
    pub coords: Vec<Coord<f64>>,
}

/// Input handed to [`GeometryBuilder::build`].
#[derive(Debug, Clone, Copy)]
pub enum BuildInput<'a> {
    /// A node location.
    Node(Coord<f64>),
    /// A way's coordinates in node order.
    Way {
        /// Resolved coordinates.
        coords: &'a [Coord<f64>],
        /// Shape requested by the tag transformer.
        shape: Shape,
    },
    /// A relation's way members in relation order.
    Relation {
        /// Resolved way members.
        members: &'a [MemberGeometry],
        /// Shape requested by the tag transformer.
        shape: Shape,
    },
}

/// Reasons a feature's geometry cannot be built.
///
/// These are per-feature failures: callers log and skip the feature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Too few distinct coordinates for the requested shape.
    #[error("degenerate geometry: {distinct} distinct points, {required} required")]
    Degenerate {
        /// Distinct coordinates available.
        distinct: usize,
        /// Minimum required for the shape.
        required: usize,
    },
    /// A polygon ring does not end where it starts.
    #[error("polygon ring is not closed")]
    Unclosed,
    /// A polygon ring crosses itself.
    #[error("polygon ring intersects itself")]
    SelfIntersecting,
    /// A polygon ring encloses no area.
    #[error("polygon ring encloses no area")]
    ZeroArea,
    /// Ring assembly produced no usable outer ring.
    #[error("no closed outer ring could be assembled")]
    NoOuterRing,
    /// The builder does not produce this shape for this feature kind.
    #[error("{shape:?} geometry is not supported for {kind} features")]
    Unsupported {
        /// Requested shape.
        shape: Shape,
        /// Feature kind being built.
        kind: FeatureKind,
    },
}

/// Geometry construction policy, safe to share across threads.
pub trait GeometryBuilder: Send + Sync + fmt::Debug {
    /// Feature kinds this builder handles.
    fn interests(&self) -> Interests;

    /// Whether this builder produces geometries of `shape`.
    fn accepts(&self, shape: Shape) -> bool;

    /// Build the geometry parts for `input`.
    ///
    /// Nodes and ways yield one part. Relations may yield several; the
    /// caller decides whether they become one row or many.
    fn build(&self, input: BuildInput<'_>) -> Result<Vec<Geometry<f64>>, GeometryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Interests::NODES, FeatureKind::Node, true)]
    #[case(Interests::NODES, FeatureKind::Way, false)]
    #[case(Interests::WAYS_AND_RELATIONS, FeatureKind::Relation, true)]
    #[case(Interests::default(), FeatureKind::Way, false)]
    fn interests_contain_kinds(
        #[case] interests: Interests,
        #[case] kind: FeatureKind,
        #[case] expected: bool,
    ) {
        assert_eq!(interests.contains(kind), expected);
    }
}
