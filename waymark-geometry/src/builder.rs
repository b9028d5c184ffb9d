//! `geo`-backed geometry builder.

use geo::{Contains, Coord, Geometry, LineString, Point, Polygon};
use log::warn;
use waymark_core::{
    BuildInput, FeatureKind, GeometryBuilder, GeometryError, Interests, MemberGeometry, Shape,
    TableKind,
};

use crate::rings::{dedup_coords, join_paths, validated_ring};

const INNER_ROLE: &str = "inner";

/// Builds geometries for one destination table kind.
///
/// # Examples
/// ```
/// use geo::{Coord, Geometry};
/// use waymark_core::{BuildInput, GeometryBuilder, Shape};
/// use waymark_geometry::GeoBuilder;
///
/// let builder = GeoBuilder::line();
/// let coords = [Coord { x: 1.0, y: 1.0 }, Coord { x: 2.0, y: 1.0 }];
/// let parts = builder
///     .build(BuildInput::Way { coords: &coords, shape: Shape::Line })
///     .expect("two distinct points form a line");
/// assert!(matches!(parts.as_slice(), [Geometry::LineString(_)]));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeoBuilder {
    kind: TableKind,
}

impl GeoBuilder {
    /// Create a builder for `kind` tables.
    #[must_use]
    pub const fn new(kind: TableKind) -> Self {
        Self { kind }
    }

    /// Builder for point tables.
    #[must_use]
    pub const fn point() -> Self {
        Self::new(TableKind::Point)
    }

    /// Builder for line tables.
    #[must_use]
    pub const fn line() -> Self {
        Self::new(TableKind::Line)
    }

    /// Builder for polygon tables.
    #[must_use]
    pub const fn polygon() -> Self {
        Self::new(TableKind::Polygon)
    }

    /// Table kind this builder serves.
    #[must_use]
    pub const fn kind(&self) -> TableKind {
        self.kind
    }
}

impl GeometryBuilder for GeoBuilder {
    fn interests(&self) -> Interests {
        match self.kind {
            TableKind::Point => Interests::NODES,
            TableKind::Line | TableKind::Polygon => Interests::WAYS_AND_RELATIONS,
        }
    }

    fn accepts(&self, shape: Shape) -> bool {
        matches!(
            (self.kind, shape),
            (TableKind::Point, Shape::Point)
                | (TableKind::Line, Shape::Line)
                | (TableKind::Polygon, Shape::Polygon)
        )
    }

    fn build(&self, input: BuildInput<'_>) -> Result<Vec<Geometry<f64>>, GeometryError> {
        match input {
            BuildInput::Node(coord) => Ok(vec![Geometry::Point(Point::from(coord))]),
            BuildInput::Way {
                coords,
                shape: Shape::Line,
            } => way_line(coords).map(|line| vec![Geometry::LineString(line)]),
            BuildInput::Way {
                coords,
                shape: Shape::Polygon,
            } => validated_ring(coords)
                .map(|ring| vec![Geometry::Polygon(Polygon::new(ring, Vec::new()))]),
            BuildInput::Way { shape, .. } => Err(GeometryError::Unsupported {
                shape,
                kind: FeatureKind::Way,
            }),
            BuildInput::Relation {
                members,
                shape: Shape::Line,
            } => relation_lines(members),
            BuildInput::Relation {
                members,
                shape: Shape::Polygon,
            } => relation_polygons(members),
            BuildInput::Relation { shape, .. } => Err(GeometryError::Unsupported {
                shape,
                kind: FeatureKind::Relation,
            }),
        }
    }
}

fn way_line(coords: &[Coord<f64>]) -> Result<LineString<f64>, GeometryError> {
    let unique = dedup_coords(coords);
    if unique.len() < 2 {
        return Err(GeometryError::Degenerate {
            distinct: unique.len(),
            required: 2,
        });
    }
    Ok(LineString::from(unique))
}

fn relation_lines(members: &[MemberGeometry]) -> Result<Vec<Geometry<f64>>, GeometryError> {
    let joined = join_paths(members.iter().map(|member| member.coords.clone()));
    let lines: Vec<Geometry<f64>> = joined
        .closed
        .into_iter()
        .chain(joined.open)
        .map(|chain| Geometry::LineString(LineString::from(chain)))
        .collect();
    if lines.is_empty() {
        return Err(GeometryError::Degenerate {
            distinct: 0,
            required: 2,
        });
    }
    Ok(lines)
}

fn relation_polygons(members: &[MemberGeometry]) -> Result<Vec<Geometry<f64>>, GeometryError> {
    let (inner, outer): (Vec<&MemberGeometry>, Vec<&MemberGeometry>) = members
        .iter()
        .partition(|member| member.role == INNER_ROLE);

    let mut polygons: Vec<Polygon<f64>> = closed_rings(&outer, "outer")
        .into_iter()
        .map(|ring| Polygon::new(ring, Vec::new()))
        .collect();
    if polygons.is_empty() {
        return Err(GeometryError::NoOuterRing);
    }

    for ring in closed_rings(&inner, INNER_ROLE) {
        let hole = Polygon::new(ring.clone(), Vec::new());
        match polygons.iter_mut().find(|outer| outer.contains(&hole)) {
            Some(outer) => outer.interiors_push(ring),
            None => warn!("dropping inner ring outside every outer ring"),
        }
    }
    Ok(polygons.into_iter().map(Geometry::Polygon).collect())
}

/// Join member runs and keep the rings that validate.
fn closed_rings(members: &[&MemberGeometry], role: &str) -> Vec<LineString<f64>> {
    let joined = join_paths(members.iter().map(|member| member.coords.clone()));
    if !joined.open.is_empty() {
        warn!(
            "dropping {} unclosed {role} path(s) during ring assembly",
            joined.open.len()
        );
    }
    joined
        .closed
        .iter()
        .filter_map(|chain| match validated_ring(chain) {
            Ok(ring) => Some(ring),
            Err(err) => {
                warn!("dropping invalid {role} ring: {err}");
                None
            }
        })
        .collect()
}
