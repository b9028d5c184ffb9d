//! Tile invalidation tree.
//!
//! Records the slippy-map tiles whose rendered representation went stale
//! because a row covering them was written or deleted. Tiles accumulate
//! monotonically until the orchestrator merges or clears them.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use geo::{BoundingRect, Coord, CoordsIter, Geometry, Rect};

/// Latitude limit of the Web Mercator projection, in degrees.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Highest zoom for which tile indices fit in `u32`.
pub const MAX_EXPIRE_ZOOM: u8 = 30;

/// A tile in the XYZ scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tile {
    /// Zoom level.
    pub zoom: u8,
    /// Column, counted eastwards from the antimeridian.
    pub x: u32,
    /// Row, counted southwards from the northern mercator limit.
    pub y: u32,
}

/// Zoom range and extent policy for invalidation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExpireConfig {
    /// Lowest zoom level recorded.
    pub min_zoom: u8,
    /// Highest zoom level recorded. Clamped to [`MAX_EXPIRE_ZOOM`].
    pub max_zoom: u8,
    /// Largest bounding-box side, in degrees, expired as a full rectangle.
    /// Larger geometries only expire the tiles under their vertices.
    pub max_bbox: f64,
}

impl Default for ExpireConfig {
    fn default() -> Self {
        Self {
            min_zoom: 14,
            max_zoom: 14,
            max_bbox: 0.2,
        }
    }
}

/// Accumulated set of stale tiles.
///
/// # Examples
/// ```
/// use geo::{Coord, Geometry, Point};
/// use waymark_core::{ExpireConfig, ExpireTiles};
///
/// let mut expire = ExpireTiles::new(ExpireConfig { min_zoom: 0, max_zoom: 1, max_bbox: 1.0 });
/// expire.mark_geometry(&Geometry::Point(Point::from(Coord { x: 0.5, y: 0.5 })));
/// assert_eq!(expire.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExpireTiles {
    config: ExpireConfig,
    tiles: BTreeSet<Tile>,
}

impl Default for ExpireTiles {
    fn default() -> Self {
        Self::new(ExpireConfig::default())
    }
}

impl ExpireTiles {
    /// Create an empty tree for the configured zoom range.
    #[must_use]
    pub fn new(config: ExpireConfig) -> Self {
        let max_zoom = config.max_zoom.min(MAX_EXPIRE_ZOOM);
        Self {
            config: ExpireConfig {
                min_zoom: config.min_zoom.min(max_zoom),
                max_zoom,
                max_bbox: config.max_bbox,
            },
            tiles: BTreeSet::new(),
        }
    }

    /// The effective configuration after clamping.
    #[must_use]
    pub const fn config(&self) -> &ExpireConfig {
        &self.config
    }

    /// An empty tree sharing this tree's configuration.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(self.config)
    }

    /// Record the tiles covered by `geometry`.
    pub fn mark_geometry(&mut self, geometry: &Geometry<f64>) {
        let Some(rect) = geometry.bounding_rect() else {
            return;
        };
        if self.exceeds_max_bbox(&rect) {
            for coord in geometry.coords_iter() {
                self.mark_coord(coord);
            }
        } else {
            self.mark_rect(&rect);
        }
    }

    /// Record the tiles of a stored row's bounding box.
    ///
    /// Extents wider than `max_bbox` only mark the tiles under their
    /// corners, matching [`ExpireTiles::mark_geometry`] for large rows.
    pub fn mark_extent(&mut self, rect: &Rect<f64>) {
        if !self.exceeds_max_bbox(rect) {
            self.mark_rect(rect);
            return;
        }
        let min = rect.min();
        let max = rect.max();
        for coord in [
            min,
            Coord { x: min.x, y: max.y },
            max,
            Coord { x: max.x, y: min.y },
        ] {
            self.mark_coord(coord);
        }
    }

    /// Record every tile intersecting `rect`.
    pub fn mark_rect(&mut self, rect: &Rect<f64>) {
        let min = rect.min();
        let max = rect.max();
        if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
            return;
        }
        for zoom in self.config.min_zoom..=self.config.max_zoom {
            let (x_min, y_min) = tile_index(Coord { x: min.x, y: max.y }, zoom);
            let (x_max, y_max) = tile_index(Coord { x: max.x, y: min.y }, zoom);
            for x in x_min..=x_max {
                for y in y_min..=y_max {
                    self.tiles.insert(Tile { zoom, x, y });
                }
            }
        }
    }

    /// Record the tile under a single coordinate at each zoom.
    pub fn mark_coord(&mut self, coord: Coord<f64>) {
        if !(coord.x.is_finite() && coord.y.is_finite()) {
            return;
        }
        for zoom in self.config.min_zoom..=self.config.max_zoom {
            let (x, y) = tile_index(coord, zoom);
            self.tiles.insert(Tile { zoom, x, y });
        }
    }

    /// Union `other` into `self`. Commutative and idempotent.
    pub fn merge(&mut self, other: &Self) {
        self.tiles.extend(other.tiles.iter().copied());
    }

    /// Tiles recorded at `zoom`, in `(x, y)` order.
    pub fn tiles_at(&self, zoom: u8) -> impl Iterator<Item = Tile> + '_ {
        self.tiles.iter().copied().filter(move |tile| tile.zoom == zoom)
    }

    /// Every recorded tile ordered by zoom, then `x`, then `y`.
    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        self.tiles.iter().copied()
    }

    /// Report whether a tile is recorded.
    #[must_use]
    pub fn contains(&self, tile: Tile) -> bool {
        self.tiles.contains(&tile)
    }

    /// Number of recorded tiles across all zoom levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Report whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Drop all recorded tiles, keeping the configuration.
    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    #[expect(
        clippy::float_arithmetic,
        reason = "extent comparison works on degree spans"
    )]
    fn exceeds_max_bbox(&self, rect: &Rect<f64>) -> bool {
        let span = rect.max() - rect.min();
        span.x > self.config.max_bbox || span.y > self.config.max_bbox
    }
}

/// Project a WGS84 coordinate to its XYZ tile column and row at `zoom`.
#[expect(
    clippy::float_arithmetic,
    reason = "web mercator projection is inherently floating point"
)]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "indices are clamped into 0..2^zoom before the cast"
)]
fn tile_index(coord: Coord<f64>, zoom: u8) -> (u32, u32) {
    let tiles_per_axis = 2_f64.powi(i32::from(zoom));
    let lon = coord.x.clamp(-180.0, 180.0);
    let lat = coord.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (lon + 180.0) / 360.0 * tiles_per_axis;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * tiles_per_axis;
    let last = tiles_per_axis - 1.0;
    (
        x.floor().clamp(0.0, last) as u32,
        y.floor().clamp(0.0, last) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point, Polygon};
    use rstest::{fixture, rstest};

    #[fixture]
    fn zoom_one() -> ExpireTiles {
        ExpireTiles::new(ExpireConfig {
            min_zoom: 1,
            max_zoom: 1,
            max_bbox: 360.0,
        })
    }

    #[rstest]
    #[case(Coord { x: -90.0, y: 45.0 }, (0, 0))]
    #[case(Coord { x: 90.0, y: 45.0 }, (1, 0))]
    #[case(Coord { x: -90.0, y: -45.0 }, (0, 1))]
    #[case(Coord { x: 180.0, y: -90.0 }, (1, 1))]
    fn projects_quadrants_at_zoom_one(#[case] coord: Coord<f64>, #[case] expected: (u32, u32)) {
        assert_eq!(tile_index(coord, 1), expected);
    }

    #[rstest]
    fn known_tile_at_zoom_fourteen() {
        // Brandenburg Gate.
        let tile = tile_index(Coord { x: 13.377_7, y: 52.516_3 }, 14);
        assert_eq!(tile, (8800, 5373));
    }

    #[rstest]
    fn rect_spanning_origin_marks_all_quadrants(mut zoom_one: ExpireTiles) {
        let rect = Rect::new(Coord { x: -1.0, y: -1.0 }, Coord { x: 1.0, y: 1.0 });
        zoom_one.mark_rect(&rect);
        assert_eq!(zoom_one.len(), 4);
    }

    #[rstest]
    fn oversized_geometry_only_marks_vertices() {
        let mut expire = ExpireTiles::new(ExpireConfig {
            min_zoom: 2,
            max_zoom: 2,
            max_bbox: 1.0,
        });
        let line = LineString::from(vec![(-170.0, 60.0), (170.0, 60.0)]);
        expire.mark_geometry(&Geometry::LineString(line));
        assert_eq!(expire.len(), 2, "only the two endpoint tiles are expired");
    }

    #[rstest]
    #[case(1.0, 4)]
    #[case(400.0, 8)]
    fn extents_respect_max_bbox(#[case] max_bbox: f64, #[case] expected: usize) {
        let mut expire = ExpireTiles::new(ExpireConfig {
            min_zoom: 2,
            max_zoom: 2,
            max_bbox,
        });
        expire.mark_extent(&Rect::new(
            Coord { x: -170.0, y: -60.0 },
            Coord { x: 170.0, y: 60.0 },
        ));
        assert_eq!(expire.len(), expected);
    }

    #[rstest]
    fn polygon_marks_its_bounding_tiles(mut zoom_one: ExpireTiles) {
        let polygon = Polygon::new(
            LineString::from(vec![(10.0, 10.0), (20.0, 10.0), (20.0, 20.0), (10.0, 10.0)]),
            Vec::new(),
        );
        zoom_one.mark_geometry(&Geometry::Polygon(polygon));
        assert!(zoom_one.contains(Tile { zoom: 1, x: 1, y: 0 }));
        assert_eq!(zoom_one.len(), 1);
    }

    #[rstest]
    fn merge_is_idempotent(mut zoom_one: ExpireTiles) {
        zoom_one.mark_geometry(&Geometry::Point(Point::new(5.0, 5.0)));
        let snapshot = zoom_one.clone();
        zoom_one.merge(&snapshot);
        assert_eq!(zoom_one, snapshot);
    }

    #[rstest]
    fn zoom_range_is_clamped() {
        let expire = ExpireTiles::new(ExpireConfig {
            min_zoom: 40,
            max_zoom: 99,
            max_bbox: 1.0,
        });
        assert_eq!(expire.config().max_zoom, MAX_EXPIRE_ZOOM);
        assert_eq!(expire.config().min_zoom, MAX_EXPIRE_ZOOM);
    }

    #[rstest]
    fn tiles_at_filters_by_zoom() {
        let mut expire = ExpireTiles::new(ExpireConfig {
            min_zoom: 0,
            max_zoom: 2,
            max_bbox: 1.0,
        });
        expire.mark_coord(Coord { x: 0.5, y: 0.5 });
        assert_eq!(expire.tiles_at(0).count(), 1);
        assert_eq!(expire.tiles_at(2).count(), 1);
        assert_eq!(expire.len(), 3);
    }
}
