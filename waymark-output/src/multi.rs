//! The standard per-table output processor.

use std::fmt;
use std::sync::Arc;

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use log::{debug, info, warn};
use waymark_core::feature::is_closed_ring;
use waymark_core::{
    BuildInput, Cardinality, Classification, ClassifyContext, ExpireConfig, ExpireTiles,
    FeatureKind, FeatureLookup, GeometryBuilder, IdTracker, Interests, Member, MemberGeometry,
    MemberKind, OsmId, ResolvedMember, Row, RowWriter, TagTransform, Tags,
};

use crate::{
    Outcome, Output, OutputError, OutputStats, PendingQueue, PendingTracker, SkipReason,
};

/// Output processor writing one table through pluggable policies.
///
/// The geometry builder is shared with every clone; the tag transformer,
/// row writer, pending sets and invalidation tree belong to one instance.
/// Relation rows are keyed by the negated relation id so they never collide
/// with way rows in the same table.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use geo::Coord;
/// use waymark_core::{ExpireConfig, MemoryLookup, MemoryTable, Tags};
/// use waymark_geometry::GeoBuilder;
/// use waymark_output::{KeyFilterTransform, MultiOutput, Outcome, Output};
///
/// # fn main() -> Result<(), waymark_output::OutputError> {
/// let lookup = Arc::new(MemoryLookup::new());
/// lookup.insert_node(1, Coord { x: 0.0, y: 0.0 }, Tags::new());
/// lookup.insert_node(2, Coord { x: 1.0, y: 0.0 }, Tags::new());
///
/// let table = MemoryTable::new("roads");
/// let mut output = MultiOutput::new(
///     "roads",
///     Arc::new(GeoBuilder::line()),
///     Box::new(KeyFilterTransform::new(["highway"], Vec::<String>::new())),
///     Box::new(table.clone()),
///     lookup,
///     ExpireConfig::default(),
/// );
/// output.start()?;
/// let outcome = output.way_add(10, &[1, 2], &Tags::from_pairs([("highway", "path")]))?;
/// assert_eq!(outcome, Outcome::Written(1));
/// assert_eq!(table.ids(), vec![10]);
/// # Ok(())
/// # }
/// ```
pub struct MultiOutput {
    table: String,
    builder: Arc<dyn GeometryBuilder>,
    transform: Box<dyn TagTransform>,
    writer: Box<dyn RowWriter>,
    lookup: Arc<dyn FeatureLookup>,
    ways: PendingTracker,
    relations: PendingTracker,
    expire: ExpireTiles,
    stats: OutputStats,
}

impl fmt::Debug for MultiOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiOutput")
            .field("table", &self.table)
            .field("builder", &self.builder)
            .field("transform", &self.transform)
            .field("writer", &self.writer)
            .field("ways", &self.ways)
            .field("relations", &self.relations)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl MultiOutput {
    /// Assemble a processor for `table`.
    pub fn new(
        table: impl Into<String>,
        builder: Arc<dyn GeometryBuilder>,
        transform: Box<dyn TagTransform>,
        writer: Box<dyn RowWriter>,
        lookup: Arc<dyn FeatureLookup>,
        expire: ExpireConfig,
    ) -> Self {
        Self {
            table: table.into(),
            builder,
            transform,
            writer,
            lookup,
            ways: PendingTracker::new(),
            relations: PendingTracker::new(),
            expire: ExpireTiles::new(expire),
            stats: OutputStats::default(),
        }
    }

    fn wants(&self, kind: FeatureKind) -> bool {
        self.builder.interests().contains(kind)
    }

    fn classify(&mut self, tags: &Tags, context: ClassifyContext<'_>) -> Option<Classification> {
        let class = self
            .transform
            .classify(tags, context)
            .filter(|class| self.builder.accepts(class.shape));
        if class.is_none() {
            self.stats.rejected += 1;
        }
        class
    }

    fn mark_ways_using_node(&mut self, node_id: OsmId) -> Result<(), OutputError> {
        if self.wants(FeatureKind::Way) {
            for way_id in self.lookup.ways_referencing(node_id)? {
                self.ways.mark(way_id);
            }
        }
        Ok(())
    }

    fn mark_relations_using_way(&mut self, way_id: OsmId) -> Result<(), OutputError> {
        if self.wants(FeatureKind::Relation) {
            for relation_id in self.lookup.relations_referencing(way_id)? {
                self.relations.mark(relation_id);
            }
        }
        Ok(())
    }

    /// Remove every row stored under `key`, expiring the tiles they covered.
    fn delete_from_output(&mut self, key: OsmId) -> Result<usize, OutputError> {
        let extents = self.writer.delete(key)?;
        for rect in &extents {
            self.expire.mark_extent(rect);
        }
        self.stats.rows_deleted += extents.len() as u64;
        Ok(extents.len())
    }

    fn process_node(
        &mut self,
        id: OsmId,
        location: Coord<f64>,
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        let Some(class) = self.classify(tags, ClassifyContext::Node) else {
            return Ok(Outcome::Skipped(SkipReason::NotWanted));
        };
        self.build_and_write(FeatureKind::Node, id, id, BuildInput::Node(location), class)
    }

    fn process_way(
        &mut self,
        id: OsmId,
        nodes: &[OsmId],
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        let context = ClassifyContext::Way {
            closed: is_closed_ring(nodes),
        };
        let Some(class) = self.classify(tags, context) else {
            return Ok(Outcome::Skipped(SkipReason::NotWanted));
        };
        let coords = self.lookup.node_locations(nodes)?;
        self.write_way(id, &coords, class)
    }

    /// Rebuild a way from coordinates already fetched from the lookup.
    fn reprocess_way(
        &mut self,
        id: OsmId,
        nodes: &[OsmId],
        coords: &[Coord<f64>],
        tags: &Tags,
        exists: bool,
    ) -> Result<Outcome, OutputError> {
        if exists {
            self.delete_from_output(id)?;
            self.mark_relations_using_way(id)?;
        }
        let context = ClassifyContext::Way {
            closed: is_closed_ring(nodes),
        };
        let Some(class) = self.classify(tags, context) else {
            return Ok(Outcome::Skipped(SkipReason::NotWanted));
        };
        self.write_way(id, coords, class)
    }

    fn write_way(
        &mut self,
        id: OsmId,
        coords: &[Coord<f64>],
        class: Classification,
    ) -> Result<Outcome, OutputError> {
        if coords.is_empty() {
            warn!("{}: way {id} has no resolvable nodes", self.table);
            return Ok(Outcome::Skipped(SkipReason::MissingNodes));
        }
        let input = BuildInput::Way {
            coords,
            shape: class.shape,
        };
        self.build_and_write(FeatureKind::Way, id, id, input, class)
    }

    fn process_relation(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
        exists: bool,
        pending: bool,
    ) -> Result<Outcome, OutputError> {
        if pending {
            self.stats.pending_relations += 1;
            debug!("{}: reprocessing pending relation {id}", self.table);
        }
        if exists {
            self.delete_from_output(-id)?;
        }

        let (resolved, geometries) = self.resolve_members(id, members)?;
        let context = ClassifyContext::Relation { members: &resolved };
        let Some(class) = self.classify(tags, context) else {
            return Ok(Outcome::Skipped(SkipReason::NotWanted));
        };
        let input = BuildInput::Relation {
            members: &geometries,
            shape: class.shape,
        };
        self.build_and_write(FeatureKind::Relation, id, -id, input, class)
    }

    /// Fetch the current tags and coordinates of a relation's way members.
    ///
    /// Members the store no longer holds are dropped.
    fn resolve_members(
        &mut self,
        id: OsmId,
        members: &[Member],
    ) -> Result<(Vec<ResolvedMember>, Vec<MemberGeometry>), OutputError> {
        let mut resolved = Vec::new();
        let mut geometries = Vec::new();
        let mut lost = 0_usize;
        for member in members.iter().filter(|m| m.kind == MemberKind::Way) {
            let Some(way) = self.lookup.way(member.id)? else {
                lost += 1;
                continue;
            };
            geometries.push(MemberGeometry {
                id: member.id,
                role: member.role.clone(),
                coords: self.lookup.node_locations(&way.nodes)?,
            });
            resolved.push(ResolvedMember {
                member: member.clone(),
                tags: way.tags,
            });
        }
        if lost > 0 {
            warn!(
                "{}: relation {id} lost {lost} of {} way members",
                self.table,
                lost + resolved.len()
            );
            self.stats.missing_members += lost as u64;
        }
        Ok((resolved, geometries))
    }

    fn build_and_write(
        &mut self,
        kind: FeatureKind,
        id: OsmId,
        key: OsmId,
        input: BuildInput<'_>,
        class: Classification,
    ) -> Result<Outcome, OutputError> {
        let parts = match self.builder.build(input) {
            Ok(parts) if !parts.is_empty() => parts,
            Ok(_) => {
                warn!("{}: {kind} {id} produced no geometry", self.table);
                self.stats.degenerate += 1;
                return Ok(Outcome::Skipped(SkipReason::Degenerate));
            }
            Err(err) => {
                warn!("{}: skipping {kind} {id}: {err}", self.table);
                self.stats.degenerate += 1;
                return Ok(Outcome::Skipped(SkipReason::Degenerate));
            }
        };
        let geometries = match class.cardinality {
            Cardinality::Single => vec![combine(parts)],
            Cardinality::PerComponent => parts,
        };
        for geometry in &geometries {
            let row = Row {
                id: key,
                columns: class.columns.clone(),
                geometry: geometry.clone(),
            };
            self.writer.write(&row)?;
            self.expire.mark_geometry(geometry);
        }
        self.stats.rows_written += geometries.len() as u64;
        Ok(Outcome::Written(geometries.len()))
    }
}

/// Merge geometry parts into one, promoting to the matching multi type.
fn combine(mut parts: Vec<Geometry<f64>>) -> Geometry<f64> {
    if parts.len() == 1
        && let Some(single) = parts.pop()
    {
        return single;
    }
    if parts.iter().all(|part| matches!(part, Geometry::Polygon(_))) {
        let polygons: Vec<Polygon<f64>> = parts
            .into_iter()
            .filter_map(|part| Polygon::try_from(part).ok())
            .collect();
        return Geometry::MultiPolygon(MultiPolygon::new(polygons));
    }
    if parts.iter().all(|part| matches!(part, Geometry::LineString(_))) {
        let lines: Vec<LineString<f64>> = parts
            .into_iter()
            .filter_map(|part| LineString::try_from(part).ok())
            .collect();
        return Geometry::MultiLineString(MultiLineString::new(lines));
    }
    if parts.iter().all(|part| matches!(part, Geometry::Point(_))) {
        let points: Vec<Point<f64>> = parts
            .into_iter()
            .filter_map(|part| Point::try_from(part).ok())
            .collect();
        return Geometry::MultiPoint(MultiPoint::new(points));
    }
    Geometry::GeometryCollection(GeometryCollection::new_from(parts))
}

impl Output for MultiOutput {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn interests(&self) -> Interests {
        self.builder.interests()
    }

    fn start(&mut self) -> Result<(), OutputError> {
        info!("{}: starting output", self.table);
        self.writer.start()?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), OutputError> {
        self.writer.stop()?;
        info!(
            "{}: stopped after {} rows written, {} deleted",
            self.table, self.stats.rows_written, self.stats.rows_deleted
        );
        Ok(())
    }

    fn commit(&mut self) -> Result<(), OutputError> {
        self.writer.commit()?;
        debug!("{}: committed", self.table);
        Ok(())
    }

    fn node_add(
        &mut self,
        id: OsmId,
        lat: f64,
        lon: f64,
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        if !self.wants(FeatureKind::Node) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.process_node(id, Coord { x: lon, y: lat }, tags)
    }

    fn way_add(
        &mut self,
        id: OsmId,
        nodes: &[OsmId],
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        if !self.wants(FeatureKind::Way) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.process_way(id, nodes, tags)
    }

    fn relation_add(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        if !self.wants(FeatureKind::Relation) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.process_relation(id, members, tags, false, false)
    }

    fn node_modify(
        &mut self,
        id: OsmId,
        lat: f64,
        lon: f64,
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        self.mark_ways_using_node(id)?;
        if !self.wants(FeatureKind::Node) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.delete_from_output(id)?;
        self.process_node(id, Coord { x: lon, y: lat }, tags)
    }

    fn way_modify(
        &mut self,
        id: OsmId,
        nodes: &[OsmId],
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        self.mark_relations_using_way(id)?;
        if !self.wants(FeatureKind::Way) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.delete_from_output(id)?;
        self.process_way(id, nodes, tags)
    }

    fn relation_modify(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
    ) -> Result<Outcome, OutputError> {
        if !self.wants(FeatureKind::Relation) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.process_relation(id, members, tags, true, false)
    }

    fn node_delete(&mut self, id: OsmId) -> Result<Outcome, OutputError> {
        self.mark_ways_using_node(id)?;
        if !self.wants(FeatureKind::Node) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        Ok(Outcome::Deleted(self.delete_from_output(id)?))
    }

    fn way_delete(&mut self, id: OsmId) -> Result<Outcome, OutputError> {
        self.mark_relations_using_way(id)?;
        if !self.wants(FeatureKind::Way) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        Ok(Outcome::Deleted(self.delete_from_output(id)?))
    }

    fn relation_delete(&mut self, id: OsmId) -> Result<Outcome, OutputError> {
        if !self.wants(FeatureKind::Relation) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        Ok(Outcome::Deleted(self.delete_from_output(-id)?))
    }

    fn pending_way(&mut self, id: OsmId, exists: bool) -> Result<Outcome, OutputError> {
        self.stats.pending_ways += 1;
        let current = if exists { self.lookup.way(id)? } else { None };
        let Some(way) = current else {
            return self.way_delete(id);
        };
        if !self.wants(FeatureKind::Way) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        let coords = self.lookup.node_locations(&way.nodes)?;
        self.reprocess_way(id, &way.nodes, &coords, &way.tags, true)
    }

    fn pending_relation(&mut self, id: OsmId, exists: bool) -> Result<Outcome, OutputError> {
        let current = if exists { self.lookup.relation(id)? } else { None };
        let Some(relation) = current else {
            return self.relation_delete(id);
        };
        if !self.wants(FeatureKind::Relation) {
            return Ok(Outcome::Skipped(SkipReason::NotOfInterest));
        }
        self.process_relation(id, &relation.members, &relation.tags, true, true)
    }

    fn enqueue_ways(&mut self, queue: &PendingQueue, output_id: usize) -> usize {
        self.ways.enqueue(queue, output_id)
    }

    fn enqueue_relations(&mut self, queue: &PendingQueue, output_id: usize) -> usize {
        self.relations.enqueue(queue, output_id)
    }

    fn complete_pass(&mut self) {
        self.ways.complete_pass();
        self.relations.complete_pass();
    }

    fn pending_count(&self) -> usize {
        self.ways.len() + self.relations.len()
    }

    fn pending_ways(&self) -> &IdTracker {
        self.ways.pending()
    }

    fn pending_relations(&self) -> &IdTracker {
        self.relations.pending()
    }

    fn expire_tree(&self) -> &ExpireTiles {
        &self.expire
    }

    fn stats(&self) -> &OutputStats {
        &self.stats
    }

    fn clone_output(&self, lookup: Arc<dyn FeatureLookup>) -> Box<dyn Output> {
        Box::new(Self {
            table: self.table.clone(),
            builder: Arc::clone(&self.builder),
            transform: self.transform.clone_box(),
            writer: self.writer.clone_writer(),
            lookup,
            ways: PendingTracker::new(),
            relations: PendingTracker::new(),
            expire: self.expire.empty_like(),
            stats: OutputStats::default(),
        })
    }

    fn merge_pending(&mut self, other: &dyn Output) {
        self.ways.merge_from(other.pending_ways());
        self.relations.merge_from(other.pending_relations());
    }

    fn merge_invalidation(&mut self, other: &dyn Output) {
        self.expire.merge(other.expire_tree());
    }

    fn merge_stats(&mut self, other: &dyn Output) {
        self.stats.absorb(other.stats());
    }
}
