//! Orchestration across every configured output.
//!
//! [`OutputSet`] fans each change out to all outputs and runs drain passes.
//! A drain pass extracts pending ids from every output into one
//! [`PendingQueue`] and reprocesses them either on the outputs themselves or,
//! with several workers, on per-thread clones that are merged back once all
//! threads have joined.

use std::fmt;
use std::sync::Arc;
use std::thread;

use geo::{Coord, Rect};
use log::{debug, info};
use waymark_core::{
    FeatureLookup, Member, NodeRecord, OsmId, RelationRecord, RowWriter, Tags, WayRecord,
};

use crate::config::{BoundingBox, ImportConfig, TableConfig};
use crate::{Outcome, Output, OutputError, PendingQueue};

/// Kind of change applied to a feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// The feature is new.
    Create,
    /// The feature replaces an earlier version.
    Modify,
    /// The feature was removed. Its payload is ignored.
    Delete,
}

/// Feature payload carried by a [`Change`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeElement {
    /// A node.
    Node(NodeRecord),
    /// A way.
    Way(WayRecord),
    /// A relation.
    Relation(RelationRecord),
}

/// One feature change delivered by the upstream pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// What happened to the feature.
    pub action: ChangeAction,
    /// Feature id.
    pub id: OsmId,
    /// Current state of the feature.
    pub element: ChangeElement,
}

impl Change {
    /// A node change at `lat`/`lon`.
    #[must_use]
    pub const fn node(action: ChangeAction, id: OsmId, lat: f64, lon: f64, tags: Tags) -> Self {
        Self {
            action,
            id,
            element: ChangeElement::Node(NodeRecord {
                location: Coord { x: lon, y: lat },
                tags,
            }),
        }
    }

    /// A way change.
    #[must_use]
    pub const fn way(action: ChangeAction, id: OsmId, nodes: Vec<OsmId>, tags: Tags) -> Self {
        Self {
            action,
            id,
            element: ChangeElement::Way(WayRecord { nodes, tags }),
        }
    }

    /// A relation change.
    #[must_use]
    pub const fn relation(
        action: ChangeAction,
        id: OsmId,
        members: Vec<Member>,
        tags: Tags,
    ) -> Self {
        Self {
            action,
            id,
            element: ChangeElement::Relation(RelationRecord { members, tags }),
        }
    }
}

/// Counts of changes applied through an [`OutputSet`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSummary {
    /// Node changes delivered to the outputs.
    pub nodes: u64,
    /// Way changes delivered to the outputs.
    pub ways: u64,
    /// Relation changes delivered to the outputs.
    pub relations: u64,
    /// Node changes dropped by the bounding-box filter.
    pub filtered_nodes: u64,
    /// Bounding box covering all delivered node coordinates.
    /// Coordinates are WGS84 with `x = longitude`, `y = latitude`.
    pub bounds: Option<Rect<f64>>,
}

impl ChangeSummary {
    fn include_bounds(&mut self, bounds: Rect<f64>) {
        match &mut self.bounds {
            Some(existing) => {
                let min = Coord {
                    x: existing.min().x.min(bounds.min().x),
                    y: existing.min().y.min(bounds.min().y),
                };
                let max = Coord {
                    x: existing.max().x.max(bounds.max().x),
                    y: existing.max().y.max(bounds.max().y),
                };
                *existing = Rect::new(min, max);
            }
            None => self.bounds = Some(bounds),
        }
    }

    fn record_node(&mut self, lat: f64, lon: f64) {
        self.nodes += 1;
        if lon.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lon)
            && (-90.0..=90.0).contains(&lat)
        {
            let coordinate = Coord { x: lon, y: lat };
            self.include_bounds(Rect::new(coordinate, coordinate));
        }
    }
}

/// Work performed by one drain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Way jobs processed.
    pub ways: usize,
    /// Relation jobs processed.
    pub relations: usize,
    /// Passes run across both kinds.
    pub passes: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Pass {
    Ways,
    Relations,
}

/// All outputs of one import, driven together.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use geo::Coord;
/// use waymark_core::{MemoryLookup, MemoryTable, Tags};
/// use waymark_output::{Change, ChangeAction, ImportConfig, OutputSet};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ImportConfig::from_json(
///     r#"{ "tables": [{ "name": "roads", "kind": "line", "columns": ["highway"] }] }"#,
/// )?;
/// let lookup = Arc::new(MemoryLookup::new());
/// lookup.insert_node(1, Coord { x: 0.0, y: 0.0 }, Tags::new());
/// lookup.insert_node(2, Coord { x: 1.0, y: 0.0 }, Tags::new());
/// lookup.insert_way(10, vec![1, 2], Tags::from_pairs([("highway", "path")]));
///
/// let roads = MemoryTable::new("roads");
/// let mut outputs = OutputSet::from_config(&config, lookup.clone(), |_| Box::new(roads.clone()));
/// outputs.start()?;
/// outputs.apply(&Change::way(
///     ChangeAction::Create,
///     10,
///     vec![1, 2],
///     Tags::from_pairs([("highway", "path")]),
/// ))?;
///
/// lookup.insert_node(2, Coord { x: 1.0, y: 1.0 }, Tags::new());
/// outputs.apply(&Change::node(ChangeAction::Modify, 2, 1.0, 1.0, Tags::new()))?;
/// assert_eq!(outputs.pending_count(), 1);
///
/// let report = outputs.drain_pending()?;
/// assert_eq!(report.ways, 1);
/// outputs.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct OutputSet {
    outputs: Vec<Box<dyn Output>>,
    lookup: Arc<dyn FeatureLookup>,
    workers: usize,
    bbox: Option<BoundingBox>,
    summary: ChangeSummary,
}

impl fmt::Debug for OutputSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSet")
            .field("outputs", &self.outputs)
            .field("workers", &self.workers)
            .field("bbox", &self.bbox)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl OutputSet {
    /// Build one output per configured table, asking `writer_for` for each
    /// table's destination.
    pub fn from_config<F>(
        config: &ImportConfig,
        lookup: Arc<dyn FeatureLookup>,
        mut writer_for: F,
    ) -> Self
    where
        F: FnMut(&TableConfig) -> Box<dyn RowWriter>,
    {
        let outputs = config
            .tables
            .iter()
            .map(|table| {
                Box::new(table.output(writer_for(table), Arc::clone(&lookup))) as Box<dyn Output>
            })
            .collect();
        Self {
            outputs,
            lookup,
            workers: config.workers,
            bbox: config.bbox,
            summary: ChangeSummary::default(),
        }
    }

    /// Drain with `workers` threads. Values below two drain sequentially.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Ignore node changes outside `bbox`.
    #[must_use]
    pub const fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// The managed outputs in index order.
    #[must_use]
    pub fn outputs(&self) -> &[Box<dyn Output>] {
        &self.outputs
    }

    /// Counts of changes applied so far.
    #[must_use]
    pub const fn summary(&self) -> &ChangeSummary {
        &self.summary
    }

    /// Total pending ids across all outputs.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.outputs.iter().map(|output| output.pending_count()).sum()
    }

    /// Start every output.
    ///
    /// # Errors
    /// Returns the first destination failure.
    pub fn start(&mut self) -> Result<(), OutputError> {
        self.outputs.iter_mut().try_for_each(|output| output.start())
    }

    /// Commit every output.
    ///
    /// # Errors
    /// Returns the first destination failure.
    pub fn commit(&mut self) -> Result<(), OutputError> {
        self.outputs.iter_mut().try_for_each(|output| output.commit())
    }

    /// Stop every output.
    ///
    /// # Errors
    /// Returns the first destination failure.
    pub fn stop(&mut self) -> Result<(), OutputError> {
        self.outputs.iter_mut().try_for_each(|output| output.stop())?;
        info!(
            "applied {} nodes, {} ways, {} relations",
            self.summary.nodes, self.summary.ways, self.summary.relations
        );
        Ok(())
    }

    fn fan_out<F>(&mut self, mut call: F) -> Result<Vec<Outcome>, OutputError>
    where
        F: FnMut(&mut dyn Output) -> Result<Outcome, OutputError>,
    {
        self.outputs
            .iter_mut()
            .map(|output| call(output.as_mut()))
            .collect()
    }

    fn node_wanted(&mut self, lat: f64, lon: f64) -> bool {
        if self.bbox.is_some_and(|bbox| !bbox.contains(lat, lon)) {
            self.summary.filtered_nodes += 1;
            return false;
        }
        self.summary.record_node(lat, lon);
        true
    }

    /// Add a node to every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn node_add(
        &mut self,
        id: OsmId,
        lat: f64,
        lon: f64,
        tags: &Tags,
    ) -> Result<Vec<Outcome>, OutputError> {
        if !self.node_wanted(lat, lon) {
            return Ok(Vec::new());
        }
        self.fan_out(|output| output.node_add(id, lat, lon, tags))
    }

    /// Modify a node in every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn node_modify(
        &mut self,
        id: OsmId,
        lat: f64,
        lon: f64,
        tags: &Tags,
    ) -> Result<Vec<Outcome>, OutputError> {
        if !self.node_wanted(lat, lon) {
            return Ok(Vec::new());
        }
        self.fan_out(|output| output.node_modify(id, lat, lon, tags))
    }

    /// Delete a node from every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn node_delete(&mut self, id: OsmId) -> Result<Vec<Outcome>, OutputError> {
        self.summary.nodes += 1;
        self.fan_out(|output| output.node_delete(id))
    }

    /// Add a way to every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn way_add(
        &mut self,
        id: OsmId,
        nodes: &[OsmId],
        tags: &Tags,
    ) -> Result<Vec<Outcome>, OutputError> {
        self.summary.ways += 1;
        self.fan_out(|output| output.way_add(id, nodes, tags))
    }

    /// Modify a way in every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn way_modify(
        &mut self,
        id: OsmId,
        nodes: &[OsmId],
        tags: &Tags,
    ) -> Result<Vec<Outcome>, OutputError> {
        self.summary.ways += 1;
        self.fan_out(|output| output.way_modify(id, nodes, tags))
    }

    /// Delete a way from every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn way_delete(&mut self, id: OsmId) -> Result<Vec<Outcome>, OutputError> {
        self.summary.ways += 1;
        self.fan_out(|output| output.way_delete(id))
    }

    /// Add a relation to every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn relation_add(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
    ) -> Result<Vec<Outcome>, OutputError> {
        self.summary.relations += 1;
        self.fan_out(|output| output.relation_add(id, members, tags))
    }

    /// Modify a relation in every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn relation_modify(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
    ) -> Result<Vec<Outcome>, OutputError> {
        self.summary.relations += 1;
        self.fan_out(|output| output.relation_modify(id, members, tags))
    }

    /// Delete a relation from every output.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn relation_delete(&mut self, id: OsmId) -> Result<Vec<Outcome>, OutputError> {
        self.summary.relations += 1;
        self.fan_out(|output| output.relation_delete(id))
    }

    /// Deliver one change to every output.
    ///
    /// Returns one outcome per output, or none when the bounding-box filter
    /// drops a node.
    ///
    /// # Errors
    /// Returns the first lookup or destination failure.
    pub fn apply(&mut self, change: &Change) -> Result<Vec<Outcome>, OutputError> {
        let id = change.id;
        match (&change.element, change.action) {
            (ChangeElement::Node(node), ChangeAction::Create) => {
                self.node_add(id, node.location.y, node.location.x, &node.tags)
            }
            (ChangeElement::Node(node), ChangeAction::Modify) => {
                self.node_modify(id, node.location.y, node.location.x, &node.tags)
            }
            (ChangeElement::Node(_), ChangeAction::Delete) => self.node_delete(id),
            (ChangeElement::Way(way), ChangeAction::Create) => {
                self.way_add(id, &way.nodes, &way.tags)
            }
            (ChangeElement::Way(way), ChangeAction::Modify) => {
                self.way_modify(id, &way.nodes, &way.tags)
            }
            (ChangeElement::Way(_), ChangeAction::Delete) => self.way_delete(id),
            (ChangeElement::Relation(relation), ChangeAction::Create) => {
                self.relation_add(id, &relation.members, &relation.tags)
            }
            (ChangeElement::Relation(relation), ChangeAction::Modify) => {
                self.relation_modify(id, &relation.members, &relation.tags)
            }
            (ChangeElement::Relation(_), ChangeAction::Delete) => self.relation_delete(id),
        }
    }

    /// Reprocess every pending way, then every pending relation.
    ///
    /// Way reprocessing can make relations pending, so ways always drain
    /// first. Each kind repeats passes until no output has pending ids of
    /// that kind.
    ///
    /// # Errors
    /// Returns the first lookup, destination or worker failure. Pending ids
    /// claimed before the failure are not restored.
    pub fn drain_pending(&mut self) -> Result<DrainReport, OutputError> {
        let mut report = DrainReport::default();
        for pass in [Pass::Ways, Pass::Relations] {
            loop {
                let queue = PendingQueue::new();
                let queued: usize = self
                    .outputs
                    .iter_mut()
                    .enumerate()
                    .map(|(index, output)| match pass {
                        Pass::Ways => output.enqueue_ways(&queue, index),
                        Pass::Relations => output.enqueue_relations(&queue, index),
                    })
                    .sum();
                if queued == 0 {
                    break;
                }
                let processed = if self.workers > 1 {
                    self.run_parallel(&queue, pass)?
                } else {
                    run_jobs(&mut self.outputs, &queue, self.lookup.as_ref(), pass)?
                };
                for output in &mut self.outputs {
                    output.complete_pass();
                }
                debug!("{pass:?} pass processed {processed} of {queued} queued ids");
                report.passes += 1;
                match pass {
                    Pass::Ways => report.ways += processed,
                    Pass::Relations => report.relations += processed,
                }
            }
        }
        Ok(report)
    }

    fn run_parallel(&mut self, queue: &PendingQueue, pass: Pass) -> Result<usize, OutputError> {
        // Clones open their own writer handles; make earlier rows durable first.
        self.commit()?;
        let crews: Vec<Vec<Box<dyn Output>>> = (0..self.workers)
            .map(|_| {
                self.outputs
                    .iter()
                    .map(|output| output.clone_output(Arc::clone(&self.lookup)))
                    .collect()
            })
            .collect();
        let lookup = self.lookup.as_ref();
        let results: Vec<Result<(Vec<Box<dyn Output>>, usize), OutputError>> =
            thread::scope(|scope| {
                let handles: Vec<_> = crews
                    .into_iter()
                    .map(|crew| scope.spawn(move || run_crew(crew, queue, lookup, pass)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|_| Err(OutputError::WorkerPanicked))
                    })
                    .collect()
            });

        let mut processed = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok((crew, count)) => {
                    processed += count;
                    for (output, clone) in self.outputs.iter_mut().zip(&crew) {
                        output.merge_pending(clone.as_ref());
                        output.merge_invalidation(clone.as_ref());
                        output.merge_stats(clone.as_ref());
                    }
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(processed), Err)
    }
}

/// Run one worker's share of the queue on its private clones.
fn run_crew(
    mut crew: Vec<Box<dyn Output>>,
    queue: &PendingQueue,
    lookup: &dyn FeatureLookup,
    pass: Pass,
) -> Result<(Vec<Box<dyn Output>>, usize), OutputError> {
    for clone in &mut crew {
        clone.start()?;
    }
    let processed = run_jobs(&mut crew, queue, lookup, pass)?;
    for clone in &mut crew {
        clone.stop()?;
    }
    Ok((crew, processed))
}

/// Claim jobs until the queue is empty.
fn run_jobs(
    outputs: &mut [Box<dyn Output>],
    queue: &PendingQueue,
    lookup: &dyn FeatureLookup,
    pass: Pass,
) -> Result<usize, OutputError> {
    let mut processed = 0;
    while let Some(job) = queue.pop() {
        let output = outputs
            .get_mut(job.output_id)
            .ok_or(OutputError::UnknownOutput {
                index: job.output_id,
            })?;
        match pass {
            Pass::Ways => {
                let exists = lookup.way(job.id)?.is_some();
                output.pending_way(job.id, exists)?;
            }
            Pass::Relations => {
                let exists = lookup.relation(job.id)?.is_some();
                output.pending_relation(job.id, exists)?;
            }
        }
        processed += 1;
    }
    Ok(processed)
}
