//! The output processor capability.

use std::fmt;
use std::sync::Arc;

use waymark_core::{ExpireTiles, FeatureLookup, IdTracker, Interests, Member, OsmId, Tags};

use crate::{OutputError, Outcome, OutputStats, PendingQueue};

/// A per-table output processor.
///
/// Callers deliver changes in kind order (nodes, then ways, then
/// relations). Entry points write rows immediately and record downstream
/// features that went stale in the processor's pending sets. A drain pass
/// later extracts those ids with [`Output::enqueue_ways`] and
/// [`Output::enqueue_relations`] and reprocesses them through
/// [`Output::pending_way`] and [`Output::pending_relation`].
///
/// Every entry point returns an [`Outcome`] for per-feature results and an
/// [`OutputError`] only when the feature store or destination fails.
pub trait Output: Send + fmt::Debug {
    /// Destination table name.
    fn table_name(&self) -> &str;

    /// Feature kinds this processor writes rows for.
    fn interests(&self) -> Interests;

    /// Open the destination for bulk writing.
    fn start(&mut self) -> Result<(), OutputError>;

    /// Commit and close the destination.
    fn stop(&mut self) -> Result<(), OutputError>;

    /// Make written rows durable.
    fn commit(&mut self) -> Result<(), OutputError>;

    /// Process a new node at `lat`/`lon`.
    fn node_add(&mut self, id: OsmId, lat: f64, lon: f64, tags: &Tags)
    -> Result<Outcome, OutputError>;

    /// Process a new way.
    fn way_add(&mut self, id: OsmId, nodes: &[OsmId], tags: &Tags) -> Result<Outcome, OutputError>;

    /// Process a new relation.
    fn relation_add(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
    ) -> Result<Outcome, OutputError>;

    /// Replace a node's rows and mark referencing ways pending.
    fn node_modify(
        &mut self,
        id: OsmId,
        lat: f64,
        lon: f64,
        tags: &Tags,
    ) -> Result<Outcome, OutputError>;

    /// Replace a way's rows and mark referencing relations pending.
    fn way_modify(&mut self, id: OsmId, nodes: &[OsmId], tags: &Tags)
    -> Result<Outcome, OutputError>;

    /// Replace a relation's rows.
    fn relation_modify(
        &mut self,
        id: OsmId,
        members: &[Member],
        tags: &Tags,
    ) -> Result<Outcome, OutputError>;

    /// Remove a node's rows and mark referencing ways pending.
    fn node_delete(&mut self, id: OsmId) -> Result<Outcome, OutputError>;

    /// Remove a way's rows and mark referencing relations pending.
    fn way_delete(&mut self, id: OsmId) -> Result<Outcome, OutputError>;

    /// Remove a relation's rows.
    fn relation_delete(&mut self, id: OsmId) -> Result<Outcome, OutputError>;

    /// Reprocess a pending way from its current state in the feature store.
    ///
    /// `exists` reports whether the store still holds the way; `false`
    /// behaves as [`Output::way_delete`].
    fn pending_way(&mut self, id: OsmId, exists: bool) -> Result<Outcome, OutputError>;

    /// Reprocess a pending relation from its current state in the feature
    /// store. `exists == false` behaves as [`Output::relation_delete`].
    fn pending_relation(&mut self, id: OsmId, exists: bool) -> Result<Outcome, OutputError>;

    /// Move pending way ids onto `queue`, tagging jobs with `output_id`.
    fn enqueue_ways(&mut self, queue: &PendingQueue, output_id: usize) -> usize;

    /// Move pending relation ids onto `queue`, tagging jobs with `output_id`.
    fn enqueue_relations(&mut self, queue: &PendingQueue, output_id: usize) -> usize;

    /// End the current drain pass so re-marked ids can be extracted again.
    fn complete_pass(&mut self);

    /// Total number of pending way and relation ids.
    fn pending_count(&self) -> usize;

    /// Pending way ids.
    fn pending_ways(&self) -> &IdTracker;

    /// Pending relation ids.
    fn pending_relations(&self) -> &IdTracker;

    /// Tiles invalidated by this processor's writes and deletes.
    fn expire_tree(&self) -> &ExpireTiles;

    /// Counters accumulated by this processor.
    fn stats(&self) -> &OutputStats;

    /// Create a sibling processor for one worker thread.
    ///
    /// The clone writes to the same table and shares the geometry policy.
    /// It owns a fresh tag transformer, an unstarted writer and empty
    /// pending and invalidation state, and reads from `lookup`.
    fn clone_output(&self, lookup: Arc<dyn FeatureLookup>) -> Box<dyn Output>;

    /// Union `other`'s pending way and relation ids into `self`.
    fn merge_pending(&mut self, other: &dyn Output);

    /// Union `other`'s invalidated tiles into `self`.
    fn merge_invalidation(&mut self, other: &dyn Output);

    /// Add `other`'s counters to `self`.
    fn merge_stats(&mut self, other: &dyn Output);

    /// Alias of [`Output::merge_pending`].
    fn merge_pending_relations(&mut self, other: &dyn Output) {
        self.merge_pending(other);
    }

    /// Alias of [`Output::merge_invalidation`].
    fn merge_expire_trees(&mut self, other: &dyn Output) {
        self.merge_invalidation(other);
    }
}
