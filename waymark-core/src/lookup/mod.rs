//! Random-access feature lookup.
//!
//! The [`FeatureLookup`] trait answers "where is this node now", "what does
//! this way look like now" and "who references this id" queries on behalf
//! of output processors. Implementations may block on I/O; the processor
//! never retries, so a [`LookupError`] aborts the current batch.

mod memory;

pub use memory::MemoryLookup;

use geo::Coord;
use thiserror::Error;

use crate::{FeatureKind, OsmId, RelationRecord, WayRecord};

/// Errors raised when the feature store cannot be observed.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Reading a feature failed in the backing store.
    #[error("failed to read {kind} {id} from the feature store")]
    Read {
        /// Kind of the feature being read.
        kind: FeatureKind,
        /// Identifier of the feature being read.
        id: OsmId,
        /// Backend error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The store cannot serve queries at all.
    #[error("feature store is unavailable: {reason}")]
    Unavailable {
        /// Human-readable cause.
        reason: String,
    },
}

/// Read access to the current state of every feature.
///
/// Implementers must be shareable across worker threads.
///
/// # Examples
///
/// ```rust
/// use geo::Coord;
/// use waymark_core::{FeatureLookup, MemoryLookup, Tags};
///
/// let lookup = MemoryLookup::default();
/// lookup.insert_node(1, Coord { x: 0.0, y: 0.0 }, Tags::new());
/// lookup.insert_node(2, Coord { x: 1.0, y: 0.0 }, Tags::new());
/// lookup.insert_way(10, vec![1, 2], Tags::new());
///
/// assert_eq!(lookup.ways_referencing(2)?, vec![10]);
/// assert_eq!(lookup.node_locations(&[1, 3, 2])?.len(), 2);
/// # Ok::<(), waymark_core::LookupError>(())
/// ```
pub trait FeatureLookup: Send + Sync {
    /// Location of node `id`, or `None` when it no longer exists.
    fn node_location(&self, id: OsmId) -> Result<Option<Coord<f64>>, LookupError>;

    /// Current nodes and tags of way `id`, or `None` when it no longer exists.
    fn way(&self, id: OsmId) -> Result<Option<WayRecord>, LookupError>;

    /// Current members and tags of relation `id`, or `None` when it no
    /// longer exists.
    fn relation(&self, id: OsmId) -> Result<Option<RelationRecord>, LookupError>;

    /// Ids of live ways whose node list contains `node_id`, ascending.
    fn ways_referencing(&self, node_id: OsmId) -> Result<Vec<OsmId>, LookupError>;

    /// Ids of live relations with a way member `way_id`, ascending.
    fn relations_referencing(&self, way_id: OsmId) -> Result<Vec<OsmId>, LookupError>;

    /// Resolve node ids to locations, preserving order and dropping nodes
    /// that no longer exist.
    fn node_locations(&self, ids: &[OsmId]) -> Result<Vec<Coord<f64>>, LookupError> {
        let mut locations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(location) = self.node_location(*id)? {
                locations.push(location);
            }
        }
        Ok(locations)
    }
}
