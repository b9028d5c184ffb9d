//! Hash-map backed [`FeatureLookup`] with reverse reference indices.
//!
//! Suitable for tests and for small extracts held entirely in memory.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use geo::Coord;

use super::{FeatureLookup, LookupError};
use crate::{Member, MemberKind, NodeRecord, OsmId, RelationRecord, Tags, WayRecord};

#[derive(Debug, Default)]
struct Features {
    nodes: HashMap<OsmId, NodeRecord>,
    ways: HashMap<OsmId, WayRecord>,
    relations: HashMap<OsmId, RelationRecord>,
    ways_by_node: HashMap<OsmId, BTreeSet<OsmId>>,
    relations_by_way: HashMap<OsmId, BTreeSet<OsmId>>,
}

impl Features {
    fn unlink_way(&mut self, way_id: OsmId) {
        let Some(old) = self.ways.remove(&way_id) else {
            return;
        };
        for node_id in old.nodes {
            if let Some(ways) = self.ways_by_node.get_mut(&node_id) {
                ways.remove(&way_id);
                if ways.is_empty() {
                    self.ways_by_node.remove(&node_id);
                }
            }
        }
    }

    fn unlink_relation(&mut self, relation_id: OsmId) {
        let Some(old) = self.relations.remove(&relation_id) else {
            return;
        };
        for member in old.members.iter().filter(|m| m.kind == MemberKind::Way) {
            if let Some(relations) = self.relations_by_way.get_mut(&member.id) {
                relations.remove(&relation_id);
                if relations.is_empty() {
                    self.relations_by_way.remove(&member.id);
                }
            }
        }
    }
}

/// In-memory feature store.
///
/// Mutators take `&self` so a store shared with output processors through
/// an `Arc` can be updated between change batches.
#[derive(Debug, Default)]
pub struct MemoryLookup {
    features: RwLock<Features>,
}

impl MemoryLookup {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Features> {
        self.features.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Features> {
        self.features.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a node.
    pub fn insert_node(&self, id: OsmId, location: Coord<f64>, tags: Tags) {
        self.write().nodes.insert(id, NodeRecord { location, tags });
    }

    /// Insert or replace a way, re-indexing its node references.
    pub fn insert_way(&self, id: OsmId, nodes: Vec<OsmId>, tags: Tags) {
        let mut features = self.write();
        features.unlink_way(id);
        for node_id in &nodes {
            features.ways_by_node.entry(*node_id).or_default().insert(id);
        }
        features.ways.insert(id, WayRecord { nodes, tags });
    }

    /// Insert or replace a relation, re-indexing its way members.
    pub fn insert_relation(&self, id: OsmId, members: Vec<Member>, tags: Tags) {
        let mut features = self.write();
        features.unlink_relation(id);
        for member in members.iter().filter(|m| m.kind == MemberKind::Way) {
            features
                .relations_by_way
                .entry(member.id)
                .or_default()
                .insert(id);
        }
        features
            .relations
            .insert(id, RelationRecord { members, tags });
    }

    /// Remove a node. Ways keep referencing it until they change.
    pub fn remove_node(&self, id: OsmId) -> bool {
        self.write().nodes.remove(&id).is_some()
    }

    /// Remove a way and its reverse index entries.
    pub fn remove_way(&self, id: OsmId) -> bool {
        let mut features = self.write();
        let existed = features.ways.contains_key(&id);
        features.unlink_way(id);
        existed
    }

    /// Remove a relation and its reverse index entries.
    pub fn remove_relation(&self, id: OsmId) -> bool {
        let mut features = self.write();
        let existed = features.relations.contains_key(&id);
        features.unlink_relation(id);
        existed
    }
}

impl FeatureLookup for MemoryLookup {
    fn node_location(&self, id: OsmId) -> Result<Option<Coord<f64>>, LookupError> {
        Ok(self.read().nodes.get(&id).map(|node| node.location))
    }

    fn way(&self, id: OsmId) -> Result<Option<WayRecord>, LookupError> {
        Ok(self.read().ways.get(&id).cloned())
    }

    fn relation(&self, id: OsmId) -> Result<Option<RelationRecord>, LookupError> {
        Ok(self.read().relations.get(&id).cloned())
    }

    fn ways_referencing(&self, node_id: OsmId) -> Result<Vec<OsmId>, LookupError> {
        Ok(self
            .read()
            .ways_by_node
            .get(&node_id)
            .map(|ways| ways.iter().copied().collect())
            .unwrap_or_default())
    }

    fn relations_referencing(&self, way_id: OsmId) -> Result<Vec<OsmId>, LookupError> {
        Ok(self
            .read()
            .relations_by_way
            .get(&way_id)
            .map(|relations| relations.iter().copied().collect())
            .unwrap_or_default())
    }
}
