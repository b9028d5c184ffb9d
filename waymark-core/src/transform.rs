//! Tag transformation policy.
//!
//! A [`TagTransform`] decides whether a feature belongs in a destination
//! table, which shape its geometry takes and which column values it
//! produces. Transformers may keep per-instance caches, so every output
//! processor owns its own instance and clones get a fresh copy through
//! [`TagTransform::clone_box`].

use std::collections::BTreeMap;
use std::fmt;

use crate::{Member, Tags};

/// Column values keyed by column name.
pub type Columns = BTreeMap<String, String>;

/// Geometry shape requested for a feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Shape {
    /// A single location.
    Point,
    /// An open or closed path.
    Line,
    /// An area bounded by rings.
    Polygon,
    /// Heterogeneous parts kept together.
    Collection,
}

/// How many rows a multi-part geometry produces.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Cardinality {
    /// All parts are combined into one multi-geometry row.
    #[default]
    Single,
    /// Each part is written as its own row.
    PerComponent,
}

/// Outcome of classifying a wanted feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Destination column values.
    pub columns: Columns,
    /// Requested geometry shape.
    pub shape: Shape,
    /// Row cardinality for multi-part results.
    pub cardinality: Cardinality,
}

/// A relation member together with the tags of the feature it references.
///
/// Members the feature store no longer knows are omitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    /// The member as listed by the relation.
    pub member: Member,
    /// Current tags of the referenced feature.
    pub tags: Tags,
}

/// Feature-kind specific context passed alongside the tags.
#[derive(Debug, Clone, Copy)]
pub enum ClassifyContext<'a> {
    /// The feature is a node.
    Node,
    /// The feature is a way.
    Way {
        /// Whether the way's first and last node coincide.
        closed: bool,
    },
    /// The feature is a relation.
    Relation {
        /// Members resolved through the feature store, in relation order.
        members: &'a [ResolvedMember],
    },
}

/// Tag classification policy for one destination table.
pub trait TagTransform: Send + fmt::Debug {
    /// Classify `tags`. `None` means the feature is not wanted.
    fn classify(&mut self, tags: &Tags, context: ClassifyContext<'_>) -> Option<Classification>;

    /// Independent copy for use by a cloned output processor.
    fn clone_box(&self) -> Box<dyn TagTransform>;
}
