//! OSM feature records.
//!
//! Nodes, ways and relations live in independent id namespaces. Ways hold an
//! ordered list of node ids and relations hold an ordered list of typed
//! members; neither embeds the referenced feature.

use std::fmt;

use geo::Coord;

/// Identifier assigned upstream, unique within one [`FeatureKind`].
pub type OsmId = i64;

/// The three OSM feature kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FeatureKind {
    /// A point with a location.
    Node,
    /// An ordered path of node references.
    Way,
    /// An ordered collection of typed members.
    Relation,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        };
        f.write_str(name)
    }
}

/// A single key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    /// Tag key, e.g. `highway`.
    pub key: String,
    /// Tag value, e.g. `residential`.
    pub value: String,
}

/// Ordered tag list as received from upstream.
///
/// Keys are not guaranteed unique. [`Tags::get`] returns the first match;
/// callers needing a different conflict policy iterate instead.
///
/// # Examples
/// ```
/// use waymark_core::Tags;
///
/// let tags = Tags::from_pairs([("highway", "primary"), ("name", "High Street")]);
/// assert_eq!(tags.get("highway"), Some("primary"));
/// assert!(tags.get("building").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Create an empty tag list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a tag list from borrowed key/value pairs, preserving order.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .map(|(key, value)| Tag {
                key: key.to_owned(),
                value: value.to_owned(),
            })
            .collect()
    }

    /// Append a tag at the end of the list.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(Tag {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Value of the first tag with `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    /// Report whether any tag carries `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|tag| tag.key == key)
    }

    /// Iterate over `(key, value)` pairs in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0
            .iter()
            .map(|tag| (tag.key.as_str(), tag.value.as_str()))
    }

    /// Number of tags, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Report whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Kind of a relation member.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MemberKind {
    /// Member is a node.
    Node,
    /// Member is a way.
    Way,
    /// Member is another relation.
    Relation,
}

/// One relation member; order and role are significant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Kind of the referenced feature.
    pub kind: MemberKind,
    /// Identifier of the referenced feature.
    pub id: OsmId,
    /// Role string, e.g. `outer` or `inner`. May be empty.
    pub role: String,
}

impl Member {
    /// Construct a way member with the given role.
    pub fn way(id: OsmId, role: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Way,
            id,
            role: role.into(),
        }
    }

    /// Construct a node member with the given role.
    pub fn node(id: OsmId, role: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Node,
            id,
            role: role.into(),
        }
    }
}

/// Current state of a node as held by the feature store.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Location, `x = longitude`, `y = latitude`.
    pub location: Coord<f64>,
    /// Node tags.
    pub tags: Tags,
}

/// Current state of a way as held by the feature store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WayRecord {
    /// Ordered node references.
    pub nodes: Vec<OsmId>,
    /// Way tags.
    pub tags: Tags,
}

impl WayRecord {
    /// Report whether the way starts and ends on the same node.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        is_closed_ring(&self.nodes)
    }
}

/// Current state of a relation as held by the feature store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationRecord {
    /// Ordered members.
    pub members: Vec<Member>,
    /// Relation tags.
    pub tags: Tags,
}

/// Report whether a node reference list forms a closed ring.
///
/// A ring needs at least four references (three distinct corners plus the
/// repeated first node).
#[must_use]
pub fn is_closed_ring(nodes: &[OsmId]) -> bool {
    nodes.len() >= 4 && nodes.first() == nodes.last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn tags_keep_duplicates_and_first_wins() {
        let tags = Tags::from_pairs([("name", "A"), ("name", "B")]);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("name"), Some("A"));
    }

    #[rstest]
    #[case(&[1, 2, 3, 1], true)]
    #[case(&[1, 2, 1], false)]
    #[case(&[1, 2, 3, 4], false)]
    #[case(&[], false)]
    fn detects_closed_rings(#[case] nodes: &[OsmId], #[case] closed: bool) {
        assert_eq!(is_closed_ring(nodes), closed);
    }

    #[rstest]
    fn feature_kind_displays_lowercase() {
        assert_eq!(FeatureKind::Relation.to_string(), "relation");
    }
}
