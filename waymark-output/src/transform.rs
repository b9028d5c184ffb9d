//! Key-filter tag transformer.

use std::collections::BTreeSet;

use waymark_core::{
    Cardinality, Classification, ClassifyContext, Columns, ResolvedMember, Shape, TagTransform,
    Tags,
};

const AREA_KEY: &str = "area";
const TYPE_KEY: &str = "type";
const OUTER_ROLES: [&str; 2] = ["outer", ""];

/// Exports a configured set of tag keys as columns.
///
/// - Features carrying none of the exported keys are rejected.
/// - Nodes become points.
/// - Closed ways become polygons when tagged with a polygon key or
///   `area=yes`; `area=no` always yields a line.
/// - Relations of `type=multipolygon` or `type=boundary` become polygons,
///   `type=route` becomes a line, every other type is rejected. A
///   multipolygon without exported tags of its own takes them from its
///   first tagged outer member.
///
/// Duplicate keys resolve to their first occurrence.
///
/// # Examples
/// ```
/// use waymark_core::{ClassifyContext, Shape, TagTransform, Tags};
/// use waymark_output::KeyFilterTransform;
///
/// let mut transform = KeyFilterTransform::new(["building", "name"], ["building"]);
/// let tags = Tags::from_pairs([("building", "yes"), ("name", "Hall")]);
/// let class = transform
///     .classify(&tags, ClassifyContext::Way { closed: true })
///     .expect("building is exported");
/// assert_eq!(class.shape, Shape::Polygon);
/// assert_eq!(class.columns.get("name").map(String::as_str), Some("Hall"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilterTransform {
    columns: Vec<String>,
    polygon_keys: BTreeSet<String>,
    cardinality: Cardinality,
}

impl KeyFilterTransform {
    /// Export `columns`, treating closed ways with any of `polygon_keys` as
    /// areas.
    pub fn new<C, P>(columns: C, polygon_keys: P) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            polygon_keys: polygon_keys.into_iter().map(Into::into).collect(),
            cardinality: Cardinality::Single,
        }
    }

    /// Set the row cardinality reported for multi-part geometries.
    #[must_use]
    pub const fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    fn columns_for(&self, tags: &Tags) -> Columns {
        self.columns
            .iter()
            .filter_map(|key| tags.get(key).map(|value| (key.clone(), value.to_owned())))
            .collect()
    }

    fn way_shape(&self, tags: &Tags, closed: bool) -> Shape {
        if !closed {
            return Shape::Line;
        }
        match tags.get(AREA_KEY) {
            Some("no") => Shape::Line,
            Some("yes") => Shape::Polygon,
            _ if tags.iter().any(|(key, _)| self.polygon_keys.contains(key)) => Shape::Polygon,
            _ => Shape::Line,
        }
    }

    fn member_columns(&self, members: &[ResolvedMember]) -> Columns {
        members
            .iter()
            .filter(|resolved| OUTER_ROLES.contains(&resolved.member.role.as_str()))
            .map(|resolved| self.columns_for(&resolved.tags))
            .find(|columns| !columns.is_empty())
            .unwrap_or_default()
    }

    const fn classification(&self, columns: Columns, shape: Shape) -> Classification {
        Classification {
            columns,
            shape,
            cardinality: self.cardinality,
        }
    }
}

impl TagTransform for KeyFilterTransform {
    fn classify(&mut self, tags: &Tags, context: ClassifyContext<'_>) -> Option<Classification> {
        let own = self.columns_for(tags);
        match context {
            ClassifyContext::Node => {
                (!own.is_empty()).then(|| self.classification(own, Shape::Point))
            }
            ClassifyContext::Way { closed } => {
                let shape = self.way_shape(tags, closed);
                (!own.is_empty()).then(|| self.classification(own, shape))
            }
            ClassifyContext::Relation { members } => {
                let (shape, columns) = match tags.get(TYPE_KEY)? {
                    "multipolygon" if own.is_empty() => {
                        (Shape::Polygon, self.member_columns(members))
                    }
                    "multipolygon" | "boundary" => (Shape::Polygon, own),
                    "route" => (Shape::Line, own),
                    _ => return None,
                };
                (!columns.is_empty()).then(|| self.classification(columns, shape))
            }
        }
    }

    fn clone_box(&self) -> Box<dyn TagTransform> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use waymark_core::Member;

    #[fixture]
    fn transform() -> KeyFilterTransform {
        KeyFilterTransform::new(["highway", "building", "landuse", "name"], [
            "building", "landuse",
        ])
    }

    #[rstest]
    fn rejects_features_without_exported_keys(mut transform: KeyFilterTransform) {
        let tags = Tags::from_pairs([("source", "survey")]);
        assert!(transform.classify(&tags, ClassifyContext::Node).is_none());
    }

    #[rstest]
    fn keeps_first_duplicate_value(mut transform: KeyFilterTransform) {
        let tags = Tags::from_pairs([("name", "First"), ("name", "Second")]);
        let class = transform
            .classify(&tags, ClassifyContext::Node)
            .expect("name is exported");
        assert_eq!(class.columns.get("name").map(String::as_str), Some("First"));
        assert_eq!(class.shape, Shape::Point);
    }

    #[rstest]
    #[case(&[("highway", "residential")], true, Shape::Line)]
    #[case(&[("building", "yes")], true, Shape::Polygon)]
    #[case(&[("building", "yes")], false, Shape::Line)]
    #[case(&[("building", "yes"), ("area", "no")], true, Shape::Line)]
    #[case(&[("highway", "pedestrian"), ("area", "yes")], true, Shape::Polygon)]
    fn way_shapes(
        mut transform: KeyFilterTransform,
        #[case] pairs: &[(&str, &str)],
        #[case] closed: bool,
        #[case] expected: Shape,
    ) {
        let tags = Tags::from_pairs(pairs.iter().copied());
        let class = transform
            .classify(&tags, ClassifyContext::Way { closed })
            .expect("exported keys present");
        assert_eq!(class.shape, expected);
    }

    #[rstest]
    #[case("multipolygon", Some(Shape::Polygon))]
    #[case("boundary", Some(Shape::Polygon))]
    #[case("route", Some(Shape::Line))]
    #[case("restriction", None)]
    fn relation_types(
        mut transform: KeyFilterTransform,
        #[case] kind: &str,
        #[case] expected: Option<Shape>,
    ) {
        let tags = Tags::from_pairs([("type", kind), ("name", "Park")]);
        let shape = transform
            .classify(&tags, ClassifyContext::Relation { members: &[] })
            .map(|class| class.shape);
        assert_eq!(shape, expected);
    }

    #[rstest]
    fn untagged_multipolygon_uses_outer_member_tags(mut transform: KeyFilterTransform) {
        let members = [
            ResolvedMember {
                member: Member::way(1, "inner"),
                tags: Tags::from_pairs([("landuse", "meadow")]),
            },
            ResolvedMember {
                member: Member::way(2, "outer"),
                tags: Tags::from_pairs([("landuse", "forest")]),
            },
        ];
        let tags = Tags::from_pairs([("type", "multipolygon")]);
        let class = transform
            .classify(&tags, ClassifyContext::Relation { members: &members })
            .expect("outer member supplies columns");
        assert_eq!(
            class.columns.get("landuse").map(String::as_str),
            Some("forest")
        );
    }

    #[rstest]
    fn cardinality_is_configurable(transform: KeyFilterTransform) {
        let mut per_component = transform.with_cardinality(Cardinality::PerComponent);
        let tags = Tags::from_pairs([("type", "route"), ("name", "Loop")]);
        let class = per_component
            .classify(&tags, ClassifyContext::Relation { members: &[] })
            .expect("route with a name");
        assert_eq!(class.cardinality, Cardinality::PerComponent);
    }
}
