//! Property-based tests for the mergeable state owned by output processors.
//!
//! # Invariants tested
//!
//! - **Commutativity:** merging A then B equals merging B then A.
//! - **Idempotence:** merging the same tracker twice changes nothing.
//! - **Identity:** merging an empty tracker is a no-op.

use geo::Coord;
use proptest::prelude::*;
use waymark_core::{ExpireConfig, ExpireTiles, IdTracker, OsmId};

fn tracker_strategy() -> impl Strategy<Value = IdTracker> {
    proptest::collection::vec(-1_000_i64..1_000, 0..40)
        .prop_map(|ids| ids.into_iter().collect::<IdTracker>())
}

fn expire_strategy() -> impl Strategy<Value = ExpireTiles> {
    proptest::collection::vec((-179.0_f64..179.0, -80.0_f64..80.0), 0..20).prop_map(|coords| {
        let mut expire = ExpireTiles::new(ExpireConfig {
            min_zoom: 4,
            max_zoom: 6,
            max_bbox: 1.0,
        });
        for (x, y) in coords {
            expire.mark_coord(Coord { x, y });
        }
        expire
    })
}

fn ids(tracker: &IdTracker) -> Vec<OsmId> {
    tracker.iter().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tracker_merge_is_commutative(
        base in tracker_strategy(),
        a in tracker_strategy(),
        b in tracker_strategy(),
    ) {
        let mut left = base.clone();
        left.merge(&a);
        left.merge(&b);
        let mut right = base;
        right.merge(&b);
        right.merge(&a);
        prop_assert_eq!(ids(&left), ids(&right));
    }

    #[test]
    fn tracker_merge_is_idempotent(base in tracker_strategy(), other in tracker_strategy()) {
        let mut once = base.clone();
        once.merge(&other);
        let mut twice = once.clone();
        twice.merge(&other);
        prop_assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn merging_empty_tracker_is_a_no_op(base in tracker_strategy()) {
        let mut merged = base.clone();
        merged.merge(&IdTracker::new());
        prop_assert_eq!(ids(&merged), ids(&base));
    }

    #[test]
    fn expire_merge_is_commutative(a in expire_strategy(), b in expire_strategy()) {
        let mut left = a.clone();
        left.merge(&b);
        let mut right = b;
        right.merge(&a);
        prop_assert_eq!(left, right);
    }
}
