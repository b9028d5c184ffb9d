//! Sparse ordered id set used for dependency tracking.
//!
//! Output processors keep one tracker for ids awaiting reprocessing and one
//! for ids already reprocessed in the current drain pass.

use std::collections::BTreeSet;

use crate::OsmId;

/// Ordered set of feature ids with pop-in-order extraction.
///
/// # Examples
/// ```
/// use waymark_core::IdTracker;
///
/// let mut tracker = IdTracker::default();
/// tracker.mark(20);
/// tracker.mark(10);
/// assert_eq!(tracker.pop_mark(), Some(10));
/// assert!(tracker.is_marked(20));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTracker {
    ids: BTreeSet<OsmId>,
}

impl IdTracker {
    /// Create an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: BTreeSet::new(),
        }
    }

    /// Insert `id`. Returns `true` when it was not yet marked.
    pub fn mark(&mut self, id: OsmId) -> bool {
        self.ids.insert(id)
    }

    /// Report whether `id` is marked.
    #[must_use]
    pub fn is_marked(&self, id: OsmId) -> bool {
        self.ids.contains(&id)
    }

    /// Remove and return the smallest marked id.
    pub fn pop_mark(&mut self) -> Option<OsmId> {
        self.ids.pop_first()
    }

    /// Number of marked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Report whether no id is marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over marked ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = OsmId> + '_ {
        self.ids.iter().copied()
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.ids.extend(other.ids.iter().copied());
    }

    /// Forget every marked id.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl Extend<OsmId> for IdTracker {
    fn extend<I: IntoIterator<Item = OsmId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

impl FromIterator<OsmId> for IdTracker {
    fn from_iter<I: IntoIterator<Item = OsmId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pops_in_ascending_order() {
        let mut tracker: IdTracker = [5, -3, 12].into_iter().collect();
        let popped: Vec<_> = std::iter::from_fn(|| tracker.pop_mark()).collect();
        assert_eq!(popped, vec![-3, 5, 12]);
        assert!(tracker.is_empty());
    }

    #[rstest]
    fn marking_twice_keeps_one_entry() {
        let mut tracker = IdTracker::new();
        assert!(tracker.mark(7));
        assert!(!tracker.mark(7));
        assert_eq!(tracker.len(), 1);
    }

    #[rstest]
    fn clear_forgets_every_id() {
        let mut tracker: IdTracker = [1, 2].into_iter().collect();
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(!tracker.is_marked(1));
    }
}
