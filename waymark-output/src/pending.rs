//! Pending-dependency bookkeeping shared by output implementations.
//!
//! Each dependency kind moves through three states: absent, pending and
//! done. Marking puts an id into pending. Enqueueing moves pending ids to
//! done and onto a [`PendingQueue`]. Completing the pass forgets done.

use waymark_core::{IdTracker, OsmId};

use crate::{PendingJob, PendingQueue};

/// Pending and done sets for one dependency kind.
///
/// # Examples
/// ```
/// use waymark_output::{PendingQueue, PendingTracker};
///
/// let mut tracker = PendingTracker::default();
/// tracker.mark(3);
/// tracker.mark(1);
/// let queue = PendingQueue::new();
/// assert_eq!(tracker.enqueue(&queue, 0), 2);
/// assert!(tracker.is_drained());
/// assert!(tracker.is_done(1));
/// tracker.complete_pass();
/// assert!(!tracker.is_done(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTracker {
    pending: IdTracker,
    done: IdTracker,
}

impl PendingTracker {
    /// Create an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: IdTracker::new(),
            done: IdTracker::new(),
        }
    }

    /// Put `id` into the pending set.
    pub fn mark(&mut self, id: OsmId) -> bool {
        self.pending.mark(id)
    }

    /// Ids awaiting reprocessing.
    #[must_use]
    pub const fn pending(&self) -> &IdTracker {
        &self.pending
    }

    /// Report whether `id` was extracted during the current pass.
    #[must_use]
    pub fn is_done(&self, id: OsmId) -> bool {
        self.done.is_marked(id)
    }

    /// Move every pending id onto `queue`, returning the number queued.
    ///
    /// Ids already extracted in this pass stay pending for the next one.
    pub fn enqueue(&mut self, queue: &PendingQueue, output_id: usize) -> usize {
        let mut added = 0;
        let mut deferred = Vec::new();
        while let Some(id) = self.pending.pop_mark() {
            if self.done.mark(id) {
                queue.push(PendingJob { id, output_id });
                added += 1;
            } else {
                deferred.push(id);
            }
        }
        self.pending.extend(deferred);
        added
    }

    /// End the current pass, forgetting which ids were extracted.
    pub fn complete_pass(&mut self) {
        self.done.clear();
    }

    /// Report whether nothing is pending.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    /// Union another processor's pending ids into this one.
    pub fn merge_from(&mut self, other: &IdTracker) {
        self.pending.merge(other);
    }

    /// Number of pending ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Report whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
