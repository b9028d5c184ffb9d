//! Shared work queue for drain passes.

use flume::{Receiver, Sender};
use waymark_core::OsmId;

/// One pending id claimed for reprocessing by a specific output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PendingJob {
    /// Feature id to reprocess.
    pub id: OsmId,
    /// Index of the output that owns the pending entry.
    pub output_id: usize,
}

/// Multi-producer, multi-consumer queue of [`PendingJob`]s.
///
/// Any worker may claim any job and each job is handed to exactly one
/// consumer. No ordering is guaranteed across consumers.
///
/// # Examples
/// ```
/// use waymark_output::{PendingJob, PendingQueue};
///
/// let queue = PendingQueue::new();
/// queue.push(PendingJob { id: 7, output_id: 0 });
/// assert_eq!(queue.len(), 1);
/// assert_eq!(queue.pop(), Some(PendingJob { id: 7, output_id: 0 }));
/// assert!(queue.pop().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PendingQueue {
    sender: Sender<PendingJob>,
    receiver: Receiver<PendingJob>,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingQueue {
    /// Create an empty, unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Append a job.
    pub fn push(&self, job: PendingJob) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _sent = self.sender.send(job).is_ok();
    }

    /// Claim the next job without blocking.
    #[must_use]
    pub fn pop(&self) -> Option<PendingJob> {
        self.receiver.try_recv().ok()
    }

    /// Number of unclaimed jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Report whether every job has been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeSet;
    use std::thread;

    #[rstest]
    fn concurrent_consumers_claim_each_job_once() {
        let queue = PendingQueue::new();
        for id in 0..200 {
            queue.push(PendingJob { id, output_id: 0 });
        }
        let claimed: Vec<Vec<OsmId>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        std::iter::from_fn(|| queue.pop())
                            .map(|job| job.id)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("consumer thread"))
                .collect()
        });
        let flat: Vec<OsmId> = claimed.into_iter().flatten().collect();
        let unique: BTreeSet<OsmId> = flat.iter().copied().collect();
        assert_eq!(flat.len(), 200);
        assert_eq!(unique.len(), 200);
        assert!(queue.is_empty());
    }
}
