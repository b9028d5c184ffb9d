//! Per-feature results and processor counters.

/// Why a feature produced no rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The tag transformer rejected the feature, or asked for a shape this
    /// table cannot store.
    NotWanted,
    /// The table does not process this feature kind.
    NotOfInterest,
    /// The geometry builder could not build a valid geometry.
    Degenerate,
    /// None of the referenced nodes could be resolved.
    MissingNodes,
}

/// Result of one entry point call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Rows were written for the feature.
    Written(usize),
    /// The feature was removed; carries the number of rows deleted.
    Deleted(usize),
    /// Nothing was written.
    Skipped(SkipReason),
}

impl Outcome {
    /// Integer status: `0` when the call did its work, `1` when skipped.
    #[must_use]
    pub const fn status(self) -> i32 {
        match self {
            Self::Written(_) | Self::Deleted(_) => 0,
            Self::Skipped(_) => 1,
        }
    }

    /// Rows written by the call.
    #[must_use]
    pub const fn rows_written(self) -> usize {
        match self {
            Self::Written(rows) => rows,
            Self::Deleted(_) | Self::Skipped(_) => 0,
        }
    }
}

/// Counters kept by one output processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputStats {
    /// Rows written.
    pub rows_written: u64,
    /// Rows deleted.
    pub rows_deleted: u64,
    /// Features rejected by the tag transformer.
    pub rejected: u64,
    /// Features skipped because their geometry could not be built.
    pub degenerate: u64,
    /// Relation way members that could no longer be resolved.
    pub missing_members: u64,
    /// Ways reprocessed by a drain pass.
    pub pending_ways: u64,
    /// Relations reprocessed by a drain pass.
    pub pending_relations: u64,
}

impl OutputStats {
    /// Add `other`'s counters to `self`.
    pub const fn absorb(&mut self, other: &Self) {
        self.rows_written += other.rows_written;
        self.rows_deleted += other.rows_deleted;
        self.rejected += other.rejected;
        self.degenerate += other.degenerate;
        self.missing_members += other.missing_members;
        self.pending_ways += other.pending_ways;
        self.pending_relations += other.pending_relations;
    }
}
