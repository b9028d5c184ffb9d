//! Errors surfaced by output processors and the orchestrator.

use thiserror::Error;
use waymark_core::{LookupError, WriteError};

/// Failures that abort the current batch.
///
/// Rejected features, degenerate geometry and missing dependencies are
/// reported through [`Outcome`](crate::Outcome) instead.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The feature store could not be observed.
    #[error("feature lookup failed")]
    Lookup(#[from] LookupError),
    /// The destination table rejected an operation.
    #[error("destination write failed")]
    Write(#[from] WriteError),
    /// A queued job named an output the orchestrator does not hold.
    #[error("no output registered at index {index}")]
    UnknownOutput {
        /// Index carried by the job.
        index: usize,
    },
    /// A drain worker thread panicked.
    #[error("drain worker panicked")]
    WorkerPanicked,
}
