//! Per-table output processing for Waymark.
//!
//! Responsibilities:
//! - Turn node, way and relation changes into destination rows through a
//!   [`MultiOutput`] per configured table.
//! - Record features made stale by upstream changes and reprocess them in
//!   drain passes, optionally on several threads.
//! - Clone processors for workers and merge their pending ids, invalidation
//!   trees and counters back.
//!
//! Boundaries:
//! - Feature storage, geometry construction and row storage are reached only
//!   through the `waymark-core` traits.
//! - Change parsing belongs upstream; [`Change`] is the hand-off type.
//!
//! Invariants:
//! - Relation rows carry the negated relation id.
//! - A drain pass never processes the same id twice for one output.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod multi;
mod outcome;
mod output;
mod pending;
mod queue;
mod set;
mod transform;

pub use config::{BoundingBox, ConfigError, ImportConfig, TableConfig};
pub use error::OutputError;
pub use multi::MultiOutput;
pub use outcome::{Outcome, OutputStats, SkipReason};
pub use output::Output;
pub use pending::PendingTracker;
pub use queue::{PendingJob, PendingQueue};
pub use set::{Change, ChangeAction, ChangeElement, ChangeSummary, DrainReport, OutputSet};
pub use transform::KeyFilterTransform;
