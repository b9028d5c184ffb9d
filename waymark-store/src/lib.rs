//! SQLite persistence for Waymark destination tables.
//!
//! Responsibilities:
//! - Persist rows produced by output processors into one SQLite table per
//!   destination, keyed by feature id.
//! - Return the extents of deleted rows so callers can expire tiles without
//!   decoding stored geometry.
//!
//! Boundaries:
//! - No processing policy lives here; this crate only implements
//!   [`RowWriter`](waymark_core::RowWriter).
//!
//! Invariants:
//! - Handles cloned for worker threads share one connection and one open
//!   transaction per table.
//! - `commit` is the only durability point.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod fs;
mod table;

pub use error::StoreError;
pub use table::SqliteTable;
