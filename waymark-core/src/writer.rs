//! Destination table writing.
//!
//! A [`RowWriter`] appends rows to one destination table and deletes rows by
//! feature id. `commit` is the durability point; individual writes are not.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use geo::{BoundingRect, Geometry, Rect};
use thiserror::Error;

use crate::{Columns, OsmId};

/// One destination row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Feature id. Relation rows carry the negated relation id.
    pub id: OsmId,
    /// Column values produced by the tag transformer.
    pub columns: Columns,
    /// Geometry built for the feature.
    pub geometry: Geometry<f64>,
}

/// Errors raised by the destination. Always fatal for the batch.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A row operation was attempted before `start` or after `stop`.
    #[error("table {table} is not open for writing")]
    NotStarted {
        /// Destination table name.
        table: String,
    },
    /// The backing store rejected the operation.
    #[error("table {table} failed to {operation}")]
    Backend {
        /// Destination table name.
        table: String,
        /// Operation being attempted.
        operation: &'static str,
        /// Backend error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Bulk writer for one destination table.
pub trait RowWriter: Send + fmt::Debug {
    /// Name of the destination table.
    fn table_name(&self) -> &str;

    /// Open the destination for bulk writing.
    fn start(&mut self) -> Result<(), WriteError>;

    /// Flush pending rows and make them durable.
    fn commit(&mut self) -> Result<(), WriteError>;

    /// Commit and close the destination.
    fn stop(&mut self) -> Result<(), WriteError>;

    /// Append a row.
    fn write(&mut self, row: &Row) -> Result<(), WriteError>;

    /// Delete every row for `id`, returning the extents of removed rows.
    ///
    /// Deleting a missing id is a no-op returning an empty list.
    fn delete(&mut self, id: OsmId) -> Result<Vec<Rect<f64>>, WriteError>;

    /// Unstarted writer bound to the same destination table.
    fn clone_writer(&self) -> Box<dyn RowWriter>;
}

#[derive(Debug, Default)]
struct TableState {
    rows: BTreeMap<OsmId, Vec<Row>>,
    commits: usize,
}

/// In-memory destination table.
///
/// Clones share the stored rows, so a test can keep a handle while the
/// output processor owns another. Each clone tracks its own open state.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use waymark_core::{Columns, MemoryTable, Row, RowWriter};
///
/// # fn main() -> Result<(), waymark_core::WriteError> {
/// let table = MemoryTable::new("points");
/// let mut writer = table.clone();
/// writer.start()?;
/// writer.write(&Row { id: 1, columns: Columns::new(), geometry: Geometry::Point(Point::new(0.0, 0.0)) })?;
/// writer.commit()?;
/// assert_eq!(table.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    state: Arc<Mutex<TableState>>,
    open: bool,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
            open: false,
        }
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), WriteError> {
        if self.open {
            Ok(())
        } else {
            Err(WriteError::NotStarted {
                table: self.name.clone(),
            })
        }
    }

    /// Rows currently stored for `id`.
    #[must_use]
    pub fn rows(&self, id: OsmId) -> Vec<Row> {
        self.state().rows.get(&id).cloned().unwrap_or_default()
    }

    /// Ids with at least one row, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<OsmId> {
        self.state().rows.keys().copied().collect()
    }

    /// Total number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().rows.values().map(Vec::len).sum()
    }

    /// Report whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of commits across every clone.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    /// Whether this handle is open for writing.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }
}

impl RowWriter for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), WriteError> {
        self.open = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), WriteError> {
        self.ensure_open()?;
        self.state().commits += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WriteError> {
        if self.open {
            self.commit()?;
            self.open = false;
        }
        Ok(())
    }

    fn write(&mut self, row: &Row) -> Result<(), WriteError> {
        self.ensure_open()?;
        self.state().rows.entry(row.id).or_default().push(row.clone());
        Ok(())
    }

    fn delete(&mut self, id: OsmId) -> Result<Vec<Rect<f64>>, WriteError> {
        self.ensure_open()?;
        let removed = self.state().rows.remove(&id).unwrap_or_default();
        Ok(removed
            .iter()
            .filter_map(|row| row.geometry.bounding_rect())
            .collect())
    }

    fn clone_writer(&self) -> Box<dyn RowWriter> {
        Box::new(Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            open: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString, Point};
    use rstest::{fixture, rstest};

    fn row(id: OsmId, geometry: Geometry<f64>) -> Row {
        Row {
            id,
            columns: Columns::new(),
            geometry,
        }
    }

    #[fixture]
    fn open_table() -> MemoryTable {
        let mut table = MemoryTable::new("lines");
        table.start().expect("start table");
        table
    }

    #[rstest]
    fn rejects_writes_before_start() {
        let mut table = MemoryTable::new("lines");
        let err = table
            .write(&row(1, Geometry::Point(Point::new(0.0, 0.0))))
            .expect_err("unstarted table must refuse rows");
        assert!(matches!(err, WriteError::NotStarted { table } if table == "lines"));
    }

    #[rstest]
    fn delete_returns_extents_of_removed_rows(mut open_table: MemoryTable) {
        let line = LineString::from(vec![(0.0, 0.0), (2.0, 1.0)]);
        open_table
            .write(&row(7, Geometry::LineString(line)))
            .expect("write row");
        let extents = open_table.delete(7).expect("delete row");
        assert_eq!(
            extents,
            vec![Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 1.0 })]
        );
        assert!(open_table.is_empty());
    }

    #[rstest]
    fn deleting_missing_id_is_a_no_op(mut open_table: MemoryTable) {
        assert!(open_table.delete(42).expect("delete").is_empty());
    }

    #[rstest]
    fn cloned_writers_share_rows_but_not_open_state(open_table: MemoryTable) {
        let mut clone = open_table.clone_writer();
        assert!(clone.write(&row(1, Geometry::Point(Point::new(0.0, 0.0)))).is_err());
        clone.start().expect("start clone");
        clone
            .write(&row(1, Geometry::Point(Point::new(0.0, 0.0))))
            .expect("write through clone");
        assert_eq!(open_table.rows(1).len(), 1);
    }

    #[rstest]
    fn stop_commits_once(mut open_table: MemoryTable) {
        open_table.stop().expect("stop");
        open_table.stop().expect("second stop is a no-op");
        assert_eq!(open_table.commit_count(), 1);
        assert!(!open_table.is_open());
    }
}
