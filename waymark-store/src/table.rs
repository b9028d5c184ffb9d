//! SQLite-backed [`RowWriter`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use geo::{BoundingRect, Coord, Rect};
use log::{debug, info, warn};
use rusqlite::{Connection, params};
use waymark_core::{OsmId, Row, RowWriter, WriteError};

use crate::StoreError;
use crate::fs::ensure_parent_dir;

/// How long a statement waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection shared by every handle of one table.
#[derive(Debug, Default)]
struct SharedConnection {
    conn: Option<Connection>,
    users: usize,
}

/// Destination table stored in a SQLite database file.
///
/// Each row stores the feature id, the columns as JSON, the geometry encoded
/// with `bincode` and the geometry's bounding box. Deletes read the bounding
/// boxes back so tiles can be expired without decoding geometry.
///
/// Handles returned by [`RowWriter::clone_writer`] share one connection and
/// one open transaction. The first handle to start opens the connection and
/// the last one to stop commits and closes it. Stopping any other handle
/// leaves its writes uncommitted until the next [`RowWriter::commit`].
///
/// # Examples
/// ```no_run
/// use geo::{Geometry, Point};
/// use waymark_core::{Columns, Row, RowWriter};
/// use waymark_store::SqliteTable;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut table = SqliteTable::new("artefacts/import.db", "points")?;
/// table.start()?;
/// table.write(&Row {
///     id: 1,
///     columns: Columns::new(),
///     geometry: Geometry::Point(Point::new(13.4, 52.5)),
/// })?;
/// table.stop()?;
/// assert_eq!(table.rows(1)?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteTable {
    path: Utf8PathBuf,
    table: String,
    shared: Arc<Mutex<SharedConnection>>,
    open: bool,
}

impl SqliteTable {
    /// Bind a handle to `table` inside the database at `path`.
    ///
    /// Nothing is opened until [`RowWriter::start`].
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidTableName`] unless the name is a
    /// non-empty run of ASCII letters, digits and underscores that does not
    /// start with a digit.
    pub fn new(path: impl Into<Utf8PathBuf>, table: impl Into<String>) -> Result<Self, StoreError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(StoreError::InvalidTableName { name: table });
        }
        Ok(Self {
            path: path.into(),
            table,
            shared: Arc::default(),
            open: false,
        })
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether this handle is open for writing.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Rows stored for `id`, in insertion order.
    ///
    /// Reads through the shared connection while any handle is open, so
    /// uncommitted rows are visible; otherwise reads committed rows.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or a stored row
    /// cannot be decoded.
    pub fn rows(&self, id: OsmId) -> Result<Vec<Row>, StoreError> {
        let shared = self.lock();
        if let Some(conn) = shared.conn.as_ref() {
            return select_rows(conn, &self.table, id);
        }
        drop(shared);
        let conn = self.connect()?;
        select_rows(&conn, &self.table, id)
    }

    fn lock(&self) -> MutexGuard<'_, SharedConnection> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn database(&self, source: rusqlite::Error) -> StoreError {
        StoreError::Database {
            table: self.table.clone(),
            source,
        }
    }

    fn backend(&self, operation: &'static str, source: StoreError) -> WriteError {
        WriteError::Backend {
            table: self.table.clone(),
            operation,
            source: Box::new(source),
        }
    }

    /// Open the database and create the table when missing.
    fn connect(&self) -> Result<Connection, StoreError> {
        ensure_parent_dir(&self.path)?;
        let conn =
            Connection::open(self.path.as_std_path()).map_err(|source| StoreError::Open {
                path: self.path.clone(),
                source,
            })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| self.database(source))?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER NOT NULL,
                columns TEXT NOT NULL,
                geom BLOB NOT NULL,
                min_x REAL,
                min_y REAL,
                max_x REAL,
                max_y REAL
            );
            CREATE INDEX IF NOT EXISTS {table}_id ON {table} (id);",
            table = self.table
        ))
        .map_err(|source| self.database(source))?;
        Ok(conn)
    }

    /// Run `operation` on the shared connection of a started handle.
    fn with_connection<T, F>(&self, operation: &'static str, run: F) -> Result<T, WriteError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let not_started = || WriteError::NotStarted {
            table: self.table.clone(),
        };
        if !self.open {
            return Err(not_started());
        }
        let shared = self.lock();
        let conn = shared.conn.as_ref().ok_or_else(not_started)?;
        run(conn).map_err(|source| self.backend(operation, source))
    }

    /// Give up this handle's share of the connection.
    ///
    /// Other handles keep the transaction open. The last handle commits
    /// when `commit` is set and closes the connection; closing with the
    /// transaction still open rolls it back.
    fn release(&mut self, commit: bool) -> Result<(), StoreError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut shared = self.lock();
        shared.users = shared.users.saturating_sub(1);
        if shared.users > 0 {
            return Ok(());
        }
        let committed = match shared.conn.as_ref() {
            Some(conn) if commit => conn
                .execute_batch("COMMIT")
                .map_err(|source| self.database(source)),
            _ => Ok(()),
        };
        if shared.conn.take().is_some() {
            info!("{}: closed {}", self.table, self.path);
        }
        committed
    }
}

impl RowWriter for SqliteTable {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn start(&mut self) -> Result<(), WriteError> {
        if self.open {
            return Ok(());
        }
        let mut shared = self.lock();
        if shared.conn.is_none() {
            let conn = self
                .connect()
                .and_then(|conn| {
                    conn.execute_batch("BEGIN")
                        .map(|()| conn)
                        .map_err(|source| self.database(source))
                })
                .map_err(|source| self.backend("start", source))?;
            shared.conn = Some(conn);
            info!("{}: opened {}", self.table, self.path);
        }
        shared.users += 1;
        drop(shared);
        self.open = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), WriteError> {
        self.with_connection("commit", |conn| {
            conn.execute_batch("COMMIT; BEGIN")
                .map_err(|source| self.database(source))
        })?;
        debug!("{}: committed", self.table);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WriteError> {
        self.release(true)
            .map_err(|source| self.backend("stop", source))
    }

    fn write(&mut self, row: &Row) -> Result<(), WriteError> {
        self.with_connection("write", |conn| insert_row(conn, &self.table, row))
    }

    fn delete(&mut self, id: OsmId) -> Result<Vec<Rect<f64>>, WriteError> {
        self.with_connection("delete", |conn| delete_rows(conn, &self.table, id))
    }

    fn clone_writer(&self) -> Box<dyn RowWriter> {
        Box::new(Self {
            path: self.path.clone(),
            table: self.table.clone(),
            shared: Arc::clone(&self.shared),
            open: false,
        })
    }
}

impl Drop for SqliteTable {
    fn drop(&mut self) {
        if self.open {
            warn!("{}: handle dropped while open", self.table);
            if let Err(err) = self.release(false) {
                warn!("{}: failed to release connection: {err}", self.table);
            }
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn insert_row(conn: &Connection, table: &str, row: &Row) -> Result<(), StoreError> {
    let columns = serde_json::to_string(&row.columns).map_err(|source| {
        StoreError::EncodeColumns {
            id: row.id,
            source,
        }
    })?;
    let geom = bincode::serialize(&row.geometry).map_err(|source| StoreError::EncodeGeometry {
        id: row.id,
        source,
    })?;
    let extent = row.geometry.bounding_rect();
    conn.prepare_cached(&format!(
        "INSERT INTO {table} (id, columns, geom, min_x, min_y, max_x, max_y)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    ))
    .and_then(|mut statement| {
        statement.execute(params![
            row.id,
            columns,
            geom,
            extent.map(|rect| rect.min().x),
            extent.map(|rect| rect.min().y),
            extent.map(|rect| rect.max().x),
            extent.map(|rect| rect.max().y),
        ])
    })
    .map(|_| ())
    .map_err(|source| StoreError::Database {
        table: table.to_owned(),
        source,
    })
}

type Extent = (Option<f64>, Option<f64>, Option<f64>, Option<f64>);

fn delete_rows(conn: &Connection, table: &str, id: OsmId) -> Result<Vec<Rect<f64>>, StoreError> {
    let database = |source: rusqlite::Error| StoreError::Database {
        table: table.to_owned(),
        source,
    };
    let extents: Vec<Extent> = conn
        .prepare_cached(&format!(
            "SELECT min_x, min_y, max_x, max_y FROM {table} WHERE id = ?1"
        ))
        .and_then(|mut statement| {
            statement
                .query_map([id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect()
        })
        .map_err(database)?;
    conn.prepare_cached(&format!("DELETE FROM {table} WHERE id = ?1"))
        .and_then(|mut statement| statement.execute([id]))
        .map_err(database)?;

    Ok(extents
        .into_iter()
        .filter_map(|(min_x, min_y, max_x, max_y)| {
            Some(Rect::new(
                Coord {
                    x: min_x?,
                    y: min_y?,
                },
                Coord {
                    x: max_x?,
                    y: max_y?,
                },
            ))
        })
        .collect())
}

fn select_rows(conn: &Connection, table: &str, id: OsmId) -> Result<Vec<Row>, StoreError> {
    let stored: Vec<(String, Vec<u8>)> = conn
        .prepare_cached(&format!(
            "SELECT columns, geom FROM {table} WHERE id = ?1 ORDER BY rowid"
        ))
        .and_then(|mut statement| {
            statement
                .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect()
        })
        .map_err(|source| StoreError::Database {
            table: table.to_owned(),
            source,
        })?;

    stored
        .into_iter()
        .map(|(columns, geom)| {
            Ok(Row {
                id,
                columns: serde_json::from_str(&columns)
                    .map_err(|source| StoreError::DecodeColumns { id, source })?,
                geometry: bincode::deserialize(&geom)
                    .map_err(|source| StoreError::DecodeGeometry { id, source })?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, LineString, Point};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;
    use waymark_core::Columns;

    struct Database {
        _dir: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn database() -> Database {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested/tables.db"))
            .expect("utf-8 path");
        Database { _dir: dir, path }
    }

    fn line_row(id: OsmId) -> Row {
        Row {
            id,
            columns: Columns::from([(String::from("highway"), String::from("path"))]),
            geometry: Geometry::LineString(LineString::from(vec![(0.0, 0.0), (2.0, 1.0)])),
        }
    }

    fn stored_count(path: &Utf8Path, table: &str) -> i64 {
        let conn = Connection::open(path.as_std_path()).expect("open database");
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .expect("count rows")
    }

    #[rstest]
    #[case("roads", true)]
    #[case("_planet_osm_line", true)]
    #[case("", false)]
    #[case("1roads", false)]
    #[case("roads; DROP TABLE x", false)]
    fn validates_table_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(SqliteTable::new("db.sqlite", name).is_ok(), valid);
    }

    #[rstest]
    fn written_rows_round_trip_after_stop(database: Database) {
        let mut table = SqliteTable::new(database.path.clone(), "roads").expect("valid name");
        table.start().expect("start");
        table.write(&line_row(7)).expect("write");
        table.stop().expect("stop");

        assert!(!table.is_open());
        assert_eq!(table.rows(7).expect("read"), vec![line_row(7)]);
        assert_eq!(stored_count(&database.path, "roads"), 1);
    }

    #[rstest]
    fn delete_returns_extents_of_removed_rows(database: Database) {
        let mut table = SqliteTable::new(database.path.clone(), "roads").expect("valid name");
        table.start().expect("start");
        table.write(&line_row(7)).expect("write");
        table.write(&line_row(7)).expect("write");

        let extents = table.delete(7).expect("delete");
        let expected = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 1.0 });
        assert_eq!(extents, vec![expected, expected]);
        assert!(table.delete(7).expect("delete missing").is_empty());
        table.stop().expect("stop");
    }

    #[rstest]
    fn commit_makes_rows_visible_to_other_connections(database: Database) {
        let mut table = SqliteTable::new(database.path.clone(), "points").expect("valid name");
        table.start().expect("start");
        table
            .write(&Row {
                id: 3,
                columns: Columns::new(),
                geometry: Geometry::Point(Point::new(1.0, 2.0)),
            })
            .expect("write");
        table.commit().expect("commit");

        assert_eq!(stored_count(&database.path, "points"), 1);
        table.stop().expect("stop");
    }

    #[rstest]
    fn unstarted_handles_refuse_writes(database: Database) {
        let mut table = SqliteTable::new(database.path, "roads").expect("valid name");
        let err = table.write(&line_row(1)).expect_err("not started");
        assert!(matches!(err, WriteError::NotStarted { .. }));
    }

    #[rstest]
    fn clones_share_one_transaction(database: Database) {
        let mut table = SqliteTable::new(database.path.clone(), "roads").expect("valid name");
        table.start().expect("start");
        let mut worker = table.clone_writer();
        assert!(table.rows(8).expect("read").is_empty());

        worker.start().expect("start clone");
        worker.write(&line_row(8)).expect("write through clone");
        assert_eq!(table.rows(8).expect("read").len(), 1, "same connection");
        worker.stop().expect("stop clone");
        assert_eq!(stored_count(&database.path, "roads"), 0, "clone stop does not commit");

        assert!(table.is_open());
        table.write(&line_row(9)).expect("still writable");
        table.stop().expect("stop");
        assert_eq!(stored_count(&database.path, "roads"), 2);
    }

    #[rstest]
    fn commit_publishes_writes_of_stopped_clones(database: Database) {
        let mut table = SqliteTable::new(database.path.clone(), "roads").expect("valid name");
        table.start().expect("start");
        let mut first = table.clone_writer();
        let mut second = table.clone_writer();
        first.start().expect("start first clone");
        second.start().expect("start second clone");

        first.delete(5).expect("delete through first clone");
        first.write(&line_row(5)).expect("write through first clone");
        first.stop().expect("stop first clone");
        second.write(&line_row(6)).expect("write through second clone");
        assert_eq!(stored_count(&database.path, "roads"), 0);

        second.stop().expect("stop second clone");
        table.commit().expect("commit");
        assert_eq!(stored_count(&database.path, "roads"), 2);
        table.stop().expect("stop");
    }

    #[rstest]
    fn dropping_an_open_handle_rolls_back(database: Database) {
        {
            let mut table =
                SqliteTable::new(database.path.clone(), "roads").expect("valid name");
            table.start().expect("start");
            table.write(&line_row(4)).expect("write");
        }
        assert_eq!(stored_count(&database.path, "roads"), 0);
    }
}
