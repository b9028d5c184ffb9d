//! Errors raised by the SQLite store.

use camino::Utf8PathBuf;
use thiserror::Error;
use waymark_core::OsmId;

/// Errors raised while opening, writing or reading a SQLite table.
///
/// [`RowWriter`](waymark_core::RowWriter) methods wrap these in
/// [`WriteError::Backend`](waymark_core::WriteError::Backend).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table name cannot be used as an unquoted SQL identifier.
    #[error("table name {name:?} must be ASCII letters, digits and underscores")]
    InvalidTableName {
        /// Rejected table name.
        name: String,
    },
    /// Failed to create the parent directory for the database file.
    #[error("failed to create parent directory {path}")]
    CreateDirectory {
        /// Path of the directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A statement against the table failed.
    #[error("SQLite statement on table {table} failed")]
    Database {
        /// Destination table name.
        table: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Serializing a row's columns to JSON failed.
    #[error("failed to encode columns for feature {id}")]
    EncodeColumns {
        /// Row id.
        id: OsmId,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Stored columns were not valid JSON.
    #[error("failed to decode columns for feature {id}")]
    DecodeColumns {
        /// Row id.
        id: OsmId,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing a row's geometry failed.
    #[error("failed to encode geometry for feature {id}")]
    EncodeGeometry {
        /// Row id.
        id: OsmId,
        /// Source error produced by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// Stored geometry could not be decoded.
    #[error("failed to decode geometry for feature {id}")]
    DecodeGeometry {
        /// Row id.
        id: OsmId,
        /// Source error produced by `bincode`.
        #[source]
        source: bincode::Error,
    },
}
