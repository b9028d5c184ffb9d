//! JSON import configuration.
//!
//! The configuration names each destination table, the geometry family it
//! stores, the tag keys it exports and its tile invalidation policy.
//!
//! ```json
//! {
//!   "workers": 4,
//!   "bbox": { "min_lon": 13.0, "min_lat": 52.3, "max_lon": 13.8, "max_lat": 52.7 },
//!   "tables": [
//!     { "name": "roads", "kind": "line", "columns": ["highway", "name"] },
//!     { "name": "areas", "kind": "polygon", "columns": ["landuse"],
//!       "polygon_keys": ["landuse"], "expire": { "min_zoom": 12, "max_zoom": 14 } }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::io::BufReader;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use serde::Deserialize;
use thiserror::Error;
use waymark_core::{Cardinality, ExpireConfig, FeatureLookup, RowWriter, TableKind};
use waymark_geometry::GeoBuilder;

use crate::{KeyFilterTransform, MultiOutput};

/// Errors raised while loading an [`ImportConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be opened.
    #[error("failed to open configuration at {path}")]
    Open {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid JSON for this schema.
    #[error("failed to parse configuration")]
    Parse {
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A table has an empty name.
    #[error("table names must not be empty")]
    EmptyTableName,
    /// Two tables share a name.
    #[error("table {name} is configured more than once")]
    DuplicateTable {
        /// Repeated table name.
        name: String,
    },
    /// The bounding box is inverted or outside WGS84 ranges.
    #[error("bounding box is invalid")]
    InvalidBoundingBox,
}

/// WGS84 bounding box used to filter incoming nodes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    /// Western edge in degrees.
    pub min_lon: f64,
    /// Southern edge in degrees.
    pub min_lat: f64,
    /// Eastern edge in degrees.
    pub max_lon: f64,
    /// Northern edge in degrees.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Report whether `lat`/`lon` lies inside the box, edges included.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    fn is_valid(&self) -> bool {
        let lon = -180.0..=180.0;
        let lat = -90.0..=90.0;
        lon.contains(&self.min_lon)
            && lon.contains(&self.max_lon)
            && lat.contains(&self.min_lat)
            && lat.contains(&self.max_lat)
            && self.min_lon <= self.max_lon
            && self.min_lat <= self.max_lat
    }
}

/// One destination table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableConfig {
    /// Destination table name.
    pub name: String,
    /// Geometry family stored by the table.
    #[serde(default)]
    pub kind: TableKind,
    /// Tag keys exported as columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Keys that turn a closed way into an area.
    #[serde(default)]
    pub polygon_keys: Vec<String>,
    /// Combine multi-part relation geometries into one row.
    #[serde(default = "default_multi_geometry")]
    pub multi_geometry: bool,
    /// Tile invalidation policy.
    #[serde(default)]
    pub expire: ExpireConfig,
}

const fn default_multi_geometry() -> bool {
    true
}

const fn default_workers() -> usize {
    1
}

impl TableConfig {
    /// Row cardinality implied by [`TableConfig::multi_geometry`].
    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        if self.multi_geometry {
            Cardinality::Single
        } else {
            Cardinality::PerComponent
        }
    }

    /// Key filter built from this table's column and polygon keys.
    #[must_use]
    pub fn transform(&self) -> KeyFilterTransform {
        KeyFilterTransform::new(self.columns.iter().cloned(), self.polygon_keys.iter().cloned())
            .with_cardinality(self.cardinality())
    }

    /// Build the output processor for this table.
    #[must_use]
    pub fn output(&self, writer: Box<dyn RowWriter>, lookup: Arc<dyn FeatureLookup>) -> MultiOutput {
        MultiOutput::new(
            self.name.clone(),
            Arc::new(GeoBuilder::new(self.kind)),
            Box::new(self.transform()),
            writer,
            lookup,
            self.expire,
        )
    }
}

/// Complete import configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportConfig {
    /// Destination tables.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    /// Drain worker threads. Values below two drain sequentially.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Nodes outside this box are ignored.
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            workers: default_workers(),
            bbox: None,
        }
    }
}

impl ImportConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read, is not valid
    /// JSON for this schema, or fails validation.
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let file = fs_utf8::File::open_ambient(path, ambient_authority()).map_err(|source| {
            ConfigError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the document is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Check table names and the bounding box.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(ConfigError::EmptyTableName);
            }
            if !seen.insert(table.name.as_str()) {
                return Err(ConfigError::DuplicateTable {
                    name: table.name.clone(),
                });
            }
        }
        if self.bbox.is_some_and(|bbox| !bbox.is_valid()) {
            return Err(ConfigError::InvalidBoundingBox);
        }
        Ok(())
    }
}
