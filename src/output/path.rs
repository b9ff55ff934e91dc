//! Chunk path layout
//!
//! Chunks live in a per-station directory:
//! `<root>/stations/<station:03>/<year>_<data type>.csv`
//!
//! ```rust
//! use cimis_fetch::output::{ChunkPathBuilder, path::DataType};
//! use std::path::PathBuf;
//!
//! let path = ChunkPathBuilder::new(PathBuf::from("data"), 2)
//!     .with_year(2024)
//!     .with_data_type(DataType::Daily)
//!     .build();
//! assert_eq!(path, PathBuf::from("data/stations/002/2024_daily.csv"));
//! ```

use std::path::{Path, PathBuf};

pub use super::DataType;
use crate::StationId;

/// Directory under the data root holding station chunks
pub const STATIONS_DIR: &str = "stations";

/// Builder for chunk file paths
#[derive(Debug, Clone)]
pub struct ChunkPathBuilder {
    root: PathBuf,
    station_id: StationId,
    year: i32,
    data_type: DataType,
}

impl ChunkPathBuilder {
    /// Start a path for `station_id` under `root`
    pub fn new(root: PathBuf, station_id: StationId) -> Self {
        Self {
            root,
            station_id,
            year: crate::EPOCH_YEAR,
            data_type: DataType::Daily,
        }
    }

    /// Set the storage year
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    /// Set the data type
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Directory holding every chunk of the station
    pub fn station_dir(&self) -> PathBuf {
        station_dir(&self.root, self.station_id)
    }

    /// Chunk file name, e.g. `2024_daily.csv`
    pub fn filename(&self) -> String {
        format!("{}_{}.csv", self.year, self.data_type)
    }

    /// Full chunk path
    pub fn build(&self) -> PathBuf {
        self.station_dir().join(self.filename())
    }
}

/// Directory for one station's chunks
pub fn station_dir(root: &Path, station_id: StationId) -> PathBuf {
    root.join(STATIONS_DIR).join(format!("{station_id:03}"))
}
