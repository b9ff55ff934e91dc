//! Chunk storage
//!
//! The fetch pipeline persists each station's records as one chunk per
//! (station, year) through the [`ChunkStore`] contract. [`FileChunkStore`] is
//! the bundled implementation: a CSV file per chunk plus a JSON index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DailyRecord, StationId};

pub mod csv;
pub mod index;
pub mod path;

pub use self::csv::CsvChunkWriter;
pub use self::index::ChunkIndex;
pub use self::path::ChunkPathBuilder;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Index error
    #[error("index error: {0}")]
    IndexError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Kind of data held by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Daily station observations
    Daily,
}

impl DataType {
    /// Lowercase name used in paths and index keys
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Daily => "daily",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a persisted chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Station the chunk belongs to
    pub station_id: StationId,
    /// Storage period
    pub year: i32,
    /// Kind of data
    pub data_type: DataType,
    /// Chunk location
    pub path: PathBuf,
    /// Records stored
    pub record_count: usize,
    /// File size in bytes
    pub bytes_written: u64,
}

/// Storage collaborator used by the fetch workers
///
/// Implementations are shared by every worker and must tolerate concurrent calls.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Whether a chunk for (station, year) is already stored
    async fn exists(&self, station: StationId, year: i32) -> OutputResult<bool>;

    /// Persist a station's records for a year
    async fn write(
        &self,
        station: StationId,
        year: i32,
        records: &[DailyRecord],
    ) -> OutputResult<ChunkInfo>;

    /// Record a written chunk in the index
    async fn record_index(&self, info: &ChunkInfo) -> OutputResult<()>;
}

/// CSV chunks under `<root>/stations/` indexed by `<root>/metadata.json`
#[derive(Clone)]
pub struct FileChunkStore {
    writer: Arc<CsvChunkWriter>,
    index: Arc<ChunkIndex>,
}

impl FileChunkStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> OutputResult<Self> {
        let root = root.into();
        tokio::task::spawn_blocking(move || Self::open_blocking(&root))
            .await
            .map_err(|e| OutputError::IoError(format!("store open task failed: {e}")))?
    }

    fn open_blocking(root: &Path) -> OutputResult<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            OutputError::IoError(format!("Failed to create data directory {}: {e}", root.display()))
        })?;
        let writer = CsvChunkWriter::new(root);
        let index = ChunkIndex::open(root.join(index::INDEX_FILE_NAME))?;
        Ok(Self {
            writer: Arc::new(writer),
            index: Arc::new(index),
        })
    }

    /// Data root
    pub fn root(&self) -> &Path {
        self.writer.root()
    }

    /// Index backing this store
    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }
}

#[async_trait]
impl ChunkStore for FileChunkStore {
    async fn exists(&self, station: StationId, year: i32) -> OutputResult<bool> {
        let writer = Arc::clone(&self.writer);
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || {
            Ok(index.contains(station, year, DataType::Daily)
                && writer.chunk_path(station, year).is_file())
        })
        .await
        .map_err(|e| OutputError::IoError(format!("exists task failed: {e}")))?
    }

    async fn write(
        &self,
        station: StationId,
        year: i32,
        records: &[DailyRecord],
    ) -> OutputResult<ChunkInfo> {
        let writer = Arc::clone(&self.writer);
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || writer.write_daily_chunk(station, year, &records))
            .await
            .map_err(|e| OutputError::IoError(format!("write task failed: {e}")))?
    }

    async fn record_index(&self, info: &ChunkInfo) -> OutputResult<()> {
        let index = Arc::clone(&self.index);
        let info = info.clone();
        tokio::task::spawn_blocking(move || index.record(info))
            .await
            .map_err(|e| OutputError::IoError(format!("index task failed: {e}")))?
    }
}
