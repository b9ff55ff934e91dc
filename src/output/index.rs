//! JSON index of persisted chunks
//!
//! The index lives at `<root>/metadata.json` and maps `station/year/type`
//! keys to [`ChunkInfo`] entries. Every update rewrites the file through a
//! temporary sibling and a rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChunkInfo, DataType, OutputError, OutputResult};
use crate::StationId;

/// File name of the index under the data root
pub const INDEX_FILE_NAME: &str = "metadata.json";

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    #[serde(flatten)]
    info: ChunkInfo,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    chunks: BTreeMap<String, IndexEntry>,
}

fn chunk_key(station: StationId, year: i32, data_type: DataType) -> String {
    format!("{station:03}/{year}/{data_type}")
}

/// Chunk index shared by all workers
#[derive(Debug)]
pub struct ChunkIndex {
    path: PathBuf,
    state: Mutex<IndexFile>,
}

impl ChunkIndex {
    /// Load the index at `path`, starting empty when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> OutputResult<Self> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<IndexFile>(&bytes).map_err(|e| {
                OutputError::IndexError(format!("corrupt index {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexFile {
                version: INDEX_VERSION,
                chunks: BTreeMap::new(),
            },
            Err(e) => {
                return Err(OutputError::IoError(format!(
                    "Failed to read index {}: {e}",
                    path.display()
                )))
            }
        };

        if state.version != INDEX_VERSION {
            warn!(
                found = state.version,
                expected = INDEX_VERSION,
                "index version mismatch; entries will be rewritten on next update"
            );
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Index file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a chunk is recorded
    pub fn contains(&self, station: StationId, year: i32, data_type: DataType) -> bool {
        self.state
            .lock()
            .map(|s| s.chunks.contains_key(&chunk_key(station, year, data_type)))
            .unwrap_or(false)
    }

    /// Recorded chunk, if any
    pub fn get(&self, station: StationId, year: i32, data_type: DataType) -> Option<ChunkInfo> {
        let state = self.state.lock().ok()?;
        state
            .chunks
            .get(&chunk_key(station, year, data_type))
            .map(|e| e.info.clone())
    }

    /// Number of recorded chunks
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.chunks.len()).unwrap_or(0)
    }

    /// True when no chunks are recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add or replace an entry and persist the index
    pub fn record(&self, info: ChunkInfo) -> OutputResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| OutputError::IndexError("index lock poisoned".to_string()))?;

        let key = chunk_key(info.station_id, info.year, info.data_type);
        state.version = INDEX_VERSION;
        state.chunks.insert(
            key.clone(),
            IndexEntry {
                info,
                updated_at: Utc::now(),
            },
        );

        // Written while holding the lock so concurrent updates serialize
        self.persist(&state)?;
        debug!(key = %key, entries = state.chunks.len(), "index updated");
        Ok(())
    }

    fn persist(&self, state: &IndexFile) -> OutputResult<()> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| {
            OutputError::IoError(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            OutputError::IoError(format!("Failed to replace index: {e}"))
        })
    }
}
