//! CSV chunk writer

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::path::{ChunkPathBuilder, DataType};
use super::{ChunkInfo, OutputError, OutputResult};
use crate::{days_since_epoch, DailyRecord, StationId};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

const DATE_FORMAT: &str = "%Y-%m-%d";

/// CSV row for a daily record; measurements stay in fixed-point units
#[derive(Debug, Serialize, Deserialize)]
struct DailyCsvRecord {
    date: String,
    station_id: StationId,
    temperature_x10: i16,
    et_x100: i16,
    wind_speed_x10: u16,
    humidity: u8,
    solar_radiation_x10: u8,
    precipitation_x100: u16,
    qc_flags: u8,
}

impl From<&DailyRecord> for DailyCsvRecord {
    fn from(r: &DailyRecord) -> Self {
        Self {
            date: r
                .date()
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            station_id: r.station_id,
            temperature_x10: r.temperature,
            et_x100: r.et,
            wind_speed_x10: r.wind_speed,
            humidity: r.humidity,
            solar_radiation_x10: r.solar_radiation,
            precipitation_x100: r.precipitation,
            qc_flags: r.qc_flags,
        }
    }
}

impl TryFrom<DailyCsvRecord> for DailyRecord {
    type Error = OutputError;

    fn try_from(row: DailyCsvRecord) -> Result<Self, Self::Error> {
        let date = chrono::NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
            .map_err(|e| OutputError::CsvError(format!("invalid date '{}': {e}", row.date)))?;
        let timestamp = u32::try_from(days_since_epoch(date))
            .map_err(|_| OutputError::CsvError(format!("date before epoch: {}", row.date)))?;
        Ok(DailyRecord {
            timestamp,
            station_id: row.station_id,
            temperature: row.temperature_x10,
            et: row.et_x100,
            wind_speed: row.wind_speed_x10,
            humidity: row.humidity,
            solar_radiation: row.solar_radiation_x10,
            precipitation: row.precipitation_x100,
            qc_flags: row.qc_flags,
        })
    }
}

/// Writes one CSV file per (station, year)
///
/// Files are written to a temporary sibling and renamed into place, so a
/// chunk path never holds a partial file.
#[derive(Debug, Clone)]
pub struct CsvChunkWriter {
    root: PathBuf,
    buffer_size: usize,
}

impl CsvChunkWriter {
    /// Create a writer rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Data root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the daily chunk for (station, year)
    pub fn chunk_path(&self, station: StationId, year: i32) -> PathBuf {
        ChunkPathBuilder::new(self.root.clone(), station)
            .with_year(year)
            .with_data_type(DataType::Daily)
            .build()
    }

    /// Write a station's daily records, replacing any existing chunk
    pub fn write_daily_chunk(
        &self,
        station: StationId,
        year: i32,
        records: &[DailyRecord],
    ) -> OutputResult<ChunkInfo> {
        let path = self.chunk_path(station, year);
        let parent = path
            .parent()
            .ok_or_else(|| OutputError::IoError(format!("No parent for {}", path.display())))?;
        std::fs::create_dir_all(parent).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to create directory {}: {e}",
                parent.display()
            ))
        })?;

        // Each write gets its own temp file; it is removed on drop if never persisted
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{year}_daily."))
            .suffix(".csv.tmp")
            .tempfile_in(parent)
            .map_err(|e| {
                OutputError::IoError(format!(
                    "Failed to create temp file in {}: {e}",
                    parent.display()
                ))
            })?;
        self.write_rows(tmp.as_file(), records)?;

        tmp.persist(&path).map_err(|e| {
            OutputError::IoError(format!("Failed to move chunk into place: {}", e.error))
        })?;

        let bytes_written = std::fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| OutputError::IoError(e.to_string()))?;

        debug!(
            station_id = station,
            year,
            records = records.len(),
            bytes = bytes_written,
            path = %path.display(),
            "wrote daily chunk"
        );

        Ok(ChunkInfo {
            station_id: station,
            year,
            data_type: DataType::Daily,
            path,
            record_count: records.len(),
            bytes_written,
        })
    }

    fn write_rows(&self, file: &File, records: &[DailyRecord]) -> OutputResult<()> {
        let mut writer = Writer::from_writer(BufWriter::with_capacity(self.buffer_size, file));

        for record in records {
            writer
                .serialize(DailyCsvRecord::from(record))
                .map_err(|e| OutputError::CsvError(e.to_string()))?;
        }

        let mut inner = writer
            .into_inner()
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        inner
            .flush()
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        inner
            .get_ref()
            .sync_all()
            .map_err(|e| OutputError::IoError(e.to_string()))
    }
}

/// Read a daily chunk back into records
pub fn read_daily_chunk(path: &Path) -> OutputResult<Vec<DailyRecord>> {
    let file = File::open(path).map_err(|e| {
        OutputError::IoError(format!("Failed to open {}: {e}", path.display()))
    })?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader
        .deserialize::<DailyCsvRecord>()
        .map(|row| {
            row.map_err(|e| OutputError::CsvError(e.to_string()))
                .and_then(DailyRecord::try_from)
        })
        .collect()
}
