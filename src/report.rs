//! Run summaries
//!
//! [`FetchSummary`] aggregates the results of one run. The same summary
//! renders as a human-readable report or as a JSON document.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::downloader::{StationFetchResult, TimingsMs};
use crate::StationId;

/// Aggregated outcome of a multi-station run
#[derive(Debug, Clone)]
pub struct FetchSummary {
    /// When the summary was built
    pub timestamp: DateTime<Utc>,
    /// Per-station results ordered by station id
    pub results: Vec<StationFetchResult>,
    /// Stations in the run
    pub total_stations: usize,
    /// Stations reported as success (fetched or skipped)
    pub successful: usize,
    /// Failed stations
    pub failed: usize,
    /// Stations skipped because their chunk already existed
    pub skipped: usize,
    /// Records decoded across all stations
    pub total_records: u64,
    /// Response bytes across all stations
    pub total_bytes: u64,
    /// Wall time of the whole run
    pub wall_time: Duration,
}

/// Serialized per-station entry
#[derive(Debug, Serialize)]
pub struct StationReport {
    /// Station id
    pub station_id: StationId,
    /// Storage period
    pub year: i32,
    /// Fetched (or skipped) successfully
    pub success: bool,
    /// Chunk already existed
    pub skipped: bool,
    /// Records decoded
    pub records: usize,
    /// Attempts made
    pub attempts: u32,
    /// Terminal error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Response body bytes
    pub bytes_transferred: u64,
    /// Phase timings in milliseconds
    pub timings: TimingsMs,
}

impl From<&StationFetchResult> for StationReport {
    fn from(r: &StationFetchResult) -> Self {
        Self {
            station_id: r.station_id,
            year: r.year,
            success: r.success,
            skipped: r.skipped,
            records: r.record_count,
            attempts: r.attempts,
            error: r.error.clone(),
            bytes_transferred: r.bytes_transferred,
            timings: r.timings_ms(),
        }
    }
}

/// Serialized summary document
#[derive(Debug, Serialize)]
pub struct SummaryReport {
    /// RFC 3339 creation time
    pub timestamp: String,
    /// Stations in the run
    pub total_stations: usize,
    /// Successful stations
    pub successful: usize,
    /// Failed stations
    pub failed: usize,
    /// Skipped stations
    pub skipped: usize,
    /// Records decoded
    pub total_records: u64,
    /// Response bytes
    pub total_bytes: u64,
    /// Run wall time in milliseconds
    pub wall_time_ms: u64,
    /// Per-station entries
    pub results: Vec<StationReport>,
}

impl FetchSummary {
    /// Aggregate results in arrival order
    pub fn from_results(mut results: Vec<StationFetchResult>, wall_time: Duration) -> Self {
        // Stable, so duplicate stations keep arrival order
        results.sort_by_key(|r| r.station_id);

        let successful = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let total_records = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.record_count as u64)
            .sum();
        let total_bytes = results.iter().map(|r| r.bytes_transferred).sum();

        Self {
            timestamp: Utc::now(),
            total_stations: results.len(),
            successful,
            failed: results.len() - successful,
            skipped,
            total_records,
            total_bytes,
            wall_time,
            results,
        }
    }

    /// Failed results
    pub fn failures(&self) -> impl Iterator<Item = &StationFetchResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Whether any station failed
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Multi-section plain-text report
    pub fn render_human(&self, perf: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Fetch Summary ===");
        let _ = writeln!(out, "Stations:      {}", self.total_stations);
        let _ = writeln!(out, "Successful:    {}", self.successful);
        let _ = writeln!(out, "Skipped:       {}", self.skipped);
        let _ = writeln!(out, "Failed:        {}", self.failed);
        let _ = writeln!(out, "Total records: {}", self.total_records);
        let _ = writeln!(out, "Transferred:   {}", format_bytes(self.total_bytes));
        let _ = writeln!(out, "Wall time:     {:.2}s", self.wall_time.as_secs_f64());

        if perf {
            let _ = writeln!(out);
            let _ = writeln!(out, "=== Performance Breakdown ===");
            for r in self.results.iter().filter(|r| r.success && !r.skipped) {
                let t = r.timings_ms();
                let _ = writeln!(out, "Station {} ({}):", r.station_id, r.year);
                let _ = writeln!(out, "  Records:          {}", r.record_count);
                let _ = writeln!(out, "  Connect (approx): {} ms", t.connect_ms);
                let _ = writeln!(out, "  TTFB:             {} ms", t.ttfb_ms);
                let _ = writeln!(out, "  Read:             {} ms", t.read_ms);
                let _ = writeln!(out, "  Decode:           {} ms", t.decode_ms);
                let _ = writeln!(out, "  Write:            {} ms", t.write_ms);
                let _ = writeln!(out, "  Total:            {} ms", t.total_ms);
                let _ = writeln!(out, "  Attempts:         {}", r.attempts);
            }
        }

        if self.has_failures() {
            let _ = writeln!(out);
            let _ = writeln!(out, "=== Failed Stations ===");
            for r in self.failures() {
                let _ = writeln!(
                    out,
                    "Station {}: {} (after {} attempt(s))",
                    r.station_id,
                    r.error.as_deref().unwrap_or("unknown error"),
                    r.attempts
                );
            }
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "WARNING: {} of {} stations failed; rerun to retry only the missing stations",
                self.failed, self.total_stations
            );
        }

        out
    }

    /// Serializable summary document
    pub fn to_json(&self) -> SummaryReport {
        SummaryReport {
            timestamp: self.timestamp.to_rfc3339(),
            total_stations: self.total_stations,
            successful: self.successful,
            failed: self.failed,
            skipped: self.skipped,
            total_records: self.total_records,
            total_bytes: self.total_bytes,
            wall_time_ms: u64::try_from(self.wall_time.as_millis()).unwrap_or(u64::MAX),
            results: self.results.iter().map(StationReport::from).collect(),
        }
    }

    /// Pretty-printed JSON summary
    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_json())
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}
