//! Station jobs and per-station results

use std::time::Duration;

use serde::Serialize;

use crate::fetcher::FetchMetrics;
use crate::StationId;

/// One unit of work for the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationJob {
    /// Station to fetch
    pub station_id: StationId,
}

impl StationJob {
    /// Create a job for a station
    pub fn new(station_id: StationId) -> Self {
        Self { station_id }
    }
}

/// Phase timings of the successful attempt plus persistence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Approximate connection setup (lookup, TCP and TLS together)
    pub connection_setup: Duration,
    /// Attempt start until response headers
    pub time_to_first_byte: Duration,
    /// Body streaming
    pub body_read: Duration,
    /// JSON decode
    pub json_decode: Duration,
    /// Chunk write plus index update
    pub write: Duration,
}

impl From<&FetchMetrics> for PhaseTimings {
    fn from(m: &FetchMetrics) -> Self {
        Self {
            connection_setup: m.connection_setup,
            time_to_first_byte: m.time_to_first_byte,
            body_read: m.body_read,
            json_decode: m.json_decode,
            write: Duration::ZERO,
        }
    }
}

/// Timings in whole milliseconds, as emitted in JSON summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimingsMs {
    /// Approximate connection setup
    pub connect_ms: u64,
    /// Time to first byte
    pub ttfb_ms: u64,
    /// Body read
    pub read_ms: u64,
    /// JSON decode
    pub decode_ms: u64,
    /// Persistence
    pub write_ms: u64,
    /// Whole station
    pub total_ms: u64,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Outcome of one station job; exactly one is produced per job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFetchResult {
    /// Station this result belongs to
    pub station_id: StationId,
    /// Storage period (year) the station was fetched for
    pub year: i32,
    /// Fetched (and persisted, unless dry-run) or skipped
    pub success: bool,
    /// Chunk already existed; no request was made
    pub skipped: bool,
    /// Records decoded
    pub record_count: usize,
    /// Fetch attempts made
    pub attempts: u32,
    /// Phase timings of the last successful attempt
    pub timings: PhaseTimings,
    /// Response body bytes of the last successful attempt
    pub bytes_transferred: u64,
    /// Wall time spent on the station, including retries
    pub total_time: Duration,
    /// Terminal error when `success` is false
    pub error: Option<String>,
}

impl StationFetchResult {
    /// Result for a station whose chunk already exists
    pub fn skipped(station_id: StationId, year: i32, total_time: Duration) -> Self {
        Self {
            station_id,
            year,
            success: true,
            skipped: true,
            record_count: 0,
            attempts: 0,
            timings: PhaseTimings::default(),
            bytes_transferred: 0,
            total_time,
            error: None,
        }
    }

    /// Result for a successful fetch
    pub fn fetched(station_id: StationId, year: i32, attempts: u32, metrics: &FetchMetrics) -> Self {
        Self {
            station_id,
            year,
            success: true,
            skipped: false,
            record_count: metrics.records_fetched,
            attempts,
            timings: PhaseTimings::from(metrics),
            bytes_transferred: metrics.bytes_transferred,
            total_time: metrics.total_duration,
            error: None,
        }
    }

    /// Result for a station that could not be completed
    pub fn failed(
        station_id: StationId,
        year: i32,
        attempts: u32,
        error: impl Into<String>,
        total_time: Duration,
    ) -> Self {
        Self {
            station_id,
            year,
            success: false,
            skipped: false,
            record_count: 0,
            attempts,
            timings: PhaseTimings::default(),
            bytes_transferred: 0,
            total_time,
            error: Some(error.into()),
        }
    }

    /// Mark a fetched result as failed (e.g. persistence error), keeping its timings
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error.into());
    }

    /// Timings rounded to milliseconds
    pub fn timings_ms(&self) -> TimingsMs {
        TimingsMs {
            connect_ms: millis(self.timings.connection_setup),
            ttfb_ms: millis(self.timings.time_to_first_byte),
            read_ms: millis(self.timings.body_read),
            decode_ms: millis(self.timings.json_decode),
            write_ms: millis(self.timings.write),
            total_ms: millis(self.total_time),
        }
    }
}
