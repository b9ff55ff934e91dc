//! CIMIS data fetchers
//!
//! - [`cimis_http`] - HTTP client issuing one request per station and date range
//! - [`cimis_parser`] - Streaming decoder from the API JSON into [`DailyRecord`]s
//! - [`retry_formatter`] - Retryable/terminal error classification and retry messages
//! - [`shared_resources`] - Process-wide HTTP client

use crate::{DailyRecord, StationId};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::time::Duration;

pub mod cimis_http;
pub mod cimis_parser;
pub mod retry_formatter;
pub mod shared_resources;

/// Date format used by the CIMIS API query parameters
pub const CIMIS_DATE_FORMAT: &str = "%m/%d/%Y";

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Transport failure before an HTTP status was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-200 HTTP response
    #[error("API returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Malformed JSON or unexpected document shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetcherError {
    /// HTTP status code carried by the error, 0 when none was received
    pub fn status_code(&self) -> u16 {
        match self {
            FetcherError::HttpStatus { status, .. } => *status,
            _ => 0,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Inclusive date range for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> FetcherResult<Self> {
        if start > end {
            return Err(FetcherError::InvalidRequest(format!(
                "start date {} is after end date {}",
                format_cimis_date(start),
                format_cimis_date(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// January 1st through December 31st of `year`
    pub fn for_year(year: i32) -> FetcherResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| FetcherError::InvalidRequest(format!("invalid year {year}")))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| FetcherError::InvalidRequest(format!("invalid year {year}")))?;
        Self::new(start, end)
    }

    /// Parse a range from two `MM/DD/YYYY` strings
    pub fn parse(start: &str, end: &str) -> FetcherResult<Self> {
        Self::new(parse_cimis_date(start)?, parse_cimis_date(end)?)
    }

    /// First day of the range
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Storage period the range belongs to (year of the start date)
    pub fn year(&self) -> i32 {
        self.start.year()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            format_cimis_date(self.start),
            format_cimis_date(self.end)
        )
    }
}

/// Format a date as `MM/DD/YYYY`
pub fn format_cimis_date(date: NaiveDate) -> String {
    date.format(CIMIS_DATE_FORMAT).to_string()
}

/// Parse a `MM/DD/YYYY` date
pub fn parse_cimis_date(input: &str) -> FetcherResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), CIMIS_DATE_FORMAT)
        .map_err(|e| FetcherError::InvalidRequest(format!("invalid date '{input}': {e}")))
}

/// Phase timings and counters for a single fetch attempt
///
/// `connection_setup` covers everything between sending the request and
/// receiving response headers (name resolution, TCP and TLS together); the
/// HTTP stack does not expose those sub-phases separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchMetrics {
    /// Request sent until response headers arrived
    pub connection_setup: Duration,
    /// Attempt start until response headers arrived
    pub time_to_first_byte: Duration,
    /// Time spent streaming the response body
    pub body_read: Duration,
    /// Time spent decoding the body into records
    pub json_decode: Duration,
    /// Wall time of the whole attempt
    pub total_duration: Duration,
    /// Records kept after decoding
    pub records_fetched: usize,
    /// Response body size in bytes
    pub bytes_transferred: u64,
}

impl fmt::Display for FetchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connect={:?} ttfb={:?} read={:?} decode={:?} total={:?} records={} bytes={}",
            self.connection_setup,
            self.time_to_first_byte,
            self.body_read,
            self.json_decode,
            self.total_duration,
            self.records_fetched,
            self.bytes_transferred
        )
    }
}

/// Source of daily station records
#[async_trait]
pub trait StationFetcher: Send + Sync {
    /// Fetch and decode daily records for one station over a date range
    ///
    /// # Errors
    /// Returns [`FetcherError`] on transport, HTTP status or decode failures
    async fn fetch_daily(
        &self,
        station: StationId,
        range: &DateRange,
    ) -> FetcherResult<(Vec<DailyRecord>, FetchMetrics)>;
}
