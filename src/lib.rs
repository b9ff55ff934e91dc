//! # CIMIS Fetch Library
//!
//! A concurrent multi-station fetcher for daily weather observations published by
//! the California Irrigation Management Information System (CIMIS) web API.
//!
//! ## Features
//!
//! - **Concurrent Fetching**: Fixed worker pool pulling stations off a pre-sized job queue
//! - **Streaming Decode**: Token-driven JSON decode straight into compact fixed-point records
//! - **Bounded Retries**: Exponential backoff with per-worker jitter and error classification
//! - **Idempotent Runs**: Stations whose chunk already exists are skipped without a request
//! - **Phase Timing**: Per-station connection, first-byte, read, decode and write timings
//! - **Reporting**: Human-readable or JSON summaries of every run
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cimis_fetch::downloader::{FetchConfig, FetchExecutor};
//! use cimis_fetch::fetcher::{cimis_http::CimisClient, DateRange};
//! use cimis_fetch::output::FileChunkStore;
//! use cimis_fetch::stations::resolve_stations;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stations = resolve_stations("2,5-7")?;
//! let range = DateRange::for_year(2024)?;
//!
//! let fetcher = Arc::new(CimisClient::new("my-app-key"));
//! let store = Arc::new(FileChunkStore::open("./data").await?);
//! let config = FetchConfig::new(range).with_concurrency(4);
//!
//! let executor = FetchExecutor::new(fetcher, store, config)?;
//! let results = executor.run(&stations).await;
//! println!("{} stations processed", results.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`stations`] - Station list parsing (`"2,5-7,10"`) and ordering
//! - [`fetcher`] - CIMIS HTTP client, streaming decoder and error classification
//! - [`downloader`] - Worker pool, retry state machine and per-station results
//! - [`output`] - Chunk storage contract with a CSV + JSON index implementation
//! - [`report`] - Run summaries rendered for humans or as JSON
//! - [`metrics`] - Prometheus metrics emission
//!
//! ## Record Layout
//!
//! [`DailyRecord`] keeps every measurement as a scaled integer:
//!
//! | Field | Unit | Scale |
//! |-------|------|-------|
//! | temperature | °C | ×10 |
//! | et | mm | ×100 |
//! | wind_speed | m/s | ×10 |
//! | humidity | % | ×1 |
//! | solar_radiation | MJ/m² | ×10 |
//! | precipitation | mm | ×100 |

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Fetch orchestration and retry
pub mod downloader;

/// CIMIS API access and decoding
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Chunk storage
pub mod output;

/// Run summaries
pub mod report;

/// Station list parsing
pub mod stations;

/// CIMIS weather station identifier
pub type StationId = u16;

/// First year representable by record timestamps
pub const EPOCH_YEAR: i32 = 1985;

/// Last year accepted by the fast date parser
pub const MAX_YEAR: i32 = 2100;

/// Quality-control flag bits, one per measurement
pub mod qc {
    /// Air temperature carries a QC code
    pub const TEMPERATURE: u8 = 0x01;
    /// Reference evapotranspiration carries a QC code
    pub const ET: u8 = 0x02;
    /// Wind speed carries a QC code
    pub const WIND_SPEED: u8 = 0x04;
    /// Relative humidity carries a QC code
    pub const HUMIDITY: u8 = 0x08;
    /// Solar radiation carries a QC code
    pub const SOLAR_RADIATION: u8 = 0x10;
    /// Precipitation carries a QC code
    pub const PRECIPITATION: u8 = 0x20;
}

/// One day of observations for one station, in fixed-point form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyRecord {
    /// Days since 1985-01-01
    pub timestamp: u32,
    /// Station the observation belongs to
    pub station_id: StationId,
    /// Average air temperature in tenths of °C
    pub temperature: i16,
    /// ASCE reference evapotranspiration in hundredths of mm
    pub et: i16,
    /// Average wind speed in tenths of m/s
    pub wind_speed: u16,
    /// Average relative humidity in percent
    pub humidity: u8,
    /// Average solar radiation in tenths of MJ/m²
    pub solar_radiation: u8,
    /// Precipitation in hundredths of mm
    pub precipitation: u16,
    /// Bitset of [`qc`] flags
    pub qc_flags: u8,
}

impl DailyRecord {
    /// Calendar date of this record
    pub fn date(&self) -> Option<NaiveDate> {
        date_from_days_since_epoch(self.timestamp)
    }

    /// Whether any of the given QC bits are set
    pub fn has_qc(&self, flag: u8) -> bool {
        self.qc_flags & flag != 0
    }

    /// Validate record invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.timestamp == 0 {
            return Err("timestamp must be after 1985-01-01".to_string());
        }
        if self.humidity > 100 {
            return Err(format!("humidity {} exceeds 100%", self.humidity));
        }
        if self.qc_flags & !0x3F != 0 {
            return Err(format!("unknown QC bits set: {:#04x}", self.qc_flags));
        }
        Ok(())
    }
}

fn epoch() -> NaiveDate {
    // 1985-01-01 is always representable
    NaiveDate::from_ymd_opt(EPOCH_YEAR, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Days between 1985-01-01 and `date`; negative for earlier dates
pub fn days_since_epoch(date: NaiveDate) -> i64 {
    date.signed_duration_since(epoch()).num_days()
}

/// Inverse of [`days_since_epoch`]
pub fn date_from_days_since_epoch(days: u32) -> Option<NaiveDate> {
    epoch().checked_add_days(chrono::Days::new(u64::from(days)))
}

/// Calendar year of a record timestamp
pub fn year_of(timestamp: u32) -> Option<i32> {
    date_from_days_since_epoch(timestamp).map(|d| d.year())
}

/// Scale °C to tenths, truncating and saturating to `i16`
pub fn scale_temperature(celsius: f64) -> i16 {
    (celsius * 10.0) as i16
}

/// Scale mm of ET to hundredths, truncating and saturating to `i16`
pub fn scale_et(mm: f64) -> i16 {
    (mm * 100.0) as i16
}

/// Scale m/s to tenths, truncating and saturating to `u16`
pub fn scale_wind_speed(mps: f64) -> u16 {
    (mps * 10.0) as u16
}

/// Relative humidity in whole percent
pub fn scale_humidity(percent: f64) -> u8 {
    percent as u8
}

/// Scale MJ/m² to tenths, truncating and saturating to `u8`
pub fn scale_solar_radiation(mj: f64) -> u8 {
    (mj * 10.0) as u8
}

/// Scale mm of precipitation to hundredths, truncating and saturating to `u16`
pub fn scale_precipitation(mm: f64) -> u16 {
    (mm * 100.0) as u16
}
