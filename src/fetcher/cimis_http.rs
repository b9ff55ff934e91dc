//! CIMIS HTTP client
//!
//! Issues one `GET` per (station, date range), streams the body while timing
//! each phase, then hands the buffer to [`CimisParser`]. Retrying is left to
//! the caller so that every attempt reports its own [`FetchMetrics`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::fetcher::cimis_parser::CimisParser;
use crate::fetcher::shared_resources::global_http_client;
use crate::fetcher::{
    format_cimis_date, DateRange, FetchMetrics, FetcherError, FetcherResult, StationFetcher,
};
use crate::metrics::HttpRequestMetrics;
use crate::{DailyRecord, StationId};

/// Production CIMIS data endpoint
pub const DEFAULT_BASE_URL: &str = "http://et.water.ca.gov/api/data";

/// Daily measurements requested for every station
pub const DAILY_DATA_ITEMS: &str = "day-air-tmp-avg,day-asce-eto,day-wind-spd-avg,day-rel-hum-avg,day-sol-rad-avg,day-precip";

/// Maximum number of bytes of an error body kept in [`FetcherError::HttpStatus`]
pub const ERROR_BODY_LIMIT: usize = 512;

/// HTTP client for the CIMIS daily data API
#[derive(Clone)]
pub struct CimisClient {
    client: Arc<Client>,
    base_url: String,
    app_key: String,
}

impl CimisClient {
    /// Create a client using the shared global HTTP client
    pub fn new(app_key: impl Into<String>) -> Self {
        Self::with_client(global_http_client(), app_key)
    }

    /// Create a client around an existing HTTP client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `app_key` - CIMIS application key sent with every request
    pub fn with_client(client: Arc<Client>, app_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            app_key: app_key.into(),
        }
    }

    /// Point the client at a different endpoint (mirrors, mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Endpoint requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query parameters for a daily data request
    pub fn query_params(&self, station: StationId, range: &DateRange) -> Vec<(&'static str, String)> {
        vec![
            ("appKey", self.app_key.clone()),
            ("targets", station.to_string()),
            ("startDate", format_cimis_date(range.start())),
            ("endDate", format_cimis_date(range.end())),
            ("dataItems", DAILY_DATA_ITEMS.to_string()),
            ("unitOfMeasure", "M".to_string()),
        ]
    }

    /// Fetch and decode one station's daily records, timing every phase
    ///
    /// # Errors
    /// - [`FetcherError::Transport`] when no HTTP status was received or the body read failed
    /// - [`FetcherError::HttpStatus`] for any non-200 response (no decode is attempted)
    /// - [`FetcherError::Decode`] when the body is not a CIMIS data document
    pub async fn fetch_daily_streaming(
        &self,
        station: StationId,
        range: &DateRange,
    ) -> FetcherResult<(Vec<DailyRecord>, FetchMetrics)> {
        let attempt_start = Instant::now();
        let mut metrics = FetchMetrics::default();
        let params = self.query_params(station, range);
        let request_metrics = HttpRequestMetrics::start("daily", station);

        debug!(station_id = station, range = %range, "Requesting daily data");

        let send_start = Instant::now();
        let response = match self.client.get(&self.base_url).query(&params).send().await {
            Ok(response) => response,
            Err(e) => {
                request_metrics.record_network_error();
                if e.is_builder() {
                    return Err(FetcherError::InvalidRequest(error_chain(&e)));
                }
                return Err(FetcherError::Transport(describe_transport_error(&e)));
            }
        };
        let headers_at = Instant::now();
        metrics.connection_setup = headers_at.duration_since(send_start);
        metrics.time_to_first_byte = headers_at.duration_since(attempt_start);

        let status = response.status();
        request_metrics.record_complete(status.as_u16());

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetcherError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(body.trim(), ERROR_BODY_LIMIT),
            });
        }

        let read_start = Instant::now();
        let capacity = response.content_length().unwrap_or(0).min(16 * 1024 * 1024) as usize;
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetcherError::Transport(describe_transport_error(&e)))?;
            body.extend_from_slice(&chunk);
        }
        metrics.body_read = read_start.elapsed();
        metrics.bytes_transferred = body.len() as u64;

        let decode_start = Instant::now();
        let records = CimisParser::decode_daily(&body, station)?;
        metrics.json_decode = decode_start.elapsed();

        metrics.records_fetched = records.len();
        metrics.total_duration = attempt_start.elapsed();

        debug!(station_id = station, metrics = %metrics, "Daily data decoded");

        Ok((records, metrics))
    }
}

#[async_trait]
impl StationFetcher for CimisClient {
    async fn fetch_daily(
        &self,
        station: StationId,
        range: &DateRange,
    ) -> FetcherResult<(Vec<DailyRecord>, FetchMetrics)> {
        self.fetch_daily_streaming(station, range).await
    }
}

/// Render an error with its whole source chain
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Describe a reqwest failure so the retry classifier can recognise it
///
/// OS-level causes ("Connection refused", "Connection reset by peer") already
/// appear in the source chain; timeouts, failed lookups and truncated bodies
/// get an explicit prefix.
fn describe_transport_error(err: &reqwest::Error) -> String {
    let chain = error_chain(err);
    let lower = chain.to_ascii_lowercase();

    if err.is_timeout() {
        format!("timeout: {chain}")
    } else if lower.contains("dns error") || lower.contains("failed to lookup address") {
        format!("no such host: {chain}")
    } else if err.is_body() || err.is_decode() {
        format!("unexpected EOF while reading body: {chain}")
    } else if lower.contains("connection closed") {
        format!("connection reset: {chain}")
    } else {
        chain
    }
}

/// Truncate to at most `limit` bytes on a character boundary
fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
