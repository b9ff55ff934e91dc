//! Observability metrics for station fetches
//!
//! Emits request, retry and per-station outcome metrics through the `metrics`
//! facade. Without an installed recorder every call is a no-op; `--metrics-addr`
//! installs a Prometheus exporter serving `/metrics`.
//!
//! ## Metrics
//!
//! - `http_requests_total{endpoint,status}` / `http_request_duration_seconds`
//! - `station_fetch_retries_total{attempt}` / `retry_backoff_duration_seconds`
//! - `stations_completed_total`, `stations_failed_total{error}`, `stations_skipped_total`
//! - `records_fetched_total`, `bytes_transferred_total`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::StationId;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls return `Ok(())` without rebinding.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
///
/// # Errors
/// Returns an error if the exporter cannot be installed or the address cannot be bound
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the CIMIS API"
    );

    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Time from sending a request to receiving response headers"
    );

    describe_counter!(
        "station_fetch_retries_total",
        Unit::Count,
        "Total number of station fetch retries"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );

    describe_counter!(
        "stations_completed_total",
        Unit::Count,
        "Stations fetched and persisted successfully"
    );

    describe_counter!(
        "stations_failed_total",
        Unit::Count,
        "Stations that exhausted retries or failed to persist"
    );

    describe_counter!(
        "stations_skipped_total",
        Unit::Count,
        "Stations skipped because their chunk already exists"
    );

    describe_counter!(
        "records_fetched_total",
        Unit::Count,
        "Daily records decoded across all stations"
    );

    describe_counter!(
        "bytes_transferred_total",
        Unit::Bytes,
        "Response body bytes received"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    station_id: StationId,
    start_time: Instant,
    correlation_id: String,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(endpoint: &'static str, station_id: StationId) -> Self {
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = endpoint,
            station_id = station_id,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            station_id,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                station_id = self.station_id,
                duration_ms = duration.as_millis(),
                "Rate limit response (429) from CIMIS"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            station_id = self.station_id,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            station_id = self.station_id,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "station_fetch_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Per-station outcome metrics
pub struct StationMetrics {
    station_id: StationId,
    start_time: Instant,
}

impl StationMetrics {
    /// Start tracking a station
    pub fn start(station_id: StationId) -> Self {
        Self {
            station_id,
            start_time: Instant::now(),
        }
    }

    /// Record a station whose chunk already existed
    pub fn record_skipped(&self) {
        counter!("stations_skipped_total").increment(1);
        debug!(station_id = self.station_id, "Station skipped");
    }

    /// Record successful fetch (and persist, unless dry-run)
    pub fn record_success(&self, records: usize, bytes: u64) {
        counter!("stations_completed_total").increment(1);
        counter!("records_fetched_total").increment(records as u64);
        counter!("bytes_transferred_total").increment(bytes);

        debug!(
            station_id = self.station_id,
            records = records,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Station metrics recorded"
        );
    }

    /// Record a terminal failure
    pub fn record_failure(&self, error_kind: &'static str) {
        counter!("stations_failed_total", "error" => error_kind).increment(1);

        debug!(
            station_id = self.station_id,
            error = error_kind,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Station failure recorded"
        );
    }
}
