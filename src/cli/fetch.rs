//! Fetch command implementation

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Datelike;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::CliError;
use crate::downloader::config::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, MAX_CONCURRENCY, MAX_RETRIES_LIMIT,
};
use crate::downloader::{FetchConfig, FetchExecutor, FetchProgress, RetryMode};
use crate::fetcher::cimis_http::CimisClient;
use crate::fetcher::shared_resources::build_http_client;
use crate::fetcher::DateRange;
use crate::output::FileChunkStore;
use crate::report::FetchSummary;
use crate::stations::resolve_stations;
use crate::{EPOCH_YEAR, MAX_YEAR};

/// Environment variable holding the CIMIS application key
pub const APP_KEY_ENV: &str = "CIMIS_APP_KEY";

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// CIMIS station data fetcher
#[derive(Parser, Debug)]
#[command(name = "cimis-fetch")]
#[command(about = "Fetch daily CIMIS weather station data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Data root directory for station chunks and the index
    #[arg(long, global = true, default_value = "./data")]
    pub data_dir: PathBuf,

    /// CIMIS application key
    #[arg(long, global = true, env = APP_KEY_ENV, hide_env_values = true)]
    pub app_key: Option<String>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch daily data for a list of stations
    Fetch(FetchArgs),
}

/// Fetch command arguments
#[derive(Parser, Debug, Clone)]
pub struct FetchArgs {
    /// Stations to fetch, e.g. "2,5-7,80"
    #[arg(long)]
    pub stations: String,

    /// Calendar year to fetch (defaults to the current year)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub year: Option<i32>,

    /// First date, MM/DD/YYYY (requires --end)
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Last date, MM/DD/YYYY (requires --start)
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Number of concurrent workers (default: 4, max: 32)
    ///
    /// CIMIS answers aggressive clients with 429s; 4-8 is plenty for most runs.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Retries after the first attempt (default: 3, range: 0-10)
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(0..=MAX_RETRIES_LIMIT as i64)
    )]
    pub retries: u32,

    /// Fetch and decode without writing anything
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Print a per-station phase timing breakdown
    #[arg(long, default_value_t = false)]
    pub perf: bool,

    /// Retry every failure, including client errors
    #[arg(long, default_value_t = false)]
    pub retry_all: bool,

    /// Request gzip-compressed responses
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub gzip: bool,

    /// Override the CIMIS API endpoint
    #[arg(long)]
    pub base_url: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl FetchArgs {
    /// Date range requested by the flags
    pub fn date_range(&self) -> Result<DateRange, CliError> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => DateRange::parse(start, end)
                .map_err(|e| CliError::InvalidArgument(format!("invalid date range: {e}"))),
            (None, None) => {
                let year = self.year.unwrap_or_else(|| chrono::Utc::now().year());
                if !(EPOCH_YEAR..=MAX_YEAR).contains(&year) {
                    return Err(CliError::InvalidArgument(format!(
                        "year must be between {EPOCH_YEAR} and {MAX_YEAR}, got {year}"
                    )));
                }
                DateRange::for_year(year)
                    .map_err(|e| CliError::InvalidArgument(format!("invalid year: {e}")))
            }
            _ => Err(CliError::InvalidArgument(
                "--start and --end must be given together".to_string(),
            )),
        }
    }

    /// Run configuration for the flags
    pub fn fetch_config(&self, range: DateRange) -> FetchConfig {
        let mode = if self.retry_all {
            RetryMode::Uniform
        } else {
            RetryMode::Classified
        };
        FetchConfig::new(range)
            .with_concurrency(self.concurrency)
            .with_max_retries(self.retries)
            .with_retry_mode(mode)
            .with_dry_run(self.dry_run)
    }

    fn client(&self, app_key: &str) -> Result<CimisClient, CliError> {
        let client = if self.gzip {
            CimisClient::new(app_key)
        } else {
            CimisClient::with_client(Arc::new(build_http_client(false)?), app_key)
        };
        Ok(match &self.base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    /// Execute the fetch command and print the summary
    ///
    /// Station failures are part of the summary, not an error.
    pub async fn execute(&self, cli: &Cli) -> Result<FetchSummary, CliError> {
        let stations = resolve_stations(&self.stations)?;
        let range = self.date_range()?;
        let app_key = cli
            .app_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(format!(
                    "CIMIS app key missing: pass --app-key or set {APP_KEY_ENV}"
                ))
            })?;

        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr).await.map_err(|e| {
                CliError::ConfigurationError(format!("failed to start metrics exporter: {e}"))
            })?;
        }

        let config = self.fetch_config(range);
        let fetcher = Arc::new(self.client(app_key)?);
        let store = Arc::new(FileChunkStore::open(&cli.data_dir).await?);
        let executor = FetchExecutor::new(fetcher, store, config)?;

        info!(
            stations = stations.len(),
            range = %range,
            data_dir = %cli.data_dir.display(),
            "Fetching stations"
        );

        let pb = create_progress_bar(stations.len(), cli.output_format);
        let mut progress = FetchProgress::new(stations.len());
        let started = Instant::now();

        let results = executor
            .run_with_progress(&stations, |result| {
                progress.update(result);
                pb.inc(1);
                pb.set_message(progress.status_message());
                if pb.is_hidden() && progress.should_emit_update() {
                    info!("{}", progress.format_progress());
                    progress.mark_emitted();
                }
            })
            .await;
        pb.finish_and_clear();

        let summary = FetchSummary::from_results(results, started.elapsed());
        match cli.output_format {
            OutputFormat::Json => {
                let json = summary.render_json().map_err(|e| {
                    CliError::OutputError(crate::output::OutputError::SerializationError(
                        e.to_string(),
                    ))
                })?;
                println!("{json}");
            }
            OutputFormat::Human => print!("{}", summary.render_human(self.perf)),
        }

        Ok(summary)
    }
}

// ─── Progress bar ────────────────────────────────────────────────────────────

fn create_progress_bar(total: usize, format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} stations {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
