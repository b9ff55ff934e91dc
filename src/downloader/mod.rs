//! Multi-station fetch orchestration
//!
//! The downloader runs one job per requested station on a bounded pool of
//! worker tasks and returns exactly one [`StationFetchResult`] per job.
//!
//! # Overview
//!
//! 1. **Configuration**: Describe the run with [`FetchConfig`]
//! 2. **Execution**: Hand the station list to [`FetchExecutor::run`]
//! 3. **Retries**: Each station goes through the [`retry`] state machine
//! 4. **Persistence**: Results are stored through [`crate::output::ChunkStore`]
//! 5. **Progress**: [`progress::FetchProgress`] aggregates results as they arrive
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cimis_fetch::downloader::{FetchConfig, FetchExecutor};
//! use cimis_fetch::fetcher::{cimis_http::CimisClient, DateRange};
//! use cimis_fetch::output::FileChunkStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig::new(DateRange::for_year(2024)?).with_concurrency(8);
//! let fetcher = Arc::new(CimisClient::new("app-key"));
//! let store = Arc::new(FileChunkStore::open("./data").await?);
//!
//! let executor = FetchExecutor::new(fetcher, store, config)?;
//! let results = executor.run(&[2, 5, 80]).await;
//! assert_eq!(results.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`executor`] - Worker pool and result collection
//! - [`job`] - Station jobs and per-station results
//! - [`retry`] - Retry state machine and backoff loop
//! - [`config`] - Configuration constants and backoff calculation
//! - [`progress`] - Run progress aggregation
//!
//! # Error Handling
//!
//! Per-station failures never abort a run; they are reported in the
//! station's result. [`DownloadError`] is only returned for problems with the
//! run itself, such as an invalid configuration.
//!
//! # Related Modules
//!
//! - [`crate::fetcher`] - Retrieval and decoding of station data
//! - [`crate::output`] - Chunk persistence

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod retry;

pub use config::{FetchConfig, RetryMode};
pub use executor::FetchExecutor;
pub use job::{PhaseTimings, StationFetchResult, StationJob, TimingsMs};
pub use progress::FetchProgress;
pub use retry::{RetryPolicy, RetryState};

use crate::output::OutputError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Chunk write or index update failed after a successful fetch
    #[error("persist error: {0}")]
    Persist(#[from] OutputError),

    /// A worker stopped before reporting a station's result
    #[error("worker terminated before reporting a result")]
    WorkerLost,

    /// Invalid run configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;
