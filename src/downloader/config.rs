//! Fetch configuration and backoff calculation

use std::time::Duration;

use rand::Rng;

use crate::downloader::DownloadError;
use crate::fetcher::DateRange;

/// Default number of retries after the first attempt.
/// 3 retries with a 1s base gives waits of roughly 2s, 4s and 8s plus jitter.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest accepted retry count.
/// At 10 retries the last backoff alone is over 17 minutes.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Default worker pool size.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Maximum allowed concurrency; CIMIS throttles aggressive clients with 429s.
pub const MAX_CONCURRENCY: usize = 32;

/// Base backoff delay in milliseconds; attempt `n` waits `base * 2^n`.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// How failed attempts decide whether to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    /// Retry only errors the classifier marks retryable
    #[default]
    Classified,
    /// Retry every failure until attempts run out
    Uniform,
}

/// Calculate exponential backoff delay before attempt `attempt`
///
/// `base * 2^attempt`, saturating at [`Duration::MAX`]; no upper cap.
pub fn calculate_backoff(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// Uniform random jitter in `[0, backoff / 2)`
pub fn calculate_jitter<R: Rng + ?Sized>(backoff: Duration, rng: &mut R) -> Duration {
    let bound = (backoff / 2).as_nanos().min(u128::from(u64::MAX)) as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.random_range(0..bound))
}

/// Settings for one multi-station fetch run
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Dates requested for every station
    pub range: DateRange,
    /// Number of worker tasks
    pub concurrency: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base of the exponential backoff
    pub initial_backoff: Duration,
    /// Retry continuation policy
    pub retry_mode: RetryMode,
    /// Fetch and decode only; skip persistence
    pub dry_run: bool,
    /// Seed for per-worker jitter generators; OS entropy when `None`
    pub rng_seed: Option<u64>,
}

impl FetchConfig {
    /// Configuration with defaults for the given range
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            retry_mode: RetryMode::default(),
            dry_run: false,
            rng_seed: None,
        }
    }

    /// Set the worker pool size
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set retries after the first attempt
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Set the retry continuation policy
    pub fn with_retry_mode(mut self, retry_mode: RetryMode) -> Self {
        self.retry_mode = retry_mode;
        self
    }

    /// Enable or disable dry-run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Seed jitter generators for reproducible backoff
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Check bounds on concurrency and retries
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(DownloadError::InvalidConfig(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(DownloadError::InvalidConfig(format!(
                "retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}
