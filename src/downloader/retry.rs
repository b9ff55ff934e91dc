//! Per-station retry state machine
//!
//! ```text
//! Idle ─▶ Attempting(0) ─ok─▶ Success
//!              │
//!              └─err─▶ Attempting(n+1)  (retryable and n < max_retries)
//!                  └─▶ Exhausted        (terminal or out of attempts)
//! ```
//!
//! Before every attempt `n > 0` the controller sleeps `backoff(n) + jitter`,
//! with jitter drawn from the calling worker's own RNG.

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::downloader::config::{calculate_backoff, calculate_jitter, FetchConfig, RetryMode};
use crate::fetcher::retry_formatter::{
    classify_retryable_error, extract_error_type, RetryContext, RetryErrorType, RetryableError,
};
use crate::fetcher::{DateRange, FetcherError, FetcherResult};
use crate::metrics::record_retry_backoff;
use crate::StationId;

/// Retry controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// No attempt made yet
    Idle,
    /// About to run attempt `n` (0-based)
    Attempting(u32),
    /// An attempt succeeded
    Success,
    /// No further attempts will be made
    Exhausted,
}

/// Result of a single attempt as seen by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt returned data
    Succeeded,
    /// The attempt failed; `retryable` is the policy verdict
    Failed {
        /// Whether the policy allows another attempt for this error
        retryable: bool,
    },
}

impl RetryState {
    /// Leave `Idle` for the first attempt
    pub fn start(self) -> RetryState {
        match self {
            RetryState::Idle => RetryState::Attempting(0),
            other => other,
        }
    }

    /// Transition after an attempt
    pub fn next(self, outcome: AttemptOutcome, max_retries: u32) -> RetryState {
        match self {
            RetryState::Idle => RetryState::Attempting(0),
            RetryState::Attempting(n) => match outcome {
                AttemptOutcome::Succeeded => RetryState::Success,
                AttemptOutcome::Failed { retryable: true } if n < max_retries => {
                    RetryState::Attempting(n + 1)
                }
                AttemptOutcome::Failed { .. } => RetryState::Exhausted,
            },
            terminal => terminal,
        }
    }

    /// Whether the controller has stopped
    pub fn is_terminal(self) -> bool {
        matches!(self, RetryState::Success | RetryState::Exhausted)
    }
}

/// Bounded exponential backoff policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base
    pub initial_backoff: Duration,
    /// Continuation policy
    pub mode: RetryMode,
}

impl RetryPolicy {
    /// Policy from a run configuration
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            mode: config.retry_mode,
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(self.initial_backoff, attempt)
    }

    /// Classify an error and apply the retry mode
    pub fn verdict(&self, err: &FetcherError) -> (bool, Option<RetryableError>) {
        let classified = classify_retryable_error(Some(err), err.status_code());
        let retryable = match self.mode {
            RetryMode::Uniform => true,
            // Undecodable bodies are retried whatever their message says
            RetryMode::Classified => {
                matches!(err, FetcherError::Decode(_))
                    || classified.as_ref().is_some_and(|c| c.should_retry)
            }
        };
        (retryable, classified)
    }
}

/// Everything the controller learned while running
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Value of the successful attempt, or the last error
    pub result: FetcherResult<T>,
    /// Attempts actually made
    pub attempts: u32,
    /// `Success` or `Exhausted`
    pub final_state: RetryState,
    /// Classifier verdict for the last error, if any
    pub last_verdict: Option<RetryableError>,
}

/// Drive `operation` through the retry state machine
///
/// `operation` receives the 0-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    rng: &mut StdRng,
    station: StationId,
    range: &DateRange,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = FetcherResult<T>>,
{
    let mut state = RetryState::Idle;
    let mut attempts = 0u32;
    let mut pending_delay = Duration::ZERO;
    let mut last_error: Option<FetcherError> = None;
    let mut last_verdict = None;
    let mut value = None;

    while !state.is_terminal() {
        let n = match state {
            RetryState::Idle => {
                state = state.start();
                continue;
            }
            RetryState::Attempting(n) => n,
            RetryState::Success | RetryState::Exhausted => break,
        };

        if n > 0 {
            tokio::time::sleep(pending_delay).await;
        }

        attempts += 1;
        debug!(
            station_id = station,
            attempt = attempts,
            max_attempts = policy.max_attempts(),
            "Fetch attempt"
        );

        match operation(n).await {
            Ok(v) => {
                if n > 0 {
                    let error_type = last_error
                        .as_ref()
                        .map(extract_error_type)
                        .unwrap_or(RetryErrorType::NetworkGeneric);
                    let ctx = RetryContext::new(
                        attempts,
                        policy.max_attempts(),
                        error_type,
                        pending_delay,
                        station,
                        Some(*range),
                        "",
                    );
                    info!("{}", ctx.format_success());
                }
                value = Some(v);
                last_error = None;
                state = state.next(AttemptOutcome::Succeeded, policy.max_retries);
            }
            Err(err) => {
                let (retryable, verdict) = policy.verdict(&err);
                state = state.next(AttemptOutcome::Failed { retryable }, policy.max_retries);

                if let RetryState::Attempting(next) = state {
                    let backoff = policy.backoff(next);
                    pending_delay = backoff.saturating_add(calculate_jitter(backoff, rng));
                    let ctx = RetryContext::new(
                        attempts + 1,
                        policy.max_attempts(),
                        extract_error_type(&err),
                        pending_delay,
                        station,
                        Some(*range),
                        err.to_string(),
                    );
                    warn!(station_id = station, error = %err, "{}", ctx.format_retry());
                    record_retry_backoff(pending_delay, next);
                } else if !retryable {
                    debug!(
                        station_id = station,
                        verdict = ?verdict.as_ref().map(|v| v.to_string()),
                        "Error is not retryable, giving up"
                    );
                }

                last_verdict = verdict;
                last_error = Some(err);
            }
        }
    }

    let result = match (value, last_error) {
        (Some(v), _) => Ok(v),
        (None, Some(err)) => Err(err),
        (None, None) => Err(FetcherError::Transport("no attempt was made".to_string())),
    };

    RetryOutcome {
        result,
        attempts,
        final_state: state,
        last_verdict,
    }
}
