//! Retry classification and message formatting for station fetches.
//!
//! [`classify_retryable_error`] decides whether a failed attempt is worth
//! repeating from its HTTP status and error text alone. [`RetryErrorType`] and
//! [`RetryContext`] turn the same failure into consistent, user-facing log lines.

use std::fmt;
use std::time::Duration;

use crate::fetcher::{DateRange, FetcherError};
use crate::StationId;

/// Error text fragments that mark a status-less failure as transient.
pub const RETRYABLE_ERROR_PATTERNS: &[&str] = &[
    "timeout",
    "connection refused",
    "connection reset",
    "EOF",
    "broken pipe",
    "no such host",
];

/// Verdict of the retry classifier for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableError {
    /// Rendered error message
    pub error: String,
    /// HTTP status code, 0 when none was received
    pub status_code: u16,
    /// Whether another attempt may succeed
    pub should_retry: bool,
}

impl fmt::Display for RetryableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.should_retry {
            "retryable"
        } else {
            "non-retryable"
        };
        write!(f, "{prefix}: {} (status: {})", self.error, self.status_code)
    }
}

impl std::error::Error for RetryableError {}

/// Classify a failed attempt as retryable or terminal.
///
/// Rules, first match wins:
/// 1. no error → `None`
/// 2. 4xx other than 429 → terminal
/// 3. 429 or 5xx → retryable
/// 4. error text contains one of [`RETRYABLE_ERROR_PATTERNS`] (ignoring case) → retryable
/// 5. anything else → terminal
///
/// # Examples
///
/// ```
/// use cimis_fetch::fetcher::retry_formatter::classify_retryable_error;
///
/// let verdict = classify_retryable_error(Some(&"connection timeout"), 0).unwrap();
/// assert!(verdict.should_retry);
///
/// let verdict = classify_retryable_error(Some(&"bad request"), 400).unwrap();
/// assert!(!verdict.should_retry);
///
/// assert!(classify_retryable_error(None::<&str>, 500).is_none());
/// ```
pub fn classify_retryable_error<E>(error: Option<&E>, status_code: u16) -> Option<RetryableError>
where
    E: fmt::Display + ?Sized,
{
    let error = error?.to_string();

    let should_retry = if (400..500).contains(&status_code) && status_code != 429 {
        false
    } else if status_code == 429 || status_code >= 500 {
        true
    } else {
        contains_any(&error, RETRYABLE_ERROR_PATTERNS)
    };

    Some(RetryableError {
        error,
        status_code,
        should_retry,
    })
}

/// Case-insensitive substring search for any of `needles`.
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    needles
        .iter()
        .any(|needle| haystack.contains(&needle.to_ascii_lowercase()))
}

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request or body read timed out
    NetworkTimeout,
    /// Connection refused, reset, or host lookup failed
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 invalid request
    InvalidRequest,
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Response body was not the expected JSON
    DecodeError,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "authentication failed (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
            Self::DecodeError => "malformed response",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented with actionable guidance after failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Reduce --concurrency or wait before retrying",
            Self::ServerError(_) => "CIMIS may be experiencing issues, try again later",
            Self::InvalidRequest => "Check station numbers and the date range for typos",
            Self::AuthFailed(_) => "Check that CIMIS_APP_KEY is set and valid",
            Self::ClientError(_) => "Review request parameters against the CIMIS API docs",
            Self::DecodeError => "The API may be returning an error page, try again later",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Low-cardinality label for failure counters.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "timeout",
            Self::NetworkOffline => "offline",
            Self::RateLimit => "rate_limit",
            Self::ServerError(_) => "server",
            Self::InvalidRequest => "invalid_request",
            Self::AuthFailed(_) => "auth",
            Self::ClientError(_) => "client",
            Self::DecodeError => "decode",
            Self::NetworkGeneric => "network",
        }
    }

    /// Determine whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RetryErrorType::InvalidRequest
                | RetryErrorType::AuthFailed(_)
                | RetryErrorType::ClientError(_)
        )
    }
}

/// Extract a [`RetryErrorType`] from a fetch failure.
pub fn extract_error_type(err: &FetcherError) -> RetryErrorType {
    match err {
        FetcherError::HttpStatus { status, .. } => match *status {
            400 => RetryErrorType::InvalidRequest,
            401 | 403 => RetryErrorType::AuthFailed(*status),
            429 => RetryErrorType::RateLimit,
            s if s >= 500 => RetryErrorType::ServerError(s),
            s => RetryErrorType::ClientError(s),
        },
        FetcherError::Decode(_) => RetryErrorType::DecodeError,
        FetcherError::InvalidRequest(_) => RetryErrorType::InvalidRequest,
        FetcherError::Transport(message) => {
            if contains_any(message, &["timeout"]) {
                RetryErrorType::NetworkTimeout
            } else if contains_any(
                message,
                &["connection refused", "connection reset", "no such host"],
            ) {
                RetryErrorType::NetworkOffline
            } else {
                RetryErrorType::NetworkGeneric
            }
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Station being fetched
    pub station_id: StationId,
    /// Requested date range
    pub date_range: Option<DateRange>,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        station_id: StationId,
        date_range: Option<DateRange>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type,
            backoff_duration,
            station_id,
            date_range,
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying station {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.station_id,
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_range(&mut message, self.date_range);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded for station {}",
            self.attempt, self.max_attempts, self.station_id
        );
        append_range(&mut message, self.date_range);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "[FAILED] Station {} failed after {} attempt(s)",
            self.station_id, self.attempt
        ));
        lines.push(format!("  Last error: {}", self.error_message));

        let range_display = self
            .date_range
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        lines.push(format!("  Date range: {range_display}"));
        lines.push("  Suggestions:".to_string());

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.error_type.is_retryable() {
            suggestions.push(format!(
                "Try increasing --retries (current: {})",
                self.max_attempts.saturating_sub(1)
            ));
        }
        suggestions
    }
}

fn append_range(buffer: &mut String, date_range: Option<DateRange>) {
    if let Some(range) = date_range {
        buffer.push_str(" [");
        buffer.push_str(&range.to_string());
        buffer.push(']');
    }
}
