use std::time::Duration;

use cimis_fetch::fetcher::retry_formatter::{
    classify_retryable_error, extract_error_type, RetryContext, RetryErrorType,
};
use cimis_fetch::fetcher::{DateRange, FetcherError};

fn sample_context(error_type: RetryErrorType) -> RetryContext {
    RetryContext::new(
        2,
        4,
        error_type,
        Duration::from_secs(4),
        80,
        Some(DateRange::parse("01/01/2024", "01/31/2024").unwrap()),
        "network timeout",
    )
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let ctx = sample_context(RetryErrorType::RateLimit);
    let message = ctx.format_retry();
    assert!(message.contains("station 80"));
    assert!(message.contains("attempt 2/4"));
    assert!(message.contains("rate limit exceeded"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.contains("01/01/2024 to 01/31/2024"));
}

#[test]
fn format_success_includes_station_context() {
    let ctx = sample_context(RetryErrorType::NetworkTimeout);
    let message = ctx.format_success();
    assert!(message.contains("Retry attempt 2/4 succeeded"));
    assert!(message.contains("station 80"));
}

#[test]
fn format_failure_lists_suggestions() {
    let ctx = sample_context(RetryErrorType::ServerError(503));
    let message = ctx.format_failure();
    assert!(message.starts_with("[FAILED] Station 80 failed after 2 attempt(s)"));
    assert!(message.contains("Last error: network timeout"));
    assert!(message.contains("--retries (current: 3)"));
}

#[test]
fn terminal_errors_do_not_suggest_more_retries() {
    let ctx = sample_context(RetryErrorType::AuthFailed(401));
    let suggestions = ctx.format_suggestions();
    assert_eq!(suggestions.len(), 1);
    assert!(suggestions[0].contains("CIMIS_APP_KEY"));
}

#[test]
fn classifier_status_rules() {
    let retry = |status: u16| {
        classify_retryable_error(Some("boom"), status)
            .unwrap()
            .should_retry
    };
    assert!(!retry(400));
    assert!(!retry(401));
    assert!(!retry(404));
    assert!(retry(429));
    assert!(retry(500));
    assert!(retry(503));
    assert!(!retry(0));
    assert!(classify_retryable_error::<str>(None, 503).is_none());
}

#[test]
fn classifier_keywords_are_case_insensitive() {
    for message in [
        "operation TIMEOUT",
        "Connection refused (os error 111)",
        "connection reset by peer",
        "unexpected eof",
        "Broken pipe",
        "no such host",
    ] {
        let verdict = classify_retryable_error(Some(message), 0).unwrap();
        assert!(verdict.should_retry, "{message}");
        assert!(verdict.to_string().starts_with("retryable: "));
    }
    let verdict = classify_retryable_error(Some("certificate invalid"), 0).unwrap();
    assert_eq!(verdict.to_string(), "non-retryable: certificate invalid (status: 0)");
}

#[test]
fn error_type_from_fetcher_errors() {
    let status = |s: u16| FetcherError::HttpStatus {
        status: s,
        body: String::new(),
    };
    assert_eq!(extract_error_type(&status(429)), RetryErrorType::RateLimit);
    assert_eq!(extract_error_type(&status(502)), RetryErrorType::ServerError(502));
    assert_eq!(extract_error_type(&status(403)), RetryErrorType::AuthFailed(403));
    assert_eq!(extract_error_type(&status(404)), RetryErrorType::ClientError(404));
    assert_eq!(
        extract_error_type(&FetcherError::Transport("timeout: deadline".into())),
        RetryErrorType::NetworkTimeout
    );
    assert_eq!(
        extract_error_type(&FetcherError::Decode("bad".into())),
        RetryErrorType::DecodeError
    );
}
